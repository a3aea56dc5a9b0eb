use std::path::PathBuf;
use std::sync::Arc;

use aktivi::common::store::{FileStore, MemoryStore};
use aktivi::identity::resolver::{IdentityResolver, ResolveIdentityOptions};
use aktivi::identity::{LocalActorResolver, ProxyIdentityResolver};
use aktivi::oauth::Location;
use aktivi::oauth::atproto::client_metadata;
use aktivi::{ActorIdentifier, AuthContext, OAuthConfig};
use clap::{Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;
use url::Url;

#[derive(Parser, Debug)]
#[command(author, version, about = "Aktivi - atproto identity and sign-in tools")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Resolve a handle or DID and print the identity as JSON
    Resolve {
        /// Handle (e.g. alice.example) or DID
        actor: String,
        /// Replace the hosting endpoint with this relay
        #[arg(long)]
        relay: Option<Url>,
    },
    /// Start sign-in and print the authorization URL
    AuthorizeUrl {
        /// Handle or DID to sign in as
        actor: String,
        /// Application origin the client identity document is served from
        #[arg(long, env = "AKTIVI_ORIGIN", default_value = "http://127.0.0.1:8080")]
        origin: String,
        /// File holding pending requests and sessions
        #[arg(long, default_value = ".aktivi/store.json")]
        store: PathBuf,
    },
    /// Print the client identity document for an origin
    ClientMetadata {
        #[arg(long, env = "AKTIVI_ORIGIN")]
        origin: String,
    },
}

/// Prints the navigation target instead of following it.
struct Stdout;

impl Location for Stdout {
    fn current(&self) -> Url {
        Url::parse("about:blank").expect("valid url")
    }

    fn replace(&self, _url: &Url) {}

    fn assign(&self, url: &Url) {
        println!("{url}");
    }
}

#[tokio::main]
async fn main() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let args = Args::parse();

    match args.command {
        Command::Resolve { actor, relay } => {
            let actor = ActorIdentifier::new(&actor)?;
            let local = LocalActorResolver::public();
            let options = ResolveIdentityOptions::default();
            let identity = match relay {
                Some(relay) => {
                    ProxyIdentityResolver::new(local, relay)
                        .resolve(&actor, &options)
                        .await?
                }
                None => local.resolve(&actor, &options).await?,
            };
            for warning in &identity.warnings {
                tracing::warn!(?warning, "identity warning");
            }
            println!(
                "{}",
                serde_json::to_string_pretty(&identity).into_diagnostic()?
            );
        }
        Command::AuthorizeUrl {
            actor,
            origin,
            store,
        } => {
            let config = OAuthConfig::from_env(&origin)?;
            let resolver = aktivi::relay_resolver(&config);
            let auth = AuthContext::new(
                config,
                reqwest::Client::new(),
                Arc::new(resolver),
                Arc::new(FileStore::open(&store)),
                Arc::new(MemoryStore::new()),
            )?;
            auth.sign_in(&actor, &Stdout).await?;
            tracing::info!(store = %store.display(), "pending request saved");
        }
        Command::ClientMetadata { origin } => {
            let config = OAuthConfig::from_env(&origin)?;
            println!(
                "{}",
                serde_json::to_string_pretty(&client_metadata(&config)).into_diagnostic()?
            );
        }
    }
    Ok(())
}
