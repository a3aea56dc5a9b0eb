//! Identity resolution for atproto actors.
//!
//! Turns a handle or DID into a [`ResolvedIdentity`]: the DID, its document,
//! and the hosting endpoint traffic should go to.
//!
//! ## Quick start
//!
//! ```no_run
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! use aktivi_common::ActorIdentifier;
//! use aktivi_identity::{LocalActorResolver, ProxyIdentityResolver, ResolverOptions};
//! use aktivi_identity::resolver::{IdentityResolver, ResolveIdentityOptions};
//!
//! let local = LocalActorResolver::from_options(reqwest::Client::new(), &ResolverOptions::default());
//! let resolver = ProxyIdentityResolver::new(local, url::Url::parse("https://relay.example")?);
//!
//! let actor = ActorIdentifier::new("alice.example")?;
//! let identity = resolver.resolve(&actor, &ResolveIdentityOptions::default()).await?;
//! assert_eq!(identity.pds.as_str(), "https://relay.example/");
//! # Ok(())
//! # }
//! ```
//!
//! ## Resolution order
//!
//! **Handle → DID** (configurable via [`HandleStep`], strictly sequential):
//! 1. DNS TXT `_atproto.{handle}` over DNS-over-HTTPS
//! 2. HTTPS well-known at `https://{handle}/.well-known/atproto-did`
//!
//! With the `dns` feature, [`HandleStep::SystemDns`] queries the OS resolver.
//!
//! **DID → Document** (dispatched on the method segment):
//! - `did:plc` from the PLC directory
//! - `did:web` from the domain's HTTPS server
//!
//! Anything else fails with `UnsupportedMethod` without touching the network.

pub mod did;
pub mod error;
pub mod handle;
pub mod proxy;
pub mod resolver;

use std::time::Duration;

use bon::Builder;
use url::Url;

pub use crate::error::{IdentityError, IdentityWarning};
pub use crate::proxy::ProxyIdentityResolver;
pub use crate::resolver::{
    CompositeDidDocumentResolver, CompositeHandleResolver, IdentityResolver, LocalActorResolver,
    ResolveIdentityOptions, ResolvedIdentity,
};

/// Default PLC directory
pub const DEFAULT_PLC_DIRECTORY: &str = "https://plc.directory/";
/// Default DNS-over-HTTPS JSON endpoint
pub const DEFAULT_DOH_URL: &str = "https://mozilla.cloudflare-dns.com/dns-query";

/// Handle → DID fallback step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleStep {
    /// DNS TXT _atproto.\<handle\> through a DoH JSON endpoint
    DohTxt,
    /// DNS TXT _atproto.\<handle\> through the system resolver (feature `dns`)
    SystemDns,
    /// HTTPS GET https://\<handle\>/.well-known/atproto-did
    HttpsWellKnown,
}

/// Options for the default resolver stack.
///
/// - `plc_directory`: where `did:plc` documents are fetched from.
/// - `doh_url`: DNS-over-HTTPS JSON endpoint for TXT lookups.
/// - `handle_order`: ordered handle strategies.
/// - `timeout`: bound on every individual network call.
#[derive(Debug, Clone, Builder)]
#[builder(start_fn = new)]
pub struct ResolverOptions {
    #[allow(missing_docs)]
    pub plc_directory: Url,
    #[allow(missing_docs)]
    pub doh_url: Url,
    #[allow(missing_docs)]
    pub handle_order: Vec<HandleStep>,
    #[allow(missing_docs)]
    pub timeout: Duration,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self::new()
            .plc_directory(Url::parse(DEFAULT_PLC_DIRECTORY).expect("valid url"))
            .doh_url(Url::parse(DEFAULT_DOH_URL).expect("valid url"))
            .handle_order(vec![HandleStep::DohTxt, HandleStep::HttpsWellKnown])
            .timeout(Duration::from_secs(5))
            .build()
    }
}

#[cfg(feature = "reqwest-client")]
impl LocalActorResolver {
    /// Default stack over a fresh `reqwest` client.
    pub fn public() -> Self {
        Self::from_options(reqwest::Client::new(), &ResolverOptions::default())
    }
}
