use std::time::Duration;

use bon::Builder;
use miette::Diagnostic;
use smol_str::SmolStr;
use thiserror::Error;
use url::Url;

/// Scope requested when none is configured
pub const DEFAULT_SCOPE: &str = "atproto transition:generic";
/// Local relay used when none is configured
pub const DEFAULT_PROXY_URL: &str = "http://127.0.0.1:3000";
/// External broker used when none is configured
pub const DEFAULT_BROKER_URL: &str = "https://ih-auth.pages.dev/auth";
/// Path of the broker return route, relative to the application origin
pub const DEFAULT_PRE_AUTH_PATH: &str = "/oauth/pre";

/// A configuration value that cannot work.
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("invalid URL for {field}: {source}")]
    #[diagnostic(code(aktivi_oauth::config::invalid_url))]
    InvalidUrl {
        field: &'static str,
        #[source]
        source: url::ParseError,
    },
    #[error("{field} must be an http(s) URL, got {url}")]
    #[diagnostic(code(aktivi_oauth::config::not_http))]
    NotHttp { field: &'static str, url: Url },
    #[error("scope `{0}` does not include `atproto`")]
    #[diagnostic(
        code(aktivi_oauth::config::scope),
        help("atproto authorization servers reject requests without the `atproto` scope")
    )]
    MissingAtprotoScope(SmolStr),
}

fn constant_url(url: &'static str) -> Url {
    Url::parse(url).expect("valid url")
}

fn parse_field(field: &'static str, raw: &str) -> Result<Url, ConfigError> {
    Url::parse(raw).map_err(|source| ConfigError::InvalidUrl { field, source })
}

/// Client configuration for the sign-in flow, passed explicitly to every
/// component that needs it.
#[derive(Debug, Clone, Builder)]
#[builder(start_fn = new)]
pub struct OAuthConfig {
    /// URL of the client identity document
    pub client_id: Url,
    /// Callback route; the authorization server returns here
    pub redirect_uri: Url,
    /// Application origin
    pub client_uri: Url,
    /// Relay every authenticated call goes to
    #[builder(default = constant_url(DEFAULT_PROXY_URL))]
    pub proxy_url: Url,
    #[builder(default = SmolStr::new_static(DEFAULT_SCOPE), into)]
    pub scope: SmolStr,
    /// External broker used by the handoff entry point
    #[builder(default = constant_url(DEFAULT_BROKER_URL))]
    pub broker_url: Url,
    #[builder(default = SmolStr::new_static(DEFAULT_PRE_AUTH_PATH), into)]
    pub pre_auth_path: SmolStr,
    /// How long the broker has to send the user back
    #[builder(default = Duration::from_secs(10 * 60))]
    pub nonce_ttl: Duration,
    /// How long a pending sign-in stays exchangeable, and how long its
    /// consumed marker is kept afterwards
    #[builder(default = Duration::from_secs(30 * 60))]
    pub request_ttl: Duration,
    /// Bound on each call to the authorization server
    #[builder(default = Duration::from_secs(10))]
    pub request_timeout: Duration,
    #[builder(into)]
    pub client_name: Option<SmolStr>,
}

impl OAuthConfig {
    /// Defaults derived from the application origin.
    pub fn for_origin(origin: &str) -> Result<Self, ConfigError> {
        let origin = origin.trim_end_matches('/');
        let config = Self::new()
            .client_id(parse_field(
                "client_id",
                &format!("{origin}/client-metadata.json"),
            )?)
            .redirect_uri(parse_field(
                "redirect_uri",
                &format!("{origin}/oauth/callback"),
            )?)
            .client_uri(parse_field("client_uri", origin)?)
            .build();
        config.validate()?;
        Ok(config)
    }

    /// [`OAuthConfig::for_origin`], then overrides from `AKTIVI_OAUTH_*`
    /// environment variables.
    pub fn from_env(origin: &str) -> Result<Self, ConfigError> {
        let mut config = Self::for_origin(origin)?;
        let overrides: [(&'static str, &str, &mut Url); 4] = [
            ("client_id", "AKTIVI_OAUTH_CLIENT_ID", &mut config.client_id),
            ("redirect_uri", "AKTIVI_OAUTH_REDIRECT_URI", &mut config.redirect_uri),
            ("proxy_url", "AKTIVI_OAUTH_PROXY_URL", &mut config.proxy_url),
            ("broker_url", "AKTIVI_OAUTH_BROKER_URL", &mut config.broker_url),
        ];
        for (field, var, slot) in overrides {
            if let Ok(raw) = std::env::var(var) {
                *slot = parse_field(field, raw.trim())?;
            }
        }
        config.validate()?;
        Ok(config)
    }

    /// Every URL is http(s) with a host and the scope includes `atproto`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, url) in [
            ("client_id", &self.client_id),
            ("redirect_uri", &self.redirect_uri),
            ("client_uri", &self.client_uri),
            ("proxy_url", &self.proxy_url),
            ("broker_url", &self.broker_url),
        ] {
            if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
                return Err(ConfigError::NotHttp {
                    field,
                    url: url.clone(),
                });
            }
        }
        if !self.scope.split_whitespace().any(|s| s == "atproto") {
            return Err(ConfigError::MissingAtprotoScope(self.scope.clone()));
        }
        Ok(())
    }

    /// Where the broker sends the user back to: `{client_uri}{pre_auth_path}`.
    pub fn pre_auth_url(&self) -> Result<Url, ConfigError> {
        self.client_uri
            .join(&self.pre_auth_path)
            .map_err(|source| ConfigError::InvalidUrl {
                field: "pre_auth_path",
                source,
            })
    }
}
