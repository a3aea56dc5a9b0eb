//! # Aktivi
//!
//! Identity resolution and OAuth sign-in for an atproto application that
//! routes all authenticated traffic through one relay.
//!
//! - [`identity`]: handle → DID → document → hosting endpoint, with the
//!   relay substituted for the endpoint.
//! - [`oauth`]: the authorization flow, stored sessions and the external
//!   broker handoff.
//! - [`AuthContext`]: what an application holds on to: restore on start,
//!   sign in, sign out.
//!
//! ## Example
//!
//! ```no_run
//! # async fn example(location: &dyn aktivi::oauth::Location) -> miette::Result<()> {
//! use std::sync::Arc;
//! use aktivi::{AuthContext, OAuthConfig};
//! use aktivi::common::store::MemoryStore;
//!
//! let config = OAuthConfig::from_env("https://app.example")?;
//! let resolver = aktivi::relay_resolver(&config);
//! let auth = AuthContext::new(
//!     config,
//!     reqwest::Client::new(),
//!     Arc::new(resolver),
//!     Arc::new(MemoryStore::new()),
//!     Arc::new(MemoryStore::new()),
//! )?;
//!
//! if auth.restore().await.is_none() {
//!     auth.sign_in("alice.example", location).await?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod auth_context;

pub use aktivi_common as common;
pub use aktivi_identity as identity;
pub use aktivi_oauth as oauth;

pub use aktivi_common::{ActorIdentifier, Did, Handle};
pub use aktivi_oauth::{OAuthConfig, OAuthError, Session};
pub use auth_context::AuthContext;

/// The default identity stack with every hosting endpoint replaced by
/// `config.proxy_url`.
#[cfg(feature = "reqwest-client")]
pub fn relay_resolver(
    config: &OAuthConfig,
) -> aktivi_identity::ProxyIdentityResolver<aktivi_identity::LocalActorResolver> {
    aktivi_identity::ProxyIdentityResolver::new(
        aktivi_identity::LocalActorResolver::public(),
        config.proxy_url.clone(),
    )
}
