//! atproto OAuth sign-in for a public browser client.
//!
//! [`flow::AuthorizationFlowManager`] builds the authorization redirect
//! (PKCE, `state`, DPoP key) and exchanges the code on return;
//! [`store::SessionStore`] keeps the resulting session across restarts;
//! [`handoff::HandoffGuard`] binds the external broker entry point with a
//! single-use nonce. [`routes`] wires these to the callback and
//! pre-authorization routes.

/// Client identity document served at `client_id`
pub mod atproto;
pub mod config;
pub mod dpop;
pub mod error;
pub mod flow;
pub mod handoff;
/// Minimal JWS for DPoP proofs
pub mod jose;
pub mod latch;
/// PAR and token endpoint calls
pub mod request;
/// Authorization server discovery
pub mod resolver;
pub mod routes;
pub mod session;
pub mod store;
/// OAuth wire types
pub mod types;
pub mod utils;

/// DPoP algorithm assumed when the server does not list any
pub const FALLBACK_ALG: &str = "ES256";

pub use config::OAuthConfig;
pub use error::{OAuthError, Result};
pub use flow::{AuthorizationFlowManager, FlowState};
pub use handoff::HandoffGuard;
pub use routes::{CallbackRoute, FailureScreen, Location, PreAuthRoute, RouteOutcome};
pub use session::Session;
pub use store::SessionStore;
