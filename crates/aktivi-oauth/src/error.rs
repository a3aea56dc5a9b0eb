use aktivi_common::store::StoreError;
use aktivi_common::types::string::AtStrError;
use aktivi_identity::IdentityError;
use miette::Diagnostic;
use smol_str::SmolStr;
use thiserror::Error;

use crate::config::ConfigError;
use crate::dpop::DpopError;
use crate::flow::FlowState;
use crate::request::RequestError;
use crate::resolver::ResolverError;

/// Result alias for the sign-in flow
pub type Result<T> = core::result::Result<T, OAuthError>;

/// Errors surfaced by the authorization flow, the handoff guard and the
/// session store.
///
/// Flow-integrity and exchange failures are terminal: the attempt cannot be
/// resumed and has to be started over from the sign-in page. See
/// [`OAuthError::is_terminal`].
#[derive(Debug, Error, Diagnostic)]
pub enum OAuthError {
    /// A required route or callback parameter was absent
    #[error("missing {0} parameter")]
    #[diagnostic(code(aktivi_oauth::missing_parameter))]
    MissingParameter(&'static str),

    /// The callback fragment could not be decoded
    #[error("malformed callback parameters: {0}")]
    #[diagnostic(code(aktivi_oauth::malformed_callback))]
    MalformedCallback(#[from] serde_html_form::de::Error),

    /// The handoff route ran without a nonce stored for this page session
    #[error("no stored nonce for this browser session")]
    #[diagnostic(
        code(aktivi_oauth::no_stored_nonce),
        help("start sign-in again from the login page in this same browser tab")
    )]
    NoStoredNonce,

    /// The nonce returned by the broker differs from the stored one
    #[error("nonce mismatch")]
    #[diagnostic(code(aktivi_oauth::nonce_mismatch))]
    NonceMismatch,

    /// The stored nonce outlived its time-to-live
    #[error("nonce expired")]
    #[diagnostic(
        code(aktivi_oauth::nonce_expired),
        help("the sign-in handoff took too long; start again")
    )]
    NonceExpired,

    /// The authorization request for this `state` was already exchanged
    #[error("authorization response already consumed")]
    #[diagnostic(code(aktivi_oauth::already_consumed))]
    AlreadyConsumed,

    /// The pending authorization request outlived its time-to-live
    #[error("authorization request expired")]
    #[diagnostic(
        code(aktivi_oauth::request_expired),
        help("the sign-in took too long to come back; start again")
    )]
    RequestExpired,

    /// No pending authorization request matches the returned `state`
    #[error("unknown authorization state")]
    #[diagnostic(
        code(aktivi_oauth::state_mismatch),
        help("the callback does not belong to a sign-in started from this client")
    )]
    StateMismatch,

    /// `iss` on the callback does not name the server the request went to
    #[error("issuer mismatch: expected {expected}, got {got}")]
    #[diagnostic(code(aktivi_oauth::issuer_mismatch))]
    IssuerMismatch { expected: SmolStr, got: SmolStr },

    /// A flow step was requested from a state that does not allow it
    #[error("invalid flow transition from {from} to {to}")]
    #[diagnostic(code(aktivi_oauth::invalid_transition))]
    InvalidTransition { from: FlowState, to: FlowState },

    /// The authorization server redirected back with an `error` parameter
    #[error("authorization denied: {error}{}", description.as_ref().map(|d| format!(" ({d})")).unwrap_or_default())]
    #[diagnostic(code(aktivi_oauth::authorization_denied))]
    AuthorizationDenied {
        error: SmolStr,
        description: Option<SmolStr>,
    },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Exchange(#[from] RequestError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Resolver(#[from] ResolverError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Identity(#[from] IdentityError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Storage(#[from] StoreError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Dpop(#[from] DpopError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(code(aktivi_oauth::invalid_identifier))]
    InvalidIdentifier(#[from] AtStrError),

    #[error("URL parse error: {0}")]
    #[diagnostic(code(aktivi_oauth::url))]
    Url(#[from] url::ParseError),
}

impl OAuthError {
    /// Whether the sign-in attempt is dead and must be restarted from scratch.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OAuthError::MissingParameter(_)
                | OAuthError::MalformedCallback(_)
                | OAuthError::NoStoredNonce
                | OAuthError::NonceMismatch
                | OAuthError::NonceExpired
                | OAuthError::AlreadyConsumed
                | OAuthError::RequestExpired
                | OAuthError::StateMismatch
                | OAuthError::IssuerMismatch { .. }
                | OAuthError::InvalidTransition { .. }
                | OAuthError::AuthorizationDenied { .. }
                | OAuthError::Exchange(_)
                | OAuthError::Dpop(_)
        )
    }
}
