use aktivi_common::{ActorIdentifier, Did};
use chrono::{DateTime, Utc};
use jose_jwk::Key;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use url::Url;

use crate::dpop::DpopState;
use crate::types::{OAuthTokenType, TokenSet};

/// An authenticated session for one DID.
///
/// The access token is DPoP-bound to `dpop.key`; both are needed to make
/// authenticated calls to `pds` (the relay).
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Account the tokens were issued for (the token response `sub`)
    pub did: Did,
    pub access_token: SmolStr,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<SmolStr>,
    pub token_type: OAuthTokenType,
    /// Scope granted, which may be narrower than requested
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<SmolStr>,
    /// Key the access token is bound to
    pub dpop: DpopState,
    /// Absolute expiry of the access token; `None` when the server gave none
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    /// Authorization server that issued the tokens
    pub issuer: SmolStr,
    /// Where a refresh would go
    pub token_endpoint: SmolStr,
    /// Hosting endpoint for authenticated calls; always the relay
    pub pds: Url,
    /// Set on restore when the caller accepted a session past its expiry
    #[serde(default)]
    pub allow_stale: bool,
}

impl Session {
    pub(crate) fn from_token_set(
        tokens: TokenSet,
        dpop: DpopState,
        token_endpoint: SmolStr,
        pds: Url,
    ) -> Self {
        Self {
            did: tokens.sub,
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            token_type: tokens.token_type,
            scope: tokens.scope,
            dpop,
            expires_at: tokens.expires_at,
            issuer: tokens.iss,
            token_endpoint,
            pds,
            allow_stale: false,
        }
    }

    /// Private key for DPoP proofs on resource requests.
    pub fn dpop_key(&self) -> &Key {
        &self.dpop.key
    }

    /// Past `expires_at` at `now`. Sessions without an expiry never go stale.
    pub fn is_stale_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    /// [`Session::is_stale_at`] now.
    pub fn is_stale(&self) -> bool {
        self.is_stale_at(Utc::now())
    }

    /// `Authorization` header value for resource requests.
    pub fn authorization_header(&self) -> String {
        format!("{} {}", self.token_type.as_str(), self.access_token)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("did", &self.did)
            .field("token_type", &self.token_type)
            .field("scope", &self.scope)
            .field("expires_at", &self.expires_at)
            .field("issuer", &self.issuer)
            .field("pds", &self.pds.as_str())
            .field("allow_stale", &self.allow_stale)
            .finish_non_exhaustive()
    }
}

/// Everything needed to finish a sign-in after the redirect comes back.
///
/// Written before the user agent leaves the page, keyed by `state`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationRequest {
    /// What the user typed
    pub actor: ActorIdentifier,
    /// What it resolved to; the token `sub` must match
    pub did: Did,
    pub scope: SmolStr,
    pub state: SmolStr,
    /// PKCE secret, only ever sent to the token endpoint
    pub code_verifier: SmolStr,
    pub client_id: SmolStr,
    pub redirect_uri: SmolStr,
    /// Issuer the callback `iss` is checked against
    pub issuer: SmolStr,
    pub token_endpoint: SmolStr,
    /// The server promised an `iss` parameter on the callback
    #[serde(default)]
    pub iss_parameter_supported: bool,
    pub pds: Url,
    pub dpop: DpopState,
    /// Requests older than the store's time-to-live cannot be claimed
    pub created_at: DateTime<Utc>,
}

impl std::fmt::Debug for AuthorizationRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorizationRequest")
            .field("actor", &self.actor)
            .field("did", &self.did)
            .field("scope", &self.scope)
            .field("issuer", &self.issuer)
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}
