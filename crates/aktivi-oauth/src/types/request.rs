use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorizationResponseType {
    Code,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorizationResponseMode {
    Query,
    Fragment,
    FormPost,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthorizationCodeChallengeMethod {
    S256,
    #[serde(rename = "plain")]
    Plain,
}

/// Authorization request parameters (RFC 6749 §4.1.1, RFC 7636 §4.3).
///
/// Either pushed to the PAR endpoint or appended to the authorization
/// endpoint's query when the server has no PAR endpoint. `client_id` travels
/// alongside, not in here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationRequestParameters {
    pub response_type: AuthorizationResponseType,
    pub redirect_uri: SmolStr,
    pub scope: SmolStr,
    pub state: SmolStr,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_mode: Option<AuthorizationResponseMode>,
    pub code_challenge: SmolStr,
    pub code_challenge_method: AuthorizationCodeChallengeMethod,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub login_hint: Option<SmolStr>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenGrantType {
    AuthorizationCode,
    RefreshToken,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRequestParameters {
    // RFC 6749 §4.1.3
    pub grant_type: TokenGrantType,
    pub code: SmolStr,
    pub redirect_uri: SmolStr,
    // RFC 7636 §4.5
    pub code_verifier: SmolStr,
}
