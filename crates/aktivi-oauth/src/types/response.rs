use aktivi_common::Did;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// RFC 9126 §2.2
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct OAuthParResponse {
    pub request_uri: SmolStr,
    pub expires_in: Option<u32>,
}

/// `token_type` of a token response; atproto servers issue `DPoP`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OAuthTokenType {
    DPoP,
    Bearer,
}

impl OAuthTokenType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OAuthTokenType::DPoP => "DPoP",
            OAuthTokenType::Bearer => "Bearer",
        }
    }
}

/// RFC 6749 §5.1, plus the atproto `sub` member.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct OAuthTokenResponse {
    pub access_token: SmolStr,
    pub token_type: OAuthTokenType,
    pub expires_in: Option<i64>,
    pub refresh_token: Option<SmolStr>,
    pub scope: Option<SmolStr>,
    pub sub: Option<SmolStr>,
}

/// A verified token response.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct TokenSet {
    pub iss: SmolStr,
    pub sub: Did,
    pub scope: Option<SmolStr>,
    pub access_token: SmolStr,
    pub refresh_token: Option<SmolStr>,
    pub token_type: OAuthTokenType,
    pub expires_at: Option<DateTime<Utc>>,
}

/// `{"error": ..., "error_description": ...}` body of a rejected OAuth call.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct OAuthErrorResponse {
    pub error: SmolStr,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_description: Option<SmolStr>,
}
