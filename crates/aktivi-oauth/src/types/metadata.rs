use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use url::Url;

/// RFC 8414 authorization server metadata, restricted to the members the
/// sign-in flow reads.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
#[serde(default)]
pub struct OAuthAuthorizationServerMetadata {
    pub issuer: SmolStr,
    pub authorization_endpoint: SmolStr,
    pub token_endpoint: SmolStr,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revocation_endpoint: Option<SmolStr>,
    pub scopes_supported: Vec<SmolStr>,
    pub response_types_supported: Vec<SmolStr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_modes_supported: Option<Vec<SmolStr>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grant_types_supported: Option<Vec<SmolStr>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_endpoint_auth_methods_supported: Option<Vec<SmolStr>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_challenge_methods_supported: Option<Vec<SmolStr>>,

    // RFC 9126 §5
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pushed_authorization_request_endpoint: Option<SmolStr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub require_pushed_authorization_requests: Option<bool>,

    // RFC 9207 §3
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorization_response_iss_parameter_supported: Option<bool>,

    // RFC 9449 §5.1
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dpop_signing_alg_values_supported: Option<Vec<SmolStr>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id_metadata_document_supported: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub protected_resources: Option<Vec<SmolStr>>,
}

impl OAuthAuthorizationServerMetadata {
    /// Whether the server says it sends `iss` on authorization responses.
    pub fn sends_iss(&self) -> bool {
        self.authorization_response_iss_parameter_supported == Some(true)
    }
}

/// RFC 9728 protected resource metadata.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
#[serde(default)]
pub struct OAuthProtectedResourceMetadata {
    pub resource: SmolStr,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorization_servers: Option<Vec<Url>>,
    pub scopes_supported: Vec<SmolStr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bearer_methods_supported: Option<Vec<SmolStr>>,
}
