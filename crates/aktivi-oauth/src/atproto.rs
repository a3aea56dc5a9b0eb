//! The client identity document the authorization server fetches from
//! `client_id`.

use smol_str::SmolStr;

use crate::config::OAuthConfig;
use crate::types::OAuthClientMetadata;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GrantType {
    AuthorizationCode,
    RefreshToken,
}

impl From<GrantType> for SmolStr {
    fn from(value: GrantType) -> Self {
        match value {
            GrantType::AuthorizationCode => SmolStr::new_static("authorization_code"),
            GrantType::RefreshToken => SmolStr::new_static("refresh_token"),
        }
    }
}

/// Public browser client: no client authentication, DPoP-bound tokens, one
/// redirect URI.
pub fn client_metadata(config: &OAuthConfig) -> OAuthClientMetadata {
    OAuthClientMetadata {
        client_id: config.client_id.clone(),
        client_name: config.client_name.clone(),
        client_uri: Some(config.client_uri.clone()),
        redirect_uris: vec![config.redirect_uri.clone()],
        scope: Some(config.scope.clone()),
        grant_types: Some(vec![
            GrantType::AuthorizationCode.into(),
            GrantType::RefreshToken.into(),
        ]),
        response_types: Some(vec![SmolStr::new_static("code")]),
        token_endpoint_auth_method: Some(SmolStr::new_static("none")),
        application_type: Some(SmolStr::new_static("web")),
        dpop_bound_access_tokens: Some(true),
    }
}
