//! Authorization-server discovery from a hosting endpoint.
//!
//! `pds → /.well-known/oauth-protected-resource → authorization_servers[0]
//! → /.well-known/oauth-authorization-server`

use std::time::Duration;

use aktivi_common::error::TransportError;
use aktivi_common::http_client::{HttpClient, get_request};
use http::StatusCode;
use serde::de::DeserializeOwned;
use url::Url;

use crate::types::{OAuthAuthorizationServerMetadata, OAuthProtectedResourceMetadata};

/// Compare two issuer strings strictly but without spuriously failing on
/// trivial differences.
///
/// - Schemes must match exactly.
/// - Hosts and effective ports must match; a missing port equals the default.
/// - Paths must match, except that an empty path and `/` are equivalent.
/// - A query or fragment on either side fails the comparison.
pub fn issuer_equivalent(a: &str, b: &str) -> bool {
    fn normalize(url: &Url) -> Option<(&str, &str, u16, &str)> {
        if url.query().is_some() || url.fragment().is_some() {
            return None;
        }
        let path = match url.path() {
            "" => "/",
            other => other,
        };
        Some((url.scheme(), url.host_str()?, url.port_or_known_default()?, path))
    }

    match (Url::parse(a), Url::parse(b)) {
        (Ok(ua), Ok(ub)) => match (normalize(&ua), normalize(&ub)) {
            (Some(na), Some(nb)) => na == nb,
            _ => false,
        },
        _ => a == b,
    }
}

/// Authorization server discovery failed.
#[derive(thiserror::Error, Debug, miette::Diagnostic)]
pub enum ResolverError {
    #[error("protected resource metadata is invalid: {0}")]
    #[diagnostic(
        code(aktivi_oauth::resolver::protected_resource_metadata),
        help("the hosting endpoint must advertise exactly one authorization server")
    )]
    ProtectedResourceMetadata(String),
    #[error("authorization server metadata is invalid: {0}")]
    #[diagnostic(
        code(aktivi_oauth::resolver::authorization_server_metadata),
        help("issuer must match and include the hosting endpoint as a protected resource")
    )]
    AuthorizationServerMetadata(String),
    #[error("discovery request to {url} timed out after {after:?}")]
    #[diagnostic(code(aktivi_oauth::resolver::timeout))]
    Timeout { url: String, after: Duration },
    #[error(transparent)]
    #[diagnostic(code(aktivi_oauth::resolver::transport))]
    Transport(#[from] TransportError),
    #[error("http status {status} from {url}")]
    #[diagnostic(
        code(aktivi_oauth::resolver::http_status),
        help("check well-known paths and server configuration")
    )]
    HttpStatus { url: String, status: StatusCode },
    #[error(transparent)]
    #[diagnostic(code(aktivi_oauth::resolver::serde_json))]
    SerdeJson(#[from] serde_json::Error),
    #[error(transparent)]
    #[diagnostic(code(aktivi_oauth::resolver::url))]
    Uri(#[from] url::ParseError),
}

async fn fetch_well_known<C, T>(
    client: &C,
    server: &Url,
    path: &str,
    timeout: Duration,
) -> Result<T, ResolverError>
where
    C: HttpClient + ?Sized,
    T: DeserializeOwned,
{
    let url = server.join(path)?;
    let req = get_request(&url, "application/json").map_err(TransportError::from)?;
    let res = tokio::time::timeout(timeout, client.send_http(req))
        .await
        .map_err(|_| ResolverError::Timeout {
            url: url.to_string(),
            after: timeout,
        })?
        .map_err(TransportError::other)?;
    if res.status() != StatusCode::OK {
        return Err(ResolverError::HttpStatus {
            url: url.to_string(),
            status: res.status(),
        });
    }
    Ok(serde_json::from_slice(res.body())?)
}

/// Fetch RFC 8414 metadata for `server` and check its issuer.
///
/// An equivalent issuer is normalized to the requested form (RFC 8414 §3.3).
pub async fn resolve_authorization_server<C: HttpClient + ?Sized>(
    client: &C,
    server: &Url,
    timeout: Duration,
) -> Result<OAuthAuthorizationServerMetadata, ResolverError> {
    let mut metadata: OAuthAuthorizationServerMetadata =
        fetch_well_known(client, server, "/.well-known/oauth-authorization-server", timeout)
            .await?;
    if !issuer_equivalent(&metadata.issuer, server.as_str()) {
        return Err(ResolverError::AuthorizationServerMetadata(format!(
            "invalid issuer: {}",
            metadata.issuer
        )));
    }
    metadata.issuer = server.as_str().into();
    Ok(metadata)
}

/// Fetch RFC 9728 metadata for the resource server at `server`.
pub async fn resolve_protected_resource_info<C: HttpClient + ?Sized>(
    client: &C,
    server: &Url,
    timeout: Duration,
) -> Result<OAuthProtectedResourceMetadata, ResolverError> {
    let mut metadata: OAuthProtectedResourceMetadata =
        fetch_well_known(client, server, "/.well-known/oauth-protected-resource", timeout)
            .await?;
    if !issuer_equivalent(&metadata.resource, server.as_str()) {
        return Err(ResolverError::ProtectedResourceMetadata(format!(
            "invalid resource: {}",
            metadata.resource
        )));
    }
    metadata.resource = server.as_str().into();
    Ok(metadata)
}

/// Locate and validate the authorization server protecting `pds`.
#[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip_all, fields(pds = %pds)))]
pub async fn get_resource_server_metadata<C: HttpClient + ?Sized>(
    client: &C,
    pds: &Url,
    timeout: Duration,
) -> Result<OAuthAuthorizationServerMetadata, ResolverError> {
    let rs_metadata = resolve_protected_resource_info(client, pds, timeout).await?;
    // atproto requires exactly one authorization server entry
    let issuer = match rs_metadata.authorization_servers.as_deref() {
        Some([issuer]) => issuer,
        Some([_, _, ..]) => {
            return Err(ResolverError::ProtectedResourceMetadata(format!(
                "unable to determine authorization server for {pds}"
            )));
        }
        _ => {
            return Err(ResolverError::ProtectedResourceMetadata(format!(
                "no authorization server found for {pds}"
            )));
        }
    };
    let as_metadata = resolve_authorization_server(client, issuer, timeout).await?;
    if let Some(protected) = &as_metadata.protected_resources {
        if !protected
            .iter()
            .any(|r| issuer_equivalent(r, &rs_metadata.resource))
        {
            return Err(ResolverError::AuthorizationServerMetadata(format!(
                "resource {} is not protected by {issuer}",
                rs_metadata.resource
            )));
        }
    }
    Ok(as_metadata)
}
