//! DID method resolvers: `did:plc` via a PLC directory and `did:web` via HTTPS.

use std::time::Duration;

use aktivi_common::http_client::{HttpClient, get_request};
use aktivi_common::{Did, DidDocument};
use async_trait::async_trait;
use bytes::Bytes;
use http::StatusCode;
use percent_encoding::percent_decode_str;
use url::{ParseError, Url};

use crate::ResolverOptions;
use crate::error::{IdentityError, Result};
use crate::resolver::{CompositeDidDocumentResolver, DidDocumentResolver};

const DID_JSON: &str = "application/did+ld+json, application/json";

/// Raw DID document fetch response.
///
/// Carries the response bytes and status together with the DID that was
/// asked for, so the status and body can be mapped to the right error.
#[derive(Clone, Debug)]
pub struct DidDocResponse {
    #[allow(missing_docs)]
    pub buffer: Bytes,
    #[allow(missing_docs)]
    pub status: StatusCode,
    /// DID we intended to resolve
    pub requested: Did,
}

impl DidDocResponse {
    /// Parse the body as a DID document.
    ///
    /// 404 and 410 (tombstoned PLC entries) and any other non-success status
    /// map to `DocumentNotFound`; a body that is not a valid document maps to
    /// `MalformedDocument`.
    pub fn parse(&self) -> Result<DidDocument> {
        if !self.status.is_success() {
            return Err(IdentityError::DocumentNotFound {
                did: self.requested.clone(),
                status: Some(self.status),
            });
        }
        serde_json::from_slice::<DidDocument>(&self.buffer).map_err(|e| {
            IdentityError::MalformedDocument {
                did: self.requested.clone(),
                message: e.to_string(),
            }
        })
    }
}

/// Send a GET and enforce `timeout` on the whole exchange.
pub(crate) async fn fetch<C>(
    http: &C,
    url: &Url,
    accept: &str,
    timeout: Duration,
) -> Result<(Bytes, StatusCode)>
where
    C: HttpClient + Sync,
{
    let request = get_request(url, accept).map_err(aktivi_common::error::TransportError::from)?;
    let response = tokio::time::timeout(timeout, http.send_http(request))
        .await
        .map_err(|_| IdentityError::Timeout {
            url: url.to_string(),
            after: timeout,
        })?
        .map_err(IdentityError::transport)?;
    let status = response.status();
    Ok((Bytes::from(response.into_body()), status))
}

/// Resolves `did:plc` identifiers against a PLC directory.
#[derive(Clone, Debug)]
pub struct PlcDidDocumentResolver<C> {
    http: C,
    directory: Url,
    timeout: Duration,
}

impl<C> PlcDidDocumentResolver<C> {
    /// Resolver against `directory` (e.g. `https://plc.directory/`).
    pub fn new(http: C, directory: Url, timeout: Duration) -> Self {
        Self {
            http,
            directory,
            timeout,
        }
    }

    /// `{directory}/{did}`, tolerant of a missing trailing slash on the base.
    pub fn document_url(&self, did: &Did) -> Result<Url> {
        let base = self.directory.as_str().trim_end_matches('/');
        Ok(Url::parse(&format!("{base}/{}", did.as_str()))?)
    }
}

#[async_trait]
impl<C> DidDocumentResolver for PlcDidDocumentResolver<C>
where
    C: HttpClient + Send + Sync,
{
    #[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip_all, fields(did = %did)))]
    async fn resolve(&self, did: &Did) -> Result<DidDocument> {
        if did.method() != "plc" {
            return Err(IdentityError::unsupported_method(did));
        }
        let url = self.document_url(did)?;
        let (buffer, status) = fetch(&self.http, &url, DID_JSON, self.timeout).await?;
        DidDocResponse {
            buffer,
            status,
            requested: did.clone(),
        }
        .parse()
    }
}

/// Resolves `did:web` identifiers from the domain's HTTPS server.
#[derive(Clone, Debug)]
pub struct WebDidDocumentResolver<C> {
    http: C,
    timeout: Duration,
}

impl<C> WebDidDocumentResolver<C> {
    #[allow(missing_docs)]
    pub fn new(http: C, timeout: Duration) -> Self {
        Self { http, timeout }
    }
}

/// Construct the well-known HTTPS URL for a `did:web` DID.
///
/// - `did:web:example.com` → `https://example.com/.well-known/did.json`
/// - `did:web:example.com:user:alice` → `https://example.com/user/alice/did.json`
/// - `did:web:localhost%3A8080` → `https://localhost:8080/.well-known/did.json`
pub fn did_web_url(did: &Did) -> Result<Url> {
    if did.method() != "web" {
        return Err(IdentityError::unsupported_method(did));
    }
    let mut parts = did.method_specific_id().split(':');
    let host = parts
        .next()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| IdentityError::MalformedDocument {
            did: did.clone(),
            message: "did:web without a host".into(),
        })?;
    let host = percent_decode_str(host).decode_utf8_lossy();
    let mut url = Url::parse(&format!("https://{host}/"))?;
    let path: Vec<&str> = parts.collect();
    if path.is_empty() {
        url.set_path(".well-known/did.json");
    } else {
        let mut segments = url
            .path_segments_mut()
            .map_err(|_| IdentityError::Url(ParseError::SetHostOnCannotBeABaseUrl))?;
        segments.pop_if_empty();
        for seg in path {
            let decoded = percent_decode_str(seg).decode_utf8_lossy();
            segments.push(&decoded);
        }
        segments.push("did.json");
    }
    Ok(url)
}

#[async_trait]
impl<C> DidDocumentResolver for WebDidDocumentResolver<C>
where
    C: HttpClient + Send + Sync,
{
    #[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip_all, fields(did = %did)))]
    async fn resolve(&self, did: &Did) -> Result<DidDocument> {
        let url = did_web_url(did)?;
        let (buffer, status) = fetch(&self.http, &url, DID_JSON, self.timeout).await?;
        DidDocResponse {
            buffer,
            status,
            requested: did.clone(),
        }
        .parse()
    }
}

/// The default method table: `plc` and `web`.
pub fn did_resolver_for<C>(http: C, opts: &ResolverOptions) -> CompositeDidDocumentResolver
where
    C: HttpClient + Clone + Send + Sync + 'static,
{
    CompositeDidDocumentResolver::new()
        .with_method(
            "plc",
            PlcDidDocumentResolver::new(http.clone(), opts.plc_directory.clone(), opts.timeout),
        )
        .with_method("web", WebDidDocumentResolver::new(http, opts.timeout))
}
