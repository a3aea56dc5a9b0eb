//! Errors and warnings produced while resolving identities.

use std::time::Duration;

use aktivi_common::error::TransportError;
use aktivi_common::types::string::AtStrError;
use aktivi_common::{ActorIdentifier, Did, DidDocument, Handle};
use http::StatusCode;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use thiserror::Error;

/// Result alias for identity resolution
pub type Result<T> = std::result::Result<T, IdentityError>;

/// Errors that can occur during identity resolution.
///
/// Strategy-level variants (`NoHandleRecord`, `HttpStatus`, `Timeout`, ...)
/// are what a single leaf resolver reports. Composites turn those into
/// `HandleNotFound` or wrap them in `IdentityResolutionFailed`; use
/// [`IdentityError::root_cause`] to get back to the innermost failure.
#[derive(Debug, Error, Diagnostic)]
#[allow(missing_docs)]
pub enum IdentityError {
    #[error("unsupported DID method `{method}` for {did}")]
    #[diagnostic(
        code(aktivi_identity::unsupported_method),
        help("register a resolver for this method on the composite DID resolver")
    )]
    UnsupportedMethod { method: SmolStr, did: Did },

    #[error("DID document not found for {did}{}", status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    #[diagnostic(code(aktivi_identity::document_not_found))]
    DocumentNotFound {
        did: Did,
        status: Option<StatusCode>,
    },

    #[error("malformed DID document for {did}: {message}")]
    #[diagnostic(
        code(aktivi_identity::malformed_document),
        help("the document must be JSON with an `id` matching the DID")
    )]
    MalformedDocument { did: Did, message: String },

    #[error("could not resolve handle {handle} (tried: {})", attempted.join(", "))]
    #[diagnostic(
        code(aktivi_identity::handle_not_found),
        help("check the handle's `_atproto` TXT record or its /.well-known/atproto-did file")
    )]
    HandleNotFound {
        handle: Handle,
        attempted: Vec<SmolStr>,
    },

    #[error("no atproto record for {handle} via {strategy}")]
    #[diagnostic(code(aktivi_identity::no_handle_record))]
    NoHandleRecord {
        handle: Handle,
        strategy: &'static str,
    },

    #[error("{count} conflicting atproto records for {handle}")]
    #[diagnostic(
        code(aktivi_identity::ambiguous_handle_record),
        help("a handle must publish exactly one `did=` TXT record")
    )]
    AmbiguousHandleRecord { handle: Handle, count: usize },

    #[error("invalid well-known atproto-did content")]
    #[diagnostic(
        code(aktivi_identity::invalid_well_known),
        help("expected first non-empty line to be a DID")
    )]
    InvalidWellKnown,

    #[error("missing PDS endpoint in DID document for {did}")]
    #[diagnostic(
        code(aktivi_identity::missing_pds_endpoint),
        help("the document needs an AtprotoPersonalDataServer service with an http(s) URL")
    )]
    MissingPdsEndpoint { did: Did },

    /// DID document id did not match requested DID; includes the fetched document
    #[error("DID doc id mismatch: requested {expected}, got {}", doc.id)]
    #[diagnostic(
        code(aktivi_identity::doc_id_mismatch),
        help("document id differs from requested DID; do not trust this document")
    )]
    DocIdMismatch { expected: Did, doc: Box<DidDocument> },

    #[error("request to {url} timed out after {after:?}")]
    #[diagnostic(code(aktivi_identity::timeout))]
    Timeout { url: String, after: Duration },

    #[error("HTTP status {status} from {url}")]
    #[diagnostic(code(aktivi_identity::http_status))]
    HttpStatus { url: String, status: StatusCode },

    #[error("HTTP error: {0}")]
    #[diagnostic(
        code(aktivi_identity::transport),
        help("check network connectivity and TLS configuration")
    )]
    Transport(#[from] TransportError),

    #[error(transparent)]
    #[diagnostic(code(aktivi_identity::invalid_identifier))]
    InvalidIdentifier(#[from] AtStrError),

    #[error("URL parse error: {0}")]
    #[diagnostic(code(aktivi_identity::url))]
    Url(#[from] url::ParseError),

    #[error("serialize/deserialize error: {0}")]
    #[diagnostic(code(aktivi_identity::serde))]
    Serde(#[from] serde_json::Error),

    #[cfg(all(feature = "dns", not(target_family = "wasm")))]
    #[error("DNS error: {0}")]
    #[diagnostic(code(aktivi_identity::dns))]
    Dns(#[from] hickory_resolver::error::ResolveError),

    /// Wraps the first sub-step that failed while resolving `actor`
    #[error("failed to resolve identity for {actor}")]
    #[diagnostic(code(aktivi_identity::resolution_failed))]
    IdentityResolutionFailed {
        actor: ActorIdentifier,
        #[source]
        source: Box<IdentityError>,
    },
}

impl IdentityError {
    pub(crate) fn unsupported_method(did: &Did) -> Self {
        Self::UnsupportedMethod {
            method: SmolStr::new(did.method()),
            did: did.clone(),
        }
    }

    pub(crate) fn transport(e: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Transport(TransportError::other(e))
    }

    /// The innermost error, looking through `IdentityResolutionFailed` layers.
    pub fn root_cause(&self) -> &IdentityError {
        let mut current = self;
        while let IdentityError::IdentityResolutionFailed { source, .. } = current {
            current = source;
        }
        current
    }
}

/// Warnings produced during identity checks that are not fatal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum IdentityWarning {
    /// The DID doc did not contain the expected handle alias under alsoKnownAs
    HandleAliasMismatch {
        #[allow(missing_docs)]
        expected: Handle,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_cause_unwraps_nested_failures() {
        let did = Did::new("did:example:abc").unwrap();
        let inner = IdentityError::unsupported_method(&did);
        let wrapped = IdentityError::IdentityResolutionFailed {
            actor: ActorIdentifier::Did(did.clone()),
            source: Box::new(IdentityError::IdentityResolutionFailed {
                actor: ActorIdentifier::Did(did),
                source: Box::new(inner),
            }),
        };
        assert!(matches!(
            wrapped.root_cause(),
            IdentityError::UnsupportedMethod { method, .. } if method == "example"
        ));
    }

    #[test]
    fn handle_not_found_lists_strategies() {
        let err = IdentityError::HandleNotFound {
            handle: Handle::new("alice.example").unwrap(),
            attempted: vec!["dns-over-https".into(), "https-well-known".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("dns-over-https, https-well-known"), "{msg}");
    }
}
