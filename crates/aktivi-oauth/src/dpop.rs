//! DPoP (RFC 9449) proofs and the nonce-retry wrapper around token calls.

use aktivi_common::http_client::HttpClient;
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::Utc;
use http::{Request, Response, header::InvalidHeaderValue};
use jose_jwa::{Algorithm, Signing};
use jose_jwk::{Jwk, Key, crypto};
use miette::Diagnostic;
use p256::ecdsa::SigningKey;
use rand::{RngCore, rngs::ThreadRng};
use serde::{Deserialize, Serialize};
use smol_str::{SmolStr, ToSmolStr};

use crate::jose::{Claims, DpopClaims, JwsHeader, RegisteredClaims, create_signed_jwt};

pub const JWT_HEADER_TYP_DPOP: &str = "dpop+jwt";

#[derive(Deserialize)]
struct ErrorResponse {
    error: String,
}

/// Failure to build or send a DPoP-bound request.
#[derive(thiserror::Error, Debug, Diagnostic)]
pub enum DpopError {
    #[error(transparent)]
    #[diagnostic(code(aktivi_oauth::dpop::header))]
    InvalidHeaderValue(#[from] InvalidHeaderValue),
    #[error("crypto error: {0:?}")]
    #[diagnostic(code(aktivi_oauth::dpop::crypto))]
    JwkCrypto(crypto::Error),
    #[error("key does not match any alg supported by the server")]
    #[diagnostic(
        code(aktivi_oauth::dpop::unsupported_key),
        help("only ES256 (P-256) DPoP keys are supported")
    )]
    UnsupportedKey,
    #[error(transparent)]
    #[diagnostic(code(aktivi_oauth::dpop::serde))]
    SerdeJson(#[from] serde_json::Error),
    #[error("transport: {0}")]
    #[diagnostic(code(aktivi_oauth::dpop::transport))]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),
}

type Result<T> = core::result::Result<T, DpopError>;

/// Key plus the most recent nonce from the authorization server.
///
/// Lives on the pending authorization request and moves into the session,
/// so the token is bound to the key that requested it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DpopState {
    /// Private ES256 key the proofs are signed with
    pub key: Key,
    /// Last `DPoP-Nonce` the authorization server handed out
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authserver_nonce: Option<SmolStr>,
}

impl DpopState {
    /// State for a fresh key with no nonce seen yet.
    pub fn new(key: Key) -> Self {
        Self {
            key,
            authserver_nonce: None,
        }
    }
}

/// Attach a DPoP proof to an authorization-server `request` and send it.
///
/// A `DPoP-Nonce` in the response is remembered on `state`. When the server
/// rejected the proof with `use_dpop_nonce`, the request is replayed exactly
/// once with a proof carrying the new nonce.
pub async fn wrap_request_with_dpop<C>(
    client: &C,
    state: &mut DpopState,
    mut request: Request<Vec<u8>>,
) -> Result<Response<Vec<u8>>>
where
    C: HttpClient,
{
    let method = request.method().to_smolstr();
    let htu = htu_for(request.uri());

    let init_nonce = state.authserver_nonce.clone();
    let proof = build_dpop_proof(&state.key, method.clone(), htu.clone(), init_nonce.clone())?;
    request.headers_mut().insert("DPoP", proof.parse()?);
    let response = client
        .send_http(request.clone())
        .await
        .map_err(|e| DpopError::Transport(Box::new(e)))?;

    let next_nonce = response
        .headers()
        .get("DPoP-Nonce")
        .and_then(|v| v.to_str().ok())
        .map(SmolStr::new);
    let next_nonce = match next_nonce {
        Some(n) if Some(&n) != init_nonce.as_ref() => n,
        _ => return Ok(response),
    };
    state.authserver_nonce = Some(next_nonce.clone());

    if !is_use_dpop_nonce_error(&response) {
        return Ok(response);
    }
    #[cfg(feature = "tracing")]
    tracing::debug!("retrying with server-provided DPoP nonce");
    let proof = build_dpop_proof(&state.key, method, htu, Some(next_nonce))?;
    request.headers_mut().insert("DPoP", proof.parse()?);
    client
        .send_http(request)
        .await
        .map_err(|e| DpopError::Transport(Box::new(e)))
}

/// `htu` is the request URI without query and fragment.
fn htu_for(uri: &http::Uri) -> SmolStr {
    let full = uri.to_string();
    match full.find(['?', '#']) {
        Some(idx) => SmolStr::new(&full[..idx]),
        None => SmolStr::new(full),
    }
}

// RFC 9449 §8
fn is_use_dpop_nonce_error(response: &Response<Vec<u8>>) -> bool {
    response.status() == http::StatusCode::BAD_REQUEST
        && serde_json::from_slice::<ErrorResponse>(response.body())
            .is_ok_and(|res| res.error == "use_dpop_nonce")
}

pub(crate) fn generate_jti() -> SmolStr {
    let mut bytes = [0u8; 12];
    ThreadRng::default().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes).into()
}

/// Compact ES256 JWS proving possession of `key` for one request.
pub fn build_dpop_proof(
    key: &Key,
    method: SmolStr,
    url: SmolStr,
    nonce: Option<SmolStr>,
) -> Result<SmolStr> {
    let secret = match crypto::Key::try_from(key).map_err(DpopError::JwkCrypto)? {
        crypto::Key::P256(crypto::Kind::Secret(sk)) => sk,
        _ => return Err(DpopError::UnsupportedKey),
    };
    let mut header = JwsHeader::from(Algorithm::Signing(Signing::Es256));
    header.typ = Some(JWT_HEADER_TYP_DPOP.into());
    header.jwk = Some(Jwk {
        key: Key::from(&crypto::Key::from(secret.public_key())),
        prm: Default::default(),
    });

    let claims = Claims {
        registered: RegisteredClaims {
            jti: Some(generate_jti()),
            iat: Some(Utc::now().timestamp()),
            ..Default::default()
        },
        public: DpopClaims {
            htm: Some(method),
            htu: Some(url),
            nonce,
        },
    };
    Ok(create_signed_jwt(&SigningKey::from(secret), &header, &claims)?)
}
