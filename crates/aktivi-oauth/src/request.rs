use std::time::Duration;

use aktivi_common::Did;
use aktivi_common::http_client::HttpClient;
use aktivi_common::types::string::AtStrError;
use chrono::{TimeDelta, Utc};
use http::{Method, Request, StatusCode};
use serde::Serialize;
use serde_json::Value;
use smol_str::SmolStr;

use crate::dpop::{DpopError, DpopState, wrap_request_with_dpop};
use crate::types::{
    AuthorizationRequestParameters, OAuthParResponse, OAuthTokenResponse, TokenGrantType,
    TokenRequestParameters, TokenSet,
};

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Failure of a call to the authorization server's token or PAR endpoint
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
#[error("{kind}")]
pub struct RequestError {
    #[diagnostic_source]
    kind: RequestErrorKind,
    #[source]
    source: Option<BoxError>,
    #[help]
    help: Option<SmolStr>,
    context: Option<SmolStr>,
    url: Option<SmolStr>,
}

/// Error categories for authorization server calls
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum RequestErrorKind {
    #[error("no {0} endpoint available")]
    #[diagnostic(
        code(aktivi_oauth::request::no_endpoint),
        help("server does not advertise this endpoint")
    )]
    NoEndpoint(SmolStr),

    #[error("token response verification failed")]
    #[diagnostic(code(aktivi_oauth::request::token_verification))]
    TokenVerification,

    #[error("failed to parse DID")]
    #[diagnostic(code(aktivi_oauth::request::invalid_did))]
    InvalidDid,

    #[error("dpop error")]
    #[diagnostic(code(aktivi_oauth::request::dpop))]
    Dpop,

    #[error("transport error")]
    #[diagnostic(code(aktivi_oauth::request::transport))]
    Transport,

    #[error("request timed out after {0:?}")]
    #[diagnostic(code(aktivi_oauth::request::timeout))]
    Timeout(Duration),

    #[error("http build error")]
    #[diagnostic(code(aktivi_oauth::request::http_build))]
    HttpBuild,

    #[error("http status: {0}")]
    #[diagnostic(
        code(aktivi_oauth::request::http_status),
        help("see server response for details")
    )]
    HttpStatus(StatusCode),

    #[error("http status: {status}, body: {body}")]
    #[diagnostic(
        code(aktivi_oauth::request::http_status_body),
        help("server returned error JSON; inspect `error` and `error_description`")
    )]
    HttpStatusWithBody { status: StatusCode, body: Value },

    #[error("form serialization error")]
    #[diagnostic(code(aktivi_oauth::request::serde_form))]
    SerdeHtmlForm,

    #[error("json error")]
    #[diagnostic(code(aktivi_oauth::request::serde_json))]
    SerdeJson,
}

impl RequestError {
    pub fn new(kind: RequestErrorKind, source: Option<BoxError>) -> Self {
        Self {
            kind,
            source,
            help: None,
            context: None,
            url: None,
        }
    }

    pub fn kind(&self) -> &RequestErrorKind {
        &self.kind
    }

    pub fn context(&self) -> Option<&str> {
        self.context.as_deref()
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    pub fn with_help(mut self, help: impl Into<SmolStr>) -> Self {
        self.help = Some(help.into());
        self
    }

    pub fn with_context(mut self, context: impl Into<SmolStr>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_url(mut self, url: impl Into<SmolStr>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn no_endpoint(endpoint: impl Into<SmolStr>) -> Self {
        Self::new(RequestErrorKind::NoEndpoint(endpoint.into()), None)
    }

    pub fn token_verification() -> Self {
        Self::new(RequestErrorKind::TokenVerification, None)
    }

    pub fn timeout(after: Duration) -> Self {
        Self::new(RequestErrorKind::Timeout(after), None)
    }

    pub fn http_status(status: StatusCode) -> Self {
        Self::new(RequestErrorKind::HttpStatus(status), None)
    }

    pub fn http_status_with_body(status: StatusCode, body: Value) -> Self {
        Self::new(RequestErrorKind::HttpStatusWithBody { status, body }, None)
    }
}

impl From<AtStrError> for RequestError {
    fn from(e: AtStrError) -> Self {
        let msg = smol_str::format_smolstr!("{:?}", e);
        Self::new(RequestErrorKind::InvalidDid, Some(Box::new(e)))
            .with_context(msg)
            .with_help("the token response `sub` must be a DID")
    }
}

impl From<DpopError> for RequestError {
    fn from(e: DpopError) -> Self {
        let msg = smol_str::format_smolstr!("{:?}", e);
        let kind = match e {
            DpopError::Transport(_) => RequestErrorKind::Transport,
            _ => RequestErrorKind::Dpop,
        };
        Self::new(kind, Some(Box::new(e)))
            .with_context(msg)
            .with_help("check DPoP key configuration and nonce handling")
    }
}

impl From<http::Error> for RequestError {
    fn from(e: http::Error) -> Self {
        let msg = smol_str::format_smolstr!("{:?}", e);
        Self::new(RequestErrorKind::HttpBuild, Some(Box::new(e)))
            .with_context(msg)
            .with_help("verify request URIs and headers are valid")
    }
}

impl From<serde_html_form::ser::Error> for RequestError {
    fn from(e: serde_html_form::ser::Error) -> Self {
        let msg = smol_str::format_smolstr!("{:?}", e);
        Self::new(RequestErrorKind::SerdeHtmlForm, Some(Box::new(e)))
            .with_context(msg)
            .with_help("check OAuth request parameters are serializable")
    }
}

impl From<serde_json::Error> for RequestError {
    fn from(e: serde_json::Error) -> Self {
        let msg = smol_str::format_smolstr!("{:?}", e);
        Self::new(RequestErrorKind::SerdeJson, Some(Box::new(e)))
            .with_context(msg)
            .with_help("verify OAuth response body is valid JSON")
    }
}

pub type Result<T> = core::result::Result<T, RequestError>;

pub enum OAuthRequest {
    Token(TokenRequestParameters),
    PushedAuthorizationRequest(AuthorizationRequestParameters),
}

impl OAuthRequest {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Token(_) => "token",
            Self::PushedAuthorizationRequest(_) => "pushed_authorization_request",
        }
    }

    pub fn expected_status(&self) -> StatusCode {
        match self {
            Self::Token(_) => StatusCode::OK,
            // RFC 9126 §2.2
            Self::PushedAuthorizationRequest(_) => StatusCode::CREATED,
        }
    }
}

/// Where a request goes and on whose behalf.
#[derive(Debug, Clone, Copy)]
pub struct ServerEndpoint<'a> {
    pub client_id: &'a str,
    pub url: &'a str,
    pub timeout: Duration,
}

/// Public clients authenticate with `client_id` alone
/// (`token_endpoint_auth_method = none`).
#[derive(Serialize)]
pub(crate) struct RequestPayload<'a, T: Serialize> {
    pub client_id: &'a str,
    #[serde(flatten)]
    pub parameters: &'a T,
}

/// POST a form-encoded request with a DPoP proof and decode the reply.
pub async fn oauth_request<O, C>(
    client: &C,
    dpop: &mut DpopState,
    endpoint: ServerEndpoint<'_>,
    request: OAuthRequest,
) -> Result<O>
where
    C: HttpClient,
    O: serde::de::DeserializeOwned,
{
    let body = match &request {
        OAuthRequest::Token(parameters) => serde_html_form::to_string(RequestPayload {
            client_id: endpoint.client_id,
            parameters,
        })?,
        OAuthRequest::PushedAuthorizationRequest(parameters) => {
            serde_html_form::to_string(RequestPayload {
                client_id: endpoint.client_id,
                parameters,
            })?
        }
    };
    let req = Request::builder()
        .uri(endpoint.url)
        .method(Method::POST)
        .header("Content-Type", "application/x-www-form-urlencoded")
        .header("Accept", "application/json")
        .body(body.into_bytes())?;
    let res = tokio::time::timeout(
        endpoint.timeout,
        wrap_request_with_dpop(client, dpop, req),
    )
    .await
    .map_err(|_| RequestError::timeout(endpoint.timeout).with_url(endpoint.url))??;

    if res.status() == request.expected_status() {
        Ok(serde_json::from_slice(res.body())?)
    } else if res.status().is_client_error() {
        let body = serde_json::from_slice(res.body()).unwrap_or(Value::Null);
        Err(RequestError::http_status_with_body(res.status(), body)
            .with_context(request.name())
            .with_url(endpoint.url))
    } else {
        Err(RequestError::http_status(res.status())
            .with_context(request.name())
            .with_url(endpoint.url))
    }
}

/// Push the authorization request parameters (RFC 9126).
#[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip_all, fields(url = endpoint.url)))]
pub async fn par<C: HttpClient>(
    client: &C,
    dpop: &mut DpopState,
    endpoint: ServerEndpoint<'_>,
    parameters: AuthorizationRequestParameters,
) -> Result<OAuthParResponse> {
    oauth_request(
        client,
        dpop,
        endpoint,
        OAuthRequest::PushedAuthorizationRequest(parameters),
    )
    .await
}

/// Exchange an authorization code and PKCE verifier for tokens.
///
/// The response must carry `sub`, and when the DID was known before the
/// redirect it must be that DID.
#[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip_all, fields(url = endpoint.url)))]
pub async fn exchange_code<C: HttpClient>(
    client: &C,
    dpop: &mut DpopState,
    endpoint: ServerEndpoint<'_>,
    issuer: &str,
    parameters: TokenRequestParameters,
    expected_sub: Option<&Did>,
) -> Result<TokenSet> {
    debug_assert_eq!(parameters.grant_type, TokenGrantType::AuthorizationCode);
    let token_response: OAuthTokenResponse =
        oauth_request(client, dpop, endpoint, OAuthRequest::Token(parameters)).await?;
    let Some(sub) = token_response.sub else {
        return Err(RequestError::token_verification().with_context("token response has no sub"));
    };
    let sub = Did::new(&sub)?;
    if let Some(expected) = expected_sub {
        if expected != &sub {
            return Err(RequestError::token_verification()
                .with_context(smol_str::format_smolstr!(
                    "token issued for {sub}, expected {expected}"
                ))
                .with_help("the account that signed in is not the one sign-in started for"));
        }
    }
    let expires_at = token_response
        .expires_in
        .and_then(|secs| Utc::now().checked_add_signed(TimeDelta::seconds(secs)));
    Ok(TokenSet {
        iss: issuer.into(),
        sub,
        scope: token_response.scope,
        access_token: token_response.access_token,
        refresh_token: token_response.refresh_token,
        token_type: token_response.token_type,
        expires_at,
    })
}
