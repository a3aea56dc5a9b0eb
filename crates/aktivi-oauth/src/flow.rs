use std::fmt;
use std::sync::{Arc, Mutex};

use aktivi_common::ActorIdentifier;
use aktivi_common::http_client::HttpClient;
use aktivi_common::store::KeyValueStore;
use aktivi_identity::resolver::{IdentityResolver, ResolveIdentityOptions};
use chrono::Utc;
use serde::Serialize;
use smol_str::SmolStr;
use url::Url;

use crate::config::OAuthConfig;
use crate::dpop::{DpopError, DpopState};
use crate::error::{OAuthError, Result};
use crate::request::{RequestError, RequestPayload, ServerEndpoint, exchange_code, par};
use crate::resolver::{get_resource_server_metadata, issuer_equivalent};
use crate::session::{AuthorizationRequest, Session};
use crate::store::{Claim, PendingRequestStore, SessionStore};
use crate::types::{
    AuthorizationCodeChallengeMethod, AuthorizationRequestParameters, AuthorizationResponseMode,
    AuthorizationResponseType, CallbackParams, TokenGrantType, TokenRequestParameters,
};
use crate::utils::{generate_dpop_key, generate_nonce, generate_pkce};

/// Where a sign-in attempt stands.
///
/// ```text
/// Idle -> Building -> AwaitingRedirect -> ExchangingCode -> Authorized
///            |                                  |
///            +-------------> Failed <-----------+
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FlowState {
    /// Nothing started on this manager yet
    Idle,
    /// Resolving the actor and preparing the authorization request
    Building,
    /// The user agent was sent to the authorization server
    AwaitingRedirect,
    /// A callback is being exchanged for tokens
    ExchangingCode,
    /// The last callback produced a session
    Authorized,
    /// The last attempt failed; a new one may be started
    Failed,
}

impl fmt::Display for FlowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FlowState::Idle => "idle",
            FlowState::Building => "building",
            FlowState::AwaitingRedirect => "awaiting-redirect",
            FlowState::ExchangingCode => "exchanging-code",
            FlowState::Authorized => "authorized",
            FlowState::Failed => "failed",
        })
    }
}

/// Builds authorization redirects and turns callbacks into sessions.
///
/// Everything that has to survive the redirect lives in the durable store,
/// so a fresh manager (after a full page load) can finish a flow started by
/// another one.
pub struct AuthorizationFlowManager<C> {
    config: OAuthConfig,
    http: C,
    resolver: Arc<dyn IdentityResolver>,
    requests: PendingRequestStore,
    sessions: SessionStore,
    state: Mutex<FlowState>,
}

impl<C> AuthorizationFlowManager<C>
where
    C: HttpClient + Send + Sync,
{
    /// Checks `config` before anything else; pending requests and sessions
    /// live in `durable`.
    pub fn new(
        config: OAuthConfig,
        http: C,
        resolver: Arc<dyn IdentityResolver>,
        durable: Arc<dyn KeyValueStore>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            requests: PendingRequestStore::new(durable.clone(), config.request_ttl),
            sessions: SessionStore::new(durable),
            config,
            http,
            resolver,
            state: Mutex::new(FlowState::Idle),
        })
    }

    pub fn config(&self) -> &OAuthConfig {
        &self.config
    }

    /// Where successful callbacks persist their session.
    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Current step of the sign-in attempt.
    pub fn state(&self) -> FlowState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Move to `to` if the current state is one of `from`; returns the
    /// state that was left.
    fn enter(&self, from: &[FlowState], to: FlowState) -> Result<FlowState> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let current = *state;
        if !from.contains(&current) {
            return Err(OAuthError::InvalidTransition { from: current, to });
        }
        *state = to;
        #[cfg(feature = "tracing")]
        tracing::debug!(from = %current, to = %to, "sign-in flow transition");
        Ok(current)
    }

    fn settle(&self, to: FlowState) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        #[cfg(feature = "tracing")]
        tracing::debug!(from = %*state, to = %to, "sign-in flow transition");
        *state = to;
    }

    fn fail(&self, _error: &OAuthError) {
        #[cfg(feature = "tracing")]
        tracing::warn!(error = %_error, "sign-in flow failed");
        self.settle(FlowState::Failed);
    }

    /// Resolve `actor`, prepare PKCE, `state` and a DPoP key, persist the
    /// pending request and return the URL to send the user agent to.
    pub async fn start(&self, actor: &ActorIdentifier) -> Result<Url> {
        self.enter(
            &[
                FlowState::Idle,
                FlowState::AwaitingRedirect,
                FlowState::Authorized,
                FlowState::Failed,
            ],
            FlowState::Building,
        )?;
        match self.build(actor).await {
            Ok(url) => {
                self.settle(FlowState::AwaitingRedirect);
                Ok(url)
            }
            Err(e) => {
                self.fail(&e);
                Err(e)
            }
        }
    }

    #[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip_all, fields(actor = %actor)))]
    async fn build(&self, actor: &ActorIdentifier) -> Result<Url> {
        let identity = self
            .resolver
            .resolve(actor, &ResolveIdentityOptions::default())
            .await?;
        let timeout = self.config.request_timeout;
        let metadata = get_resource_server_metadata(&self.http, &identity.pds, timeout).await?;

        let key = generate_dpop_key(&metadata).ok_or(DpopError::UnsupportedKey)?;
        let mut dpop = DpopState::new(key);
        let state = generate_nonce();
        let (code_challenge, code_verifier) = generate_pkce();
        let client_id = SmolStr::new(self.config.client_id.as_str());
        let redirect_uri = SmolStr::new(self.config.redirect_uri.as_str());

        let parameters = AuthorizationRequestParameters {
            response_type: AuthorizationResponseType::Code,
            redirect_uri: redirect_uri.clone(),
            scope: self.config.scope.clone(),
            state: state.clone(),
            response_mode: Some(AuthorizationResponseMode::Fragment),
            code_challenge,
            code_challenge_method: AuthorizationCodeChallengeMethod::S256,
            login_hint: Some(actor.as_str().into()),
        };

        let mut auth_url = Url::parse(&metadata.authorization_endpoint)?;
        if let Some(par_endpoint) = metadata.pushed_authorization_request_endpoint.as_deref() {
            let endpoint = ServerEndpoint {
                client_id: &client_id,
                url: par_endpoint,
                timeout,
            };
            let pushed = par(&self.http, &mut dpop, endpoint, parameters).await?;
            auth_url
                .query_pairs_mut()
                .append_pair("client_id", &client_id)
                .append_pair("request_uri", &pushed.request_uri);
        } else if metadata.require_pushed_authorization_requests == Some(true) {
            return Err(RequestError::no_endpoint("pushed_authorization_request").into());
        } else {
            let query = serde_html_form::to_string(RequestPayload {
                client_id: &client_id,
                parameters: &parameters,
            })
            .map_err(RequestError::from)?;
            let query = match auth_url.query().filter(|q| !q.is_empty()) {
                Some(existing) => format!("{existing}&{query}"),
                None => query,
            };
            auth_url.set_query(Some(&query));
        }

        self.requests
            .save(&AuthorizationRequest {
                actor: actor.clone(),
                did: identity.did.clone(),
                scope: self.config.scope.clone(),
                state,
                code_verifier,
                client_id,
                redirect_uri,
                issuer: metadata.issuer.clone(),
                token_endpoint: metadata.token_endpoint.clone(),
                iss_parameter_supported: metadata.sends_iss(),
                pds: identity.pds.clone(),
                dpop,
                created_at: Utc::now(),
            })
            .await?;
        #[cfg(feature = "tracing")]
        tracing::debug!(did = %identity.did, issuer = %metadata.issuer, "authorization request stored");
        Ok(auth_url)
    }

    /// Finish sign-in from the parameters returned to the callback route.
    ///
    /// Each pending request is exchanged at most once: a replayed callback
    /// gets `AlreadyConsumed` and nothing else happens.
    pub async fn callback(&self, params: CallbackParams) -> Result<Session> {
        let previous = match self.enter(
            &[
                FlowState::Idle,
                FlowState::AwaitingRedirect,
                FlowState::Authorized,
                FlowState::Failed,
            ],
            FlowState::ExchangingCode,
        ) {
            Ok(previous) => previous,
            Err(OAuthError::InvalidTransition {
                from: FlowState::ExchangingCode,
                ..
            }) => return Err(OAuthError::AlreadyConsumed),
            Err(e) => return Err(e),
        };
        match self.exchange(params).await {
            Ok(session) => {
                self.settle(FlowState::Authorized);
                Ok(session)
            }
            Err(OAuthError::AlreadyConsumed) => {
                self.settle(previous);
                Err(OAuthError::AlreadyConsumed)
            }
            Err(e) => {
                self.fail(&e);
                Err(e)
            }
        }
    }

    async fn exchange(&self, params: CallbackParams) -> Result<Session> {
        if let Some(error) = params.error {
            if let Some(state) = &params.state {
                self.requests.discard(state).await?;
            }
            return Err(OAuthError::AuthorizationDenied {
                error,
                description: params.error_description,
            });
        }
        let state = params.state.ok_or(OAuthError::MissingParameter("state"))?;
        let code = params.code.ok_or(OAuthError::MissingParameter("code"))?;

        let mut request = match self.requests.claim(&state).await? {
            Claim::Claimed(request) => request,
            Claim::AlreadyConsumed => return Err(OAuthError::AlreadyConsumed),
            Claim::Expired => return Err(OAuthError::RequestExpired),
            Claim::Unknown => return Err(OAuthError::StateMismatch),
        };

        // RFC 9207
        match params.iss {
            Some(iss) if !issuer_equivalent(&iss, &request.issuer) => {
                return Err(OAuthError::IssuerMismatch {
                    expected: request.issuer.clone(),
                    got: iss,
                });
            }
            None if request.iss_parameter_supported => {
                return Err(OAuthError::MissingParameter("iss"));
            }
            _ => {}
        }

        let endpoint = ServerEndpoint {
            client_id: &request.client_id,
            url: &request.token_endpoint,
            timeout: self.config.request_timeout,
        };
        let parameters = TokenRequestParameters {
            grant_type: TokenGrantType::AuthorizationCode,
            code,
            redirect_uri: request.redirect_uri.clone(),
            code_verifier: request.code_verifier.clone(),
        };
        let tokens = exchange_code(
            &self.http,
            &mut request.dpop,
            endpoint,
            &request.issuer,
            parameters,
            Some(&request.did),
        )
        .await?;

        let request = *request;
        let session =
            Session::from_token_set(tokens, request.dpop, request.token_endpoint, request.pds);
        self.sessions.persist(&session).await?;
        #[cfg(feature = "tracing")]
        tracing::info!(did = %session.did, "signed in");
        Ok(session)
    }
}
