use std::sync::Arc;

use aktivi_common::ActorIdentifier;
use aktivi_common::http_client::HttpClient;
use aktivi_common::store::KeyValueStore;
use aktivi_identity::IdentityResolver;
use aktivi_oauth::{
    AuthorizationFlowManager, CallbackRoute, HandoffGuard, Location, OAuthConfig, OAuthError,
    PreAuthRoute, RouteOutcome, Session,
};
use tokio::sync::RwLock;
use url::Url;

/// Application-wide sign-in state.
///
/// Holds the active session (if any) and the handlers for the callback and
/// broker return routes. Create one per page load: each route runs at most
/// once per context.
pub struct AuthContext<C> {
    flow: Arc<AuthorizationFlowManager<C>>,
    handoff: Arc<HandoffGuard>,
    callback: CallbackRoute<C>,
    pre_auth: PreAuthRoute<C>,
    session: RwLock<Option<Session>>,
}

impl<C> AuthContext<C>
where
    C: HttpClient + Send + Sync,
{
    /// `durable` survives restarts; `page_session` lives as long as one
    /// browsing context and only holds the broker nonce.
    pub fn new(
        config: OAuthConfig,
        http: C,
        resolver: Arc<dyn IdentityResolver>,
        durable: Arc<dyn KeyValueStore>,
        page_session: Arc<dyn KeyValueStore>,
    ) -> Result<Self, OAuthError> {
        let flow = Arc::new(AuthorizationFlowManager::new(
            config, http, resolver, durable,
        )?);
        let handoff = Arc::new(HandoffGuard::new(flow.config(), page_session)?);
        Ok(Self {
            callback: CallbackRoute::new(flow.clone()),
            pre_auth: PreAuthRoute::new(flow.clone(), handoff.clone()),
            flow,
            handoff,
            session: RwLock::new(None),
        })
    }

    pub fn flow(&self) -> &Arc<AuthorizationFlowManager<C>> {
        &self.flow
    }

    /// Load the session of the last signed-in user.
    ///
    /// Accepts a session past its expiry; the data layer refreshes or
    /// rejects it on first use. Missing or unreadable state is `None`.
    pub async fn restore(&self) -> Option<Session> {
        let restored = self.flow.sessions().restore_active(true).await;
        #[cfg(feature = "tracing")]
        {
            match &restored {
                Some(session) => {
                    tracing::info!(did = %session.did, stale = session.is_stale(), "session restored")
                }
                None => tracing::debug!("no session to restore"),
            }
        }
        *self.session.write().await = restored.clone();
        restored
    }

    pub async fn session(&self) -> Option<Session> {
        self.session.read().await.clone()
    }

    pub async fn is_signed_in(&self) -> bool {
        self.session.read().await.is_some()
    }

    /// Start sign-in for `identifier` (handle or DID) and navigate to the
    /// authorization server.
    pub async fn sign_in(
        &self,
        identifier: &str,
        location: &dyn Location,
    ) -> Result<Url, OAuthError> {
        let actor = ActorIdentifier::new(identifier.trim())?;
        let url = self.flow.start(&actor).await?;
        location.assign(&url);
        Ok(url)
    }

    /// Send the user to the external broker with a fresh nonce.
    pub async fn begin_handoff(&self, location: &dyn Location) -> Result<Url, OAuthError> {
        let url = self.handoff.begin().await?;
        location.assign(&url);
        Ok(url)
    }

    /// Forget the session locally.
    ///
    /// Tokens are not revoked at the authorization server; they stay valid
    /// until they expire.
    pub async fn sign_out(&self) -> Result<(), OAuthError> {
        self.flow.sessions().clear().await?;
        let _previous = self.session.write().await.take();
        #[cfg(feature = "tracing")]
        {
            if let Some(session) = _previous {
                tracing::info!(did = %session.did, "signed out");
            }
        }
        Ok(())
    }

    /// Run the callback route; on success the new session becomes the
    /// active one.
    pub async fn handle_callback(&self, location: &dyn Location) -> RouteOutcome {
        let outcome = self.callback.handle(location).await;
        if matches!(outcome, RouteOutcome::Navigated(_)) {
            let session = self.flow.sessions().restore_active(false).await;
            #[cfg(feature = "tracing")]
            {
                if let Some(session) = &session {
                    tracing::info!(did = %session.did, "session active");
                }
            }
            *self.session.write().await = session;
        }
        outcome
    }

    /// Run the broker return route.
    pub async fn handle_pre_auth(&self, location: &dyn Location) -> RouteOutcome {
        self.pre_auth.handle(location).await
    }
}
