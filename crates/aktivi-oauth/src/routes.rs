//! Handlers for the two routes the sign-in flow lands on.
//!
//! - `/oauth/callback`: the authorization server returns here with the
//!   result in the URL fragment. See [`CallbackRoute`].
//! - `/oauth/pre`: the external broker returns here with `hint` and `nonce`
//!   in the query. See [`PreAuthRoute`].
//!
//! Both handlers may run twice for one navigation; each owns a [`OneShot`]
//! and the second run returns [`RouteOutcome::AlreadyHandled`] without doing
//! anything.

use std::sync::Arc;

use aktivi_common::http_client::HttpClient;
use serde::Serialize;
use smol_str::SmolStr;
use url::Url;

use crate::error::OAuthError;
use crate::flow::AuthorizationFlowManager;
use crate::handoff::HandoffGuard;
use crate::latch::OneShot;
use crate::types::CallbackParams;

/// Path of the sign-in page every failure screen links back to
pub const LOGIN_PATH: &str = "/login";

/// The user agent's address bar.
pub trait Location: Send + Sync {
    /// The URL the page was loaded with, including query and fragment.
    fn current(&self) -> Url;
    /// Change the visible URL without a history entry or a navigation.
    fn replace(&self, url: &Url);
    /// Navigate to `url`.
    fn assign(&self, url: &Url);
}

/// What a failed redirect flow shows instead of a retry button.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureScreen {
    pub title: SmolStr,
    /// The error, rendered for the user
    pub message: SmolStr,
    /// Link back to the sign-in page; the only way forward
    pub restart_href: SmolStr,
}

impl FailureScreen {
    /// Screen for a terminal route failure.
    pub fn from_error(error: &OAuthError) -> Self {
        Self {
            title: SmolStr::new_static("authorization failed"),
            message: smol_str::format_smolstr!("{error}"),
            restart_href: SmolStr::new_static(LOGIN_PATH),
        }
    }
}

/// Result of running a route handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    /// The handler succeeded and sent the user agent to this URL
    Navigated(Url),
    /// The handler already ran for this page load and did nothing
    AlreadyHandled,
    /// The attempt is over; show this screen
    Failed(FailureScreen),
}

impl RouteOutcome {
    fn fail(error: OAuthError) -> Self {
        #[cfg(feature = "tracing")]
        tracing::warn!(error = %error, terminal = error.is_terminal(), "route failed");
        RouteOutcome::Failed(FailureScreen::from_error(&error))
    }
}

/// The authorization server's redirect target.
pub struct CallbackRoute<C> {
    flow: Arc<AuthorizationFlowManager<C>>,
    latch: OneShot,
}

impl<C> CallbackRoute<C>
where
    C: HttpClient + Send + Sync,
{
    /// Handler over `flow`, armed for one run.
    pub fn new(flow: Arc<AuthorizationFlowManager<C>>) -> Self {
        Self {
            flow,
            latch: OneShot::new(),
        }
    }

    /// Scrub the returned parameters from the address bar, exchange the code
    /// and go to the application root.
    pub async fn handle(&self, location: &dyn Location) -> RouteOutcome {
        if !self.latch.try_fire() {
            return RouteOutcome::AlreadyHandled;
        }
        let current = location.current();
        let mut scrubbed = current.clone();
        scrubbed.set_fragment(None);
        scrubbed.set_query(None);
        location.replace(&scrubbed);

        let params = match CallbackParams::from_url(&current) {
            Ok(params) => params,
            Err(e) => return RouteOutcome::fail(e.into()),
        };
        match self.flow.callback(params).await {
            Ok(_) => {
                let mut home = self.flow.config().client_uri.clone();
                home.set_path("/");
                home.set_query(None);
                home.set_fragment(None);
                location.assign(&home);
                RouteOutcome::Navigated(home)
            }
            Err(e) => RouteOutcome::fail(e),
        }
    }
}

/// Where the external broker sends the user back to.
pub struct PreAuthRoute<C> {
    flow: Arc<AuthorizationFlowManager<C>>,
    guard: Arc<HandoffGuard>,
    latch: OneShot,
}

impl<C> PreAuthRoute<C>
where
    C: HttpClient + Send + Sync,
{
    /// Handler that checks the broker nonce with `guard` before starting
    /// sign-in on `flow`.
    pub fn new(flow: Arc<AuthorizationFlowManager<C>>, guard: Arc<HandoffGuard>) -> Self {
        Self {
            flow,
            guard,
            latch: OneShot::new(),
        }
    }

    /// Check the broker's nonce, then start sign-in for `hint` and navigate to
    /// the authorization server.
    pub async fn handle(&self, location: &dyn Location) -> RouteOutcome {
        if !self.latch.try_fire() {
            return RouteOutcome::AlreadyHandled;
        }
        let actor = match self.guard.verify_url(&location.current()).await {
            Ok(actor) => actor,
            Err(e) => return RouteOutcome::fail(e),
        };
        match self.flow.start(&actor).await {
            Ok(url) => {
                location.assign(&url);
                RouteOutcome::Navigated(url)
            }
            Err(e) => RouteOutcome::fail(e),
        }
    }
}
