//! Nonce guard for the external broker entry point.
//!
//! 1. [`HandoffGuard::begin`] stores a fresh [`Nonce`] in the page-session
//!    store and returns the broker URL carrying it.
//! 2. The broker sends the user back to the pre-authorization route with
//!    `hint` and `nonce` query parameters.
//! 3. [`HandoffGuard::verify`] consumes the stored nonce and, if it matches,
//!    yields the actor to start sign-in for.
//!
//! The stored nonce is removed on every verification attempt, successful or
//! not.

use std::sync::Arc;
use std::time::Duration;

use aktivi_common::ActorIdentifier;
use aktivi_common::store::{KeyValueStore, set_json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use url::Url;

use crate::config::OAuthConfig;
use crate::error::{OAuthError, Result};
use crate::utils::generate_nonce;

/// Page-session key holding the pending nonce
pub const NONCE_KEY: &str = "ih_auth_nonce";

/// The nonce sent to the broker, as stored for this page session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Nonce {
    pub value: SmolStr,
    pub created_at: DateTime<Utc>,
}

impl Nonce {
    /// 128 random bits, stamped now.
    pub fn generate() -> Self {
        Self {
            value: generate_nonce(),
            created_at: Utc::now(),
        }
    }

    /// Older than `ttl` at `now`.
    pub fn is_expired_at(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        match chrono::TimeDelta::from_std(ttl) {
            Ok(ttl) => now - self.created_at > ttl,
            Err(_) => false,
        }
    }
}

/// Binds the broker round trip to this page session with a single-use
/// nonce.
pub struct HandoffGuard {
    store: Arc<dyn KeyValueStore>,
    broker_url: Url,
    return_url: Url,
    ttl: Duration,
}

impl HandoffGuard {
    /// `page_session` must be scoped to one browsing context.
    pub fn new(config: &OAuthConfig, page_session: Arc<dyn KeyValueStore>) -> Result<Self> {
        Ok(Self {
            store: page_session,
            broker_url: config.broker_url.clone(),
            return_url: config.pre_auth_url()?,
            ttl: config.nonce_ttl,
        })
    }

    /// Store a new nonce and build the broker redirect.
    ///
    /// Any nonce left over from an earlier attempt is replaced.
    pub async fn begin(&self) -> Result<Url> {
        let nonce = Nonce::generate();
        set_json(self.store.as_ref(), NONCE_KEY, &nonce).await?;
        let mut url = self.broker_url.clone();
        url.query_pairs_mut()
            .append_pair("redirect_uri", self.return_url.as_str())
            .append_pair("nonce", &nonce.value);
        #[cfg(feature = "tracing")]
        tracing::debug!(broker = %self.broker_url, "handoff nonce stored");
        Ok(url)
    }

    /// Check the parameters the broker returned.
    ///
    /// Errors, in order of precedence: `MissingParameter("hint")`,
    /// `MissingParameter("nonce")`, `NoStoredNonce`, `NonceMismatch`,
    /// `NonceExpired`.
    pub async fn verify(&self, hint: Option<&str>, nonce: Option<&str>) -> Result<ActorIdentifier> {
        let stored = self
            .store
            .take(NONCE_KEY)
            .await?
            .and_then(|value| serde_json::from_value::<Nonce>(value).ok());

        let hint = hint
            .filter(|h| !h.is_empty())
            .ok_or(OAuthError::MissingParameter("hint"))?;
        let nonce = nonce
            .filter(|n| !n.is_empty())
            .ok_or(OAuthError::MissingParameter("nonce"))?;
        let stored = stored.ok_or(OAuthError::NoStoredNonce)?;
        if stored.value != nonce {
            return Err(OAuthError::NonceMismatch);
        }
        if stored.is_expired_at(self.ttl, Utc::now()) {
            return Err(OAuthError::NonceExpired);
        }
        Ok(ActorIdentifier::new(hint)?)
    }

    /// [`HandoffGuard::verify`] with `hint` and `nonce` read from `url`'s query.
    pub async fn verify_url(&self, url: &Url) -> Result<ActorIdentifier> {
        let mut hint = None;
        let mut nonce = None;
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "hint" => hint = Some(value.into_owned()),
                "nonce" => nonce = Some(value.into_owned()),
                _ => {}
            }
        }
        self.verify(hint.as_deref(), nonce.as_deref()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aktivi_common::store::MemoryStore;

    fn guard() -> (MemoryStore, HandoffGuard) {
        let mem = MemoryStore::new();
        let config = OAuthConfig::for_origin("https://app.example").unwrap();
        let guard = HandoffGuard::new(&config, Arc::new(mem.clone())).unwrap();
        (mem, guard)
    }

    async fn stored_value(mem: &MemoryStore) -> Option<String> {
        mem.get(NONCE_KEY)
            .await
            .unwrap()
            .map(|v| v["value"].as_str().unwrap().to_string())
    }

    #[tokio::test]
    async fn begin_builds_broker_url() {
        let (mem, guard) = guard();
        let url = guard.begin().await.unwrap();
        let nonce = stored_value(&mem).await.expect("nonce stored");
        assert_eq!(url.host_str(), Some("ih-auth.pages.dev"));
        assert_eq!(url.path(), "/auth");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            vec![
                ("redirect_uri".into(), "https://app.example/oauth/pre".into()),
                ("nonce".into(), nonce),
            ]
        );
    }

    #[tokio::test]
    async fn missing_parameters_checked_first() {
        let (_, guard) = guard();
        assert!(matches!(
            guard.verify(None, Some("n")).await,
            Err(OAuthError::MissingParameter("hint"))
        ));
        assert!(matches!(
            guard.verify(Some("alice.example"), None).await,
            Err(OAuthError::MissingParameter("nonce"))
        ));
    }

    #[tokio::test]
    async fn expired_nonce_rejected_and_removed() {
        let (mem, guard) = guard();
        let old = Nonce {
            value: "n1".into(),
            created_at: Utc::now() - chrono::TimeDelta::hours(1),
        };
        set_json(&mem, NONCE_KEY, &old).await.unwrap();
        assert!(matches!(
            guard.verify(Some("alice.example"), Some("n1")).await,
            Err(OAuthError::NonceExpired)
        ));
        assert!(mem.is_empty().await);
    }

    #[tokio::test]
    async fn invalid_hint_after_match() {
        let (mem, guard) = guard();
        guard.begin().await.unwrap();
        let nonce = stored_value(&mem).await.unwrap();
        assert!(matches!(
            guard.verify(Some("not a handle!"), Some(&nonce)).await,
            Err(OAuthError::InvalidIdentifier(_))
        ));
    }
}
