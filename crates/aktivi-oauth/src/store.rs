//! Durable state for sessions and in-flight authorization requests.
//!
//! Layout in the durable [`KeyValueStore`]:
//!
//! | key | value |
//! |---|---|
//! | `aktivi_user_did` | DID of the active user |
//! | `aktivi_session:{did}` | [`Session`] |
//! | `aktivi_oauth_request:{state}` | pending [`AuthorizationRequest`] or a consumed marker |

use std::sync::Arc;
use std::time::Duration;

use aktivi_common::Did;
use aktivi_common::store::{KeyValueStore, StoreError, get_json, set_json};
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::session::{AuthorizationRequest, Session};

/// Key of the active user's DID
pub const ACTIVE_DID_KEY: &str = "aktivi_user_did";
/// Prefix of per-DID session keys
pub const SESSION_KEY_PREFIX: &str = "aktivi_session:";
/// Prefix of per-`state` authorization request keys
pub const REQUEST_KEY_PREFIX: &str = "aktivi_oauth_request:";

fn session_key(did: &Did) -> String {
    format!("{SESSION_KEY_PREFIX}{did}")
}

fn request_key(state: &str) -> String {
    format!("{REQUEST_KEY_PREFIX}{state}")
}

/// Persists the single active session, keyed by DID.
#[derive(Clone)]
pub struct SessionStore {
    store: Arc<dyn KeyValueStore>,
}

impl SessionStore {
    /// Sessions kept in `store`.
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Write `session` and make its DID the active one.
    pub async fn persist(&self, session: &Session) -> Result<(), StoreError> {
        set_json(self.store.as_ref(), &session_key(&session.did), session).await?;
        set_json(self.store.as_ref(), ACTIVE_DID_KEY, &session.did).await
    }

    /// Load the session stored for `did`.
    ///
    /// Never fails: a missing, unreadable or (unless `allow_stale`) expired
    /// session is reported as `None`.
    pub async fn restore(&self, did: &Did, allow_stale: bool) -> Option<Session> {
        let mut session = match get_json::<Session, _>(self.store.as_ref(), &session_key(did)).await
        {
            Ok(Some(session)) => session,
            Ok(None) => return None,
            Err(_e) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(did = %did, error = %_e, "discarding unreadable session");
                return None;
            }
        };
        if session.did != *did {
            return None;
        }
        if session.is_stale() && !allow_stale {
            #[cfg(feature = "tracing")]
            tracing::debug!(did = %did, "stored session is stale");
            return None;
        }
        session.allow_stale = allow_stale;
        Some(session)
    }

    /// DID recorded by the last successful sign-in, if any.
    pub async fn active_did(&self) -> Option<Did> {
        get_json::<Did, _>(self.store.as_ref(), ACTIVE_DID_KEY)
            .await
            .ok()
            .flatten()
    }

    /// Restore the session for the active DID.
    pub async fn restore_active(&self, allow_stale: bool) -> Option<Session> {
        let did = self.active_did().await?;
        self.restore(&did, allow_stale).await
    }

    /// Forget the active session and the active-DID pointer.
    pub async fn clear(&self) -> Result<(), StoreError> {
        if let Some(did) = self.active_did().await {
            self.store.del(&session_key(&did)).await?;
        }
        self.store.del(ACTIVE_DID_KEY).await
    }
}

#[derive(Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum PendingEntry {
    Pending { request: Box<AuthorizationRequest> },
    Consumed { consumed_at: DateTime<Utc> },
}

impl PendingEntry {
    fn recorded_at(&self) -> DateTime<Utc> {
        match self {
            PendingEntry::Pending { request } => request.created_at,
            PendingEntry::Consumed { consumed_at } => *consumed_at,
        }
    }
}

/// Outcome of [`PendingRequestStore::claim`].
#[derive(Debug)]
pub enum Claim {
    /// The request was pending and is now consumed
    Claimed(Box<AuthorizationRequest>),
    /// The request was claimed before
    AlreadyConsumed,
    /// The request was pending but older than the store's time-to-live; it
    /// has been removed
    Expired,
    /// Nothing is stored for this `state`
    Unknown,
}

/// In-flight authorization requests, claimable exactly once.
///
/// Claiming leaves a consumed marker behind so a replayed callback is told
/// apart from one that never belonged to us. Pending requests and markers
/// both live for `ttl`; anything older is pruned whenever a request is saved
/// or claimed.
#[derive(Clone)]
pub struct PendingRequestStore {
    store: Arc<dyn KeyValueStore>,
    ttl: TimeDelta,
    claim_lock: Arc<Mutex<()>>,
}

impl PendingRequestStore {
    /// Requests in `store`, valid for `ttl` after they are saved.
    pub fn new(store: Arc<dyn KeyValueStore>, ttl: Duration) -> Self {
        Self {
            store,
            ttl: TimeDelta::from_std(ttl).unwrap_or_else(|_| TimeDelta::days(365)),
            claim_lock: Arc::new(Mutex::new(())),
        }
    }

    fn is_expired(&self, recorded_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(recorded_at) > self.ttl
    }

    /// Store `request` under its `state`.
    pub async fn save(&self, request: &AuthorizationRequest) -> Result<(), StoreError> {
        let _guard = self.claim_lock.lock().await;
        self.prune(Utc::now()).await?;
        let entry = PendingEntry::Pending {
            request: Box::new(request.clone()),
        };
        set_json(self.store.as_ref(), &request_key(&request.state), &entry).await
    }

    /// Take the pending request for `state`, replacing it with a consumed
    /// marker.
    pub async fn claim(&self, state: &str) -> Result<Claim, StoreError> {
        let _guard = self.claim_lock.lock().await;
        let now = Utc::now();
        let key = request_key(state);
        let claim = match get_json::<PendingEntry, _>(self.store.as_ref(), &key).await? {
            None => Claim::Unknown,
            Some(PendingEntry::Consumed { .. }) => Claim::AlreadyConsumed,
            Some(PendingEntry::Pending { request }) if self.is_expired(request.created_at, now) => {
                self.store.del(&key).await?;
                Claim::Expired
            }
            Some(PendingEntry::Pending { request }) => {
                let marker = PendingEntry::Consumed { consumed_at: now };
                set_json(self.store.as_ref(), &key, &marker).await?;
                Claim::Claimed(request)
            }
        };
        self.prune(now).await?;
        Ok(claim)
    }

    /// Drop whatever is stored for `state`.
    pub async fn discard(&self, state: &str) -> Result<(), StoreError> {
        self.store.del(&request_key(state)).await
    }

    /// Remove pending requests and consumed markers older than the
    /// time-to-live, along with entries that no longer decode.
    async fn prune(&self, now: DateTime<Utc>) -> Result<(), StoreError> {
        for key in self.store.keys_with_prefix(REQUEST_KEY_PREFIX).await? {
            let stale = match get_json::<PendingEntry, _>(self.store.as_ref(), &key).await {
                Ok(Some(entry)) => self.is_expired(entry.recorded_at(), now),
                Ok(None) => false,
                Err(StoreError::Serde(_)) => true,
                Err(e) => return Err(e),
            };
            if stale {
                #[cfg(feature = "tracing")]
                tracing::debug!(key = %key, "pruning expired authorization request");
                self.store.del(&key).await?;
            }
        }
        Ok(())
    }
}
