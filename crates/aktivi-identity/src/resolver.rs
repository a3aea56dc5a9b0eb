//! Resolver traits and the composites that stitch leaf strategies together.
//!
//! Layering, leaves first:
//! - [`DidDocumentResolver`] leaves (one per DID method) under a
//!   [`CompositeDidDocumentResolver`] that dispatches on the method segment.
//! - [`HandleResolver`] leaves (DoH TXT, HTTPS well-known, system DNS) under a
//!   [`CompositeHandleResolver`] that tries them strictly in order.
//! - [`LocalActorResolver`] combining both into an [`IdentityResolver`].

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use aktivi_common::http_client::HttpClient;
use aktivi_common::{ActorIdentifier, Did, DidDocument, Handle};
use async_trait::async_trait;
use bon::Builder;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use tokio::sync::RwLock;
use url::Url;

use crate::error::{IdentityError, IdentityWarning, Result};

/// Resolves a DID of one (or several) methods to its document.
#[async_trait]
pub trait DidDocumentResolver: Send + Sync {
    /// Fetch and parse the document for `did`.
    async fn resolve(&self, did: &Did) -> Result<DidDocument>;
}

/// Resolves a handle to the DID it claims.
#[async_trait]
pub trait HandleResolver: Send + Sync {
    /// Short name used in logs and in `HandleNotFound`.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Look up the DID published for `handle`.
    async fn resolve(&self, handle: &Handle) -> Result<Did>;
}

/// Turns an actor identifier into a [`ResolvedIdentity`].
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    /// Resolve `actor` to a DID, its document and its hosting endpoint.
    async fn resolve(
        &self,
        actor: &ActorIdentifier,
        options: &ResolveIdentityOptions,
    ) -> Result<ResolvedIdentity>;
}

#[async_trait]
impl<T: DidDocumentResolver + ?Sized> DidDocumentResolver for Arc<T> {
    async fn resolve(&self, did: &Did) -> Result<DidDocument> {
        self.as_ref().resolve(did).await
    }
}

#[async_trait]
impl<T: HandleResolver + ?Sized> HandleResolver for Arc<T> {
    fn name(&self) -> &'static str {
        self.as_ref().name()
    }

    async fn resolve(&self, handle: &Handle) -> Result<Did> {
        self.as_ref().resolve(handle).await
    }
}

#[async_trait]
impl<T: IdentityResolver + ?Sized> IdentityResolver for Arc<T> {
    async fn resolve(
        &self,
        actor: &ActorIdentifier,
        options: &ResolveIdentityOptions,
    ) -> Result<ResolvedIdentity> {
        self.as_ref().resolve(actor, options).await
    }
}

#[async_trait]
impl<T: IdentityResolver + ?Sized> IdentityResolver for Box<T> {
    async fn resolve(
        &self,
        actor: &ActorIdentifier,
        options: &ResolveIdentityOptions,
    ) -> Result<ResolvedIdentity> {
        self.as_ref().resolve(actor, options).await
    }
}

/// Per-call resolution options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Builder)]
#[builder(start_fn = new)]
pub struct ResolveIdentityOptions {
    /// Skip any cached result and resolve from the network
    #[builder(default)]
    pub no_cache: bool,
    /// Validate that fetched DID document id matches the requested DID
    #[builder(default = true)]
    pub validate_doc_id: bool,
}

impl Default for ResolveIdentityOptions {
    fn default() -> Self {
        Self::new().build()
    }
}

/// A fully resolved identity.
///
/// `pds` is always an absolute http(s) URL. After a
/// [`ProxyIdentityResolver`](crate::proxy::ProxyIdentityResolver) it is the
/// relay, not the endpoint declared in `did_document`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedIdentity {
    #[allow(missing_docs)]
    pub did: Did,
    #[allow(missing_docs)]
    pub did_document: DidDocument,
    /// Hosting endpoint all authenticated traffic is addressed to
    pub pds: Url,
    /// Handle, only when it was checked against the document's `alsoKnownAs`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handle: Option<Handle>,
    /// Non-fatal findings
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<IdentityWarning>,
}

/// Dispatches a DID to the resolver registered for its method.
///
/// An unregistered method fails with `UnsupportedMethod` before any network
/// access happens.
#[derive(Default, Clone)]
pub struct CompositeDidDocumentResolver {
    methods: BTreeMap<SmolStr, Arc<dyn DidDocumentResolver>>,
}

impl CompositeDidDocumentResolver {
    #[allow(missing_docs)]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `resolver` for `method` (e.g. `"plc"`), replacing any previous one.
    pub fn with_method(
        mut self,
        method: impl Into<SmolStr>,
        resolver: impl DidDocumentResolver + 'static,
    ) -> Self {
        self.methods.insert(method.into(), Arc::new(resolver));
        self
    }

    /// Registered method names, sorted.
    pub fn methods(&self) -> impl Iterator<Item = &str> {
        self.methods.keys().map(SmolStr::as_str)
    }
}

#[async_trait]
impl DidDocumentResolver for CompositeDidDocumentResolver {
    async fn resolve(&self, did: &Did) -> Result<DidDocument> {
        let resolver = self
            .methods
            .get(did.method())
            .ok_or_else(|| IdentityError::unsupported_method(did))?;
        resolver.resolve(did).await
    }
}

/// Tries handle strategies strictly in order; the first success wins.
///
/// Strategies never run concurrently, so an authoritative but slow source
/// earlier in the list is never pre-empted by a later one.
#[derive(Default, Clone)]
pub struct CompositeHandleResolver {
    strategies: Vec<Arc<dyn HandleResolver>>,
}

impl CompositeHandleResolver {
    #[allow(missing_docs)]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a strategy at the lowest priority.
    pub fn with_strategy(mut self, strategy: impl HandleResolver + 'static) -> Self {
        self.strategies.push(Arc::new(strategy));
        self
    }

    /// Strategy names in priority order.
    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }
}

#[async_trait]
impl HandleResolver for CompositeHandleResolver {
    fn name(&self) -> &'static str {
        "composite"
    }

    #[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip_all, fields(handle = %handle.as_str())))]
    async fn resolve(&self, handle: &Handle) -> Result<Did> {
        let mut attempted = Vec::with_capacity(self.strategies.len());
        for strategy in &self.strategies {
            attempted.push(SmolStr::new_static(strategy.name()));
            match strategy.resolve(handle).await {
                Ok(did) => return Ok(did),
                Err(_e) => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(strategy = strategy.name(), error = %_e, "handle strategy failed");
                }
            }
        }
        Err(IdentityError::HandleNotFound {
            handle: handle.clone(),
            attempted,
        })
    }
}

#[derive(Clone)]
struct CacheEntry {
    identity: ResolvedIdentity,
    stored_at: Instant,
}

/// The identity resolver: handle → DID → document → hosting endpoint.
///
/// Any failing step is reported as `IdentityResolutionFailed` wrapping that
/// step's error. A document without a usable hosting endpoint is a failure,
/// never a partial result.
#[derive(Clone)]
pub struct LocalActorResolver {
    handles: Arc<dyn HandleResolver>,
    dids: Arc<dyn DidDocumentResolver>,
    cache: Option<(Duration, Arc<RwLock<HashMap<ActorIdentifier, CacheEntry>>>)>,
}

impl LocalActorResolver {
    /// Combine a handle resolver and a DID document resolver.
    pub fn new(
        handles: impl HandleResolver + 'static,
        dids: impl DidDocumentResolver + 'static,
    ) -> Self {
        Self {
            handles: Arc::new(handles),
            dids: Arc::new(dids),
            cache: None,
        }
    }

    /// Keep successful results in memory for `ttl`.
    ///
    /// `ResolveIdentityOptions::no_cache` bypasses the lookup but still
    /// refreshes the entry. Results whose document `id` differs from the
    /// resolved DID are never cached.
    pub fn with_cache(mut self, ttl: Duration) -> Self {
        self.cache = Some((ttl, Arc::new(RwLock::new(HashMap::new()))));
        self
    }

    /// Build the default stack for `http` from `opts`.
    pub fn from_options<C>(http: C, opts: &crate::ResolverOptions) -> Self
    where
        C: HttpClient + Clone + Send + Sync + 'static,
    {
        Self::new(
            crate::handle::handle_resolver_for(http.clone(), opts),
            crate::did::did_resolver_for(http, opts),
        )
    }

    async fn cached(&self, actor: &ActorIdentifier) -> Option<ResolvedIdentity> {
        let (ttl, cache) = self.cache.as_ref()?;
        let guard = cache.read().await;
        let entry = guard.get(actor)?;
        (entry.stored_at.elapsed() < *ttl).then(|| entry.identity.clone())
    }

    async fn remember(&self, actor: &ActorIdentifier, identity: &ResolvedIdentity) {
        if let Some((_, cache)) = &self.cache {
            cache.write().await.insert(
                actor.clone(),
                CacheEntry {
                    identity: identity.clone(),
                    stored_at: Instant::now(),
                },
            );
        }
    }

    async fn resolve_uncached(
        &self,
        actor: &ActorIdentifier,
        options: &ResolveIdentityOptions,
    ) -> Result<ResolvedIdentity> {
        let did = match actor {
            ActorIdentifier::Did(did) => did.clone(),
            ActorIdentifier::Handle(handle) => self.handles.resolve(handle).await?,
        };
        let doc = self.dids.resolve(&did).await?;
        if options.validate_doc_id && doc.id != did {
            return Err(IdentityError::DocIdMismatch {
                expected: did,
                doc: Box::new(doc),
            });
        }
        let pds = doc
            .pds_endpoint()
            .ok_or_else(|| IdentityError::MissingPdsEndpoint { did: did.clone() })?;

        let mut warnings = Vec::new();
        let handle = match actor {
            ActorIdentifier::Handle(handle) if doc.claims_handle(handle) => Some(handle.clone()),
            ActorIdentifier::Handle(handle) => {
                warnings.push(IdentityWarning::HandleAliasMismatch {
                    expected: handle.clone(),
                });
                None
            }
            ActorIdentifier::Did(_) => None,
        };

        Ok(ResolvedIdentity {
            did,
            did_document: doc,
            pds,
            handle,
            warnings,
        })
    }
}

#[async_trait]
impl IdentityResolver for LocalActorResolver {
    #[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip_all, fields(actor = %actor)))]
    async fn resolve(
        &self,
        actor: &ActorIdentifier,
        options: &ResolveIdentityOptions,
    ) -> Result<ResolvedIdentity> {
        if !options.no_cache {
            if let Some(hit) = self.cached(actor).await {
                return Ok(hit);
            }
        }
        let identity = self
            .resolve_uncached(actor, options)
            .await
            .map_err(|e| IdentityError::IdentityResolutionFailed {
                actor: actor.clone(),
                source: Box::new(e),
            })?;
        // A lax lookup may carry a document naming another DID; only
        // self-consistent results are shared with later callers.
        if identity.did_document.id == identity.did {
            self.remember(actor, &identity).await;
        }
        Ok(identity)
    }
}
