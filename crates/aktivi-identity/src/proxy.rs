//! Relay-rewriting decorator over any [`IdentityResolver`].

use aktivi_common::ActorIdentifier;
use async_trait::async_trait;
use url::Url;

use crate::error::Result;
use crate::resolver::{IdentityResolver, ResolveIdentityOptions, ResolvedIdentity};

/// Delegates to `inner`, then replaces `pds` with the configured relay.
///
/// Everything downstream talks to the relay; the endpoint declared in the DID
/// document is still available via `did_document.pds_endpoint()`, but the
/// `pds` field of the result is never evidence of where the actor's data
/// actually lives.
#[derive(Clone, Debug)]
pub struct ProxyIdentityResolver<R> {
    inner: R,
    relay: Url,
}

impl<R> ProxyIdentityResolver<R> {
    /// Wrap `inner`, rewriting every result to point at `relay`.
    pub fn new(inner: R, relay: Url) -> Self {
        Self { inner, relay }
    }

    #[allow(missing_docs)]
    pub fn relay(&self) -> &Url {
        &self.relay
    }

    #[allow(missing_docs)]
    pub fn inner(&self) -> &R {
        &self.inner
    }
}

#[async_trait]
impl<R: IdentityResolver> IdentityResolver for ProxyIdentityResolver<R> {
    async fn resolve(
        &self,
        actor: &ActorIdentifier,
        options: &ResolveIdentityOptions,
    ) -> Result<ResolvedIdentity> {
        let mut identity = self.inner.resolve(actor, options).await?;
        #[cfg(feature = "tracing")]
        tracing::info!(
            did = %identity.did,
            original_pds = %identity.pds,
            relay = %self.relay,
            "rewriting hosting endpoint to relay"
        );
        identity.pds = self.relay.clone();
        Ok(identity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aktivi_common::{Did, DidDocument};

    struct Static;

    #[async_trait]
    impl IdentityResolver for Static {
        async fn resolve(
            &self,
            _actor: &ActorIdentifier,
            _options: &ResolveIdentityOptions,
        ) -> Result<ResolvedIdentity> {
            let did = Did::new("did:plc:abc123").unwrap();
            Ok(ResolvedIdentity {
                did: did.clone(),
                did_document: DidDocument::new().id(did).build(),
                pds: Url::parse("https://pds.example").unwrap(),
                handle: None,
                warnings: vec![],
            })
        }
    }

    #[tokio::test]
    async fn overwrites_pds_only() {
        let relay = Url::parse("https://relay.local").unwrap();
        let proxy = ProxyIdentityResolver::new(Static, relay.clone());
        let actor = ActorIdentifier::new("did:plc:abc123").unwrap();
        let out = proxy
            .resolve(&actor, &ResolveIdentityOptions::default())
            .await
            .unwrap();
        assert_eq!(out.pds, relay);
        assert_eq!(out.did.as_str(), "did:plc:abc123");
    }
}
