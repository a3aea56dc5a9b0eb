use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use aktivi_common::ActorIdentifier;
use aktivi_common::http_client::HttpClient;
use aktivi_identity::resolver::{IdentityResolver, ResolveIdentityOptions};
use aktivi_identity::{
    HandleStep, IdentityError, LocalActorResolver, ProxyIdentityResolver, ResolverOptions,
};
use tokio::sync::Mutex;
use url::Url;

#[derive(Clone, Default)]
struct MockClient {
    queue: Arc<Mutex<VecDeque<http::Response<Vec<u8>>>>>,
    log: Arc<Mutex<Vec<http::Request<Vec<u8>>>>>,
}

impl MockClient {
    async fn push(&self, resp: http::Response<Vec<u8>>) {
        self.queue.lock().await.push_back(resp);
    }

    async fn requested_urls(&self) -> Vec<String> {
        self.log
            .lock()
            .await
            .iter()
            .map(|r| r.uri().to_string())
            .collect()
    }
}

impl HttpClient for MockClient {
    type Error = std::convert::Infallible;
    fn send_http(
        &self,
        request: http::Request<Vec<u8>>,
    ) -> impl core::future::Future<
        Output = core::result::Result<http::Response<Vec<u8>>, Self::Error>,
    > + Send {
        let log = self.log.clone();
        let queue = self.queue.clone();
        async move {
            log.lock().await.push(request);
            Ok(queue.lock().await.pop_front().expect("no queued response"))
        }
    }
}

fn json(status: u16, body: serde_json::Value) -> http::Response<Vec<u8>> {
    http::Response::builder()
        .status(status)
        .header("content-type", "application/json")
        .body(serde_json::to_vec(&body).unwrap())
        .unwrap()
}

fn text(status: u16, body: &str) -> http::Response<Vec<u8>> {
    http::Response::builder()
        .status(status)
        .header("content-type", "text/plain")
        .body(body.as_bytes().to_vec())
        .unwrap()
}

fn did_doc(did: &str, handle: &str, pds: &str) -> serde_json::Value {
    serde_json::json!({
        "@context": ["https://www.w3.org/ns/did/v1"],
        "id": did,
        "alsoKnownAs": [format!("at://{handle}")],
        "verificationMethod": [],
        "service": [{
            "id": "#atproto_pds",
            "type": "AtprotoPersonalDataServer",
            "serviceEndpoint": pds
        }]
    })
}

fn doh_answer(txt: &str) -> serde_json::Value {
    serde_json::json!({
        "Status": 0,
        "Answer": [{"name": "_atproto.alice.example", "type": 16, "TTL": 300, "data": format!("\"{txt}\"")}]
    })
}

fn options() -> ResolverOptions {
    ResolverOptions::new()
        .plc_directory(Url::parse("https://plc.test/").unwrap())
        .doh_url(Url::parse("https://doh.test/dns-query").unwrap())
        .handle_order(vec![HandleStep::DohTxt, HandleStep::HttpsWellKnown])
        .timeout(Duration::from_secs(2))
        .build()
}

#[tokio::test]
async fn handle_to_relay_end_to_end() {
    let client = MockClient::default();
    client.push(json(200, doh_answer("did=did:plc:abc123"))).await;
    client
        .push(json(
            200,
            did_doc("did:plc:abc123", "alice.example", "https://pds.example"),
        ))
        .await;

    let relay = Url::parse("https://relay.local").unwrap();
    let resolver = ProxyIdentityResolver::new(
        LocalActorResolver::from_options(client.clone(), &options()),
        relay.clone(),
    );
    let identity = resolver
        .resolve(
            &ActorIdentifier::new("alice.example").unwrap(),
            &ResolveIdentityOptions::default(),
        )
        .await
        .expect("resolves");

    assert_eq!(identity.did.as_str(), "did:plc:abc123");
    assert_eq!(identity.pds, relay);
    assert_eq!(
        identity.did_document.pds_endpoint().unwrap().as_str(),
        "https://pds.example/"
    );
    assert_eq!(identity.handle.unwrap().as_str(), "alice.example");
    assert_eq!(
        client.requested_urls().await,
        vec![
            "https://doh.test/dns-query?name=_atproto.alice.example&type=TXT".to_string(),
            "https://plc.test/did:plc:abc123".to_string(),
        ]
    );
}

#[tokio::test]
async fn falls_back_to_well_known_after_dns_miss() {
    let client = MockClient::default();
    client
        .push(json(200, serde_json::json!({"Status": 3, "Answer": []})))
        .await;
    client.push(text(200, "did:plc:abc123\n")).await;
    client
        .push(json(
            200,
            did_doc("did:plc:abc123", "alice.example", "https://pds.example"),
        ))
        .await;

    let resolver = LocalActorResolver::from_options(client.clone(), &options());
    let identity = resolver
        .resolve(
            &ActorIdentifier::new("alice.example").unwrap(),
            &ResolveIdentityOptions::default(),
        )
        .await
        .expect("resolves via well-known");

    assert_eq!(identity.did.as_str(), "did:plc:abc123");
    assert_eq!(identity.pds.as_str(), "https://pds.example/");
    let urls = client.requested_urls().await;
    assert!(urls[0].starts_with("https://doh.test/"));
    assert_eq!(urls[1], "https://alice.example/.well-known/atproto-did");
}

#[tokio::test]
async fn every_strategy_failing_is_handle_not_found() {
    let client = MockClient::default();
    client.push(json(500, serde_json::json!({}))).await;
    client.push(text(404, "not found")).await;

    let resolver = LocalActorResolver::from_options(client.clone(), &options());
    let err = resolver
        .resolve(
            &ActorIdentifier::new("alice.example").unwrap(),
            &ResolveIdentityOptions::default(),
        )
        .await
        .unwrap_err();

    match err.root_cause() {
        IdentityError::HandleNotFound { attempted, .. } => {
            assert_eq!(attempted, &vec!["dns-over-https", "https-well-known"]);
        }
        other => panic!("unexpected: {other:?}"),
    }
    assert_eq!(client.requested_urls().await.len(), 2);
}

#[tokio::test]
async fn unsupported_method_makes_no_requests() {
    let client = MockClient::default();
    let resolver = LocalActorResolver::from_options(client.clone(), &options());
    let err = resolver
        .resolve(
            &ActorIdentifier::new("did:key:zQ3shabc").unwrap(),
            &ResolveIdentityOptions::default(),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err.root_cause(),
        IdentityError::UnsupportedMethod { .. }
    ));
    assert!(client.requested_urls().await.is_empty());
}

#[tokio::test]
async fn tombstoned_plc_entry_is_not_found() {
    let client = MockClient::default();
    client
        .push(json(410, serde_json::json!({"message": "DID not available"})))
        .await;
    let resolver = LocalActorResolver::from_options(client.clone(), &options());
    let err = resolver
        .resolve(
            &ActorIdentifier::new("did:plc:abc123").unwrap(),
            &ResolveIdentityOptions::default(),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err.root_cause(),
        IdentityError::DocumentNotFound { .. }
    ));
}

#[tokio::test]
async fn did_web_document() {
    let client = MockClient::default();
    client
        .push(json(
            200,
            did_doc("did:web:alice.example", "alice.example", "https://pds.example"),
        ))
        .await;
    let resolver = LocalActorResolver::from_options(client.clone(), &options());
    let identity = resolver
        .resolve(
            &ActorIdentifier::new("did:web:alice.example").unwrap(),
            &ResolveIdentityOptions::default(),
        )
        .await
        .unwrap();
    assert_eq!(identity.did.as_str(), "did:web:alice.example");
    assert_eq!(
        client.requested_urls().await,
        vec!["https://alice.example/.well-known/did.json".to_string()]
    );
}
