use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use aktivi_common::ActorIdentifier;
use aktivi_common::Did;
use aktivi_common::http_client::HttpClient;
use aktivi_common::store::{KeyValueStore, MemoryStore};
use aktivi_identity::{HandleStep, LocalActorResolver, ProxyIdentityResolver, ResolverOptions};
use aktivi_oauth::handoff::NONCE_KEY;
use aktivi_oauth::request::RequestErrorKind;
use aktivi_oauth::types::CallbackParams;
use aktivi_oauth::{
    AuthorizationFlowManager, CallbackRoute, FlowState, HandoffGuard, Location, OAuthConfig,
    OAuthError, PreAuthRoute, RouteOutcome,
};
use serde_json::json;
use tokio::sync::Mutex;
use url::Url;

const DID: &str = "did:plc:abc123";
const ISSUER: &str = "https://auth.example";

#[derive(Clone, Default)]
struct MockClient {
    queue: Arc<Mutex<VecDeque<http::Response<Vec<u8>>>>>,
    log: Arc<Mutex<Vec<http::Request<Vec<u8>>>>>,
}

struct Sent {
    method: http::Method,
    url: String,
    dpop: bool,
    body: String,
}

impl MockClient {
    async fn push(&self, resp: http::Response<Vec<u8>>) {
        self.queue.lock().await.push_back(resp);
    }

    async fn sent(&self) -> Vec<Sent> {
        self.log
            .lock()
            .await
            .iter()
            .map(|r| Sent {
                method: r.method().clone(),
                url: r.uri().to_string(),
                dpop: r.headers().contains_key("DPoP"),
                body: String::from_utf8_lossy(r.body()).into_owned(),
            })
            .collect()
    }

    async fn posts(&self) -> Vec<Sent> {
        self.sent()
            .await
            .into_iter()
            .filter(|s| s.method == http::Method::POST)
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

fn did_doc() -> serde_json::Value {
    json!({
        "@context": ["https://www.w3.org/ns/did/v1"],
        "id": DID,
        "alsoKnownAs": ["at://alice.example"],
        "verificationMethod": [],
        "service": [{
            "id": "#atproto_pds",
            "type": "AtprotoPersonalDataServer",
            "serviceEndpoint": "https://pds.example"
        }]
    })
}

fn protected_resource() -> serde_json::Value {
    json!({
        "resource": "https://relay.local",
        "authorization_servers": [ISSUER],
    })
}

fn auth_server(par: bool) -> serde_json::Value {
    let mut metadata = json!({
        "issuer": ISSUER,
        "authorization_endpoint": "https://auth.example/oauth/authorize",
        "token_endpoint": "https://auth.example/oauth/token",
        "scopes_supported": ["atproto", "transition:generic"],
        "response_types_supported": ["code"],
        "code_challenge_methods_supported": ["S256"],
        "dpop_signing_alg_values_supported": ["ES256"],
        "authorization_response_iss_parameter_supported": true,
        "protected_resources": ["https://relay.local"],
    });
    if par {
        metadata["pushed_authorization_request_endpoint"] = json!("https://auth.example/oauth/par");
        metadata["require_pushed_authorization_requests"] = json!(true);
    }
    metadata
}

fn token_response(sub: &str, expires_in: i64) -> serde_json::Value {
    json!({
        "access_token": "at-1",
        "token_type": "DPoP",
        "expires_in": expires_in,
        "refresh_token": "rt-1",
        "scope": "atproto transition:generic",
        "sub": sub,
    })
}

#[derive(Default)]
struct TestLocation {
    current: std::sync::Mutex<Option<Url>>,
    replaced: std::sync::Mutex<Vec<Url>>,
    assigned: std::sync::Mutex<Vec<Url>>,
}

impl TestLocation {
    fn at(url: &str) -> Self {
        let location = Self::default();
        *location.current.lock().unwrap() = Some(Url::parse(url).unwrap());
        location
    }

    fn replaced(&self) -> Vec<String> {
        self.replaced.lock().unwrap().iter().map(|u| u.to_string()).collect()
    }

    fn assigned(&self) -> Vec<Url> {
        self.assigned.lock().unwrap().clone()
    }
}

impl Location for TestLocation {
    fn current(&self) -> Url {
        self.current.lock().unwrap().clone().expect("location set")
    }

    fn replace(&self, url: &Url) {
        *self.current.lock().unwrap() = Some(url.clone());
        self.replaced.lock().unwrap().push(url.clone());
    }

    fn assign(&self, url: &Url) {
        self.assigned.lock().unwrap().push(url.clone());
    }
}

struct Harness {
    client: MockClient,
    durable: MemoryStore,
    page: MemoryStore,
    config: OAuthConfig,
    flow: Arc<AuthorizationFlowManager<MockClient>>,
}

impl Harness {
    fn new() -> Self {
        Self::with_stores(MockClient::default(), MemoryStore::new())
    }

    fn with_stores(client: MockClient, durable: MemoryStore) -> Self {
        let mut config = OAuthConfig::for_origin("https://app.example").unwrap();
        config.proxy_url = Url::parse("https://relay.local").unwrap();
        let options = ResolverOptions::new()
            .plc_directory(Url::parse("https://plc.test/").unwrap())
            .doh_url(Url::parse("https://doh.test/dns-query").unwrap())
            .handle_order(vec![HandleStep::DohTxt, HandleStep::HttpsWellKnown])
            .timeout(Duration::from_secs(2))
            .build();
        let resolver = ProxyIdentityResolver::new(
            LocalActorResolver::from_options(client.clone(), &options),
            config.proxy_url.clone(),
        );
        let flow = Arc::new(
            AuthorizationFlowManager::new(
                config.clone(),
                client.clone(),
                Arc::new(resolver),
                Arc::new(durable.clone()),
            )
            .unwrap(),
        );
        Self {
            client,
            durable,
            page: MemoryStore::new(),
            config,
            flow,
        }
    }

    async fn queue_discovery(&self, par: bool) {
        self.client.push(json(200, did_doc())).await;
        self.client.push(json(200, protected_resource())).await;
        self.client.push(json(200, auth_server(par))).await;
    }

    /// Start sign-in for the test DID and return the `state` it was sent with.
    async fn start(&self) -> String {
        self.queue_discovery(false).await;
        let url = self
            .flow
            .start(&ActorIdentifier::new(DID).unwrap())
            .await
            .expect("authorization url");
        query(&url)["state"].clone()
    }

    fn guard(&self) -> Arc<HandoffGuard> {
        Arc::new(HandoffGuard::new(&self.config, Arc::new(self.page.clone())).unwrap())
    }
}

fn query(url: &Url) -> HashMap<String, String> {
    url.query_pairs().into_owned().collect()
}

fn callback(state: &str, code: &str, iss: Option<&str>) -> CallbackParams {
    CallbackParams {
        code: Some(code.into()),
        state: Some(state.into()),
        iss: iss.map(Into::into),
        ..Default::default()
    }
}

#[tokio::test]
async fn authorization_url_carries_required_parameters() {
    let h = Harness::new();
    h.queue_discovery(false).await;
    let url = h
        .flow
        .start(&ActorIdentifier::new(DID).unwrap())
        .await
        .unwrap();

    assert_eq!(h.flow.state(), FlowState::AwaitingRedirect);
    assert_eq!(url.host_str(), Some("auth.example"));
    assert_eq!(url.path(), "/oauth/authorize");
    let q = query(&url);
    assert_eq!(q["client_id"], "https://app.example/client-metadata.json");
    assert_eq!(q["redirect_uri"], "https://app.example/oauth/callback");
    assert_eq!(q["scope"], "atproto transition:generic");
    assert_eq!(q["response_type"], "code");
    assert_eq!(q["response_mode"], "fragment");
    assert_eq!(q["code_challenge_method"], "S256");
    assert_eq!(q["code_challenge"].len(), 43);
    assert_eq!(q["login_hint"], DID);
    assert!(!q["state"].is_empty());

    let urls: Vec<String> = h.client.sent().await.into_iter().map(|s| s.url).collect();
    assert_eq!(
        urls,
        vec![
            "https://plc.test/did:plc:abc123",
            "https://relay.local/.well-known/oauth-protected-resource",
            "https://auth.example/.well-known/oauth-authorization-server",
        ]
    );
    let pending = format!("aktivi_oauth_request:{}", q["state"]);
    assert!(h.durable.get(&pending).await.unwrap().is_some());
}

#[tokio::test]
async fn pushed_authorization_request_when_advertised() {
    let h = Harness::new();
    h.queue_discovery(true).await;
    h.client
        .push(json(
            201,
            json!({"request_uri": "urn:ietf:params:oauth:request_uri:r1", "expires_in": 60}),
        ))
        .await;
    let url = h
        .flow
        .start(&ActorIdentifier::new(DID).unwrap())
        .await
        .unwrap();

    let q = query(&url);
    assert_eq!(q.len(), 2);
    assert_eq!(q["client_id"], "https://app.example/client-metadata.json");
    assert_eq!(q["request_uri"], "urn:ietf:params:oauth:request_uri:r1");

    let posts = h.client.posts().await;
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0].url, "https://auth.example/oauth/par");
    assert!(posts[0].dpop);
    assert!(posts[0].body.contains("code_challenge_method=S256"));
    assert!(posts[0].body.contains("scope=atproto+transition%3Ageneric"));
}

#[tokio::test]
async fn callback_exchanges_code_and_persists_session() {
    let h = Harness::new();
    let state = h.start().await;
    h.client.push(json(200, token_response(DID, 3600))).await;

    let session = h
        .flow
        .callback(callback(&state, "c1", Some(ISSUER)))
        .await
        .expect("session");
    assert_eq!(session.did.as_str(), DID);
    assert_eq!(session.access_token, "at-1");
    assert_eq!(session.pds.as_str(), "https://relay.local/");
    assert_eq!(h.flow.state(), FlowState::Authorized);

    let posts = h.client.posts().await;
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0].url, "https://auth.example/oauth/token");
    assert!(posts[0].dpop);
    assert!(posts[0].body.contains("grant_type=authorization_code"));
    assert!(posts[0].body.contains("code=c1"));
    assert!(posts[0].body.contains("code_verifier="));

    assert_eq!(h.durable.get("aktivi_user_did").await.unwrap(), Some(json!(DID)));
    assert!(
        h.durable
            .get("aktivi_session:did:plc:abc123")
            .await
            .unwrap()
            .is_some()
    );
    let restored = h
        .flow
        .sessions()
        .restore(&Did::new(DID).unwrap(), false)
        .await
        .expect("restorable");
    assert_eq!(restored.access_token, "at-1");
}

#[tokio::test]
async fn second_callback_is_already_consumed() {
    let h = Harness::new();
    let state = h.start().await;
    h.client.push(json(200, token_response(DID, 3600))).await;

    let params = callback(&state, "c1", Some(ISSUER));
    h.flow.callback(params.clone()).await.unwrap();
    let again = h.flow.callback(params).await;

    assert!(matches!(again, Err(OAuthError::AlreadyConsumed)));
    assert_eq!(h.client.posts().await.len(), 1);
    assert_eq!(h.flow.state(), FlowState::Authorized);
}

#[tokio::test]
async fn concurrent_callbacks_exchange_once() {
    let h = Harness::new();
    let state = h.start().await;
    h.client.push(json(200, token_response(DID, 3600))).await;

    let params = callback(&state, "c1", Some(ISSUER));
    let (a, b) = tokio::join!(
        h.flow.callback(params.clone()),
        h.flow.callback(params.clone())
    );
    let outcomes = [a.is_ok(), b.is_ok()];
    assert_eq!(outcomes.iter().filter(|ok| **ok).count(), 1);
    assert!(matches!(
        if a.is_ok() { b } else { a },
        Err(OAuthError::AlreadyConsumed)
    ));
    assert_eq!(h.client.posts().await.len(), 1);
}

#[tokio::test]
async fn callback_finishes_on_fresh_manager() {
    let first = Harness::new();
    let state = first.start().await;

    // full page load: new manager, same durable store
    let second = Harness::with_stores(first.client.clone(), first.durable.clone());
    second.client.push(json(200, token_response(DID, 3600))).await;
    let session = second
        .flow
        .callback(callback(&state, "c1", Some(ISSUER)))
        .await
        .unwrap();
    assert_eq!(session.did.as_str(), DID);
}

#[tokio::test]
async fn expired_request_is_not_exchanged() {
    let h = Harness::new();
    let state = h.start().await;
    let key = format!("aktivi_oauth_request:{state}");
    let mut entry = h.durable.get(&key).await.unwrap().unwrap();
    entry["request"]["createdAt"] = json!(chrono::Utc::now() - chrono::TimeDelta::hours(2));
    h.durable.set(&key, entry).await.unwrap();

    let res = h.flow.callback(callback(&state, "c1", Some(ISSUER))).await;
    assert!(matches!(res, Err(OAuthError::RequestExpired)));
    assert_eq!(h.flow.state(), FlowState::Failed);
    assert!(h.client.posts().await.is_empty());
    assert!(h.durable.get(&key).await.unwrap().is_none());
}

#[tokio::test]
async fn manager_rejects_invalid_config() {
    let mut config = OAuthConfig::for_origin("https://app.example").unwrap();
    config.scope = "transition:generic".into();
    let client = MockClient::default();
    let resolver = LocalActorResolver::from_options(client.clone(), &ResolverOptions::default());
    let res = AuthorizationFlowManager::new(
        config,
        client,
        Arc::new(resolver),
        Arc::new(MemoryStore::new()),
    );
    assert!(matches!(res, Err(OAuthError::Config(_))));
}

#[tokio::test]
async fn unknown_state_is_rejected() {
    let h = Harness::new();
    h.start().await;
    let res = h.flow.callback(callback("forged", "c1", Some(ISSUER))).await;
    assert!(matches!(res, Err(OAuthError::StateMismatch)));
    assert_eq!(h.flow.state(), FlowState::Failed);
    assert!(h.client.posts().await.is_empty());
}

#[tokio::test]
async fn issuer_mismatch_fails_without_exchange() {
    let h = Harness::new();
    let state = h.start().await;
    let res = h
        .flow
        .callback(callback(&state, "c1", Some("https://evil.example")))
        .await;
    assert!(matches!(res, Err(OAuthError::IssuerMismatch { .. })));
    assert!(h.client.posts().await.is_empty());
    assert!(h.durable.get("aktivi_user_did").await.unwrap().is_none());
}

#[tokio::test]
async fn missing_iss_when_advertised() {
    let h = Harness::new();
    let state = h.start().await;
    let res = h.flow.callback(callback(&state, "c1", None)).await;
    assert!(matches!(res, Err(OAuthError::MissingParameter("iss"))));
}

#[tokio::test]
async fn token_for_other_account_is_rejected() {
    let h = Harness::new();
    let state = h.start().await;
    h.client
        .push(json(200, token_response("did:plc:someoneelse", 3600)))
        .await;
    let res = h.flow.callback(callback(&state, "c1", Some(ISSUER))).await;
    match res {
        Err(OAuthError::Exchange(e)) => {
            assert!(matches!(e.kind(), RequestErrorKind::TokenVerification))
        }
        other => panic!("expected token verification failure, got {other:?}"),
    }
    assert_eq!(h.flow.state(), FlowState::Failed);
    assert!(h.durable.get("aktivi_user_did").await.unwrap().is_none());
}

#[tokio::test]
async fn error_response_is_denied_and_discarded() {
    let h = Harness::new();
    let state = h.start().await;
    let params = CallbackParams {
        state: Some(state.as_str().into()),
        error: Some("access_denied".into()),
        error_description: Some("user declined".into()),
        ..Default::default()
    };
    let res = h.flow.callback(params).await;
    match res {
        Err(e @ OAuthError::AuthorizationDenied { .. }) => {
            assert!(e.is_terminal());
            assert_eq!(e.to_string(), "authorization denied: access_denied (user declined)");
        }
        other => panic!("expected denial, got {other:?}"),
    }
    let pending = format!("aktivi_oauth_request:{state}");
    assert!(h.durable.get(&pending).await.unwrap().is_none());
}

#[tokio::test]
async fn stale_session_restores_only_when_allowed() {
    let h = Harness::new();
    let state = h.start().await;
    h.client.push(json(200, token_response(DID, -60))).await;
    h.flow
        .callback(callback(&state, "c1", Some(ISSUER)))
        .await
        .unwrap();

    let sessions = h.flow.sessions();
    assert!(sessions.restore_active(false).await.is_none());
    let stale = sessions.restore_active(true).await.expect("stale session");
    assert!(stale.allow_stale);
    assert!(stale.is_stale());

    sessions.clear().await.unwrap();
    assert!(sessions.restore_active(true).await.is_none());
    assert!(h.durable.get("aktivi_user_did").await.unwrap().is_none());
}

#[tokio::test]
async fn callback_route_scrubs_and_runs_once() {
    let h = Harness::new();
    let state = h.start().await;
    h.client.push(json(200, token_response(DID, 3600))).await;

    let location = TestLocation::at(&format!(
        "https://app.example/oauth/callback#state={state}&iss=https%3A%2F%2Fauth.example&code=c1"
    ));
    let route = CallbackRoute::new(h.flow.clone());
    let first = route.handle(&location).await;
    let second = route.handle(&location).await;

    assert_eq!(
        first,
        RouteOutcome::Navigated(Url::parse("https://app.example/").unwrap())
    );
    assert_eq!(second, RouteOutcome::AlreadyHandled);
    assert_eq!(location.replaced(), vec!["https://app.example/oauth/callback"]);
    assert_eq!(location.assigned().len(), 1);
    assert_eq!(h.client.posts().await.len(), 1);
}

#[tokio::test]
async fn callback_route_failure_links_to_login() {
    let h = Harness::new();
    h.start().await;
    let location =
        TestLocation::at("https://app.example/oauth/callback#state=forged&code=c1&iss=x");
    let outcome = CallbackRoute::new(h.flow.clone()).handle(&location).await;
    match outcome {
        RouteOutcome::Failed(screen) => {
            assert_eq!(screen.restart_href, "/login");
            assert_eq!(screen.message, "unknown authorization state");
        }
        other => panic!("expected failure screen, got {other:?}"),
    }
    assert!(location.assigned().is_empty());
    assert_eq!(location.replaced(), vec!["https://app.example/oauth/callback"]);
}

#[tokio::test]
async fn callback_route_ignores_query_parameters() {
    let h = Harness::new();
    let state = h.start().await;
    let location = TestLocation::at(&format!(
        "https://app.example/oauth/callback?state={state}&code=c1&iss=https%3A%2F%2Fauth.example"
    ));
    let outcome = CallbackRoute::new(h.flow.clone()).handle(&location).await;
    match outcome {
        RouteOutcome::Failed(screen) => assert_eq!(screen.message, "missing state parameter"),
        other => panic!("expected failure screen, got {other:?}"),
    }
    assert!(h.client.posts().await.is_empty());
    assert_eq!(location.replaced(), vec!["https://app.example/oauth/callback"]);
}

#[tokio::test]
async fn pre_auth_without_stored_nonce() {
    let h = Harness::new();
    let location = TestLocation::at("https://app.example/oauth/pre?hint=alice.example&nonce=N");
    let outcome = PreAuthRoute::new(h.flow.clone(), h.guard())
        .handle(&location)
        .await;
    match outcome {
        RouteOutcome::Failed(screen) => {
            assert_eq!(screen.message, "no stored nonce for this browser session")
        }
        other => panic!("expected failure screen, got {other:?}"),
    }
    assert!(location.assigned().is_empty());
    assert!(h.client.sent().await.is_empty());
    assert_eq!(h.flow.state(), FlowState::Idle);
}

#[tokio::test]
async fn nonce_is_single_use_after_match() {
    let h = Harness::new();
    let guard = h.guard();
    let broker = guard.begin().await.unwrap();
    let nonce = query(&broker)["nonce"].clone();

    let actor = guard.verify(Some("alice.example"), Some(&nonce)).await.unwrap();
    assert_eq!(actor.as_str(), "alice.example");
    assert!(h.page.get(NONCE_KEY).await.unwrap().is_none());

    let replay = guard.verify(Some("alice.example"), Some(&nonce)).await;
    assert!(matches!(replay, Err(OAuthError::NoStoredNonce)));
}

#[tokio::test]
async fn nonce_is_single_use_after_mismatch() {
    let h = Harness::new();
    let guard = h.guard();
    let broker = guard.begin().await.unwrap();
    let nonce = query(&broker)["nonce"].clone();

    let wrong = guard.verify(Some("alice.example"), Some("forged")).await;
    assert!(matches!(wrong, Err(OAuthError::NonceMismatch)));
    assert!(h.page.get(NONCE_KEY).await.unwrap().is_none());

    let late = guard.verify(Some("alice.example"), Some(&nonce)).await;
    assert!(matches!(late, Err(OAuthError::NoStoredNonce)));
}

#[tokio::test]
async fn pre_auth_route_starts_sign_in_once() {
    let h = Harness::new();
    let guard = h.guard();
    let broker = guard.begin().await.unwrap();
    let nonce = query(&broker)["nonce"].clone();

    h.client
        .push(json(
            200,
            json!({"Status": 0, "Answer": [{"name": "_atproto.alice.example", "type": 16, "TTL": 300, "data": "\"did=did:plc:abc123\""}]}),
        ))
        .await;
    h.queue_discovery(false).await;

    let location = TestLocation::at(&format!(
        "https://app.example/oauth/pre?hint=alice.example&nonce={nonce}"
    ));
    let route = PreAuthRoute::new(h.flow.clone(), guard);
    let first = route.handle(&location).await;
    let second = route.handle(&location).await;

    let RouteOutcome::Navigated(url) = first else {
        panic!("expected navigation, got {first:?}");
    };
    assert_eq!(url.host_str(), Some("auth.example"));
    assert_eq!(query(&url)["login_hint"], "alice.example");
    assert_eq!(second, RouteOutcome::AlreadyHandled);
    assert_eq!(location.assigned(), vec![url]);
    assert_eq!(h.flow.state(), FlowState::AwaitingRedirect);
}

#[tokio::test]
async fn new_attempt_allowed_after_sign_in() {
    let h = Harness::new();
    let state = h.start().await;
    h.client.push(json(200, token_response(DID, 3600))).await;
    h.flow
        .callback(callback(&state, "c1", Some(ISSUER)))
        .await
        .unwrap();

    h.queue_discovery(false).await;
    assert!(
        h.flow
            .start(&ActorIdentifier::new(DID).unwrap())
            .await
            .is_ok()
    );
    assert_eq!(h.flow.state(), FlowState::AwaitingRedirect);
}
