use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering;
use std::time::Duration;
use url::Url;
use wiremock::Mock;
use wiremock::MockServer;
use wiremock::ResponseTemplate;
use wiremock::matchers::header;
use wiremock::matchers::method;
use wiremock::matchers::path;

use plaza_core::ApiError;
use plaza_core::CacheStore;
use plaza_core::ClientConfig;
use plaza_core::NetworkOracle;
use plaza_core::OnlineFlag;
use plaza_core::PlazaClient;
use plaza_core::PushTransport;
use plaza_core::SessionEvent;
use plaza_core::SessionManager;
use plaza_core::SessionProvider;
use plaza_core::live::LiveFrames;
use plaza_protocol::PageRequest;
use plaza_protocol::Topic;
use plaza_protocol::models::EventDraft;
use plaza_protocol::models::OrderStatus;

struct NoPush;

#[async_trait]
impl PushTransport for NoPush {
    async fn open(&self, _topic: &Topic) -> Result<LiveFrames, ApiError> {
        Ok(Box::pin(futures::stream::pending()))
    }
}

/// Token provider with a scripted rotation: refresh swaps the current token
/// for the next queued one, or fails once the queue runs dry.
struct ScriptedProvider {
    current: Mutex<Option<String>>,
    next: Mutex<Vec<String>>,
    refreshes: AtomicU32,
    clears: AtomicU32,
}

impl ScriptedProvider {
    fn new(current: &str, next: Vec<&str>) -> Arc<Self> {
        Arc::new(Self {
            current: Mutex::new(Some(current.to_string())),
            next: Mutex::new(next.into_iter().map(str::to_string).collect()),
            refreshes: AtomicU32::new(0),
            clears: AtomicU32::new(0),
        })
    }
}

#[async_trait]
impl SessionProvider for ScriptedProvider {
    async fn token(&self) -> Option<String> {
        self.current.lock().unwrap().clone()
    }

    async fn refresh(&self) -> Result<String, ApiError> {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        match self.next.lock().unwrap().pop() {
            Some(token) => {
                *self.current.lock().unwrap() = Some(token.clone());
                Ok(token)
            }
            None => Err(ApiError::Unauthenticated),
        }
    }

    async fn clear(&self) {
        self.clears.fetch_add(1, Ordering::SeqCst);
        *self.current.lock().unwrap() = None;
    }
}

fn client_for(server: &MockServer, oracle: Arc<dyn NetworkOracle>) -> PlazaClient {
    let provider = ScriptedProvider::new("token-1", Vec::new());
    client_with_provider(server, oracle, provider)
}

fn client_with_provider(
    server: &MockServer,
    oracle: Arc<dyn NetworkOracle>,
    provider: Arc<ScriptedProvider>,
) -> PlazaClient {
    let config = ClientConfig::new(Url::parse(&server.uri()).expect("server url"));
    let session = Arc::new(SessionManager::new(provider));
    PlazaClient::with_push_transport(
        config,
        session,
        CacheStore::in_memory(),
        oracle,
        Arc::new(NoPush),
    )
    .expect("client")
}

fn event_json(id: &str, title: &str) -> serde_json::Value {
    json!({
        "id": id,
        "title": title,
        "description": "an evening of things",
        "category": "music",
        "venue": "town hall",
        "startsAt": "2026-09-01T19:00:00Z",
        "priceCents": 2500,
        "currency": "EUR",
        "organizerId": "org-1",
        "status": "scheduled",
        "capacity": 120,
    })
}

fn event_draft(title: &str) -> EventDraft {
    EventDraft {
        title: title.to_string(),
        description: "an evening of things".to_string(),
        category: "music".to_string(),
        venue: "town hall".to_string(),
        starts_at: "2026-09-01T19:00:00Z".parse().expect("timestamp"),
        price_cents: 2500,
        currency: "EUR".to_string(),
        capacity: Some(120),
    }
}

fn entity(data: serde_json::Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "success": true, "data": data }))
}

fn listing(data: Vec<serde_json::Value>) -> ResponseTemplate {
    let count = data.len();
    ResponseTemplate::new(200).set_body_json(json!({
        "success": true,
        "data": data,
        "metadata": { "page": 1, "limit": 20, "totalCount": count, "hasMore": false },
    }))
}

#[tokio::test]
async fn list_fetch_seeds_single_item_reads() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/events"))
        .respond_with(listing(vec![
            event_json("41", "Quartet"),
            event_json("42", "Open mic"),
        ]))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, Arc::new(plaza_core::AlwaysOnline));
    let page = client
        .events()
        .list(None, PageRequest::default())
        .await
        .expect("list");
    assert_eq!(page.value.items.len(), 2);
    assert!(!page.stale);

    // Both follow-up reads are cache hits; no /events/{id} mock exists, so a
    // miss would fail the call.
    let first = client.events().get("41").await.expect("cached event");
    assert_eq!(first.value.title, "Quartet");
    let second = client.events().get("42").await.expect("cached event");
    assert_eq!(second.value.title, "Open mic");
}

#[tokio::test]
async fn mutation_overwrites_the_cached_entity() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/events/42"))
        .respond_with(entity(event_json("42", "Before")))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/events/42"))
        .respond_with(entity(event_json("42", "After")))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, Arc::new(plaza_core::AlwaysOnline));
    let before = client.events().get("42").await.expect("event");
    assert_eq!(before.value.title, "Before");

    let updated = client
        .events()
        .update("42", &event_draft("After"))
        .await
        .expect("update");
    assert_eq!(updated.title, "After");

    // A read after the mutation must never see the pre-mutation snapshot;
    // the authoritative response replaced it (the GET mock allows one call).
    let after = client.events().get("42").await.expect("event");
    assert_eq!(after.value.title, "After");
}

#[tokio::test]
async fn offline_reads_serve_the_cached_copy() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/events/42"))
        .respond_with(entity(event_json("42", "Open mic")))
        .expect(1)
        .mount(&server)
        .await;

    let oracle = Arc::new(OnlineFlag::new(true));
    let client = client_for(&server, oracle.clone());
    client.events().get("42").await.expect("warm the cache");

    oracle.set_online(false);
    let cached = client.events().get("42").await.expect("offline read");
    assert_eq!(cached.value.title, "Open mic");
}

#[tokio::test]
async fn offline_read_without_cache_fails_unavailable() {
    let server = MockServer::start().await;
    let client = client_for(&server, Arc::new(OnlineFlag::new(false)));
    let err = client.events().get("99").await.expect_err("no cached copy");
    assert!(matches!(err, ApiError::Unavailable));
}

#[tokio::test]
async fn duplicate_status_transition_surfaces_conflict() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/orders/7/status"))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({
            "success": false,
            "message": "order already confirmed",
        })))
        .mount(&server)
        .await;

    let client = client_for(&server, Arc::new(plaza_core::AlwaysOnline));
    let err = client
        .orders()
        .set_status("7", OrderStatus::Confirmed)
        .await
        .expect_err("conflict");
    match err {
        ApiError::Conflict(message) => assert_eq!(message, "order already confirmed"),
        other => panic!("expected conflict, got {other:?}"),
    }
}

#[tokio::test]
async fn server_error_without_cache_propagates() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/orders/7"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "success": false,
            "message": "boom",
        })))
        .mount(&server)
        .await;

    let client = client_for(&server, Arc::new(plaza_core::AlwaysOnline));
    let err = client.orders().get("7").await.expect_err("server error");
    assert!(matches!(err, ApiError::Server { status: 500, .. }));
}

#[tokio::test]
async fn notification_shade_degrades_to_empty_on_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/notifications"))
        .respond_with(ResponseTemplate::new(503).set_body_json(json!({
            "success": false,
            "message": "maintenance",
        })))
        .mount(&server)
        .await;

    let client = client_for(&server, Arc::new(plaza_core::AlwaysOnline));
    let page = client
        .notifications()
        .list(PageRequest::default())
        .await
        .expect("degraded list");
    assert!(page.value.items.is_empty());
    assert!(page.stale);
}

#[tokio::test]
async fn search_degrades_to_empty_while_offline() {
    let server = MockServer::start().await;
    let client = client_for(&server, Arc::new(OnlineFlag::new(false)));
    let page = client
        .discovery()
        .search("jazz tonight", PageRequest::default())
        .await
        .expect("degraded search");
    assert!(page.value.items.is_empty());
    assert!(page.stale);
}

#[tokio::test]
async fn expired_token_refreshes_once_and_retries() {
    let server = MockServer::start().await;
    let profile = json!({
        "id": "u1",
        "displayName": "Maya",
        "email": "maya@example.com",
        "verified": true,
        "joinedAt": "2025-03-01T08:00:00Z",
    });
    Mock::given(method("GET"))
        .and(path("/users/me"))
        .and(header("authorization", "Bearer token-1"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "success": false,
            "message": "token expired",
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/users/me"))
        .and(header("authorization", "Bearer token-2"))
        .respond_with(entity(profile))
        .expect(1)
        .mount(&server)
        .await;

    let provider = ScriptedProvider::new("token-1", vec!["token-2"]);
    let client = client_with_provider(&server, Arc::new(plaza_core::AlwaysOnline), provider.clone());

    let me = client.users().me().await.expect("profile after refresh");
    assert_eq!(me.value.display_name, "Maya");
    assert_eq!(provider.refreshes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn failed_refresh_clears_session_and_signs_out_once() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users/me"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "success": false,
            "message": "token expired",
        })))
        .mount(&server)
        .await;

    let provider = ScriptedProvider::new("token-1", Vec::new());
    let client = client_with_provider(&server, Arc::new(plaza_core::AlwaysOnline), provider.clone());
    let mut events = client.session().subscribe();

    let err = client.users().me().await.expect_err("unauthenticated");
    assert!(matches!(err, ApiError::Unauthenticated));
    assert_eq!(provider.clears.load(Ordering::SeqCst), 1);
    assert_eq!(events.recv().await, Ok(SessionEvent::SignedOut));
    assert_eq!(
        events.try_recv(),
        Err(tokio::sync::broadcast::error::TryRecvError::Empty)
    );
}

#[tokio::test]
async fn abandoned_mutation_still_writes_through() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/events/42/cancel"))
        .respond_with(
            entity(event_json("42", "Open mic")).set_delay(Duration::from_millis(150)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let oracle = Arc::new(OnlineFlag::new(true));
    let client = client_for(&server, oracle.clone());

    // The caller walks away before the response lands.
    let abandoned =
        tokio::time::timeout(Duration::from_millis(20), client.events().cancel("42")).await;
    assert!(abandoned.is_err(), "caller abandoned the mutation");

    // The detached task finishes the request and the write-through.
    tokio::time::sleep(Duration::from_millis(400)).await;
    oracle.set_online(false);
    let cached = client.events().get("42").await.expect("cached mutation result");
    assert_eq!(cached.value.title, "Open mic");
}

#[tokio::test]
async fn avatar_upload_returns_the_updated_profile() {
    let server = MockServer::start().await;
    let profile = json!({
        "id": "u1",
        "displayName": "Maya",
        "email": "maya@example.com",
        "verified": true,
        "joinedAt": "2025-03-01T08:00:00Z",
        "avatarUrl": "https://cdn.example.com/u1.png",
    });
    Mock::given(method("POST"))
        .and(path("/users/me/avatar"))
        .respond_with(entity(profile))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, Arc::new(plaza_core::AlwaysOnline));
    let updated = client
        .users()
        .upload_avatar("me.png", "image/png", bytes::Bytes::from_static(b"png"))
        .await
        .expect("upload");
    assert_eq!(updated.avatar_url.as_deref(), Some("https://cdn.example.com/u1.png"));
}
