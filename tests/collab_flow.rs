use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use loro::{ExportMode, LoroDoc, LoroList, LoroMap, LoroText};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

use cosync_doc::clients::identity_client::UserIdentity;
use cosync_doc::config::Config;
use cosync_doc::models::lorodoc::loro_to_canonical;
use cosync_doc::models::{CanonicalDoc, UpdateMessage};
use cosync_doc::state::AppState;
use cosync_doc::ws::connsession::ConnectionSession;
use cosync_doc::ws::docsession::SessionState;
use cosync_doc::ws::gateway::{self, RejectReason};
use cosync_doc::ws::{coordinator, presence};

// ---------------------------------------------------------------------------
// Stub upstream: identity provider + document store + access check
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, PartialEq)]
enum AccessMode {
    Allow,
    Deny,
    Error,
    Hang,
}

#[derive(Clone, Copy, PartialEq)]
enum LoadMode {
    FromStore,
    Error,
}

struct UpstreamState {
    access_mode: Mutex<AccessMode>,
    load_mode: Mutex<LoadMode>,
    stored: Mutex<Option<CanonicalDoc>>,
    saves: Mutex<Vec<CanonicalDoc>>,
    load_calls: AtomicU32,
    access_calls: AtomicU32,
}

impl UpstreamState {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            access_mode: Mutex::new(AccessMode::Allow),
            load_mode: Mutex::new(LoadMode::FromStore),
            stored: Mutex::new(None),
            saves: Mutex::new(Vec::new()),
            load_calls: AtomicU32::new(0),
            access_calls: AtomicU32::new(0),
        })
    }

    fn set_access(&self, mode: AccessMode) {
        *self.access_mode.lock().unwrap() = mode;
    }

    fn set_load(&self, mode: LoadMode) {
        *self.load_mode.lock().unwrap() = mode;
    }

    fn save_count(&self) -> usize {
        self.saves.lock().unwrap().len()
    }

    fn last_save(&self) -> Option<CanonicalDoc> {
        self.saves.lock().unwrap().last().cloned()
    }
}

async fn verify_user(State(_): State<Arc<UpstreamState>>, headers: HeaderMap) -> (StatusCode, Json<Value>) {
    let authorized = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(|v| v == "Bearer valid-token")
        .unwrap_or(false);

    if authorized {
        (
            StatusCode::OK,
            Json(json!({
                "id": "user-1",
                "email": "alice@example.com",
                "name": "Alice",
                "avatarUrl": null,
            })),
        )
    } else {
        (StatusCode::UNAUTHORIZED, Json(json!({"error": "invalid token"})))
    }
}

async fn access_check(
    State(upstream): State<Arc<UpstreamState>>,
    headers: HeaderMap,
) -> (StatusCode, Json<Value>) {
    upstream.access_calls.fetch_add(1, Ordering::SeqCst);

    if headers.get("x-server-secret").is_none() {
        return (StatusCode::UNAUTHORIZED, Json(json!({"error": "no secret"})));
    }

    let mode = *upstream.access_mode.lock().unwrap();
    match mode {
        AccessMode::Allow => (
            StatusCode::OK,
            Json(json!({"organizationId": "org-1", "hasAccess": true})),
        ),
        AccessMode::Deny => (
            StatusCode::OK,
            Json(json!({"organizationId": "org-1", "hasAccess": false})),
        ),
        AccessMode::Error => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": "boom"})),
        ),
        AccessMode::Hang => {
            tokio::time::sleep(Duration::from_secs(5)).await;
            (
                StatusCode::OK,
                Json(json!({"organizationId": "org-1", "hasAccess": true})),
            )
        }
    }
}

async fn load_content(
    State(upstream): State<Arc<UpstreamState>>,
    Path(_doc_id): Path<String>,
) -> (StatusCode, Json<Value>) {
    upstream.load_calls.fetch_add(1, Ordering::SeqCst);

    if *upstream.load_mode.lock().unwrap() == LoadMode::Error {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": "store outage"})),
        );
    }

    match upstream.stored.lock().unwrap().clone() {
        Some(doc) => (StatusCode::OK, Json(json!({ "content": doc }))),
        None => (StatusCode::NOT_FOUND, Json(json!({"error": "not found"}))),
    }
}

async fn save_content(
    State(upstream): State<Arc<UpstreamState>>,
    Path(_doc_id): Path<String>,
    Json(body): Json<Value>,
) -> StatusCode {
    let content: CanonicalDoc =
        serde_json::from_value(body["content"].clone()).expect("save body must be canonical");
    *upstream.stored.lock().unwrap() = Some(content.clone());
    upstream.saves.lock().unwrap().push(content);
    StatusCode::OK
}

async fn spawn_upstream(upstream: Arc<UpstreamState>) -> String {
    let app = Router::new()
        .route("/auth/user", get(verify_user))
        .route("/access-check", post(access_check))
        .route("/documents/:id/content", get(load_content))
        .route("/documents/:id/collaboration", post(save_content))
        .with_state(upstream);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{}", addr)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn test_config(base_url: &str, debounce_ms: u64, max_wait_ms: u64) -> Config {
    Config {
        api_base_url: base_url.to_string(),
        identity_base_url: format!("{}/auth", base_url),
        server_secret: Some("test-secret".to_string()),
        save_debounce_ms: debounce_ms,
        save_max_wait_ms: max_wait_ms,
        request_timeout_ms: 1_000,
        ..Config::default()
    }
}

fn test_conn(doc_id: &str, user_id: &str) -> ConnectionSession {
    ConnectionSession {
        conn_id: Uuid::new_v4(),
        user: UserIdentity {
            id: user_id.to_string(),
            email: Some(format!("{}@example.com", user_id)),
            name: Some(user_id.to_string()),
            avatar_url: None,
        },
        org_id: "org-1".to_string(),
        doc_id: doc_id.to_string(),
        can_write: true,
    }
}

/// Append a paragraph containing `text` to a client replica and export the
/// resulting update bytes.
fn append_paragraph(client: &LoroDoc, index: usize, text: &str) -> Vec<u8> {
    let content = client.get_movable_list("content");
    let node = content.insert_container(index, LoroMap::new()).unwrap();
    node.insert("type", "paragraph").unwrap();
    let children = node
        .get_or_create_container("content", LoroList::new())
        .unwrap();
    let text_node = children.insert_container(0, LoroMap::new()).unwrap();
    text_node.insert("type", "text").unwrap();
    let text_container = text_node
        .get_or_create_container("text", LoroText::new())
        .unwrap();
    text_container.insert(0, text).unwrap();
    client.commit();
    client.export(ExportMode::all_updates()).unwrap()
}

async fn apply(
    state: &Arc<AppState>,
    session: &Arc<cosync_doc::ws::docsession::DocSession>,
    conn: &ConnectionSession,
    delta: Vec<u8>,
) {
    coordinator::apply_update(state, session, conn, UpdateMessage { delta })
        .await
        .expect("update must apply");
}

// ---------------------------------------------------------------------------
// Fail-closed authorization
// ---------------------------------------------------------------------------

#[tokio::test]
async fn denied_access_never_touches_document_state() {
    let upstream = UpstreamState::new();
    let base = spawn_upstream(upstream.clone()).await;
    let state = AppState::new(test_config(&base, 100, 1_000));

    let params: HashMap<String, String> =
        [("token".to_string(), "valid-token".to_string())].into();
    let headers = HeaderMap::new();

    upstream.set_access(AccessMode::Deny);
    let result = gateway::admit(&state, "doc-42", &params, &headers).await;
    assert_eq!(result.unwrap_err(), RejectReason::AccessDenied);

    upstream.set_access(AccessMode::Error);
    let result = gateway::admit(&state, "doc-42", &params, &headers).await;
    assert_eq!(result.unwrap_err(), RejectReason::AccessDenied);

    // No session was created and the store was never read or written
    assert!(state.sessions.read().await.is_empty());
    assert_eq!(upstream.load_calls.load(Ordering::SeqCst), 0);
    assert_eq!(upstream.save_count(), 0);
}

#[tokio::test]
async fn timed_out_access_check_is_denial() {
    let upstream = UpstreamState::new();
    let base = spawn_upstream(upstream.clone()).await;
    let mut config = test_config(&base, 100, 1_000);
    config.request_timeout_ms = 200;
    let state = AppState::new(config);

    upstream.set_access(AccessMode::Hang);
    let params: HashMap<String, String> =
        [("token".to_string(), "valid-token".to_string())].into();
    let result = gateway::admit(&state, "doc-42", &params, &HeaderMap::new()).await;

    assert_eq!(result.unwrap_err(), RejectReason::AccessDenied);
    assert_eq!(upstream.load_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn missing_or_invalid_token_is_rejected_before_any_io() {
    let upstream = UpstreamState::new();
    let base = spawn_upstream(upstream.clone()).await;
    let state = AppState::new(test_config(&base, 100, 1_000));

    let result = gateway::admit(&state, "doc-42", &HashMap::new(), &HeaderMap::new()).await;
    assert_eq!(result.unwrap_err(), RejectReason::AuthenticationRequired);

    let params: HashMap<String, String> =
        [("token".to_string(), "expired-token".to_string())].into();
    let result = gateway::admit(&state, "doc-42", &params, &HeaderMap::new()).await;
    assert_eq!(result.unwrap_err(), RejectReason::AuthenticationFailed);

    let params: HashMap<String, String> =
        [("token".to_string(), "valid-token".to_string())].into();
    let result = gateway::admit(&state, "not-a-doc-channel", &params, &HeaderMap::new()).await;
    assert_eq!(result.unwrap_err(), RejectReason::InvalidChannel);

    // Every rejection happened before the access check and the store
    assert_eq!(upstream.access_calls.load(Ordering::SeqCst), 0);
    assert_eq!(upstream.load_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn valid_token_and_grant_admit_the_connection() {
    let upstream = UpstreamState::new();
    let base = spawn_upstream(upstream.clone()).await;
    let state = AppState::new(test_config(&base, 100, 1_000));

    let params: HashMap<String, String> =
        [("token".to_string(), "valid-token".to_string())].into();
    let conn = gateway::admit(&state, "doc-42", &params, &HeaderMap::new())
        .await
        .expect("admission must succeed");

    assert_eq!(conn.doc_id, "42");
    assert_eq!(conn.user.id, "user-1");
    assert_eq!(conn.org_id, "org-1");
    assert!(conn.can_write);
}

// ---------------------------------------------------------------------------
// Load failure resilience
// ---------------------------------------------------------------------------

#[tokio::test]
async fn load_failure_degrades_to_empty_active_session() {
    let upstream = UpstreamState::new();
    let base = spawn_upstream(upstream.clone()).await;
    let state = AppState::new(test_config(&base, 100, 1_000));

    upstream.set_load(LoadMode::Error);

    let conn = test_conn("doc-load-fail", "user-1");
    let session = coordinator::attach(&state, &conn).await;

    assert_eq!(session.session_state().await, SessionState::Active);
    assert!(session.canonical().await.unwrap().is_empty());
    assert_eq!(upstream.load_calls.load(Ordering::SeqCst), 1);

    // Edits still schedule saves normally
    let client = LoroDoc::new();
    let delta = append_paragraph(&client, 0, "written during outage");
    apply(&state, &session, &conn, delta).await;

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(upstream.save_count(), 1);

    coordinator::detach(&state, &conn).await;
}

// ---------------------------------------------------------------------------
// Debounce coalescing
// ---------------------------------------------------------------------------

#[tokio::test]
async fn burst_of_edits_coalesces_into_one_save() {
    let upstream = UpstreamState::new();
    let base = spawn_upstream(upstream.clone()).await;
    let state = AppState::new(test_config(&base, 300, 5_000));

    let conn = test_conn("doc-debounce", "user-1");
    let session = coordinator::attach(&state, &conn).await;

    let client = LoroDoc::new();
    for i in 0..5 {
        let delta = append_paragraph(&client, i, &format!("edit {}", i));
        apply(&state, &session, &conn, delta).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    // Still inside the trailing window: nothing saved yet
    assert_eq!(upstream.save_count(), 0);

    tokio::time::sleep(Duration::from_millis(600)).await;

    // Exactly one save, containing the state as of the last edit
    assert_eq!(upstream.save_count(), 1);
    let saved = upstream.last_save().unwrap();
    assert_eq!(saved.content.len(), 5);
    assert_eq!(saved, session.canonical().await.unwrap());

    coordinator::detach(&state, &conn).await;
}

#[tokio::test]
async fn continuous_edits_hit_the_max_wait_cap() {
    let upstream = UpstreamState::new();
    let base = spawn_upstream(upstream.clone()).await;
    let state = AppState::new(test_config(&base, 300, 800));

    let conn = test_conn("doc-cap", "user-1");
    let session = coordinator::attach(&state, &conn).await;

    // Edits arrive faster than the debounce window for ~1.5s; the cap forces
    // a save roughly 800ms after the first edit even though the window keeps
    // restarting.
    let client = LoroDoc::new();
    for i in 0..10 {
        let delta = append_paragraph(&client, i, &format!("edit {}", i));
        apply(&state, &session, &conn, delta).await;
        tokio::time::sleep(Duration::from_millis(150)).await;
    }

    assert!(
        upstream.save_count() >= 1,
        "cap should have fired while edits kept arriving"
    );

    coordinator::detach(&state, &conn).await;
}

// ---------------------------------------------------------------------------
// Flush on last detach
// ---------------------------------------------------------------------------

#[tokio::test]
async fn last_detach_flushes_and_reattach_loads_that_state() {
    let upstream = UpstreamState::new();
    let base = spawn_upstream(upstream.clone()).await;
    // Debounce far longer than the test so only the flush can save
    let state = AppState::new(test_config(&base, 60_000, 120_000));

    let conn = test_conn("doc-flush", "user-1");
    let session = coordinator::attach(&state, &conn).await;

    let client = LoroDoc::new();
    let delta = append_paragraph(&client, 0, "unsaved edit");
    apply(&state, &session, &conn, delta).await;
    let expected = session.canonical().await.unwrap();

    coordinator::detach(&state, &conn).await;

    assert_eq!(upstream.save_count(), 1);
    assert_eq!(upstream.last_save().unwrap(), expected);
    assert!(state.sessions.read().await.is_empty());

    // A fresh attach for the same document loads exactly the flushed state
    let conn2 = test_conn("doc-flush", "user-2");
    let session2 = coordinator::attach(&state, &conn2).await;
    assert_eq!(session2.canonical().await.unwrap(), expected);
    assert_eq!(upstream.load_calls.load(Ordering::SeqCst), 2);

    coordinator::detach(&state, &conn2).await;
}

// ---------------------------------------------------------------------------
// End-to-end convergence (doc-42 scenario)
// ---------------------------------------------------------------------------

#[tokio::test]
async fn concurrent_edits_from_two_connections_converge() {
    let upstream = UpstreamState::new();
    let base = spawn_upstream(upstream.clone()).await;
    let state = AppState::new(test_config(&base, 200, 2_000));

    let conn_a = test_conn("42", "user-a");
    let conn_b = test_conn("42", "user-b");
    let session_a = coordinator::attach(&state, &conn_a).await;
    let session_b = coordinator::attach(&state, &conn_b).await;

    // Both connections share the one session for the document
    assert!(Arc::ptr_eq(&session_a, &session_b));
    assert_eq!(session_a.stats().await.connections, 2);

    let mut fanout = session_a.broadcast.subscribe();

    // A and B edit concurrently, neither having seen the other's update
    let client_a = LoroDoc::new();
    client_a.set_peer_id(1).unwrap();
    let client_b = LoroDoc::new();
    client_b.set_peer_id(2).unwrap();
    let delta_a = append_paragraph(&client_a, 0, "Hello");
    let delta_b = append_paragraph(&client_b, 0, "World");

    apply(&state, &session_a, &conn_a, delta_a.clone()).await;
    apply(&state, &session_b, &conn_b, delta_b.clone()).await;

    // Fan-out carries both updates, tagged with their origin
    let first = fanout.recv().await.unwrap();
    assert_eq!(first.sender_id, conn_a.conn_id.to_string());
    let second = fanout.recv().await.unwrap();
    assert_eq!(second.sender_id, conn_b.conn_id.to_string());

    // Each client applies the other's update, in opposite orders
    client_a.import(&delta_b).unwrap();
    client_b.import(&delta_a).unwrap();

    let canonical_a = loro_to_canonical(&client_a).unwrap();
    let canonical_b = loro_to_canonical(&client_b).unwrap();
    let canonical_server = session_a.canonical().await.unwrap();

    assert_eq!(canonical_a, canonical_b);
    assert_eq!(canonical_a, canonical_server);
    assert_eq!(canonical_server.content.len(), 2);

    coordinator::detach(&state, &conn_a).await;
    coordinator::detach(&state, &conn_b).await;
}

// ---------------------------------------------------------------------------
// Presence lifecycle through the coordinator
// ---------------------------------------------------------------------------

#[tokio::test]
async fn presence_is_cleaned_up_on_every_detach() {
    let upstream = UpstreamState::new();
    let base = spawn_upstream(upstream.clone()).await;
    let state = AppState::new(test_config(&base, 200, 2_000));

    let conn_a = test_conn("doc-presence", "user-a");
    let conn_b = test_conn("doc-presence", "user-b");
    let session = coordinator::attach(&state, &conn_a).await;
    coordinator::attach(&state, &conn_b).await;

    let entries = presence::snapshot(&session).await;
    assert_eq!(entries.len(), 2);

    coordinator::detach(&state, &conn_a).await;
    let entries = presence::snapshot(&session).await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].user_id, "user-b");

    coordinator::detach(&state, &conn_b).await;
    assert!(state.sessions.read().await.is_empty());
}
