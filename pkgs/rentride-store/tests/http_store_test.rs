//! HttpConversationStore against a local axum API

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post, put},
    Json, Router,
};
use rentride_store::{ConversationStore, HttpConversationStore, NewMessage, Role, StoreError};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

type RequestLog = Arc<Mutex<Vec<String>>>;

fn authorized(headers: &HeaderMap) -> Result<(), (StatusCode, String)> {
    match headers.get("authorization").and_then(|v| v.to_str().ok()) {
        Some("Bearer secret") => Ok(()),
        _ => Err((StatusCode::UNAUTHORIZED, "missing token".to_string())),
    }
}

async fn create_message(
    State(log): State<RequestLog>,
    headers: HeaderMap,
    Json(payload): Json<NewMessage>,
) -> Result<Json<Value>, (StatusCode, String)> {
    authorized(&headers)?;
    log.lock()
        .unwrap()
        .push(format!("post {} {}", payload.receiver_id, payload.body));

    if payload.body == "reject" {
        return Err((StatusCode::INTERNAL_SERVER_ERROR, "db down".to_string()));
    }

    Ok(Json(json!({
        "_id": "m123",
        "senderId": "u1",
        "receiverId": payload.receiver_id,
        "body": payload.body,
        "createdAt": "2024-03-01T10:00:00Z"
    })))
}

async fn conversation(
    headers: HeaderMap,
    Path(peer_id): Path<String>,
) -> Result<Json<Value>, (StatusCode, String)> {
    authorized(&headers)?;
    Ok(Json(json!([
        {"_id": "m1", "senderId": peer_id, "receiverId": "u1", "body": "hello", "createdAt": "2024-03-01T09:00:00Z", "isRead": true},
        {"_id": "m2", "senderId": "u1", "receiverId": peer_id, "body": "hi", "createdAt": "2024-03-01T09:01:00Z"}
    ])))
}

async fn mark_read(
    State(log): State<RequestLog>,
    headers: HeaderMap,
    Path(peer_id): Path<String>,
) -> Result<StatusCode, (StatusCode, String)> {
    authorized(&headers)?;
    log.lock().unwrap().push(format!("read {peer_id}"));
    Ok(StatusCode::NO_CONTENT)
}

async fn unread(headers: HeaderMap) -> Result<Json<Value>, (StatusCode, String)> {
    authorized(&headers)?;
    Ok(Json(json!({"count": 3})))
}

async fn directory(
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Json<Value>, (StatusCode, String)> {
    authorized(&headers)?;
    match query.get("role").map(String::as_str) {
        Some("admin") => Ok(Json(json!([
            {"_id": "a1", "name": "Support Desk", "role": "admin"}
        ]))),
        Some("host") => Ok(Json(json!([]))),
        _ => Err((StatusCode::BAD_REQUEST, "unknown role".to_string())),
    }
}

async fn spawn_api() -> (String, RequestLog) {
    let log: RequestLog = Arc::new(Mutex::new(Vec::new()));
    let app = Router::new()
        .route("/api/messages", post(create_message))
        .route("/api/conversations/{peer_id}", get(conversation))
        .route("/api/conversations/{peer_id}/read", put(mark_read))
        .route("/api/unread/count", get(unread))
        .route("/api/directory", get(directory))
        .with_state(log.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{addr}/api"), log)
}

fn client(base: &str, token: &str) -> HttpConversationStore {
    HttpConversationStore::new(base, token, Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn test_send_message_returns_canonical_record() {
    let (base, log) = spawn_api().await;
    let store = client(&base, "secret");

    let message = store.send_message("h1", "hi").await.unwrap();

    assert_eq!(message.id, "m123");
    assert_eq!(message.receiver_id, "h1");
    assert_eq!(message.body, "hi");
    assert!(!message.read);
    assert_eq!(*log.lock().unwrap(), vec!["post h1 hi".to_string()]);
}

#[tokio::test]
async fn test_rejected_send_surfaces_status() {
    let (base, _log) = spawn_api().await;
    let store = client(&base, "secret");

    let err = store.send_message("h1", "reject").await.unwrap_err();
    match err {
        StoreError::Status { status, message } => {
            assert_eq!(status, 500);
            assert_eq!(message, "db down");
        }
        other => panic!("Unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_missing_token_is_unauthorized() {
    let (base, _log) = spawn_api().await;
    let store = client(&base, "wrong");

    let err = store.fetch_conversation("h1").await.unwrap_err();
    assert!(matches!(err, StoreError::Status { status: 401, .. }));
}

#[tokio::test]
async fn test_fetch_conversation_parses_history() {
    let (base, _log) = spawn_api().await;
    let store = client(&base, "secret");

    let history = store.fetch_conversation("h1").await.unwrap();

    assert_eq!(history.len(), 2);
    assert_eq!(history[0].id, "m1");
    assert_eq!(history[0].sender_id, "h1");
    assert!(history[0].read);
    assert_eq!(history[1].body, "hi");
    assert!(history[0].created_at < history[1].created_at);
}

#[tokio::test]
async fn test_mark_read_and_unread_count() {
    let (base, log) = spawn_api().await;
    let store = client(&base, "secret");

    store.mark_read("h1").await.unwrap();
    assert_eq!(store.unread_count().await.unwrap(), 3);
    assert_eq!(*log.lock().unwrap(), vec!["read h1".to_string()]);
}

#[tokio::test]
async fn test_directory_by_role() {
    let (base, _log) = spawn_api().await;
    let store = client(&base, "secret");

    let admins = store.directory(Role::Admin).await.unwrap();
    assert_eq!(admins.len(), 1);
    assert_eq!(admins[0].id, "a1");
    assert_eq!(admins[0].display_name, "Support Desk");

    assert!(store.directory(Role::Host).await.unwrap().is_empty());
    assert!(matches!(
        store.directory(Role::Customer).await,
        Err(StoreError::Status { status: 400, .. })
    ));
}

#[tokio::test]
async fn test_unreachable_api_is_http_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let store = client(&format!("http://{addr}/api"), "secret");
    assert!(matches!(
        store.unread_count().await,
        Err(StoreError::Http(_))
    ));
}
