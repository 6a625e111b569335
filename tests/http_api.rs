//! REST layer integration tests, driving the router in-process.

// serde_json's Value indexing returns Null instead of panicking.
#![allow(clippy::panic, clippy::indexing_slicing)]

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use tower::util::ServiceExt;

use tablepick::api;
use tablepick::app_state::AppState;
use tablepick::domain::RoomBus;
use tablepick::service::{ExpiryCoordinator, SessionLocks, SessionService};
use tablepick::store::SessionStore;
use tablepick::store::memory::MemoryStore;

fn test_app() -> Router {
    let store: Arc<dyn SessionStore> = Arc::new(MemoryStore::new());
    let room_bus = Arc::new(RoomBus::new(64));
    let locks = Arc::new(SessionLocks::new());
    let expiry = Arc::new(ExpiryCoordinator::new(
        Arc::clone(&store),
        Arc::clone(&room_bus),
        Arc::clone(&locks),
        Duration::from_secs(1800),
    ));
    let session_service = Arc::new(SessionService::new(
        store,
        Arc::clone(&room_bus),
        locks,
        Arc::clone(&expiry),
        Duration::from_secs(3600),
    ));
    api::build_router().with_state(AppState {
        session_service,
        room_bus,
        expiry,
    })
}

fn create_body() -> String {
    serde_json::json!({
        "host_name": "maya",
        "geo": { "latitude": 52.37, "longitude": 4.89, "radius_m": 1500 },
        "options": [
            { "id": "pizza", "name": "Da Mario" },
            { "id": "sushi", "name": "Umi", "rating": 4.5 }
        ]
    })
    .to_string()
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap_or_default();
    serde_json::from_slice(&bytes).unwrap_or_default()
}

fn post_json(uri: &str, body: String) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body))
        .unwrap_or_default()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .body(Body::empty())
        .unwrap_or_default()
}

#[tokio::test]
async fn health_endpoint_reports_healthy() {
    let app = test_app();
    let Ok(response) = app.oneshot(get("/health")).await else {
        panic!("request failed");
    };
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "healthy");
}

#[tokio::test]
async fn create_session_returns_code_and_expiry() {
    let app = test_app();
    let Ok(response) = app
        .oneshot(post_json("/api/v1/sessions", create_body()))
        .await
    else {
        panic!("request failed");
    };
    assert_eq!(response.status(), StatusCode::CREATED);
    let json = body_json(response).await;
    assert_eq!(json["state"], "waiting");
    let code = json["code"].as_str().unwrap_or_default();
    assert_eq!(code.len(), 6);
    assert!(json["expires_at"].is_string());
}

#[tokio::test]
async fn created_session_is_fetchable_and_empty() {
    let app = test_app();
    let Ok(response) = app
        .clone()
        .oneshot(post_json("/api/v1/sessions", create_body()))
        .await
    else {
        panic!("create failed");
    };
    let created = body_json(response).await;
    let code = created["code"].as_str().unwrap_or_default().to_string();

    let Ok(response) = app.oneshot(get(&format!("/api/v1/sessions/{code}"))).await else {
        panic!("get failed");
    };
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["participant_count"], 0);
    assert_eq!(json["submitted_count"], 0);
    assert_eq!(json["host_name"], "maya");
    assert_eq!(json["participants"], serde_json::json!([]));
}

#[tokio::test]
async fn unknown_session_is_404_with_machine_code() {
    let app = test_app();
    let Ok(response) = app.oneshot(get("/api/v1/sessions/ZZZZZ9")).await else {
        panic!("request failed");
    };
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json = body_json(response).await;
    assert_eq!(json["error"]["code"], "session_not_found");
}

#[tokio::test]
async fn malformed_code_is_400() {
    let app = test_app();
    let Ok(response) = app.oneshot(get("/api/v1/sessions/nope")).await else {
        panic!("request failed");
    };
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["error"]["code"], "invalid_code");
}

#[tokio::test]
async fn empty_host_name_is_rejected() {
    let app = test_app();
    let body = serde_json::json!({
        "host_name": "   ",
        "options": [{ "id": "pizza", "name": "Da Mario" }]
    })
    .to_string();
    let Ok(response) = app.oneshot(post_json("/api/v1/sessions", body)).await else {
        panic!("request failed");
    };
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["error"]["code"], "invalid_name");
}

#[tokio::test]
async fn delete_session_cascades() {
    let app = test_app();
    let Ok(response) = app
        .clone()
        .oneshot(post_json("/api/v1/sessions", create_body()))
        .await
    else {
        panic!("create failed");
    };
    let created = body_json(response).await;
    let code = created["code"].as_str().unwrap_or_default().to_string();

    let delete = Request::builder()
        .method("DELETE")
        .uri(format!("/api/v1/sessions/{code}"))
        .body(Body::empty())
        .unwrap_or_default();
    let Ok(response) = app.clone().oneshot(delete).await else {
        panic!("delete failed");
    };
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let Ok(response) = app.oneshot(get(&format!("/api/v1/sessions/{code}"))).await else {
        panic!("get failed");
    };
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
