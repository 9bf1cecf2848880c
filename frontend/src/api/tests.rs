#![cfg(not(coverage))]

use super::*;
use crate::state::broker_session::SessionStore;
use crate::test_support::helpers::{connected_status_body, payload};
use crate::utils::storage::MemoryStorage;
use httpmock::prelude::*;
use serde_json::json;

const STATUS_PATH: &str = "/api/modules/auth/broker/status";

fn api_client(server: &MockServer) -> ApiClient {
    ApiClient::new_with_base_url(server.url("/api/"))
}

#[tokio::test]
async fn fetch_broker_status_returns_body() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET)
                .path(STATUS_PATH)
                .query_param("config_id", "abc-123")
                .header("authorization", "Bearer app-token");
            then.status(200).json_body(connected_status_body("abc-123", "EBW183"));
        })
        .await;

    let client = api_client(&server).with_access_token("app-token");
    let body = client.fetch_broker_status("abc-123").await.unwrap();

    mock.assert_async().await;
    assert_eq!(body["data"]["user_id"], json!("EBW183"));
}

#[tokio::test]
async fn fetch_broker_status_maps_errors() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path(STATUS_PATH).query_param("config_id", "expired");
            then.status(401)
                .json_body(json!({ "error": "Token expired", "code": "UNAUTHORIZED" }));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path(STATUS_PATH).query_param("config_id", "broken");
            then.status(500).body("upstream exploded");
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path(STATUS_PATH).query_param("config_id", "list");
            then.status(200).json_body(json!(["not", "an", "object"]));
        })
        .await;

    let client = api_client(&server);

    let unauthorized = client.fetch_broker_status("expired").await.unwrap_err();
    assert!(unauthorized.is_unauthorized());
    assert_eq!(unauthorized.error, "Token expired");

    let failed = client.fetch_broker_status("broken").await.unwrap_err();
    assert_eq!(failed.code, "REQUEST_FAILED");
    assert!(failed.error.contains("500"));

    let invalid = client.fetch_broker_status("list").await.unwrap_err();
    assert_eq!(invalid.code, "VALIDATION_ERROR");
}

#[tokio::test]
async fn sync_from_status_persists_wrapped_body() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path(STATUS_PATH).query_param("config_id", "abc-123");
            then.status(200).json_body(json!({
                "success": true,
                "data": { "session_status": "connected", "needs_reauth": false, "user_id": "EBW183" }
            }));
        })
        .await;

    let store = SessionStore::new(MemoryStorage::new());
    let view = store
        .sync_from_status(&api_client(&server), "abc-123")
        .await
        .unwrap();

    assert_eq!(view.config_id, "abc-123");
    assert_eq!(view.user_id.as_deref(), Some("EBW183"));
    assert_eq!(view.session_status, SessionStatus::Connected);
    assert!(!view.needs_reauth);
    assert_eq!(store.load().unwrap(), view);
}

#[tokio::test]
async fn sync_from_status_unauthorized_marks_reauth() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path(STATUS_PATH);
            then.status(401).json_body(json!({ "error": "expired", "code": "UNAUTHORIZED" }));
        })
        .await;

    let store = SessionStore::new(MemoryStorage::new());
    store.persist(&payload(json!({
        "config_id": "abc-123",
        "user_id": "EBW183",
        "session_status": "connected",
        "needs_reauth": false
    })));

    let view = store
        .sync_from_status(&api_client(&server), "abc-123")
        .await
        .unwrap();

    assert!(view.needs_reauth);
    assert_eq!(view.user_id.as_deref(), Some("EBW183"));
    assert_eq!(view.session_status, SessionStatus::Connected);
}

#[tokio::test]
async fn sync_from_status_failure_keeps_stored_session() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path(STATUS_PATH);
            then.status(503).json_body(json!({ "error": "maintenance", "code": "UNAVAILABLE" }));
        })
        .await;

    let store = SessionStore::new(MemoryStorage::new());
    assert!(store
        .sync_from_status(&api_client(&server), "abc-123")
        .await
        .is_none());

    let stored = store
        .persist(&payload(json!({ "config_id": "abc-123", "needs_reauth": false })))
        .unwrap();
    let view = store
        .sync_from_status(&api_client(&server), "abc-123")
        .await
        .unwrap();
    assert_eq!(view, stored);
}

#[test]
fn client_trims_trailing_slash_from_base_url() {
    let client = ApiClient::new_with_base_url("http://localhost:3000/api/");
    assert_eq!(client.base_url(), "http://localhost:3000/api");
    assert_eq!(ApiClient::default().base_url(), crate::config::DEFAULT_API_BASE_URL);
}
