//! Router-level tests over the in-memory store.
//!
//! Each test drives the full HTTP surface with `oneshot`: division setup,
//! generation triggers, result submission and the error mapping.

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use chrono::Utc;
use http_body_util::BodyExt;
use pb_server::api::{AppState, create_router, request_id::REQUEST_ID_HEADER};
use pool_bracket::division::{DivisionConfig, DivisionKey, Match, Slot};
use pool_bracket::generation::{GenerationLock, LockFamily, LockStatus};
use pool_bracket::{DivisionStore, GenerationConfig, MemoryDivisionStore, ResultSubmission};
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt; // For `oneshot` method
use uuid::Uuid;

const DIVISION: &str = "/api/v1/tournaments/spring/divisions/mixed";

fn create_test_server() -> (Router, Arc<MemoryDivisionStore>) {
    let store = Arc::new(MemoryDivisionStore::new());
    let state = AppState::new(store.clone(), GenerationConfig::default());
    (create_router(state), store)
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

fn division_body() -> Value {
    json!({
        "name": "Mixed Open",
        "config": serde_json::to_value(DivisionConfig::default()).unwrap(),
        "pools": [
            {
                "name": "Pool A",
                "participants": [
                    {"id": "a1", "name": "Aces"},
                    {"id": "a2", "name": "Blockers"},
                    {"id": "a3", "name": "Diggers"}
                ]
            },
            {
                "name": "Pool B",
                "participants": [
                    {"id": "b1", "name": "Setters"},
                    {"id": "b2", "name": "Liberos"},
                    {"id": "b3", "name": "Spikers"}
                ]
            }
        ]
    })
}

async fn setup_division(app: &Router) {
    let (status, body) = send(app, "PUT", DIVISION, Some(division_body())).await;
    assert_eq!(status, StatusCode::OK, "{body}");
}

async fn pool_matches(app: &Router) -> Vec<Match> {
    let (status, body) = send(app, "GET", &format!("{DIVISION}/matches?stage=pool"), None).await;
    assert_eq!(status, StatusCode::OK);
    serde_json::from_value(body).unwrap()
}

async fn finish_pools(app: &Router) {
    let forfeit = serde_json::to_value(ResultSubmission::forfeit(Slot::A)).unwrap();
    for m in pool_matches(app).await {
        let uri = format!("{DIVISION}/matches/{}/complete", m.id);
        let (status, body) = send(app, "POST", &uri, Some(forfeit.clone())).await;
        assert_eq!(status, StatusCode::OK, "{body}");
    }
}

// ============================================================================
// Health Check Tests
// ============================================================================

#[tokio::test]
async fn test_health_check_without_database() {
    let (app, _) = create_test_server();

    let (status, body) = send(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert!(body["database"].is_null());
}

#[tokio::test]
async fn test_request_id_is_echoed() {
    let (app, _) = create_test_server();

    let request = Request::builder()
        .uri("/health")
        .header(REQUEST_ID_HEADER, "trigger-7")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.headers()[REQUEST_ID_HEADER], "trigger-7");
}

// ============================================================================
// Division Tests
// ============================================================================

#[tokio::test]
async fn test_upsert_and_get_division() {
    let (app, _) = create_test_server();
    setup_division(&app).await;

    let (status, body) = send(&app, "GET", DIVISION, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["division"]["name"], "Mixed Open");
    assert_eq!(body["pools"][0]["key"], "A");
    assert_eq!(body["pools"][1]["participants"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_duplicate_participant_rejected() {
    let (app, _) = create_test_server();
    let mut body = division_body();
    body["pools"][1]["participants"][0]["id"] = json!("a1");

    let (status, body) = send(&app, "PUT", DIVISION, Some(body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "config");
    assert!(body["request_id"].is_string());
}

#[tokio::test]
async fn test_pool_name_without_key_rejected() {
    let (app, store) = create_test_server();
    let mut body = division_body();
    body["pools"][1]["name"] = json!("Pool -");

    let (status, body) = send(&app, "PUT", DIVISION, Some(body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "config");
    assert!(
        store
            .load_division(&DivisionKey::new("spring", "mixed"))
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn test_unknown_division_is_not_found() {
    let (app, _) = create_test_server();

    let (status, body) = send(&app, "POST", &format!("{DIVISION}/pool-schedule"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["kind"], "not_found");
}

// ============================================================================
// Generation Tests
// ============================================================================

#[tokio::test]
async fn test_pool_schedule_then_bracket() {
    let (app, _) = create_test_server();
    setup_division(&app).await;

    let (status, report) = send(&app, "POST", &format!("{DIVISION}/pool-schedule"), None).await;
    assert_eq!(status, StatusCode::OK, "{report}");
    assert_eq!(report["operation"], "pool_schedule");
    assert_eq!(report["matches_written"], 6);
    assert_eq!(report["lock_version"], 1);

    let (status, body) = send(&app, "POST", &format!("{DIVISION}/bracket"), None).await;
    assert_eq!(status, StatusCode::PRECONDITION_FAILED);
    assert_eq!(body["kind"], "precondition");

    finish_pools(&app).await;

    let (status, report) = send(&app, "POST", &format!("{DIVISION}/bracket"), None).await;
    assert_eq!(status, StatusCode::OK, "{report}");
    assert_eq!(report["matches_written"], 3);
    assert_eq!(report["seed_documents"].as_array().unwrap().len(), 1);

    let (status, report) = send(
        &app,
        "POST",
        &format!("{DIVISION}/bracket/main/from-seeds"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{report}");
    assert_eq!(report["matches_removed"], 0);
    assert_eq!(report["lock_version"], 2);
}

#[tokio::test]
async fn test_regenerating_pool_schedule_is_idempotent() {
    let (app, _) = create_test_server();
    setup_division(&app).await;

    send(&app, "POST", &format!("{DIVISION}/pool-schedule"), None).await;
    let before = pool_matches(&app).await;

    let (status, report) = send(&app, "POST", &format!("{DIVISION}/pool-schedule"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["matches_removed"], 0);
    assert_eq!(pool_matches(&app).await, before);
}

#[tokio::test]
async fn test_held_lock_answers_conflict() {
    let (app, store) = create_test_server();
    setup_division(&app).await;

    store
        .force_lock(
            &DivisionKey::new("spring", "mixed"),
            LockFamily::PoolSchedule,
            GenerationLock {
                status: LockStatus::Generating,
                updated_at: Some(Utc::now()),
                version: 3,
                holder: Some(Uuid::new_v4()),
            },
        )
        .await;

    let request = Request::builder()
        .method("POST")
        .uri(format!("{DIVISION}/pool-schedule"))
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert!(response.headers().contains_key(header::RETRY_AFTER));
}

#[tokio::test]
async fn test_unknown_bracket_type_rejected() {
    let (app, _) = create_test_server();
    setup_division(&app).await;

    let (status, body) = send(
        &app,
        "POST",
        &format!("{DIVISION}/bracket/consolation/from-seeds"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("consolation"));
}

#[tokio::test]
async fn test_from_seeds_before_seeding() {
    let (app, _) = create_test_server();
    setup_division(&app).await;

    let (status, _) = send(
        &app,
        "POST",
        &format!("{DIVISION}/bracket/plate/from-seeds"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::PRECONDITION_FAILED);
}

// ============================================================================
// Completion Tests
// ============================================================================

#[tokio::test]
async fn test_completion_refreshes_standings() {
    let (app, _) = create_test_server();
    setup_division(&app).await;
    send(&app, "POST", &format!("{DIVISION}/pool-schedule"), None).await;

    let first = pool_matches(&app)
        .await
        .into_iter()
        .find(|m| m.pool_key.as_deref() == Some("A"))
        .unwrap();
    let submission = json!({"winner": "B", "games": [{"a": 15, "b": 21}]});
    let (status, report) = send(
        &app,
        "POST",
        &format!("{DIVISION}/matches/{}/complete", first.id),
        Some(submission),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{report}");
    assert_eq!(report["status"], "completed");
    assert_eq!(report["standings"]["outcome"], "updated");

    let (status, standings) = send(&app, "GET", &format!("{DIVISION}/standings/Pool%20A"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(standings["pool_key"], "A");
    assert_eq!(standings["rows"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_inconsistent_result_rejected() {
    let (app, _) = create_test_server();
    setup_division(&app).await;
    send(&app, "POST", &format!("{DIVISION}/pool-schedule"), None).await;

    let m = pool_matches(&app).await.remove(0);
    let submission = json!({"winner": "A", "games": [{"a": 15, "b": 21}]});
    let (status, body) = send(
        &app,
        "POST",
        &format!("{DIVISION}/matches/{}/complete", m.id),
        Some(submission),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "config");
}

#[tokio::test]
async fn test_unknown_match_is_not_found() {
    let (app, _) = create_test_server();
    setup_division(&app).await;

    let forfeit = serde_json::to_value(ResultSubmission::forfeit(Slot::A)).unwrap();
    let (status, _) = send(
        &app,
        "POST",
        &format!("{DIVISION}/matches/nope/complete"),
        Some(forfeit),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_standings_of_unknown_pool() {
    let (app, _) = create_test_server();
    setup_division(&app).await;

    let (status, _) = send(&app, "GET", &format!("{DIVISION}/standings/Z"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
