//! Integration tests for the HTTP backend against a local axum server.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use serde_json::{json, Value};

use checkup_sync::backend::{probe, HttpBackend, WorkflowBackend};
use checkup_sync::models::checkup::{CheckupId, CheckupPatch, CheckupStatus};
use checkup_sync::session::{Credential, Role};
use checkup_sync::AppError;

use super::test_helpers::{checkup, Harness};

const TOKEN: &str = "test-token";

/// Request bodies received by the server, tagged with their path.
type Received = Arc<Mutex<Vec<(String, Value)>>>;

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value == format!("Bearer {TOKEN}"))
}

async fn queue(headers: HeaderMap) -> Response {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    Json(json!({
        "success": true,
        "data": [{
            "id": 42,
            "patient_id": "P-42",
            "patient_name": "Juan Dela Cruz",
            "service_type": "Consultation",
            "priority": "normal",
            "status": "doctor-notified",
            "queued_at": "2024-05-01T08:00:00Z",
            "last_updated": "2024-05-01T08:05:00Z"
        }]
    }))
    .into_response()
}

async fn today() -> Json<Value> {
    Json(json!({ "success": false, "message": "database unavailable" }))
}

async fn history(Path(patient_id): Path<String>) -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, format!("no history for {patient_id}")).into_response()
}

async fn create(State(received): State<Received>, Json(body): Json<Value>) -> Json<Value> {
    received.lock().unwrap().push(("/checkups".into(), body.clone()));
    let mut record = body;
    record["id"] = json!(501);
    record["last_updated"] = json!("2024-05-01T09:00:00Z");
    Json(json!({ "success": true, "data": record }))
}

async fn queue_status(
    State(received): State<Received>,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> Json<Value> {
    received
        .lock()
        .unwrap()
        .push((format!("/queue/{id}/status"), body));
    Json(json!({ "success": true }))
}

async fn slow_health() -> Json<Value> {
    tokio::time::sleep(Duration::from_millis(500)).await;
    Json(json!({ "success": true }))
}

async fn serve() -> (HttpBackend, Received) {
    let received = Received::default();
    let app = Router::new()
        .route("/checkups/queue", get(queue))
        .route("/checkups/today", get(today))
        .route("/checkups/history/{patient_id}", get(history))
        .route("/checkups", post(create))
        .route("/queue/{id}/status", patch(queue_status))
        .route("/health", get(slow_health))
        .with_state(Arc::clone(&received));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let backend = HttpBackend::new(format!("http://{addr}/")).unwrap();
    (backend, received)
}

fn credential(token: &str) -> Credential {
    Credential::new(token, "dr-reyes", Role::Doctor)
}

#[tokio::test]
async fn fetch_queue_unwraps_envelope() {
    let (backend, _) = serve().await;
    assert!(!backend.base_url().ends_with('/'));

    let entries = backend.fetch_queue(&credential(TOKEN)).await.unwrap();

    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].id, CheckupId::from(42));
    assert_eq!(entries[0].status, CheckupStatus::DoctorNotified);
}

#[tokio::test]
async fn rejected_credential_is_auth_required() {
    let (backend, _) = serve().await;
    let result = backend.fetch_queue(&credential("stale-token")).await;
    assert!(matches!(result, Err(AppError::AuthRequired(_))));
}

#[tokio::test]
async fn unsuccessful_envelope_is_network_error() {
    let (backend, _) = serve().await;
    let result = backend.fetch_todays_checkups(&credential(TOKEN)).await;
    assert!(
        matches!(&result, Err(AppError::Network(msg)) if msg.contains("database unavailable")),
        "{result:?}"
    );
}

#[tokio::test]
async fn server_error_is_network_error() {
    let (backend, _) = serve().await;
    let result = backend
        .fetch_checkup_history(&credential(TOKEN), "P-1")
        .await;
    assert!(matches!(result, Err(AppError::Network(msg)) if msg.contains("500")));
}

#[tokio::test]
async fn create_checkup_returns_server_record() {
    let (backend, received) = serve().await;
    let session = checkup(0, "Maria Santos", CheckupStatus::Waiting);

    let created = backend
        .create_checkup(&credential(TOKEN), &session)
        .await
        .unwrap();

    assert_eq!(created.id, CheckupId::from(501));
    assert_eq!(created.patient.name, "Maria Santos");
    let bodies = received.lock().unwrap();
    assert_eq!(bodies[0].1["service_type"], "Consultation");
    assert_eq!(bodies[0].1["status"], "waiting");
}

#[tokio::test]
async fn queue_status_patch_flattens_fields() {
    let (backend, received) = serve().await;
    let patch = CheckupPatch {
        notes: Some("BP elevated".into()),
        ..CheckupPatch::default()
    };

    backend
        .patch_queue_status(&credential(TOKEN), &CheckupId::from(42), CheckupStatus::Ongoing, &patch)
        .await
        .unwrap();

    let bodies = received.lock().unwrap();
    assert_eq!(bodies[0].0, "/queue/42/status");
    assert_eq!(bodies[0].1, json!({ "status": "ongoing", "notes": "BP elevated" }));
}

#[tokio::test]
async fn probe_times_out() {
    let (backend, _) = serve().await;
    let h = Harness::new();

    let result = probe(&backend, &h.session, Duration::from_millis(50)).await;

    assert!(matches!(result, Err(AppError::Network(msg)) if msg.contains("timed out")));
}

#[tokio::test]
async fn probe_without_credential_skips_backend() {
    let h = Harness::signed_out();
    let result = probe(h.backend.as_ref(), &h.session, Duration::from_secs(1)).await;

    assert!(matches!(result, Err(AppError::AuthRequired(_))));
    assert_eq!(h.backend.calls("health"), 0);
}

#[tokio::test]
async fn probe_succeeds_against_live_backend() {
    let h = Harness::new();
    probe(h.backend.as_ref(), &h.session, Duration::from_secs(1))
        .await
        .unwrap();
    assert_eq!(h.backend.calls("health"), 1);
}
