//! Integration tests for the Calibra HTTP API.
//!
//! Uses axum-test to drive the router without starting a real server. The
//! device is a scripted in-process transport.

// Allow unwrap and panic in tests - these are standard for test code
// Allow holding MutexGuard across await in auth tests - tests are serialized
// intentionally to avoid env var conflicts
#![allow(clippy::unwrap_used, clippy::panic, clippy::await_holding_lock)]

use async_trait::async_trait;
use axum::http::HeaderValue;
use axum_test::TestServer;
use calibra::api::{AppState, ErrorResponse, FlowResponse, HealthResponse, create_router};
use calibra::{ClientError, DeviceTransport};
use calibra_core::{
    CalibrationSession, DeviceId, DeviceProfile, DeviceState, MemoryStore, SessionView,
    StartBlocked, StartRequest, StatusSnapshot, StepKind, StepStatus, StorageBackend,
    TrackerPhase,
};
use serde_json::json;
use std::sync::{Arc, Mutex};

/// Mutex to serialize tests since some of them modify env vars.
static AUTH_TEST_MUTEX: Mutex<()> = Mutex::new(());

// =============================================================================
// MOCK DEVICE
// =============================================================================

/// Device that answers start requests with a fixed result.
struct MockDevice {
    answer: Result<(), ClientError>,
    requests: Mutex<Vec<StartRequest>>,
}

impl MockDevice {
    fn accepting() -> Arc<Self> {
        Arc::new(Self {
            answer: Ok(()),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn rejecting(message: &str) -> Arc<Self> {
        Arc::new(Self {
            answer: Err(ClientError::Rejected(message.to_string())),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn sent(&self) -> Vec<StartRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl DeviceTransport for MockDevice {
    async fn start(&self, request: &StartRequest) -> Result<(), ClientError> {
        self.requests.lock().unwrap().push(request.clone());
        self.answer.clone()
    }

    async fn status(&self) -> Result<StatusSnapshot, ClientError> {
        Ok(StatusSnapshot::new(DeviceState::Idle, 0))
    }
}

// =============================================================================
// HELPER FUNCTIONS
// =============================================================================

/// Guard wrapper that holds the mutex and ensures cleanup on drop.
struct TestGuard {
    _guard: std::sync::MutexGuard<'static, ()>,
}

impl Drop for TestGuard {
    fn drop(&mut self) {
        // SAFETY: Tests run sequentially under AUTH_TEST_MUTEX, so no concurrent env access.
        unsafe { std::env::remove_var("CALIBRA_API_KEY") };
    }
}

fn idle() -> StatusSnapshot {
    StatusSnapshot::new(DeviceState::Idle, 0)
}

fn running(code: i32) -> StatusSnapshot {
    StatusSnapshot::new(DeviceState::Running, code)
}

fn session(first: &StatusSnapshot) -> CalibrationSession {
    let device = DeviceProfile::new(DeviceId::new("P1S-TEST").unwrap(), false);
    CalibrationSession::open(device, StorageBackend::InMemory(MemoryStore::new()), first).unwrap()
}

fn build_server(device: Arc<MockDevice>, first: &StatusSnapshot) -> TestServer {
    let state = AppState::new(session(first), device);
    TestServer::new(create_router(state)).unwrap()
}

/// Create a test server around an idle device.
/// Returns a guard that must be kept alive during the test.
fn create_test_server(device: Arc<MockDevice>) -> (TestServer, TestGuard) {
    let guard = AUTH_TEST_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    // SAFETY: Tests run sequentially under AUTH_TEST_MUTEX, so no concurrent env access.
    unsafe { std::env::remove_var("CALIBRA_API_KEY") };
    (build_server(device, &idle()), TestGuard { _guard: guard })
}

async fn narrow_to_bed_leveling(server: &TestServer) {
    for option in ["vibration", "motorNoise"] {
        server
            .put("/selection")
            .json(&json!({"option": option, "enabled": false}))
            .await
            .assert_status_ok();
    }
}

// =============================================================================
// HEALTH ENDPOINT TESTS
// =============================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let (server, _guard) = create_test_server(MockDevice::accepting());

    let response = server.get("/health").await;

    response.assert_status_ok();
    let health: HealthResponse = response.json();
    assert_eq!(health.status, "ok");
    assert!(!health.version.is_empty());
}

// =============================================================================
// SESSION ENDPOINT TESTS
// =============================================================================

#[tokio::test]
async fn test_fresh_session_view() {
    let (server, _guard) = create_test_server(MockDevice::accepting());

    let view: SessionView = server.get("/session").await.json();
    assert_eq!(view.phase, TrackerPhase::Idle);
    assert!(view.open);
    assert!(view.can_start);
    assert_eq!(view.current_step_index, -1);
    assert_eq!(view.steps.len(), 6);
    assert!(view.steps.iter().all(|s| s.status == StepStatus::Pending));
}

#[tokio::test]
async fn test_open_onto_running_device_resumes() {
    let _guard = AUTH_TEST_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    // SAFETY: Tests run sequentially under AUTH_TEST_MUTEX, so no concurrent env access.
    unsafe { std::env::remove_var("CALIBRA_API_KEY") };
    let device = MockDevice::accepting();
    let server = build_server(device.clone(), &running(25));

    let view: SessionView = server.get("/session").await.json();
    assert_eq!(view.phase, TrackerPhase::Running);
    assert!(view.progress.ever_seen_running);
    assert_eq!(view.start_blocked, Some(StartBlocked::AlreadyCalibrating));
    assert!(!view.selection_editable);
    assert!(device.sent().is_empty());
}

#[tokio::test]
async fn test_snapshot_sequence_reaches_completion() {
    let (server, _guard) = create_test_server(MockDevice::accepting());
    narrow_to_bed_leveling(&server).await;

    let mut indices = Vec::new();
    for snapshot in [running(13), running(1), running(48), StatusSnapshot::new(DeviceState::Idle, 48)] {
        let view: SessionView = server.post("/snapshot").json(&snapshot).await.json();
        indices.push(view.current_step_index);
    }
    assert_eq!(indices, vec![0, 2, 3, 3]);

    let view: SessionView = server.get("/session").await.json();
    assert_eq!(view.phase, TrackerPhase::Completed);
    assert!(view.steps.iter().all(|s| s.status == StepStatus::Complete));
    assert_eq!(view.start_blocked, Some(StartBlocked::AlreadyCompleted));
}

#[tokio::test]
async fn test_closed_session_ignores_snapshots() {
    let (server, _guard) = create_test_server(MockDevice::accepting());

    server.post("/session/close").await.assert_status_ok();
    let view: SessionView = server.post("/snapshot").json(&running(13)).await.json();
    assert!(!view.open);
    assert_eq!(view.phase, TrackerPhase::Idle);

    let view: SessionView = server.post("/session/open").json(&running(13)).await.json();
    assert!(view.open);
    assert_eq!(view.phase, TrackerPhase::Running);
}

#[tokio::test]
async fn test_fallback_label_for_unknown_stage() {
    let (server, _guard) = create_test_server(MockDevice::accepting());

    let snapshot = json!({
        "connected": true,
        "state": "RUNNING",
        "currentStageCode": 77,
        "currentStageName": "Purging filament"
    });
    let view: SessionView = server.post("/snapshot").json(&snapshot).await.json();
    assert_eq!(view.current_step_index, -1);
    assert_eq!(view.fallback_label.as_deref(), Some("Purging filament"));
}

#[tokio::test]
async fn test_oversized_stage_name_rejected() {
    let (server, _guard) = create_test_server(MockDevice::accepting());

    let snapshot = running(1).with_stage_name("x".repeat(10_000));
    let response = server.post("/snapshot").json(&snapshot).await;
    assert_eq!(response.status_code().as_u16(), 400);
}

// =============================================================================
// SELECTION ENDPOINT TESTS
// =============================================================================

#[tokio::test]
async fn test_selection_toggle_updates_flow() {
    let (server, _guard) = create_test_server(MockDevice::accepting());
    narrow_to_bed_leveling(&server).await;

    let view: SessionView = server.get("/session").await.json();
    let names: Vec<&str> = view.steps.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(
        names,
        vec!["Homing", "Cooling", "Bed leveling (phase 1)", "Bed leveling (phase 2)"]
    );
}

#[tokio::test]
async fn test_selection_unknown_option() {
    let (server, _guard) = create_test_server(MockDevice::accepting());

    let response = server
        .put("/selection")
        .json(&json!({"option": "laserEngraving", "enabled": true}))
        .await;
    assert_eq!(response.status_code().as_u16(), 400);
}

#[tokio::test]
async fn test_selection_unavailable_option() {
    let (server, _guard) = create_test_server(MockDevice::accepting());

    let response = server
        .put("/selection")
        .json(&json!({"option": "nozzleOffset", "enabled": true}))
        .await;
    assert_eq!(response.status_code().as_u16(), 422);
}

#[tokio::test]
async fn test_selection_locked_while_running() {
    let (server, _guard) = create_test_server(MockDevice::accepting());
    server.post("/snapshot").json(&running(3)).await.assert_status_ok();

    let response = server
        .put("/selection")
        .json(&json!({"option": "bedLeveling", "enabled": false}))
        .await;
    assert_eq!(response.status_code().as_u16(), 409);
}

#[tokio::test]
async fn test_nothing_selected_view() {
    let (server, _guard) = create_test_server(MockDevice::accepting());
    narrow_to_bed_leveling(&server).await;

    let view: SessionView = server
        .put("/selection")
        .json(&json!({"option": "bed-leveling", "enabled": false}))
        .await
        .json();
    assert!(view.nothing_selected);
    assert!(view.steps.is_empty());
    assert_eq!(view.start_blocked, Some(StartBlocked::NothingSelected));
}

// =============================================================================
// START ENDPOINT TESTS
// =============================================================================

#[tokio::test]
async fn test_start_accepted() {
    let device = MockDevice::accepting();
    let (server, _guard) = create_test_server(device.clone());
    narrow_to_bed_leveling(&server).await;

    let response = server.post("/start").await;
    response.assert_status_ok();
    let view: SessionView = response.json();
    assert_eq!(view.phase, TrackerPhase::Running);
    assert!(view.progress.started);
    assert!(!view.progress.ever_seen_running);
    // idle code 0 belongs to no step
    assert!(view.steps.iter().all(|s| s.status == StepStatus::Pending));

    let sent = device.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].device_id.as_str(), "P1S-TEST");
    assert!(sent[0].selection.bed_leveling);
    assert!(!sent[0].selection.vibration);
}

#[tokio::test]
async fn test_start_twice_is_gated() {
    let device = MockDevice::accepting();
    let (server, _guard) = create_test_server(device.clone());

    server.post("/start").await.assert_status_ok();
    let response = server.post("/start").await;
    assert_eq!(response.status_code().as_u16(), 409);
    let error: ErrorResponse = response.json();
    assert_eq!(error.reason, Some(StartBlocked::AlreadyStarted));
    assert_eq!(device.sent().len(), 1);
}

#[tokio::test]
async fn test_start_nothing_selected_sends_nothing() {
    let device = MockDevice::accepting();
    let (server, _guard) = create_test_server(device.clone());
    for option in ["bedLeveling", "vibration", "motorNoise"] {
        server
            .put("/selection")
            .json(&json!({"option": option, "enabled": false}))
            .await
            .assert_status_ok();
    }

    let response = server.post("/start").await;
    assert_eq!(response.status_code().as_u16(), 409);
    let error: ErrorResponse = response.json();
    assert_eq!(error.reason, Some(StartBlocked::NothingSelected));
    assert!(device.sent().is_empty());

    let view: SessionView = server.get("/session").await.json();
    assert_eq!(view.phase, TrackerPhase::Idle);
}

#[tokio::test]
async fn test_start_rejected_by_device() {
    let device = MockDevice::rejecting("Printer door open");
    let (server, _guard) = create_test_server(device.clone());

    let response = server.post("/start").await;
    assert_eq!(response.status_code().as_u16(), 502);
    let view: SessionView = response.json();
    assert_eq!(view.phase, TrackerPhase::Idle);
    assert!(view.can_start);
    assert!(
        view.last_error
            .as_deref()
            .is_some_and(|m| m.contains("Printer door open"))
    );
}

#[tokio::test]
async fn test_start_while_disconnected() {
    let device = MockDevice::accepting();
    let (server, _guard) = create_test_server(device.clone());
    server
        .post("/snapshot")
        .json(&StatusSnapshot::disconnected())
        .await
        .assert_status_ok();

    let response = server.post("/start").await;
    assert_eq!(response.status_code().as_u16(), 409);
    let error: ErrorResponse = response.json();
    assert_eq!(error.reason, Some(StartBlocked::Disconnected));
    assert!(device.sent().is_empty());
}

// =============================================================================
// RESET ENDPOINT TESTS
// =============================================================================

#[tokio::test]
async fn test_reset_after_completion() {
    let (server, _guard) = create_test_server(MockDevice::accepting());
    narrow_to_bed_leveling(&server).await;
    server.post("/start").await.assert_status_ok();
    server.post("/snapshot").json(&running(1)).await.assert_status_ok();
    server.post("/snapshot").json(&idle()).await.assert_status_ok();

    let view: SessionView = server
        .post("/reset")
        .json(&json!({"clear_selection": true}))
        .await
        .json();
    assert_eq!(view.phase, TrackerPhase::Idle);
    assert!(view.can_start);
    // defaults restored
    assert!(view.selection.vibration && view.selection.motor_noise);
}

// =============================================================================
// FLOW PREVIEW TESTS
// =============================================================================

#[tokio::test]
async fn test_flow_preview() {
    let (server, _guard) = create_test_server(MockDevice::accepting());

    let flow: FlowResponse = server
        .get("/flow")
        .add_query_param("highTempHeatbed", true)
        .await
        .json();
    let kinds: Vec<StepKind> = flow.steps.iter().map(|s| s.kind).collect();
    assert_eq!(
        kinds,
        vec![StepKind::Homing, StepKind::Cooling, StepKind::HighTempHeatbed]
    );
}

#[tokio::test]
async fn test_flow_preview_empty() {
    let (server, _guard) = create_test_server(MockDevice::accepting());

    let flow: FlowResponse = server.get("/flow").await.json();
    assert!(flow.nothing_selected);
    assert!(flow.steps.is_empty());
}

#[tokio::test]
async fn test_invalid_json_body() {
    let (server, _guard) = create_test_server(MockDevice::accepting());

    let response = server
        .post("/snapshot")
        .bytes(bytes::Bytes::from("not valid json"))
        .content_type("application/json")
        .await;

    assert!(response.status_code().is_client_error());
}

// =============================================================================
// AUTHENTICATION MIDDLEWARE TESTS
// =============================================================================

/// Create a test server with authentication enabled.
/// Must be called while holding AUTH_TEST_MUTEX.
fn create_auth_test_server(api_key: &str) -> TestServer {
    // SAFETY: Tests run sequentially under AUTH_TEST_MUTEX, so no concurrent env access.
    unsafe { std::env::set_var("CALIBRA_API_KEY", api_key) };
    build_server(MockDevice::accepting(), &idle())
}

/// Clean up auth env var after test.
fn cleanup_auth_env() {
    // SAFETY: Tests run sequentially under AUTH_TEST_MUTEX, so no concurrent env access.
    unsafe { std::env::remove_var("CALIBRA_API_KEY") };
}

#[tokio::test]
async fn test_auth_valid_bearer_token() {
    let _guard = AUTH_TEST_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let api_key = "test-secret-key-12345";
    let server = create_auth_test_server(api_key);

    let response = server
        .get("/session")
        .add_header(
            axum::http::header::AUTHORIZATION,
            format!("Bearer {}", api_key)
                .parse::<HeaderValue>()
                .unwrap(),
        )
        .await;

    cleanup_auth_env();
    response.assert_status_ok();
}

#[tokio::test]
async fn test_auth_invalid_token_rejected() {
    let _guard = AUTH_TEST_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let server = create_auth_test_server("correct-key");

    let response = server
        .get("/session")
        .add_header(
            axum::http::header::AUTHORIZATION,
            "Bearer wrong-key".parse::<HeaderValue>().unwrap(),
        )
        .await;

    cleanup_auth_env();
    assert_eq!(response.status_code().as_u16(), 401);
}

#[tokio::test]
async fn test_auth_missing_header_rejected() {
    let _guard = AUTH_TEST_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let server = create_auth_test_server("required-key");

    let response = server.post("/start").await;

    cleanup_auth_env();
    assert_eq!(response.status_code().as_u16(), 401);
}

#[tokio::test]
async fn test_auth_health_endpoint_bypasses_auth() {
    let _guard = AUTH_TEST_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let server = create_auth_test_server("secret-key-for-bypass-test");

    let response = server.get("/health").await;

    cleanup_auth_env();
    response.assert_status_ok();
}
