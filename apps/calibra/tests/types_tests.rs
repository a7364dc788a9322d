//! Unit tests for API types serialization/deserialization.

// Allow unwrap and panic in tests - these are standard for test code
#![allow(clippy::unwrap_used, clippy::panic)]

use calibra::api::{
    ErrorResponse, FlowQuery, FlowResponse, HealthResponse, ResetRequest, SelectionRequest,
};
use calibra_core::{
    CalibraError, CalibrationOption, CalibrationSession, DeviceId, DeviceProfile, DeviceState,
    MemoryStore, SessionView, StartBlocked, StatusSnapshot, StepKind, build_flow,
};

// =============================================================================
// HEALTH RESPONSE TESTS
// =============================================================================

#[test]
fn test_health_response_default() {
    let health = HealthResponse::default();
    assert_eq!(health.status, "ok");
    assert!(!health.version.is_empty());
}

#[test]
fn test_health_response_deserialization() {
    let json = r#"{"status":"healthy","version":"1.0.0"}"#;
    let health: HealthResponse = serde_json::from_str(json).unwrap();

    assert_eq!(health.status, "healthy");
    assert_eq!(health.version, "1.0.0");
}

// =============================================================================
// ERROR RESPONSE TESTS
// =============================================================================

#[test]
fn test_error_response_omits_missing_reason() {
    let error = ErrorResponse::from(&CalibraError::SelectionLocked);
    let json = serde_json::to_string(&error).unwrap();

    assert!(json.contains("locked"));
    assert!(!json.contains("reason"));
}

#[test]
fn test_error_response_blocked_reason() {
    let error = ErrorResponse::blocked(StartBlocked::NothingSelected);
    let json = serde_json::to_value(&error).unwrap();

    assert_eq!(json["reason"], "nothing_selected");
    assert_eq!(json["error"], StartBlocked::NothingSelected.message());
}

// =============================================================================
// REQUEST TESTS
// =============================================================================

#[test]
fn test_selection_request_parses_option() {
    let json = r#"{"option":"highTempHeatbed","enabled":true}"#;
    let request: SelectionRequest = serde_json::from_str(json).unwrap();

    assert!(request.enabled);
    assert_eq!(request.option().unwrap(), CalibrationOption::HighTempHeatbed);
}

#[test]
fn test_selection_request_unknown_option() {
    let request = SelectionRequest {
        option: "toolChanger".to_string(),
        enabled: true,
    };
    assert!(matches!(
        request.option(),
        Err(CalibraError::UnknownOption(name)) if name == "toolChanger"
    ));
}

#[test]
fn test_reset_request_defaults_to_keeping_selection() {
    let request: ResetRequest = serde_json::from_str("{}").unwrap();
    assert!(!request.clear_selection);
}

#[test]
fn test_flow_query_camel_case() {
    let query: FlowQuery =
        serde_json::from_str(r#"{"bedLeveling":true,"nozzleOffset":true,"dualExtrusion":true}"#)
            .unwrap();
    let selection = query.selection();

    assert!(selection.bed_leveling && selection.nozzle_offset);
    assert!(!selection.vibration);
    assert!(query.dual_extrusion);
}

// =============================================================================
// FLOW RESPONSE TESTS
// =============================================================================

#[test]
fn test_flow_response_from_flow() {
    let selection = FlowQuery {
        nozzle_offset: true,
        ..FlowQuery::default()
    }
    .selection();
    let response = FlowResponse::from(&build_flow(&selection, true));

    assert!(!response.nothing_selected);
    let kinds: Vec<StepKind> = response.steps.iter().map(|s| s.kind).collect();
    assert_eq!(kinds, vec![StepKind::Homing, StepKind::NozzleOffset]);
    assert_eq!(response.steps[1].stage_codes, vec![39, 40]);
    assert_eq!(response.steps[1].order, 1);
}

#[test]
fn test_flow_response_step_kind_names() {
    let selection = FlowQuery {
        bed_leveling: true,
        ..FlowQuery::default()
    }
    .selection();
    let json = serde_json::to_value(FlowResponse::from(&build_flow(&selection, false))).unwrap();

    assert_eq!(json["steps"][2]["kind"], "bed_leveling_phase1");
    assert_eq!(json["nothing_selected"], false);
}

// =============================================================================
// SESSION VIEW TESTS
// =============================================================================

#[test]
fn test_session_view_roundtrip() {
    let device = DeviceProfile::new(DeviceId::new("H2D-0042").unwrap(), true);
    let first = StatusSnapshot::new(DeviceState::Running, 40).with_stage_name("Nozzle offset");
    let session = CalibrationSession::open(device, MemoryStore::new(), &first).unwrap();
    let view = session.view();

    let json = serde_json::to_string(&view).unwrap();
    let parsed: SessionView = serde_json::from_str(&json).unwrap();

    assert_eq!(parsed, view);
    assert!(parsed.calibrating);
    assert_eq!(parsed.device_state, Some(DeviceState::Running));
    assert!(parsed.selection.nozzle_offset);
}
