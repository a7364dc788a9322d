//! # API Endpoint Handlers
//!
//! This module implements the actual HTTP endpoint handlers.
//!
//! Every session handler answers with the full
//! [`SessionView`](calibra_core::SessionView) so the
//! overlay can redraw from a single response.

use super::{
    AppState,
    types::{ErrorResponse, FlowQuery, FlowResponse, HealthResponse, ResetRequest, SelectionRequest},
};
use crate::dispatcher::StartOutcome;
use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use calibra_core::{CalibraError, StatusSnapshot, build_flow};

/// HTTP status for an engine error.
fn error_status(e: &CalibraError) -> StatusCode {
    match e {
        CalibraError::UnknownOption(_)
        | CalibraError::InvalidSnapshot(_)
        | CalibraError::InvalidDeviceId(_)
        | CalibraError::SerializationError(_) => StatusCode::BAD_REQUEST,
        CalibraError::SelectionLocked => StatusCode::CONFLICT,
        CalibraError::OptionUnavailable(_) => StatusCode::UNPROCESSABLE_ENTITY,
        CalibraError::StartRejected(_) => StatusCode::BAD_GATEWAY,
        CalibraError::StorageError(_) | CalibraError::IoError(_) | CalibraError::ConfigError(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn error_response(e: &CalibraError) -> Response {
    (error_status(e), Json(ErrorResponse::from(e))).into_response()
}

// =============================================================================
// HEALTH HANDLER
// =============================================================================

/// Health check endpoint.
pub async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse::default())
}

// =============================================================================
// SESSION HANDLERS
// =============================================================================

/// Current session view.
pub async fn session_handler(State(state): State<AppState>) -> impl IntoResponse {
    let session = state.session.read().await;
    (StatusCode::OK, Json(session.view()))
}

/// Open (or reopen) the overlay with the device's current status.
pub async fn open_handler(
    State(state): State<AppState>,
    Json(snapshot): Json<StatusSnapshot>,
) -> Response {
    let mut session = state.session.write().await;
    match session.reopen(&snapshot) {
        Ok(()) => (StatusCode::OK, Json(session.view())).into_response(),
        Err(e) => error_response(&e),
    }
}

/// Dismiss the overlay. Progress and selection are kept.
pub async fn close_handler(State(state): State<AppState>) -> impl IntoResponse {
    let mut session = state.session.write().await;
    session.close();
    (StatusCode::OK, Json(session.view()))
}

/// Push one status snapshot into the session.
pub async fn snapshot_handler(
    State(state): State<AppState>,
    Json(snapshot): Json<StatusSnapshot>,
) -> Response {
    let mut session = state.session.write().await;
    match session.observe(&snapshot) {
        Ok(_) => (StatusCode::OK, Json(session.view())).into_response(),
        Err(e) => error_response(&e),
    }
}

// =============================================================================
// SELECTION HANDLER
// =============================================================================

/// Switch one option on or off.
pub async fn selection_handler(
    State(state): State<AppState>,
    Json(request): Json<SelectionRequest>,
) -> Response {
    let option = match request.option() {
        Ok(option) => option,
        Err(e) => return error_response(&e),
    };

    let mut session = state.session.write().await;
    match session.set_option(option, request.enabled) {
        Ok(()) => (StatusCode::OK, Json(session.view())).into_response(),
        Err(e) => error_response(&e),
    }
}

// =============================================================================
// START HANDLER
// =============================================================================

/// Send a start request and wait for the device's answer.
///
/// - gated: `409` with the blocking reason, nothing sent
/// - rejected by the device: `502` with the view (carrying `last_error`)
/// - accepted: `200` with the view
pub async fn start_handler(State(state): State<AppState>) -> Response {
    match state.dispatcher.start().await {
        Err(blocked) => (StatusCode::CONFLICT, Json(ErrorResponse::blocked(blocked))).into_response(),
        Ok(StartOutcome::Accepted) => {
            (StatusCode::OK, Json(state.dispatcher.view().await)).into_response()
        }
        Ok(StartOutcome::Rejected(_)) => {
            (StatusCode::BAD_GATEWAY, Json(state.dispatcher.view().await)).into_response()
        }
    }
}

// =============================================================================
// RESET HANDLER
// =============================================================================

/// Return the session to idle.
pub async fn reset_handler(
    State(state): State<AppState>,
    Json(request): Json<ResetRequest>,
) -> Response {
    let mut session = state.session.write().await;
    match session.reset(request.clear_selection) {
        Ok(()) => (StatusCode::OK, Json(session.view())).into_response(),
        Err(e) => error_response(&e),
    }
}

// =============================================================================
// FLOW PREVIEW HANDLER
// =============================================================================

/// Flow for an arbitrary selection. Does not touch the session.
pub async fn flow_handler(Query(query): Query<FlowQuery>) -> impl IntoResponse {
    let flow = build_flow(&query.selection(), query.dual_extrusion);
    (StatusCode::OK, Json(FlowResponse::from(&flow)))
}
