//! # API Request/Response Types
//!
//! JSON bodies of the HTTP API. The session itself is returned as
//! [`calibra_core::SessionView`].

use calibra_core::{CalibraError, CalibrationOption, Flow, Selection, StartBlocked, StepKind};
use serde::{Deserialize, Serialize};

// =============================================================================
// HEALTH RESPONSE
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

// =============================================================================
// ERROR RESPONSE
// =============================================================================

/// Error body for every non-2xx answer produced by a handler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    /// Machine-readable start gating reason, when a start was refused.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<StartBlocked>,
}

impl ErrorResponse {
    #[must_use]
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            reason: None,
        }
    }

    #[must_use]
    pub fn blocked(reason: StartBlocked) -> Self {
        Self {
            error: reason.message().to_string(),
            reason: Some(reason),
        }
    }
}

impl From<&CalibraError> for ErrorResponse {
    fn from(e: &CalibraError) -> Self {
        Self::new(e.to_string())
    }
}

// =============================================================================
// SELECTION REQUEST
// =============================================================================

/// Toggle one option.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionRequest {
    /// Wire name (`bedLeveling`) or kebab name (`bed-leveling`).
    pub option: String,
    pub enabled: bool,
}

impl SelectionRequest {
    /// Resolve the option name.
    pub fn option(&self) -> Result<CalibrationOption, CalibraError> {
        self.option.parse()
    }
}

// =============================================================================
// RESET REQUEST
// =============================================================================

/// Reset the session, optionally clearing the persisted selection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResetRequest {
    #[serde(default)]
    pub clear_selection: bool,
}

// =============================================================================
// FLOW PREVIEW
// =============================================================================

/// Query string for `GET /flow`. Absent options are off.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FlowQuery {
    pub bed_leveling: bool,
    pub vibration: bool,
    pub motor_noise: bool,
    pub nozzle_offset: bool,
    pub high_temp_heatbed: bool,
    pub dual_extrusion: bool,
}

impl FlowQuery {
    #[must_use]
    pub fn selection(&self) -> Selection {
        Selection {
            bed_leveling: self.bed_leveling,
            vibration: self.vibration,
            motor_noise: self.motor_noise,
            nozzle_offset: self.nozzle_offset,
            high_temp_heatbed: self.high_temp_heatbed,
        }
    }
}

/// One step of a previewed flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowStepJson {
    pub kind: StepKind,
    pub name: String,
    pub order: usize,
    pub stage_codes: Vec<i32>,
}

/// Flow preview response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowResponse {
    pub steps: Vec<FlowStepJson>,
    /// True when no option is on; the overlay shows an empty state.
    pub nothing_selected: bool,
}

impl From<&Flow> for FlowResponse {
    fn from(flow: &Flow) -> Self {
        Self {
            steps: flow
                .steps()
                .iter()
                .map(|step| FlowStepJson {
                    kind: step.kind,
                    name: step.name.to_string(),
                    order: step.order,
                    stage_codes: step.stage_codes.iter().map(|c| c.value()).collect(),
                })
                .collect(),
            nothing_selected: flow.is_empty(),
        }
    }
}
