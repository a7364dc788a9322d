//! # Stage Classification
//!
//! A snapshot classifies as "calibrating" iff its stage code belongs to the
//! fixed set of active calibration codes **and** the device reports
//! `RUNNING`.
//!
//! Both conditions are required: firmware keeps reporting the last stage code
//! after a run finishes, while the device state drops back to idle.
//!
//! ## Active Codes
//!
//! | Codes | Step |
//! |-------|------|
//! | 13 | Homing |
//! | 29 | Cooling |
//! | 1, 47 | Bed leveling (phase 1) |
//! | 25, 31 | Motor noise cancellation |
//! | 3 | Vibration compensation |
//! | 48 | Bed leveling (phase 2) |
//! | 39, 40 | Nozzle offset calibration |
//! | 43 | High-temperature heatbed calibration |

use crate::flow::StepKind;
use crate::types::{DeviceState, StageCode, StatusSnapshot};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

// =============================================================================
// ACTIVE STAGE CODES
// =============================================================================

/// Every stage code that denotes an active calibration routine.
#[must_use]
pub fn active_stage_codes() -> BTreeSet<StageCode> {
    StepKind::ORDERED
        .iter()
        .flat_map(|kind| kind.raw_codes().iter().copied())
        .map(StageCode)
        .collect()
}

/// Check whether a stage code is one of the active calibration codes.
#[must_use]
pub fn is_active_stage(code: StageCode) -> bool {
    StepKind::ORDERED
        .iter()
        .any(|kind| kind.raw_codes().contains(&code.value()))
}

/// Classify a stage code and device state.
///
/// Pure and total: every input has an answer and nothing is logged.
#[must_use]
pub fn is_calibrating(code: StageCode, state: DeviceState) -> bool {
    state.is_running() && is_active_stage(code)
}

// =============================================================================
// CLASSIFICATION
// =============================================================================

/// Outcome of classifying one snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Classification {
    /// The device is running a calibration routine.
    Calibrating,
    /// The device is running, but not on a calibration stage (e.g. a print).
    RunningOther,
    /// The device is not running.
    NotRunning,
}

impl Classification {
    #[must_use]
    pub fn is_calibrating(&self) -> bool {
        matches!(self, Classification::Calibrating)
    }
}

/// Classifier over whole snapshots.
///
/// A disconnected snapshot never classifies as calibrating: the state and
/// stage fields are whatever the feed last had cached.
#[derive(Debug, Clone, Copy, Default)]
pub struct StageClassifier;

impl StageClassifier {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Classify a snapshot.
    #[must_use]
    pub fn classify(&self, snapshot: &StatusSnapshot) -> Classification {
        if !snapshot.connected || !snapshot.state.is_running() {
            Classification::NotRunning
        } else if is_active_stage(snapshot.current_stage_code) {
            Classification::Calibrating
        } else {
            Classification::RunningOther
        }
    }

    /// Shorthand for `classify(..).is_calibrating()`.
    #[must_use]
    pub fn is_calibrating(&self, snapshot: &StatusSnapshot) -> bool {
        self.classify(snapshot).is_calibrating()
    }
}

// =============================================================================
// TESTS
// =============================================================================
