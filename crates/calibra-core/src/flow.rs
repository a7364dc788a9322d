//! # Flow Builder
//!
//! Turns a selection plus device capability into the ordered list of steps
//! the device is expected to walk through.
//!
//! The order is a fixed table modelling the device's known execution order.
//! It is never inferred from the snapshots themselves. A flow is recomputed
//! whenever the selection changes, never patched in place.
//!
//! | Order | Step | Guard |
//! |-------|------|-------|
//! | 1 | Homing | always |
//! | 2 | Cooling | bed leveling or high-temperature heatbed |
//! | 3 | Bed leveling (phase 1) | bed leveling |
//! | 4 | Motor noise cancellation | motor noise |
//! | 5 | Vibration compensation | vibration |
//! | 6 | Bed leveling (phase 2) | bed leveling |
//! | 7 | Nozzle offset calibration | dual extrusion and nozzle offset |
//! | 8 | High-temperature heatbed calibration | high-temperature heatbed |

use crate::primitives;
use crate::types::{Selection, StageCode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

// =============================================================================
// STEP KINDS
// =============================================================================

/// The fixed set of steps a calibration run can contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Homing,
    Cooling,
    BedLevelingPhase1,
    MotorNoiseCancellation,
    VibrationCompensation,
    BedLevelingPhase2,
    NozzleOffset,
    HighTempHeatbed,
}

impl StepKind {
    /// Every step, in execution order.
    pub const ORDERED: [StepKind; 8] = [
        StepKind::Homing,
        StepKind::Cooling,
        StepKind::BedLevelingPhase1,
        StepKind::MotorNoiseCancellation,
        StepKind::VibrationCompensation,
        StepKind::BedLevelingPhase2,
        StepKind::NozzleOffset,
        StepKind::HighTempHeatbed,
    ];

    /// Display name of the step.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            StepKind::Homing => "Homing",
            StepKind::Cooling => "Cooling",
            StepKind::BedLevelingPhase1 => "Bed leveling (phase 1)",
            StepKind::MotorNoiseCancellation => "Motor noise cancellation",
            StepKind::VibrationCompensation => "Vibration compensation",
            StepKind::BedLevelingPhase2 => "Bed leveling (phase 2)",
            StepKind::NozzleOffset => "Nozzle offset calibration",
            StepKind::HighTempHeatbed => "High-temperature heatbed calibration",
        }
    }

    /// Raw stage codes that report this step.
    #[must_use]
    pub fn raw_codes(&self) -> &'static [i32] {
        match self {
            StepKind::Homing => primitives::STAGE_HOMING,
            StepKind::Cooling => primitives::STAGE_COOLING,
            StepKind::BedLevelingPhase1 => primitives::STAGE_BED_LEVELING_PHASE_1,
            StepKind::MotorNoiseCancellation => primitives::STAGE_MOTOR_NOISE,
            StepKind::VibrationCompensation => primitives::STAGE_VIBRATION,
            StepKind::BedLevelingPhase2 => primitives::STAGE_BED_LEVELING_PHASE_2,
            StepKind::NozzleOffset => primitives::STAGE_NOZZLE_OFFSET,
            StepKind::HighTempHeatbed => primitives::STAGE_HIGH_TEMP_HEATBED,
        }
    }

    /// Stage codes that report this step.
    #[must_use]
    pub fn stage_codes(&self) -> BTreeSet<StageCode> {
        self.raw_codes().iter().copied().map(StageCode).collect()
    }

    /// Whether this step is scheduled for the given selection.
    #[must_use]
    pub fn is_scheduled(&self, selection: &Selection, dual_extrusion: bool) -> bool {
        match self {
            StepKind::Homing => true,
            StepKind::Cooling => selection.bed_leveling || selection.high_temp_heatbed,
            StepKind::BedLevelingPhase1 | StepKind::BedLevelingPhase2 => selection.bed_leveling,
            StepKind::MotorNoiseCancellation => selection.motor_noise,
            StepKind::VibrationCompensation => selection.vibration,
            StepKind::NozzleOffset => dual_extrusion && selection.nozzle_offset,
            StepKind::HighTempHeatbed => selection.high_temp_heatbed,
        }
    }
}

// =============================================================================
// FLOW
// =============================================================================

/// One expected step of a calibration run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlowStep {
    pub kind: StepKind,
    pub name: &'static str,
    pub stage_codes: BTreeSet<StageCode>,
    /// Zero-based position within the flow.
    pub order: usize,
}

impl FlowStep {
    /// Whether this step is reported under the given stage code.
    #[must_use]
    pub fn matches(&self, code: StageCode) -> bool {
        self.stage_codes.contains(&code)
    }
}

/// The ordered steps for one session.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(transparent)]
pub struct Flow {
    steps: Vec<FlowStep>,
}

impl Flow {
    #[must_use]
    pub fn steps(&self) -> &[FlowStep] {
        &self.steps
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// An empty flow means nothing is selected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Step names in order.
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.steps.iter().map(|step| step.name).collect()
    }

    /// Index of the first step reported under `code`.
    #[must_use]
    pub fn index_of(&self, code: StageCode) -> Option<usize> {
        self.steps.iter().position(|step| step.matches(code))
    }

    /// Whether any step of the flow is reported under `code`.
    #[must_use]
    pub fn contains_code(&self, code: StageCode) -> bool {
        self.index_of(code).is_some()
    }
}

/// Build the flow for a selection.
///
/// Returns an empty flow when no option is selected; homing is only listed
/// when there is something to run after it. Identical inputs always produce
/// identical, identically ordered output.
#[must_use]
pub fn build_flow(selection: &Selection, dual_extrusion: bool) -> Flow {
    if !selection.any_selected() {
        return Flow::default();
    }

    let steps = StepKind::ORDERED
        .iter()
        .filter(|kind| kind.is_scheduled(selection, dual_extrusion))
        .enumerate()
        .map(|(order, kind)| FlowStep {
            kind: *kind,
            name: kind.name(),
            stage_codes: kind.stage_codes(),
            order,
        })
        .collect();

    Flow { steps }
}

// =============================================================================
// TESTS
// =============================================================================
