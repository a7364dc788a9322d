//! # Core Type Definitions
//!
//! This module contains the shared vocabulary of the calibration engine:
//! - Device identity and capability (`DeviceId`, `DeviceProfile`)
//! - Calibration routines and the operator's choice of them
//!   (`CalibrationOption`, `Selection`)
//! - Status feed input (`StatusSnapshot`, `DeviceState`, `StageCode`)
//! - Error types (`CalibraError`)
//!
//! ## Wire Names
//!
//! `Selection` and `StatusSnapshot` serialize with the camelCase field names
//! used by the device bridge (`bedLeveling`, `currentStageCode`, ...), so the
//! same types serve as the start request payload, the persisted record and
//! the status snapshot body.

use crate::primitives::{MAX_DEVICE_ID_LENGTH, MAX_STAGE_NAME_LENGTH};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// =============================================================================
// DEVICE IDENTITY
// =============================================================================

/// Identity of a controlled device (serial number or similar).
///
/// Used as the key for the persisted selection record.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(pub String);

impl DeviceId {
    /// Create a device id, rejecting empty or oversized identities.
    pub fn new(id: impl Into<String>) -> Result<Self, CalibraError> {
        let id = id.into();
        let trimmed = id.trim();
        if trimmed.is_empty() || trimmed.len() > MAX_DEVICE_ID_LENGTH {
            return Err(CalibraError::InvalidDeviceId(id));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Get the identity as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A device identity plus the capability flags that shape its flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceProfile {
    pub id: DeviceId,
    /// Dual-extrusion devices expose nozzle offset calibration.
    pub dual_extrusion: bool,
}

impl DeviceProfile {
    #[must_use]
    pub fn new(id: DeviceId, dual_extrusion: bool) -> Self {
        Self { id, dual_extrusion }
    }
}

// =============================================================================
// CALIBRATION OPTIONS
// =============================================================================

/// One of the calibration routines an operator can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CalibrationOption {
    #[serde(rename = "bedLeveling")]
    BedLeveling,
    #[serde(rename = "vibration")]
    VibrationCompensation,
    #[serde(rename = "motorNoise")]
    MotorNoiseCancellation,
    #[serde(rename = "nozzleOffset")]
    NozzleOffset,
    #[serde(rename = "highTempHeatbed")]
    HighTempHeatbed,
}

impl CalibrationOption {
    /// Every option, in display order.
    pub const ALL: [CalibrationOption; 5] = [
        CalibrationOption::BedLeveling,
        CalibrationOption::VibrationCompensation,
        CalibrationOption::MotorNoiseCancellation,
        CalibrationOption::NozzleOffset,
        CalibrationOption::HighTempHeatbed,
    ];

    /// Field name used in start requests and persisted records.
    #[must_use]
    pub fn wire_name(&self) -> &'static str {
        match self {
            CalibrationOption::BedLeveling => "bedLeveling",
            CalibrationOption::VibrationCompensation => "vibration",
            CalibrationOption::MotorNoiseCancellation => "motorNoise",
            CalibrationOption::NozzleOffset => "nozzleOffset",
            CalibrationOption::HighTempHeatbed => "highTempHeatbed",
        }
    }

    /// Human-readable label.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            CalibrationOption::BedLeveling => "Bed leveling",
            CalibrationOption::VibrationCompensation => "Vibration compensation",
            CalibrationOption::MotorNoiseCancellation => "Motor noise cancellation",
            CalibrationOption::NozzleOffset => "Nozzle offset calibration",
            CalibrationOption::HighTempHeatbed => "High-temperature heatbed calibration",
        }
    }

    /// Whether this option only exists on dual-extrusion devices.
    #[must_use]
    pub fn requires_dual_extrusion(&self) -> bool {
        matches!(self, CalibrationOption::NozzleOffset)
    }

    /// Whether the option can be selected on the given device.
    #[must_use]
    pub fn is_available(&self, device: &DeviceProfile) -> bool {
        !self.requires_dual_extrusion() || device.dual_extrusion
    }
}

impl fmt::Display for CalibrationOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

impl FromStr for CalibrationOption {
    type Err = CalibraError;

    /// Accepts the wire name or a kebab-case alias (`bed-leveling`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "bedLeveling" | "bed-leveling" => Ok(CalibrationOption::BedLeveling),
            "vibration" | "vibration-compensation" => {
                Ok(CalibrationOption::VibrationCompensation)
            }
            "motorNoise" | "motor-noise-cancellation" => {
                Ok(CalibrationOption::MotorNoiseCancellation)
            }
            "nozzleOffset" | "nozzle-offset" => Ok(CalibrationOption::NozzleOffset),
            "highTempHeatbed" | "high-temperature-heatbed" => {
                Ok(CalibrationOption::HighTempHeatbed)
            }
            other => Err(CalibraError::UnknownOption(other.to_string())),
        }
    }
}

// =============================================================================
// SELECTION
// =============================================================================

/// Which calibration routines are requested.
///
/// Serialized as the five named booleans the device expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Selection {
    pub bed_leveling: bool,
    pub vibration: bool,
    pub motor_noise: bool,
    pub nozzle_offset: bool,
    pub high_temp_heatbed: bool,
}

impl Selection {
    /// Default selection for a device: everything except the high-temperature
    /// heatbed routine, with nozzle offset only on dual-extrusion devices.
    #[must_use]
    pub fn defaults_for(dual_extrusion: bool) -> Self {
        Self {
            bed_leveling: true,
            vibration: true,
            motor_noise: true,
            nozzle_offset: dual_extrusion,
            high_temp_heatbed: false,
        }
    }

    /// A selection with every option off.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            bed_leveling: false,
            vibration: false,
            motor_noise: false,
            nozzle_offset: false,
            high_temp_heatbed: false,
        }
    }

    /// Build a selection from the options that should be on.
    #[must_use]
    pub fn from_options(options: &[CalibrationOption]) -> Self {
        let mut selection = Self::none();
        for option in options {
            selection.set(*option, true);
        }
        selection
    }

    #[must_use]
    pub fn get(&self, option: CalibrationOption) -> bool {
        match option {
            CalibrationOption::BedLeveling => self.bed_leveling,
            CalibrationOption::VibrationCompensation => self.vibration,
            CalibrationOption::MotorNoiseCancellation => self.motor_noise,
            CalibrationOption::NozzleOffset => self.nozzle_offset,
            CalibrationOption::HighTempHeatbed => self.high_temp_heatbed,
        }
    }

    pub fn set(&mut self, option: CalibrationOption, enabled: bool) {
        let slot = match option {
            CalibrationOption::BedLeveling => &mut self.bed_leveling,
            CalibrationOption::VibrationCompensation => &mut self.vibration,
            CalibrationOption::MotorNoiseCancellation => &mut self.motor_noise,
            CalibrationOption::NozzleOffset => &mut self.nozzle_offset,
            CalibrationOption::HighTempHeatbed => &mut self.high_temp_heatbed,
        };
        *slot = enabled;
    }

    /// Options that are switched on, in display order.
    pub fn enabled(&self) -> impl Iterator<Item = CalibrationOption> + '_ {
        CalibrationOption::ALL
            .into_iter()
            .filter(move |option| self.get(*option))
    }

    /// Whether at least one option is on.
    #[must_use]
    pub fn any_selected(&self) -> bool {
        self.enabled().next().is_some()
    }

    /// Whether at least one option that the device can run is on.
    ///
    /// A stored `nozzleOffset: true` on a single-extrusion device does not
    /// count, since no step would be scheduled for it.
    #[must_use]
    pub fn any_effective(&self, device: &DeviceProfile) -> bool {
        self.enabled().any(|option| option.is_available(device))
    }
}

// =============================================================================
// STATUS FEED
// =============================================================================

/// Opaque stage code reported by the device for its current micro-operation.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct StageCode(pub i32);

impl StageCode {
    #[must_use]
    pub const fn value(self) -> i32 {
        self.0
    }
}

impl fmt::Display for StageCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Coarse run/idle state reported by the device.
///
/// Only `Running` matters to classification; unrecognized states from newer
/// firmware deserialize as `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum DeviceState {
    #[default]
    Idle,
    Prepare,
    Running,
    Pause,
    Finish,
    Failed,
    #[serde(other)]
    Unknown,
}

impl DeviceState {
    #[must_use]
    pub fn is_running(&self) -> bool {
        matches!(self, DeviceState::Running)
    }
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeviceState::Idle => "IDLE",
            DeviceState::Prepare => "PREPARE",
            DeviceState::Running => "RUNNING",
            DeviceState::Pause => "PAUSE",
            DeviceState::Finish => "FINISH",
            DeviceState::Failed => "FAILED",
            DeviceState::Unknown => "UNKNOWN",
        };
        f.write_str(name)
    }
}

/// One status report from the device.
///
/// Snapshots may repeat, arrive irregularly, and jump between stage codes in
/// any order. The engine never assumes anything about the sequence of codes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    pub connected: bool,
    pub state: DeviceState,
    pub current_stage_code: StageCode,
    #[serde(default)]
    pub current_stage_name: Option<String>,
}

impl StatusSnapshot {
    /// Create a connected snapshot without a stage name.
    #[must_use]
    pub fn new(state: DeviceState, stage: i32) -> Self {
        Self {
            connected: true,
            state,
            current_stage_code: StageCode(stage),
            current_stage_name: None,
        }
    }

    /// Snapshot for a device that is not reachable.
    #[must_use]
    pub fn disconnected() -> Self {
        Self {
            connected: false,
            state: DeviceState::Unknown,
            current_stage_code: StageCode(-1),
            current_stage_name: None,
        }
    }

    #[must_use]
    pub fn with_stage_name(mut self, name: impl Into<String>) -> Self {
        self.current_stage_name = Some(name.into());
        self
    }

    /// Check the snapshot against input limits.
    pub fn validate(&self) -> Result<(), CalibraError> {
        if let Some(name) = &self.current_stage_name
            && name.len() > MAX_STAGE_NAME_LENGTH
        {
            return Err(CalibraError::InvalidSnapshot(format!(
                "stage name length {} exceeds maximum {} bytes",
                name.len(),
                MAX_STAGE_NAME_LENGTH
            )));
        }
        Ok(())
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur in the Calibra engine.
///
/// Nothing here is fatal: callers log and keep the session interactive.
#[derive(Debug, Error)]
pub enum CalibraError {
    /// Unknown calibration option name.
    #[error("Unknown calibration option: {0}")]
    UnknownOption(String),

    /// The option exists but the device cannot run it.
    #[error("Option {0} is not available on this device")]
    OptionUnavailable(CalibrationOption),

    /// The selection cannot change while a calibration run is in progress.
    #[error("Selection is locked while calibration is running")]
    SelectionLocked,

    /// Device identity is empty or too long.
    #[error("Invalid device id: {0:?}")]
    InvalidDeviceId(String),

    /// Snapshot failed input validation.
    #[error("Invalid status snapshot: {0}")]
    InvalidSnapshot(String),

    /// A serialization or deserialization error occurred.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// The key-value store failed.
    #[error("Storage error: {0}")]
    StorageError(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    IoError(String),

    /// A start request was gated or refused by the device.
    #[error("Start request failed: {0}")]
    StartRejected(String),

    /// Configuration could not be loaded.
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

// =============================================================================
// TESTS
// =============================================================================
