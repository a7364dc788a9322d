//! # Start Dispatch
//!
//! The synchronous half of the action dispatcher: start preconditions and
//! the request payload. Sending the request is the app's job; the session
//! only records that a request is in flight and what came back.

use crate::types::{DeviceId, Selection};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a start request may not be sent right now.
///
/// These are gating reasons, not failures: the presentation layer disables
/// the start control and no request leaves the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StartBlocked {
    /// No snapshot yet, or the device reports disconnected.
    Disconnected,
    /// No option that the device can run is selected.
    NothingSelected,
    /// A start request is already outstanding.
    RequestInFlight,
    /// The device is already calibrating.
    AlreadyCalibrating,
    /// A start was accepted and the device has not reported running yet.
    AlreadyStarted,
    /// The last run completed; reset before starting another.
    AlreadyCompleted,
}

impl StartBlocked {
    #[must_use]
    pub fn message(&self) -> &'static str {
        match self {
            StartBlocked::Disconnected => "Device is not connected",
            StartBlocked::NothingSelected => "Select at least one calibration option",
            StartBlocked::RequestInFlight => "A start request is already in progress",
            StartBlocked::AlreadyCalibrating => "Device is already calibrating",
            StartBlocked::AlreadyStarted => "Calibration was started and is waiting for the device",
            StartBlocked::AlreadyCompleted => "Calibration completed; reset before starting again",
        }
    }
}

impl fmt::Display for StartBlocked {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// Payload of a start request: the device plus every option as a named
/// boolean.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRequest {
    pub device_id: DeviceId,
    #[serde(flatten)]
    pub selection: Selection,
}

impl StartRequest {
    #[must_use]
    pub fn new(device_id: DeviceId, selection: Selection) -> Self {
        Self {
            device_id,
            selection,
        }
    }
}
