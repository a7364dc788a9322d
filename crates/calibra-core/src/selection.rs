//! # Selection Model
//!
//! Holds the operator's choice of calibration routines for one device and
//! moves it to and from the key-value store.
//!
//! Reads never fail from the caller's point of view: a missing record, a
//! malformed record, and a storage error all fall back to the device
//! defaults. Only the warning in the log tells them apart.

use crate::flow::{Flow, build_flow};
use crate::formats::{decode_selection, encode_selection, selection_key};
use crate::storage::KeyValueStore;
use crate::tracker::TrackerPhase;
use crate::types::{CalibraError, CalibrationOption, DeviceProfile, Selection};

/// Selection state for one device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionModel {
    device: DeviceProfile,
    selection: Selection,
}

impl SelectionModel {
    /// Model holding the device defaults.
    #[must_use]
    pub fn with_defaults(device: DeviceProfile) -> Self {
        let selection = Selection::defaults_for(device.dual_extrusion);
        Self { device, selection }
    }

    /// Model holding the persisted selection, or the defaults if there is
    /// no usable record.
    #[must_use]
    pub fn restore<S: KeyValueStore>(device: DeviceProfile, store: &S) -> Self {
        match Self::load(&device, store) {
            Some(selection) => Self { device, selection },
            None => Self::with_defaults(device),
        }
    }

    /// Read the persisted selection for a device.
    ///
    /// A stored nozzle offset flag is dropped for single-extrusion devices.
    #[must_use]
    pub fn load<S: KeyValueStore>(device: &DeviceProfile, store: &S) -> Option<Selection> {
        let key = selection_key(&device.id);
        let raw = match store.get(&key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(device = %device.id, error = %e, "selection read failed, using defaults");
                return None;
            }
        };

        match decode_selection(&raw) {
            Ok(mut selection) => {
                if !device.dual_extrusion {
                    selection.nozzle_offset = false;
                }
                Some(selection)
            }
            Err(e) => {
                tracing::warn!(device = %device.id, error = %e, "malformed selection record ignored");
                None
            }
        }
    }

    #[must_use]
    pub fn device(&self) -> &DeviceProfile {
        &self.device
    }

    #[must_use]
    pub fn selection(&self) -> Selection {
        self.selection
    }

    #[must_use]
    pub fn get(&self, option: CalibrationOption) -> bool {
        self.selection.get(option)
    }

    /// Options can only be edited while no run is in progress.
    #[must_use]
    pub fn is_editable(&self, phase: TrackerPhase) -> bool {
        phase != TrackerPhase::Running
    }

    /// Switch an option on or off.
    pub fn set(
        &mut self,
        option: CalibrationOption,
        enabled: bool,
        phase: TrackerPhase,
    ) -> Result<(), CalibraError> {
        if !self.is_editable(phase) {
            return Err(CalibraError::SelectionLocked);
        }
        if enabled && !option.is_available(&self.device) {
            return Err(CalibraError::OptionUnavailable(option));
        }
        self.selection.set(option, enabled);
        Ok(())
    }

    /// Replace the whole selection (used when restoring a run in progress).
    pub fn replace(&mut self, selection: Selection) {
        self.selection = selection;
    }

    /// Flow for the current selection.
    #[must_use]
    pub fn flow(&self) -> Flow {
        build_flow(&self.selection, self.device.dual_extrusion)
    }

    /// Write the current selection to the store.
    pub fn persist<S: KeyValueStore>(&self, store: &mut S) -> Result<(), CalibraError> {
        let raw = encode_selection(&self.selection)?;
        store.set(&selection_key(&self.device.id), &raw)
    }

    /// Remove the persisted record and go back to defaults.
    ///
    /// Returns whether a record existed.
    pub fn reset<S: KeyValueStore>(&mut self, store: &mut S) -> Result<bool, CalibraError> {
        self.selection = Selection::defaults_for(self.device.dual_extrusion);
        store.remove(&selection_key(&self.device.id))
    }
}

// =============================================================================
// TESTS
// =============================================================================
