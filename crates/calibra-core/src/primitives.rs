//! # Innate Primitives
//!
//! Hardcoded constants for the Calibra core.
//!
//! The stage-code table is compiled in. Codes are opaque keys reported by
//! device firmware; their only meaning here is which flow step they belong
//! to. Some steps are reported under more than one code depending on the
//! firmware generation.

/// Homing the toolhead before any routine.
pub const STAGE_HOMING: &[i32] = &[13];

/// Waiting for the heatbed to cool before leveling.
pub const STAGE_COOLING: &[i32] = &[29];

/// Auto bed leveling, first pass. Older firmware reports 1, newer reports 47.
pub const STAGE_BED_LEVELING_PHASE_1: &[i32] = &[1, 47];

/// Motor noise cancellation (measurement and playback).
pub const STAGE_MOTOR_NOISE: &[i32] = &[25, 31];

/// Vibration compensation sweep.
pub const STAGE_VIBRATION: &[i32] = &[3];

/// Auto bed leveling, second pass.
pub const STAGE_BED_LEVELING_PHASE_2: &[i32] = &[48];

/// Nozzle offset calibration (dual-extrusion devices only).
pub const STAGE_NOZZLE_OFFSET: &[i32] = &[39, 40];

/// High-temperature heatbed calibration.
pub const STAGE_HIGH_TEMP_HEATBED: &[i32] = &[43];

/// Prefix of the key under which a device's selection is persisted.
///
/// The full key is `calibration_selection:<device id>`.
pub const SELECTION_KEY_PREFIX: &str = "calibration_selection";

/// Current persisted selection record version.
///
/// Increment this when making breaking changes to the record layout.
pub const RECORD_VERSION: u8 = 1;

// =============================================================================
// INPUT VALIDATION LIMITS
// =============================================================================

/// Maximum length for a device identity.
pub const MAX_DEVICE_ID_LENGTH: usize = 128;

/// Maximum length for a stage name carried in a snapshot.
pub const MAX_STAGE_NAME_LENGTH: usize = 256;

/// Maximum size of a persisted selection record.
///
/// Anything larger is treated as malformed without being parsed.
pub const MAX_RECORD_SIZE: usize = 4096;

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn step_codes_do_not_overlap() {
        let tables = [
            STAGE_HOMING,
            STAGE_COOLING,
            STAGE_BED_LEVELING_PHASE_1,
            STAGE_MOTOR_NOISE,
            STAGE_VIBRATION,
            STAGE_BED_LEVELING_PHASE_2,
            STAGE_NOZZLE_OFFSET,
            STAGE_HIGH_TEMP_HEATBED,
        ];
        let mut seen = BTreeSet::new();
        for table in tables {
            for code in table {
                assert!(seen.insert(*code), "stage code {code} bound twice");
            }
        }
    }
}
