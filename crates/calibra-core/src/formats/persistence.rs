//! # Persistence Format
//!
//! The persisted selection record: one JSON document per device.
//!
//! ```json
//! {"version":1,"bedLeveling":true,"vibration":true,"motorNoise":false,
//!  "nozzleOffset":false,"highTempHeatbed":false}
//! ```
//!
//! Decoding is strict: oversized input, bad JSON, missing fields and unknown
//! versions are all errors. Callers treat any decode error exactly like a
//! missing record.

use crate::primitives::{MAX_RECORD_SIZE, RECORD_VERSION, SELECTION_KEY_PREFIX};
use crate::types::{CalibraError, DeviceId, Selection};
use serde::{Deserialize, Serialize};

/// On-disk shape of a persisted selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionRecord {
    pub version: u8,
    #[serde(flatten)]
    pub selection: Selection,
}

impl SelectionRecord {
    #[must_use]
    pub fn new(selection: Selection) -> Self {
        Self {
            version: RECORD_VERSION,
            selection,
        }
    }
}

/// Storage key for a device's selection.
#[must_use]
pub fn selection_key(device: &DeviceId) -> String {
    format!("{}:{}", SELECTION_KEY_PREFIX, device.as_str())
}

/// Serialize a selection into its record form.
pub fn encode_selection(selection: &Selection) -> Result<String, CalibraError> {
    serde_json::to_string(&SelectionRecord::new(*selection))
        .map_err(|e| CalibraError::SerializationError(e.to_string()))
}

/// Parse a persisted record.
///
/// Size is checked before parsing.
pub fn decode_selection(raw: &str) -> Result<Selection, CalibraError> {
    if raw.len() > MAX_RECORD_SIZE {
        return Err(CalibraError::SerializationError(format!(
            "Record size {} bytes exceeds maximum allowed {} bytes",
            raw.len(),
            MAX_RECORD_SIZE
        )));
    }

    let record: SelectionRecord = serde_json::from_str(raw).map_err(|e| {
        CalibraError::SerializationError(format!("Failed to parse selection record: {}", e))
    })?;

    if record.version != RECORD_VERSION {
        return Err(CalibraError::SerializationError(format!(
            "Unsupported record version: {} (expected {})",
            record.version, RECORD_VERSION
        )));
    }

    Ok(record.selection)
}

// =============================================================================
// TESTS
// =============================================================================
