//! # calibra-core
//!
//! The deterministic calibration progress engine for Calibra.
//!
//! A device reports nothing but a sequence of status snapshots (run state
//! plus a numeric stage code). This crate turns that sequence, together with
//! the operator's choice of routines, into an ordered step timeline and a
//! three-flag lifecycle: started, ever seen running, completed.
//!
//! ## Layout
//!
//! - `types`: device identity, options, selection, snapshots, errors
//! - `primitives`: stage code tables and limits
//! - `system`: stage code classification
//! - `flow`: selection to ordered step list
//! - `tracker`: lifecycle transitions and step status
//! - `selection` + `storage` + `formats`: persisted operator choice
//! - `dispatch` + `session`: start gating and the session aggregate
//!
//! ## Architectural Constraints
//!
//! - No async, no network dependencies (pure Rust)
//! - Every state change is a synchronous reaction to one event
//! - Storage is reached only through [`KeyValueStore`]

// =============================================================================
// MODULES
// =============================================================================

pub mod dispatch;
pub mod flow;
pub mod formats;
pub mod primitives;
pub mod selection;
pub mod session;
pub mod storage;
pub mod system;
pub mod tracker;
pub mod types;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{
    CalibraError, CalibrationOption, DeviceId, DeviceProfile, DeviceState, Selection, StageCode,
    StatusSnapshot,
};

// =============================================================================
// RE-EXPORTS: Engine
// =============================================================================

pub use dispatch::{StartBlocked, StartRequest};
pub use flow::{Flow, FlowStep, StepKind, build_flow};
pub use selection::SelectionModel;
pub use session::{CalibrationSession, SessionView, StepView};
pub use storage::{KeyValueStore, MemoryStore, RedbStore, StorageBackend};
pub use tracker::{
    ProgressState, StepStatus, TrackerPhase, TrackerUpdate, TransitionEvent, step_statuses,
    transition,
};

// =============================================================================
// RE-EXPORTS: Formats (from formats module)
// =============================================================================

pub use formats::{decode_selection, encode_selection, selection_key};

// =============================================================================
// RE-EXPORTS: System (from system module)
// =============================================================================

pub use system::{Classification, StageClassifier, is_calibrating};
