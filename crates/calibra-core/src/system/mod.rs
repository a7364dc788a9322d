//! # System Module
//!
//! Stage classification: deciding from a single snapshot whether the device
//! is currently executing a calibration routine.
//!
//! The classification is pure and deterministic, so it lives in the core
//! next to the tracker that consumes it.

mod stage;

pub use stage::*;
