//! # calibra
//!
//! Library half of the Calibra binary: everything the CLI and the HTTP
//! server share, exposed so integration tests can drive it directly.
//!
//! - `api` - axum router standing in for the calibration overlay
//! - `config` - layered configuration (defaults, TOML, environment)
//! - `device` - device transport, reqwest client, status feed
//! - `dispatcher` - async start dispatch around the core session

pub mod api;
pub mod config;
pub mod device;
pub mod dispatcher;

pub use config::Config;
pub use device::{ClientError, DeviceClient, DeviceTransport, StatusFeed};
pub use dispatcher::{ActionDispatcher, SharedSession, StartOutcome};
