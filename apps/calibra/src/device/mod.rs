//! # Device Module
//!
//! Everything that talks to the device bridge.
//!
//! - [`DeviceTransport`]: the two calls the app needs (start a run, read the
//!   current status). The rest of the app only sees this trait.
//! - [`DeviceClient`]: the reqwest implementation over HTTP.
//! - [`StatusFeed`]: periodic status polling producing snapshots.

mod client;
mod feed;

pub use client::DeviceClient;
pub use feed::{StatusFeed, run_status_feed};

use async_trait::async_trait;
use calibra_core::{StartRequest, StatusSnapshot};

// =============================================================================
// ERRORS
// =============================================================================

/// Errors from the device transport layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// Cannot reach the device bridge.
    ConnectionFailed(String),
    /// The device refused the request; carries its message.
    Rejected(String),
    /// 401 Unauthorized - invalid or missing token.
    Unauthorized,
    /// Bridge returned a 5xx error.
    ServerError(u16, String),
    /// Failed to parse response body.
    ParseError(String),
}

impl std::fmt::Display for ClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ConnectionFailed(url) => write!(f, "Cannot connect to device at {url}"),
            Self::Rejected(msg) => write!(f, "Device rejected the request: {msg}"),
            Self::Unauthorized => write!(f, "Unauthorized: invalid or missing device token"),
            Self::ServerError(status, msg) => write!(f, "Device error ({status}): {msg}"),
            Self::ParseError(msg) => write!(f, "Parse error: {msg}"),
        }
    }
}

impl std::error::Error for ClientError {}

// =============================================================================
// TRANSPORT
// =============================================================================

/// Connection to one device.
#[async_trait]
pub trait DeviceTransport: Send + Sync {
    /// Ask the device to start calibrating with the given options.
    async fn start(&self, request: &StartRequest) -> Result<(), ClientError>;

    /// Read the device's current status.
    async fn status(&self) -> Result<StatusSnapshot, ClientError>;
}
