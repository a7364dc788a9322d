//! # Action Dispatcher
//!
//! The asynchronous half of starting a run. The session decides whether a
//! start may go out and records the answer; this module sends it.
//!
//! The session lock is never held across the device call: snapshots keep
//! flowing while the request is outstanding, and the in-flight flag inside
//! the session gates a second submission. The device call runs in its own
//! task, so neither closing the overlay nor dropping the caller (an HTTP
//! client hanging up) cancels it; its answer is recorded whenever it
//! arrives.

use crate::device::DeviceTransport;
use calibra_core::{CalibrationSession, SessionView, StartBlocked};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Session shared between the HTTP handlers, the feed, and the dispatcher.
pub type SharedSession = Arc<RwLock<CalibrationSession>>;

/// What happened to a start request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    /// The device accepted the run.
    Accepted,
    /// The device refused or could not be reached; carries the message.
    Rejected(String),
}

/// Sends start requests for one session.
#[derive(Clone)]
pub struct ActionDispatcher {
    session: SharedSession,
    transport: Arc<dyn DeviceTransport>,
}

impl ActionDispatcher {
    #[must_use]
    pub fn new(session: SharedSession, transport: Arc<dyn DeviceTransport>) -> Self {
        Self { session, transport }
    }

    #[must_use]
    pub fn session(&self) -> &SharedSession {
        &self.session
    }

    #[must_use]
    pub fn transport(&self) -> &Arc<dyn DeviceTransport> {
        &self.transport
    }

    /// Send a start request if the session allows one.
    ///
    /// A gated start returns the blocking reason and nothing is sent. Once
    /// sent, the request completes even if the returned future is dropped.
    pub async fn start(&self) -> Result<StartOutcome, StartBlocked> {
        let request = {
            let mut session = self.session.write().await;
            session.begin_start()?
        };

        tracing::info!(
            device = %request.device_id,
            options = ?request.selection,
            "sending start request"
        );

        let session = self.session.clone();
        let transport = self.transport.clone();
        let task = tokio::spawn(async move {
            let result = transport.start(&request).await;
            let mut session = session.write().await;
            match result {
                Ok(()) => {
                    session.finish_start(Ok(()));
                    StartOutcome::Accepted
                }
                Err(e) => {
                    let message = e.to_string();
                    session.finish_start(Err(message.clone()));
                    StartOutcome::Rejected(message)
                }
            }
        });

        match task.await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                let message = format!("start request aborted: {e}");
                tracing::error!(%message);
                let mut session = self.session.write().await;
                if session.request_in_flight() {
                    session.finish_start(Err(message.clone()));
                }
                Ok(StartOutcome::Rejected(message))
            }
        }
    }

    /// Current view of the session.
    pub async fn view(&self) -> SessionView {
        self.session.read().await.view()
    }
}

// =============================================================================
// TESTS
// =============================================================================
