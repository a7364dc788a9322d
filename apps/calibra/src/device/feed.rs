//! # Status Feed
//!
//! Polls the device on a fixed interval and turns each answer into a
//! snapshot. A failed poll becomes a disconnected snapshot, which the
//! tracker ignores, so an unreachable bridge never fakes a completion.

use super::DeviceTransport;
use crate::dispatcher::SharedSession;
use calibra_core::StatusSnapshot;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Interval, MissedTickBehavior};

/// Periodic snapshot source for one device.
pub struct StatusFeed {
    transport: Arc<dyn DeviceTransport>,
    interval: Interval,
    reachable: bool,
}

impl StatusFeed {
    /// Create a feed polling every `period`. The first poll fires at once.
    pub fn new(transport: Arc<dyn DeviceTransport>, period: Duration) -> Self {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self {
            transport,
            interval,
            reachable: true,
        }
    }

    /// Wait for the next tick and fetch one snapshot.
    pub async fn next(&mut self) -> StatusSnapshot {
        self.interval.tick().await;
        self.poll().await
    }

    /// Fetch one snapshot without waiting.
    pub async fn poll(&mut self) -> StatusSnapshot {
        match self.transport.status().await {
            Ok(snapshot) => {
                if !self.reachable {
                    tracing::info!("device reachable again");
                }
                self.reachable = true;
                snapshot
            }
            Err(e) => {
                if self.reachable {
                    tracing::warn!(error = %e, "device status unavailable");
                }
                self.reachable = false;
                StatusSnapshot::disconnected()
            }
        }
    }
}

/// Apply feed snapshots to the session until `shutdown` resolves.
///
/// While the overlay is closed the session drops snapshots itself, so the
/// feed keeps polling unconditionally.
pub async fn run_status_feed(
    mut feed: StatusFeed,
    session: SharedSession,
    shutdown: impl Future<Output = ()>,
) {
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            () = &mut shutdown => {
                tracing::debug!("status feed stopped");
                return;
            }
            snapshot = feed.next() => {
                let mut guard = session.write().await;
                if let Err(e) = guard.observe(&snapshot) {
                    tracing::warn!(error = %e, "snapshot rejected");
                }
            }
        }
    }
}
