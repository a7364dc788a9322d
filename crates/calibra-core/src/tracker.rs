//! # Progress Tracker
//!
//! The state machine that turns status snapshots into a calibration
//! lifecycle.
//!
//! ## Flags
//!
//! All lifecycle information lives in one owned [`ProgressState`]:
//! - `started`: a run was requested here, or observed running
//! - `ever_seen_running`: the device was observed calibrating during this
//!   attempt (monotonic until reset)
//! - `completed`: the device stopped calibrating after having been seen
//!   calibrating
//!
//! ## Phases
//!
//! | Phase | started | completed |
//! |-------|---------|-----------|
//! | Idle | false | false |
//! | Running | true | false |
//! | Completed | - | true |
//!
//! `Completed` only leaves through an explicit reset. Nothing here has a
//! timeout: once the device has been seen calibrating, the tracker waits for
//! a non-calibrating snapshot for as long as it takes.

use crate::flow::{Flow, FlowStep};
use crate::system::StageClassifier;
use crate::types::{StageCode, StatusSnapshot};
use serde::{Deserialize, Serialize};

// =============================================================================
// PROGRESS STATE
// =============================================================================

/// Lifecycle flags of one calibration attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ProgressState {
    pub started: bool,
    pub ever_seen_running: bool,
    pub completed: bool,
}

impl ProgressState {
    /// Fresh state: nothing started.
    #[must_use]
    pub const fn idle() -> Self {
        Self {
            started: false,
            ever_seen_running: false,
            completed: false,
        }
    }

    /// State for a session that opens onto a run already in progress.
    #[must_use]
    pub const fn resumed() -> Self {
        Self {
            started: true,
            ever_seen_running: true,
            completed: false,
        }
    }

    /// Derived phase.
    #[must_use]
    pub fn phase(&self) -> TrackerPhase {
        if self.completed {
            TrackerPhase::Completed
        } else if self.started {
            TrackerPhase::Running
        } else {
            TrackerPhase::Idle
        }
    }

    /// Optimistically mark a run as started after the device accepted a
    /// start request, ahead of the first RUNNING snapshot.
    ///
    /// Only meaningful from `Idle`; a running or completed state is returned
    /// unchanged.
    #[must_use]
    pub fn accept_start(self) -> Self {
        if self.phase() == TrackerPhase::Idle {
            Self {
                started: true,
                ..self
            }
        } else {
            self
        }
    }

    /// Started, but the device has not acknowledged yet.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.phase() == TrackerPhase::Running && !self.ever_seen_running
    }
}

/// Coarse phase of the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackerPhase {
    Idle,
    Running,
    Completed,
}

impl TrackerPhase {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            TrackerPhase::Idle => "idle",
            TrackerPhase::Running => "running",
            TrackerPhase::Completed => "completed",
        }
    }
}

impl std::fmt::Display for TrackerPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// TRANSITION
// =============================================================================

/// Notable edge taken by a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionEvent {
    /// The device was seen calibrating for the first time this attempt.
    RunObserved,
    /// The device stopped calibrating after having been seen calibrating.
    RunCompleted,
}

/// Result of applying one snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerUpdate {
    pub state: ProgressState,
    /// Index of the flow step the snapshot's stage code belongs to.
    pub current_step: Option<usize>,
    pub event: Option<TransitionEvent>,
}

impl TrackerUpdate {
    /// Whether the flags changed.
    #[must_use]
    pub fn changed_from(&self, previous: &ProgressState) -> bool {
        self.state != *previous
    }
}

/// Apply one snapshot to the previous state.
///
/// - calibrating: `started` and `ever_seen_running` become true; a
///   `completed` flag carried over from an earlier attempt is cleared the
///   first time the new run is seen
/// - not calibrating after having been seen: `completed` becomes true
/// - disconnected snapshots carry no information and leave the flags alone
///
/// Applying the same snapshot twice yields the same state as applying it
/// once.
#[must_use]
pub fn transition(
    previous: ProgressState,
    flow: &Flow,
    snapshot: &StatusSnapshot,
) -> TrackerUpdate {
    let current_step = current_step_index(flow, snapshot.current_stage_code);

    if !snapshot.connected {
        return TrackerUpdate {
            state: previous,
            current_step,
            event: None,
        };
    }

    let calibrating = StageClassifier::new().is_calibrating(snapshot);
    let mut state = previous;
    let mut event = None;

    if calibrating {
        state.started = true;
        if !state.ever_seen_running {
            state.ever_seen_running = true;
            state.completed = false;
            event = Some(TransitionEvent::RunObserved);
        }
    } else if state.ever_seen_running && !state.completed {
        state.completed = true;
        event = Some(TransitionEvent::RunCompleted);
    }

    TrackerUpdate {
        state,
        current_step,
        event,
    }
}

/// Index of the first flow step reported under `code`.
#[must_use]
pub fn current_step_index(flow: &Flow, code: StageCode) -> Option<usize> {
    flow.index_of(code)
}

/// Fallback label for a snapshot whose stage code is outside the flow.
///
/// Returns the device-supplied stage name, if any, only when no step matches.
#[must_use]
pub fn fallback_label<'a>(flow: &Flow, snapshot: &'a StatusSnapshot) -> Option<&'a str> {
    if flow.contains_code(snapshot.current_stage_code) {
        return None;
    }
    snapshot
        .current_stage_name
        .as_deref()
        .filter(|name| !name.trim().is_empty())
}

// =============================================================================
// STEP STATUS
// =============================================================================

/// Display status of one flow step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Active,
    Complete,
}

/// Status of a step given the tracker state and the latest stage code.
///
/// Active iff running, not completed, and the step is reported under the
/// current code. An optimistic start counts as running.
#[must_use]
pub fn step_status(state: &ProgressState, step: &FlowStep, current: Option<StageCode>) -> StepStatus {
    match state.phase() {
        TrackerPhase::Completed => StepStatus::Complete,
        TrackerPhase::Idle => StepStatus::Pending,
        TrackerPhase::Running => match current {
            Some(code) if step.matches(code) => StepStatus::Active,
            _ => StepStatus::Pending,
        },
    }
}

/// Status of every step in the flow.
#[must_use]
pub fn step_statuses(
    state: &ProgressState,
    flow: &Flow,
    current: Option<StageCode>,
) -> Vec<StepStatus> {
    let index = current.and_then(|code| current_step_index(flow, code));
    flow.steps()
        .iter()
        .map(|step| {
            let before_current = index.is_some_and(|i| step.order < i);
            if state.phase() == TrackerPhase::Running && before_current {
                StepStatus::Complete
            } else {
                step_status(state, step, current)
            }
        })
        .collect()
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::build_flow;
    use crate::types::{CalibrationOption, DeviceState, Selection};

    fn bed_leveling_flow() -> Flow {
        build_flow(
            &Selection::from_options(&[CalibrationOption::BedLeveling]),
            false,
        )
    }

    fn running(code: i32) -> StatusSnapshot {
        StatusSnapshot::new(DeviceState::Running, code)
    }

    #[test]
    fn idle_snapshot_keeps_idle() {
        let flow = bed_leveling_flow();
        let update = transition(
            ProgressState::idle(),
            &flow,
            &StatusSnapshot::new(DeviceState::Idle, 0),
        );
        assert_eq!(update.state, ProgressState::idle());
        assert_eq!(update.event, None);
    }

    #[test]
    fn external_run_starts_tracker() {
        let flow = bed_leveling_flow();
        let update = transition(ProgressState::idle(), &flow, &running(13));
        assert_eq!(update.state, ProgressState::resumed());
        assert_eq!(update.event, Some(TransitionEvent::RunObserved));
        assert_eq!(update.current_step, Some(0));
    }

    #[test]
    fn stop_after_seen_completes() {
        let flow = bed_leveling_flow();
        let update = transition(
            ProgressState::resumed(),
            &flow,
            &StatusSnapshot::new(DeviceState::Idle, 48),
        );
        assert!(update.state.completed);
        assert_eq!(update.state.phase(), TrackerPhase::Completed);
        assert_eq!(update.event, Some(TransitionEvent::RunCompleted));
        assert_eq!(update.current_step, Some(3));
    }

    #[test]
    fn pending_start_does_not_complete_before_device_acknowledges() {
        let flow = bed_leveling_flow();
        let pending = ProgressState::idle().accept_start();
        assert!(pending.is_pending());

        let update = transition(pending, &flow, &StatusSnapshot::new(DeviceState::Idle, 48));
        assert_eq!(update.state, pending);
        assert_eq!(update.state.phase(), TrackerPhase::Running);
    }

    #[test]
    fn pending_start_reconciles_with_running_snapshot() {
        let flow = bed_leveling_flow();
        let pending = ProgressState::idle().accept_start();
        let update = transition(pending, &flow, &running(13));
        assert_eq!(update.state, ProgressState::resumed());
    }

    #[test]
    fn stale_completion_cleared_when_new_run_seen() {
        let flow = bed_leveling_flow();
        let stale = ProgressState {
            started: false,
            ever_seen_running: false,
            completed: true,
        };
        let update = transition(stale, &flow, &running(1));
        assert!(!update.state.completed);
        assert!(update.state.ever_seen_running);
    }

    #[test]
    fn completed_is_sticky() {
        let flow = bed_leveling_flow();
        let done = ProgressState {
            completed: true,
            ..ProgressState::resumed()
        };
        let update = transition(done, &flow, &running(1));
        assert_eq!(update.state.phase(), TrackerPhase::Completed);
    }

    #[test]
    fn disconnected_gap_does_not_complete() {
        let flow = bed_leveling_flow();
        let update = transition(
            ProgressState::resumed(),
            &flow,
            &StatusSnapshot::disconnected(),
        );
        assert_eq!(update.state, ProgressState::resumed());
    }

    #[test]
    fn fallback_label_only_outside_flow() {
        let flow = bed_leveling_flow();
        let inside = running(1).with_stage_name("Auto bed leveling");
        assert_eq!(fallback_label(&flow, &inside), None);

        let outside = running(0).with_stage_name("Printing");
        assert_eq!(fallback_label(&flow, &outside), Some("Printing"));
    }

    #[test]
    fn statuses_while_running() {
        let flow = bed_leveling_flow();
        let statuses = step_statuses(&ProgressState::resumed(), &flow, Some(StageCode(1)));
        assert_eq!(
            statuses,
            vec![
                StepStatus::Complete,
                StepStatus::Complete,
                StepStatus::Active,
                StepStatus::Pending
            ]
        );
    }

    #[test]
    fn statuses_when_code_outside_flow() {
        let flow = bed_leveling_flow();
        let statuses = step_statuses(&ProgressState::resumed(), &flow, Some(StageCode(0)));
        assert!(statuses.iter().all(|s| *s == StepStatus::Pending));
    }

    #[test]
    fn statuses_when_completed() {
        let flow = bed_leveling_flow();
        let done = ProgressState {
            completed: true,
            ..ProgressState::resumed()
        };
        let statuses = step_statuses(&done, &flow, Some(StageCode(13)));
        assert!(statuses.iter().all(|s| *s == StepStatus::Complete));
    }

    #[test]
    fn statuses_after_optimistic_start_follow_current_code() {
        let flow = bed_leveling_flow();
        let pending = ProgressState::idle().accept_start();
        assert_eq!(pending.phase(), TrackerPhase::Running);

        let statuses = step_statuses(&pending, &flow, Some(StageCode(1)));
        assert_eq!(
            statuses,
            vec![
                StepStatus::Complete,
                StepStatus::Complete,
                StepStatus::Active,
                StepStatus::Pending
            ]
        );
    }
}
