//! # Session Module
//!
//! One calibration overlay session: selection, flow, progress flags, the
//! latest snapshot and the start request bookkeeping, owned together so
//! that every event is applied atomically.
//!
//! ## Lifecycle
//!
//! - `open`: a fresh session. If the first snapshot is already calibrating
//!   the run was started elsewhere; the session resumes it with the
//!   persisted selection.
//! - `close`: dismissal. Snapshots are no longer applied, but the flags, the
//!   selection and any in-flight request survive.
//! - `reopen`: resubscribe and apply the current snapshot.
//! - `reset`: back to idle, optionally clearing the persisted selection.
//!
//! ## Events
//!
//! Every mutation is a synchronous reaction to one event: a snapshot
//! (`observe`) or an operator action (`set_option`, `begin_start`,
//! `finish_start`, `reset`, `close`).

use crate::dispatch::{StartBlocked, StartRequest};
use crate::flow::Flow;
use crate::selection::SelectionModel;
use crate::storage::{KeyValueStore, StorageBackend};
use crate::system::StageClassifier;
use crate::tracker::{
    ProgressState, StepStatus, TrackerPhase, TransitionEvent, fallback_label, step_statuses,
    transition,
};
use crate::types::{
    CalibraError, CalibrationOption, DeviceProfile, DeviceState, Selection, StatusSnapshot,
};
use serde::{Deserialize, Serialize};

/// A calibration overlay session for one device.
#[derive(Debug)]
pub struct CalibrationSession<S: KeyValueStore = StorageBackend> {
    store: S,
    selection: SelectionModel,
    flow: Flow,
    progress: ProgressState,
    last_snapshot: Option<StatusSnapshot>,
    current_step: Option<usize>,
    open: bool,
    request_in_flight: bool,
    last_error: Option<String>,
}

impl<S: KeyValueStore> CalibrationSession<S> {
    /// Open a new session with the first snapshot from the feed.
    pub fn open(
        device: DeviceProfile,
        store: S,
        first: &StatusSnapshot,
    ) -> Result<Self, CalibraError> {
        first.validate()?;

        let resuming = StageClassifier::new().is_calibrating(first);
        let (selection, progress) = if resuming {
            tracing::info!(device = %device.id, stage = %first.current_stage_code, "calibration already running, resuming");
            (
                SelectionModel::restore(device, &store),
                ProgressState::resumed(),
            )
        } else {
            (SelectionModel::with_defaults(device), ProgressState::idle())
        };

        let mut session = Self {
            flow: selection.flow(),
            store,
            selection,
            progress,
            last_snapshot: None,
            current_step: None,
            open: true,
            request_in_flight: false,
            last_error: None,
        };
        session.apply(first);
        Ok(session)
    }

    // =========================================================================
    // OVERLAY VISIBILITY
    // =========================================================================

    /// Dismiss the overlay. Progress and any in-flight request are kept.
    pub fn close(&mut self) {
        if self.open {
            tracing::debug!(device = %self.selection.device().id, phase = %self.phase(), "session closed");
        }
        self.open = false;
    }

    /// Show the overlay again and apply the current snapshot.
    ///
    /// A run that began while the overlay was closed is picked up the same
    /// way `open` picks one up: the persisted selection is restored.
    pub fn reopen(&mut self, snapshot: &StatusSnapshot) -> Result<(), CalibraError> {
        snapshot.validate()?;
        self.open = true;

        let calibrating = StageClassifier::new().is_calibrating(snapshot);
        if calibrating && self.phase() == TrackerPhase::Idle && !self.request_in_flight {
            self.load_persisted();
        }

        self.apply(snapshot);
        Ok(())
    }

    /// Replace the selection with the persisted one, if any.
    ///
    /// Returns whether a record was found.
    pub fn restore_persisted_selection(&mut self) -> Result<bool, CalibraError> {
        if !self.selection.is_editable(self.phase()) {
            return Err(CalibraError::SelectionLocked);
        }
        Ok(self.load_persisted())
    }

    fn load_persisted(&mut self) -> bool {
        let device = self.selection.device().clone();
        match SelectionModel::load(&device, &self.store) {
            Some(selection) => {
                self.selection.replace(selection);
                self.flow = self.selection.flow();
                self.recompute_step();
                true
            }
            None => false,
        }
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.open
    }

    // =========================================================================
    // SNAPSHOTS
    // =========================================================================

    /// Apply a snapshot from the feed.
    ///
    /// Returns the transition event, if any. Snapshots delivered while the
    /// overlay is closed are dropped.
    pub fn observe(
        &mut self,
        snapshot: &StatusSnapshot,
    ) -> Result<Option<TransitionEvent>, CalibraError> {
        snapshot.validate()?;
        if !self.open {
            tracing::trace!("snapshot dropped, session closed");
            return Ok(None);
        }
        Ok(self.apply(snapshot))
    }

    fn apply(&mut self, snapshot: &StatusSnapshot) -> Option<TransitionEvent> {
        let previous = self.progress;
        let update = transition(previous, &self.flow, snapshot);

        if update.changed_from(&previous) {
            tracing::debug!(
                from = ?previous,
                to = ?update.state,
                stage = %snapshot.current_stage_code,
                "progress transition"
            );
        }
        match update.event {
            Some(TransitionEvent::RunObserved) => {
                tracing::info!(device = %self.selection.device().id, "calibration running");
            }
            Some(TransitionEvent::RunCompleted) => {
                tracing::info!(device = %self.selection.device().id, "calibration completed");
            }
            None => {}
        }

        self.progress = update.state;
        self.current_step = update.current_step;
        self.last_snapshot = Some(snapshot.clone());
        update.event
    }

    // =========================================================================
    // SELECTION
    // =========================================================================

    /// Switch an option on or off and rebuild the flow.
    pub fn set_option(
        &mut self,
        option: CalibrationOption,
        enabled: bool,
    ) -> Result<(), CalibraError> {
        self.selection.set(option, enabled, self.phase())?;
        self.flow = self.selection.flow();
        self.recompute_step();
        Ok(())
    }

    fn recompute_step(&mut self) {
        self.current_step = self
            .last_snapshot
            .as_ref()
            .and_then(|s| self.flow.index_of(s.current_stage_code));
    }

    // =========================================================================
    // START DISPATCH
    // =========================================================================

    /// First precondition that blocks a start request, if any.
    #[must_use]
    pub fn start_blocked(&self) -> Option<StartBlocked> {
        let connected = self.last_snapshot.as_ref().is_some_and(|s| s.connected);
        if !connected {
            return Some(StartBlocked::Disconnected);
        }
        if !self.selection.selection().any_effective(self.selection.device()) {
            return Some(StartBlocked::NothingSelected);
        }
        if self.request_in_flight {
            return Some(StartBlocked::RequestInFlight);
        }
        if self.is_calibrating() {
            return Some(StartBlocked::AlreadyCalibrating);
        }
        match self.phase() {
            TrackerPhase::Completed => Some(StartBlocked::AlreadyCompleted),
            TrackerPhase::Running => Some(StartBlocked::AlreadyStarted),
            TrackerPhase::Idle => None,
        }
    }

    /// Check preconditions and mark a request as in flight.
    ///
    /// The returned payload must be sent exactly once and its outcome passed
    /// to [`finish_start`](Self::finish_start).
    pub fn begin_start(&mut self) -> Result<StartRequest, StartBlocked> {
        if let Some(blocked) = self.start_blocked() {
            tracing::debug!(reason = ?blocked, "start request gated");
            return Err(blocked);
        }
        self.request_in_flight = true;
        self.last_error = None;
        Ok(StartRequest::new(
            self.selection.device().id.clone(),
            self.selection.selection(),
        ))
    }

    /// Record the device's answer to a start request.
    ///
    /// Accepted: the selection is persisted and the run is marked started
    /// ahead of the first RUNNING snapshot. Rejected: progress is untouched
    /// and the message is kept for display.
    pub fn finish_start(&mut self, outcome: Result<(), String>) {
        self.request_in_flight = false;
        match outcome {
            Ok(()) => {
                if let Err(e) = self.selection.persist(&mut self.store) {
                    tracing::warn!(error = %e, "failed to persist selection after start");
                }
                self.progress = self.progress.accept_start();
                tracing::info!(device = %self.selection.device().id, "start request accepted");
            }
            Err(message) => {
                tracing::warn!(device = %self.selection.device().id, %message, "start request rejected");
                self.last_error = Some(message);
            }
        }
    }

    // =========================================================================
    // RESET
    // =========================================================================

    /// Return to idle. With `clear_selection`, the persisted record is
    /// removed and the selection goes back to the device defaults.
    pub fn reset(&mut self, clear_selection: bool) -> Result<(), CalibraError> {
        self.progress = ProgressState::idle();
        self.last_error = None;
        if clear_selection {
            let existed = self.selection.reset(&mut self.store)?;
            tracing::info!(device = %self.selection.device().id, existed, "persisted selection cleared");
            self.flow = self.selection.flow();
            self.recompute_step();
        }
        Ok(())
    }

    // =========================================================================
    // ACCESSORS
    // =========================================================================

    #[must_use]
    pub fn progress(&self) -> ProgressState {
        self.progress
    }

    #[must_use]
    pub fn phase(&self) -> TrackerPhase {
        self.progress.phase()
    }

    #[must_use]
    pub fn flow(&self) -> &Flow {
        &self.flow
    }

    #[must_use]
    pub fn selection(&self) -> Selection {
        self.selection.selection()
    }

    #[must_use]
    pub fn device(&self) -> &DeviceProfile {
        self.selection.device()
    }

    #[must_use]
    pub fn current_step(&self) -> Option<usize> {
        self.current_step
    }

    #[must_use]
    pub fn last_snapshot(&self) -> Option<&StatusSnapshot> {
        self.last_snapshot.as_ref()
    }

    #[must_use]
    pub fn request_in_flight(&self) -> bool {
        self.request_in_flight
    }

    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Whether the latest snapshot classifies as calibrating.
    #[must_use]
    pub fn is_calibrating(&self) -> bool {
        self.last_snapshot
            .as_ref()
            .is_some_and(|s| StageClassifier::new().is_calibrating(s))
    }

    // =========================================================================
    // PRESENTATION
    // =========================================================================

    /// Everything the presentation layer needs to draw the overlay.
    #[must_use]
    pub fn view(&self) -> SessionView {
        let code = self.last_snapshot.as_ref().map(|s| s.current_stage_code);
        let statuses = step_statuses(&self.progress, &self.flow, code);
        let steps = self
            .flow
            .steps()
            .iter()
            .zip(statuses)
            .map(|(step, status)| StepView {
                name: step.name.to_string(),
                order: step.order,
                status,
                stage_codes: step.stage_codes.iter().map(|c| c.value()).collect(),
            })
            .collect();

        let blocked = self.start_blocked();
        let phase = self.phase();

        SessionView {
            device_id: self.device().id.to_string(),
            dual_extrusion: self.device().dual_extrusion,
            open: self.open,
            phase,
            progress: self.progress,
            calibrating: self.is_calibrating(),
            connected: self.last_snapshot.as_ref().is_some_and(|s| s.connected),
            device_state: self.last_snapshot.as_ref().map(|s| s.state),
            stage_code: code.map(|c| c.value()),
            selection: self.selection(),
            selection_editable: self.selection.is_editable(phase),
            nothing_selected: self.flow.is_empty(),
            steps,
            current_step_index: self.current_step.map_or(-1, |i| i as i64),
            fallback_label: self
                .last_snapshot
                .as_ref()
                .and_then(|s| fallback_label(&self.flow, s))
                .map(str::to_string),
            can_start: blocked.is_none(),
            start_blocked: blocked,
            request_in_flight: self.request_in_flight,
            last_error: self.last_error.clone(),
        }
    }
}

// =============================================================================
// VIEW
// =============================================================================

/// One timeline entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepView {
    pub name: String,
    pub order: usize,
    pub status: StepStatus,
    pub stage_codes: Vec<i32>,
}

/// Read-only projection of a session for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionView {
    pub device_id: String,
    pub dual_extrusion: bool,
    pub open: bool,
    pub phase: TrackerPhase,
    pub progress: ProgressState,
    pub calibrating: bool,
    pub connected: bool,
    pub device_state: Option<DeviceState>,
    pub stage_code: Option<i32>,
    pub selection: Selection,
    pub selection_editable: bool,
    /// No option selected: show an explicit empty state instead of a
    /// timeline.
    pub nothing_selected: bool,
    pub steps: Vec<StepView>,
    /// Index of the current step, `-1` when the stage code matches none.
    pub current_step_index: i64,
    /// Device-supplied stage name when the code is outside the flow.
    pub fallback_label: Option<String>,
    pub can_start: bool,
    pub start_blocked: Option<StartBlocked>,
    pub request_in_flight: bool,
    pub last_error: Option<String>,
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use crate::types::DeviceId;

    fn device() -> DeviceProfile {
        DeviceProfile::new(DeviceId::new("A1M-42").expect("id"), false)
    }

    fn idle() -> StatusSnapshot {
        StatusSnapshot::new(DeviceState::Idle, 0)
    }

    fn open_idle() -> CalibrationSession<MemoryStore> {
        CalibrationSession::open(device(), MemoryStore::new(), &idle()).expect("open")
    }

    #[test]
    fn fresh_session_is_idle_with_defaults() {
        let session = open_idle();
        assert_eq!(session.phase(), TrackerPhase::Idle);
        assert_eq!(session.selection(), Selection::defaults_for(false));
        assert!(session.start_blocked().is_none());
    }

    #[test]
    fn accepted_start_persists_and_marks_started() {
        let mut session = open_idle();
        let request = session.begin_start().expect("start allowed");
        assert_eq!(request.selection, session.selection());
        assert_eq!(session.start_blocked(), Some(StartBlocked::RequestInFlight));

        session.finish_start(Ok(()));
        assert!(session.progress().started);
        assert!(session.progress().is_pending());
        assert_eq!(session.store().len(), 1);
        assert_eq!(session.start_blocked(), Some(StartBlocked::AlreadyStarted));
    }

    #[test]
    fn rejected_start_keeps_progress() {
        let mut session = open_idle();
        session.begin_start().expect("start allowed");
        session.finish_start(Err("printer busy".to_string()));

        assert_eq!(session.progress(), ProgressState::idle());
        assert_eq!(session.last_error(), Some("printer busy"));
        assert!(session.store().is_empty());
        // retry is allowed
        assert!(session.start_blocked().is_none());
    }

    #[test]
    fn closed_session_drops_snapshots_but_keeps_state() {
        let mut session = open_idle();
        session.begin_start().expect("start allowed");
        session.close();

        // the request resolves while the overlay is closed
        session.finish_start(Ok(()));
        let running = StatusSnapshot::new(DeviceState::Running, 13);
        assert_eq!(session.observe(&running).expect("observe"), None);
        assert!(session.progress().is_pending());

        session.reopen(&running).expect("reopen");
        assert_eq!(session.progress(), ProgressState::resumed());
        assert!(session.is_open());
    }

    #[test]
    fn selection_locked_while_running() {
        let mut session = open_idle();
        session
            .observe(&StatusSnapshot::new(DeviceState::Running, 13))
            .expect("observe");
        assert!(matches!(
            session.set_option(CalibrationOption::BedLeveling, false),
            Err(CalibraError::SelectionLocked)
        ));
        assert!(!session.view().selection_editable);
    }

    #[test]
    fn view_reports_nothing_selected() {
        let mut session = open_idle();
        for option in CalibrationOption::ALL {
            session.set_option(option, false).expect("set");
        }
        let view = session.view();
        assert!(view.nothing_selected);
        assert!(view.steps.is_empty());
        assert_eq!(view.start_blocked, Some(StartBlocked::NothingSelected));
        assert!(!view.can_start);
    }

    #[test]
    fn view_uses_fallback_label_outside_flow() {
        let mut session = open_idle();
        session
            .observe(&StatusSnapshot::new(DeviceState::Idle, 77).with_stage_name("Changing filament"))
            .expect("observe");
        let view = session.view();
        assert_eq!(view.current_step_index, -1);
        assert_eq!(view.fallback_label.as_deref(), Some("Changing filament"));
    }

    #[test]
    fn restore_persisted_selection_when_idle() {
        let mut session = open_idle();
        assert!(!session.restore_persisted_selection().expect("restore"));

        session
            .set_option(CalibrationOption::MotorNoiseCancellation, false)
            .expect("set");
        session.begin_start().expect("start allowed");
        session.finish_start(Ok(()));
        session.reset(false).expect("reset");
        session
            .set_option(CalibrationOption::MotorNoiseCancellation, true)
            .expect("set");

        assert!(session.restore_persisted_selection().expect("restore"));
        assert!(!session.selection().motor_noise);
    }

    #[test]
    fn disconnected_blocks_start() {
        let session =
            CalibrationSession::open(device(), MemoryStore::new(), &StatusSnapshot::disconnected())
                .expect("open");
        assert_eq!(session.start_blocked(), Some(StartBlocked::Disconnected));
    }
}
