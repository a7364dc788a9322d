//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands.

use calibra::api;
use calibra::{ActionDispatcher, Config, DeviceClient, DeviceTransport, StartOutcome, StatusFeed};
use calibra_core::{
    CalibraError, CalibrationOption, CalibrationSession, DeviceProfile, Selection,
    SelectionModel, SessionView, StartBlocked, StepStatus, StorageBackend, TransitionEvent,
    build_flow,
};
use std::sync::Arc;
use tokio::sync::RwLock;

// =============================================================================
// HELPERS
// =============================================================================

fn open_store(config: &Config) -> Result<StorageBackend, CalibraError> {
    StorageBackend::open(&config.database)
}

fn device_transport(config: &Config) -> Result<Arc<dyn DeviceTransport>, CalibraError> {
    let client = DeviceClient::new(&config.device_url, config.device_token.clone())
        .map_err(|e| CalibraError::IoError(e.to_string()))?;
    Ok(Arc::new(client))
}

/// Open a session on the device's current status.
async fn open_session(
    config: &Config,
    feed: &mut StatusFeed,
) -> Result<CalibrationSession, CalibraError> {
    let device = config.device_profile()?;
    let store = open_store(config)?;
    let first = feed.poll().await;
    CalibrationSession::open(device, store, &first)
}

fn print_json(value: &impl serde::Serialize) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => tracing::warn!(error = %e, "cannot serialize output"),
    }
}

fn status_marker(status: StepStatus) -> &'static str {
    match status {
        StepStatus::Pending => "[ ]",
        StepStatus::Active => "[>]",
        StepStatus::Complete => "[x]",
    }
}

/// Print the timeline part of a view.
fn print_timeline(view: &SessionView) {
    if view.nothing_selected {
        println!("No calibration option selected.");
        return;
    }
    for step in &view.steps {
        println!("  {} {}", status_marker(step.status), step.name);
    }
    if let Some(label) = &view.fallback_label {
        println!("  Device: {}", label);
    }
}

fn print_view(view: &SessionView, json_mode: bool) {
    if json_mode {
        print_json(view);
        return;
    }
    let state = view
        .device_state
        .map_or_else(|| "-".to_string(), |s| s.to_string());
    println!(
        "Phase: {}  Device: {}  Stage: {}",
        view.phase,
        if view.connected { state } else { "disconnected".to_string() },
        view.stage_code.map_or_else(|| "-".to_string(), |c| c.to_string())
    );
    print_timeline(view);
    if let Some(error) = &view.last_error {
        println!("Last error: {}", error);
    }
    println!();
}

fn selection_options(selection: Selection) -> Vec<&'static str> {
    selection.enabled().map(|o| o.wire_name()).collect()
}

// =============================================================================
// SERVER COMMAND
// =============================================================================

/// Start the HTTP server with the status feed.
pub async fn cmd_server(config: &Config) -> Result<(), CalibraError> {
    let transport = device_transport(config)?;
    let mut feed = StatusFeed::new(transport.clone(), config.poll_interval());
    let session = open_session(config, &mut feed).await?;

    println!("Calibra Server Starting...");
    println!();
    println!("Configuration:");
    println!("  Host:     {}", config.host);
    println!("  Port:     {}", config.port);
    println!("  Device:   {} ({})", config.device_id, config.device_url);
    println!("  Database: {:?}", config.database);
    println!("  Polling:  every {} ms", config.poll_interval().as_millis());
    println!();
    println!("Endpoints:");
    println!("  GET  /session        - Session view");
    println!("  POST /session/open   - Open the overlay");
    println!("  POST /session/close  - Dismiss the overlay");
    println!("  PUT  /selection      - Toggle an option");
    println!("  POST /start          - Start calibration");
    println!("  POST /reset          - Reset progress");
    println!("  GET  /flow           - Flow preview");
    println!("  GET  /health         - Health check");
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    api::run_server(
        &config.bind_addr(),
        session,
        transport,
        config.poll_interval(),
    )
    .await
}

// =============================================================================
// FLOW COMMAND
// =============================================================================

/// Print the flow for the given options.
pub fn cmd_flow(
    config: &Config,
    json_mode: bool,
    options: &[CalibrationOption],
    dual_extrusion: bool,
) -> Result<(), CalibraError> {
    let dual = dual_extrusion || config.dual_extrusion;
    let selection = if options.is_empty() {
        Selection::defaults_for(dual)
    } else {
        Selection::from_options(options)
    };
    let flow = build_flow(&selection, dual);

    if json_mode {
        print_json(&api::FlowResponse::from(&flow));
        return Ok(());
    }

    println!("Calibration Flow");
    println!("================");
    println!("Options: {}", selection_options(selection).join(", "));
    println!();
    if flow.is_empty() {
        println!("No calibration option selected.");
        return Ok(());
    }
    for step in flow.steps() {
        let codes: Vec<String> = step.stage_codes.iter().map(|c| c.to_string()).collect();
        println!("  {}. {} (stage {})", step.order + 1, step.name, codes.join("/"));
    }
    Ok(())
}

// =============================================================================
// WATCH COMMAND
// =============================================================================

/// Follow the session until the run completes or Ctrl-C.
async fn follow(
    session: &mut CalibrationSession,
    feed: &mut StatusFeed,
    json_mode: bool,
) -> Result<(), CalibraError> {
    let mut last = session.view();
    print_view(&last, json_mode);

    loop {
        let snapshot = tokio::select! {
            snapshot = feed.next() => snapshot,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("watch interrupted");
                return Ok(());
            }
        };

        let event = match session.observe(&snapshot) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(error = %e, "snapshot rejected");
                continue;
            }
        };

        let view = session.view();
        if view != last {
            print_view(&view, json_mode);
            last = view;
        }

        if event == Some(TransitionEvent::RunCompleted) {
            if !json_mode {
                println!("Calibration completed.");
            }
            return Ok(());
        }
    }
}

/// Follow the device until the calibration run completes.
pub async fn cmd_watch(config: &Config, json_mode: bool) -> Result<(), CalibraError> {
    let transport = device_transport(config)?;
    let mut feed = StatusFeed::new(transport, config.poll_interval());
    let mut session = open_session(config, &mut feed).await?;
    follow(&mut session, &mut feed, json_mode).await
}

// =============================================================================
// START COMMAND
// =============================================================================

/// Reason a start cannot go out whatever options are chosen.
///
/// A device already calibrating wins over everything else; an empty
/// selection is ignored because the command is about to replace it.
fn blocked_before_selection(session: &CalibrationSession) -> Option<StartBlocked> {
    if session.is_calibrating() {
        return Some(StartBlocked::AlreadyCalibrating);
    }
    session
        .start_blocked()
        .filter(|blocked| *blocked != StartBlocked::NothingSelected)
}

/// Send a start request, then optionally follow the run.
pub async fn cmd_start(
    config: &Config,
    json_mode: bool,
    options: &[CalibrationOption],
    watch: bool,
) -> Result<(), CalibraError> {
    let transport = device_transport(config)?;
    let mut feed = StatusFeed::new(transport.clone(), config.poll_interval());
    let mut session = open_session(config, &mut feed).await?;

    if let Some(blocked) = blocked_before_selection(&session) {
        return Err(CalibraError::StartRejected(blocked.message().to_string()));
    }

    if options.is_empty() {
        session.restore_persisted_selection()?;
    } else {
        for option in CalibrationOption::ALL {
            session.set_option(option, options.contains(&option))?;
        }
    }

    let shared = Arc::new(RwLock::new(session));
    let dispatcher = ActionDispatcher::new(shared.clone(), transport);
    let outcome = dispatcher
        .start()
        .await
        .map_err(|blocked| CalibraError::StartRejected(blocked.message().to_string()))?;

    if let StartOutcome::Rejected(message) = outcome {
        return Err(CalibraError::StartRejected(message));
    }

    drop(dispatcher);
    let mut session = Arc::try_unwrap(shared)
        .map_err(|_| CalibraError::IoError("session still shared after start".to_string()))?
        .into_inner();

    if !json_mode {
        println!(
            "Calibration started: {}",
            selection_options(session.selection()).join(", ")
        );
    }

    if watch {
        follow(&mut session, &mut feed, json_mode).await
    } else {
        if json_mode {
            print_json(&session.view());
        }
        Ok(())
    }
}

// =============================================================================
// SELECTION COMMAND
// =============================================================================

/// Show the persisted selection (or the defaults when there is none).
pub fn cmd_selection(config: &Config, json_mode: bool) -> Result<(), CalibraError> {
    let device: DeviceProfile = config.device_profile()?;
    let store = open_store(config)?;
    let persisted = SelectionModel::load(&device, &store).is_some();
    let model = SelectionModel::restore(device, &store);

    if json_mode {
        print_json(&serde_json::json!({
            "device_id": model.device().id,
            "dual_extrusion": model.device().dual_extrusion,
            "persisted": persisted,
            "selection": model.selection(),
        }));
        return Ok(());
    }

    println!("Calibration Selection");
    println!("=====================");
    println!("Device:  {}", model.device().id);
    println!(
        "Source:  {}",
        if persisted { "persisted" } else { "defaults" }
    );
    println!();
    for option in CalibrationOption::ALL {
        let mark = if model.get(option) { "[x]" } else { "[ ]" };
        let note = if option.is_available(model.device()) {
            ""
        } else {
            " (not available on this device)"
        };
        println!("  {} {}{}", mark, option.label(), note);
    }
    Ok(())
}

// =============================================================================
// RESET COMMAND
// =============================================================================

/// Remove the persisted selection.
pub fn cmd_reset(config: &Config, json_mode: bool) -> Result<(), CalibraError> {
    let device = config.device_profile()?;
    let mut store = open_store(config)?;
    let mut model = SelectionModel::with_defaults(device);
    let existed = model.reset(&mut store)?;

    if json_mode {
        print_json(&serde_json::json!({
            "device_id": model.device().id,
            "cleared": existed,
        }));
    } else if existed {
        println!("Persisted selection cleared for {}.", model.device().id);
    } else {
        println!("No persisted selection for {}.", model.device().id);
    }
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================
