//! # Calibra CLI Module
//!
//! This module implements the CLI interface for Calibra.
//!
//! ## Available Commands
//!
//! - `server` - Start the HTTP server and the status poller
//! - `flow` - Print the step timeline for a selection
//! - `watch` - Follow a calibration run on the device
//! - `start` - Send a start request
//! - `selection` - Show the persisted selection
//! - `reset` - Clear the persisted selection

mod commands;

use calibra::Config;
use calibra_core::{CalibraError, CalibrationOption};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// Calibra - device calibration overlay
///
/// Choose calibration routines, start them on the device, and follow the
/// run from its status reports.
#[derive(Parser, Debug)]
#[command(name = "calibra")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress banner output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to a TOML config file (default: ./calibra.toml if present)
    #[arg(short = 'c', long, global = true)]
    pub config: Option<PathBuf>,

    /// Path to the selection database
    #[arg(short = 'D', long, global = true)]
    pub database: Option<PathBuf>,

    /// Device identity (overrides config and CALIBRA_DEVICE_ID)
    #[arg(long, global = true)]
    pub device_id: Option<String>,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start HTTP server
    Server {
        /// Host to bind to
        #[arg(short = 'H', long)]
        host: Option<String>,

        /// Port to bind to
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Print the calibration flow for a selection
    Flow {
        /// Options to include (comma-separated; default: device defaults)
        #[arg(short, long, value_delimiter = ',')]
        options: Vec<CalibrationOption>,

        /// Treat the device as dual-extrusion
        #[arg(long)]
        dual_extrusion: bool,
    },

    /// Follow the device until the calibration run completes
    Watch,

    /// Send a start request to the device
    Start {
        /// Options to run (comma-separated; default: persisted selection)
        #[arg(short, long, value_delimiter = ',')]
        options: Vec<CalibrationOption>,

        /// Keep following the run after the device accepts
        #[arg(short, long)]
        watch: bool,
    },

    /// Show the persisted selection
    Selection,

    /// Clear the persisted selection
    Reset,
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Load configuration and apply the global flags on top.
fn resolve_config(cli: &Cli) -> Result<Config, CalibraError> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(database) = &cli.database {
        config.database = database.clone();
    }
    if let Some(device_id) = &cli.device_id {
        config.device_id = device_id.clone();
    }
    if cli.verbose {
        tracing::info!(?config, "resolved configuration");
    }
    Ok(config)
}

/// Execute the CLI with parsed arguments.
pub async fn execute(cli: Cli) -> Result<(), CalibraError> {
    let config = resolve_config(&cli)?;
    let json_mode = cli.json_mode;

    match cli.command {
        Some(Commands::Server { host, port }) => {
            let mut config = config;
            if let Some(host) = host {
                config.host = host;
            }
            if let Some(port) = port {
                config.port = port;
            }
            cmd_server(&config).await
        }
        Some(Commands::Flow {
            options,
            dual_extrusion,
        }) => cmd_flow(&config, json_mode, &options, dual_extrusion),
        Some(Commands::Watch) => cmd_watch(&config, json_mode).await,
        Some(Commands::Start { options, watch }) => {
            cmd_start(&config, json_mode, &options, watch).await
        }
        Some(Commands::Reset) => cmd_reset(&config, json_mode),
        Some(Commands::Selection) | None => cmd_selection(&config, json_mode),
    }
}
