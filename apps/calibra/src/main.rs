//! # Calibra - Calibration Overlay
//!
//! The main binary for Calibra.
//!
//! This application provides:
//! - HTTP REST API standing in for the calibration overlay
//! - CLI commands for one-shot starts and watching a run
//! - A status poller feeding device snapshots into the session
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    apps/calibra (THE BINARY)                  │
//! │                                                              │
//! │  ┌─────────────┐    ┌─────────────┐    ┌────────────────┐   │
//! │  │    CLI      │    │  HTTP API   │    │  Device Client │   │
//! │  │   (clap)    │    │   (axum)    │    │   (reqwest)    │   │
//! │  └──────┬──────┘    └──────┬──────┘    └───────┬────────┘   │
//! │         └──────────────────┼───────────────────┘            │
//! │                            ▼                                │
//! │                   ┌────────────────┐                        │
//! │                   │  calibra-core  │                        │
//! │                   │  (THE LOGIC)   │                        │
//! │                   └────────────────┘                        │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! # Start the HTTP server
//! calibra server --host 0.0.0.0 --port 8080
//!
//! # CLI operations
//! calibra flow -o bedLeveling,vibration
//! calibra start --watch
//! calibra reset
//! ```

mod cli;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

#[tokio::main]
async fn main() {
    // CALIBRA_LOG_FORMAT=json enables machine-parseable output.
    let log_format = std::env::var("CALIBRA_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "calibra=info,calibra_core=info,tower_http=debug".into());

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }

    let cli = cli::Cli::parse();

    if !cli.quiet && !cli.json_mode {
        print_banner();
    }

    if let Err(e) = cli::execute(cli).await {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Print the Calibra startup banner.
fn print_banner() {
    println!(
        r#"
   ___      _ _ _
  / __|__ _| (_) |__ _ _ __ _
 | (__/ _` | | | '_ \ '_/ _` |
  \___\__,_|_|_|_.__/_| \__,_|

  Calibration Overlay v{}
"#,
        env!("CARGO_PKG_VERSION")
    );
}
