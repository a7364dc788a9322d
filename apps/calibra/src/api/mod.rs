//! # Calibra HTTP API Module
//!
//! The calibration overlay as a REST surface, built on axum.
//!
//! ## Endpoints
//!
//! - `GET /health` - Health check (never authenticated)
//! - `GET /session` - Current session view
//! - `POST /session/open` - Open or reopen the overlay with a snapshot
//! - `POST /session/close` - Dismiss the overlay
//! - `POST /snapshot` - Push a status snapshot
//! - `PUT /selection` - Switch one option on or off
//! - `POST /start` - Send a start request to the device
//! - `POST /reset` - Return to idle, optionally clearing the selection
//! - `GET /flow` - Flow preview for an arbitrary selection
//!
//! ## Security Configuration (Environment Variables)
//!
//! - `CALIBRA_CORS_ORIGINS`: Comma-separated list of allowed origins, or "*" for all (default: localhost only)
//! - `CALIBRA_RATE_LIMIT`: Requests per second (default: 100, 0 to disable)
//! - `CALIBRA_API_KEY`: If set, requires Bearer token authentication

mod auth;
mod handlers;
mod middleware;
mod types;

pub use auth::get_api_key_from_env;
pub use middleware::{create_rate_limiter, get_rate_limit_from_env};
pub use types::{
    ErrorResponse, FlowQuery, FlowResponse, FlowStepJson, HealthResponse, ResetRequest,
    SelectionRequest,
};

use crate::device::{DeviceTransport, StatusFeed, run_status_feed};
use crate::dispatcher::{ActionDispatcher, SharedSession};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method, header},
    middleware as axum_middleware,
    routing::{get, post, put},
};
use calibra_core::{CalibraError, CalibrationSession};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Request bodies are tiny; anything larger is rejected.
const MAX_BODY_SIZE: usize = 64 * 1024;

// =============================================================================
// SERVER STATE
// =============================================================================

/// Shared server state.
#[derive(Clone)]
pub struct AppState {
    /// The calibration session behind the overlay.
    pub session: SharedSession,
    /// Sends start requests for that session.
    pub dispatcher: ActionDispatcher,
}

impl AppState {
    /// Create app state around a session and a device connection.
    #[must_use]
    pub fn new(session: CalibrationSession, transport: Arc<dyn DeviceTransport>) -> Self {
        Self::from_shared(Arc::new(RwLock::new(session)), transport)
    }

    /// Create app state around an already shared session.
    #[must_use]
    pub fn from_shared(session: SharedSession, transport: Arc<dyn DeviceTransport>) -> Self {
        let dispatcher = ActionDispatcher::new(session.clone(), transport);
        Self {
            session,
            dispatcher,
        }
    }
}

// =============================================================================
// CORS CONFIGURATION
// =============================================================================

const ALLOWED_METHODS: [Method; 4] = [Method::GET, Method::POST, Method::PUT, Method::OPTIONS];

/// Build CORS layer from `CALIBRA_CORS_ORIGINS`.
///
/// - `*`: any origin
/// - unset or no valid entry: localhost only
/// - otherwise: the listed origins
fn build_cors_layer() -> CorsLayer {
    let origins_env = std::env::var("CALIBRA_CORS_ORIGINS").ok();

    match origins_env.as_deref() {
        Some("*") => {
            tracing::warn!(
                "CORS: Allowing ALL origins (CALIBRA_CORS_ORIGINS=*). This is insecure for production!"
            );
            CorsLayer::permissive()
        }
        Some(origins) => {
            let allowed_origins: Vec<HeaderValue> = origins
                .split(',')
                .filter_map(|s| {
                    let trimmed = s.trim();
                    match trimmed.parse::<HeaderValue>() {
                        Ok(hv) => {
                            tracing::info!("CORS: Allowing origin: {}", trimmed);
                            Some(hv)
                        }
                        Err(e) => {
                            tracing::warn!("CORS: Invalid origin '{}': {}", trimmed, e);
                            None
                        }
                    }
                })
                .collect();

            if allowed_origins.is_empty() {
                tracing::warn!(
                    "CORS: No valid origins in CALIBRA_CORS_ORIGINS, defaulting to localhost only"
                );
                build_localhost_cors()
            } else {
                CorsLayer::new()
                    .allow_origin(allowed_origins)
                    .allow_methods(ALLOWED_METHODS)
                    .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
            }
        }
        None => {
            tracing::info!("CORS: No CALIBRA_CORS_ORIGINS set, defaulting to localhost only");
            build_localhost_cors()
        }
    }
}

/// CORS layer allowing only localhost origins.
fn build_localhost_cors() -> CorsLayer {
    let origins: Vec<HeaderValue> = [
        "http://localhost:3000",
        "http://localhost:8080",
        "http://127.0.0.1:3000",
        "http://127.0.0.1:8080",
    ]
    .into_iter()
    .filter_map(|o| o.parse::<HeaderValue>().ok())
    .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(ALLOWED_METHODS)
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

// =============================================================================
// ROUTER CREATION
// =============================================================================

/// Create the axum router with all endpoints and middleware.
///
/// Middleware stack (outer to inner):
/// 1. Tracing
/// 2. CORS
/// 3. Body limit
/// 4. Rate limiting (if enabled)
/// 5. Authentication (if configured)
pub fn create_router(state: AppState) -> Router {
    let rate_limit = get_rate_limit_from_env();
    let rate_limiter = if rate_limit > 0 {
        tracing::info!("Rate limiting enabled: {} requests/second", rate_limit);
        Some(create_rate_limiter(rate_limit))
    } else {
        tracing::info!("Rate limiting disabled");
        None
    };

    let has_auth = get_api_key_from_env().is_some();
    if has_auth {
        tracing::info!("API key authentication enabled");
    } else {
        tracing::warn!(
            "API key authentication DISABLED - all endpoints are publicly accessible. \
             Set CALIBRA_API_KEY to enable authentication."
        );
    }

    let mut router = Router::new()
        .route("/health", get(handlers::health_handler))
        .route("/session", get(handlers::session_handler))
        .route("/session/open", post(handlers::open_handler))
        .route("/session/close", post(handlers::close_handler))
        .route("/snapshot", post(handlers::snapshot_handler))
        .route("/selection", put(handlers::selection_handler))
        .route("/start", post(handlers::start_handler))
        .route("/reset", post(handlers::reset_handler))
        .route("/flow", get(handlers::flow_handler));

    if has_auth {
        router = router.layer(axum_middleware::from_fn(auth::api_key_auth_middleware));
    }

    if let Some(limiter) = rate_limiter {
        router = router.layer(axum_middleware::from_fn_with_state(
            limiter,
            middleware::rate_limit_middleware,
        ));
    }

    router
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(build_cors_layer())
                .layer(DefaultBodyLimit::max(MAX_BODY_SIZE)),
        )
        .with_state(state)
}

// =============================================================================
// SERVER STARTUP
// =============================================================================

/// Resolves on Ctrl-C.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "cannot listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}

/// Start the HTTP server and the status feed.
///
/// Both stop on Ctrl-C.
pub async fn run_server(
    addr: &str,
    session: CalibrationSession,
    transport: Arc<dyn DeviceTransport>,
    poll_interval: Duration,
) -> Result<(), CalibraError> {
    let state = AppState::new(session, transport.clone());
    let feed = StatusFeed::new(transport, poll_interval);

    let (stop_tx, mut stop_rx) = tokio::sync::watch::channel(false);
    let feed_task = tokio::spawn(run_status_feed(feed, state.session.clone(), async move {
        let _ = stop_rx.changed().await;
    }));

    let router = create_router(state);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| CalibraError::IoError(format!("Bind failed: {}", e)))?;

    tracing::info!("Calibra HTTP server listening on {}", addr);

    let served = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| CalibraError::IoError(format!("Server error: {}", e)));

    let _ = stop_tx.send(true);
    if let Err(e) = feed_task.await {
        tracing::warn!(error = %e, "status feed task failed");
    }
    served
}
