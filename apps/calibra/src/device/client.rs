//! # Device HTTP Client
//!
//! reqwest wrapper around the device bridge:
//!
//! - `POST {base}/calibration` with the start payload
//! - `GET {base}/status` returning a status snapshot

use super::{ClientError, DeviceTransport};
use async_trait::async_trait;
use calibra_core::{StartRequest, StatusSnapshot};
use std::time::Duration;

/// Per-request timeout. Completion detection itself has no timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP client for one device bridge.
#[derive(Clone)]
pub struct DeviceClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl std::fmt::Debug for DeviceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl DeviceClient {
    /// Create a client for the bridge at `base_url`.
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ClientError::ConnectionFailed(e.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Build a request with optional Bearer auth.
    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let mut req = self.http.request(method, &url);
        if let Some(ref token) = self.token {
            req = req.bearer_auth(token);
        }
        req
    }

    /// Send a request and handle connection errors.
    async fn send(&self, req: reqwest::RequestBuilder) -> Result<reqwest::Response, ClientError> {
        req.send()
            .await
            .map_err(|e| ClientError::ConnectionFailed(format!("{}: {e}", self.base_url)))
    }

    /// Map non-success statuses to errors.
    async fn check(resp: reqwest::Response) -> Result<reqwest::Response, ClientError> {
        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(ClientError::Unauthorized);
        }
        if status.is_server_error() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ClientError::ServerError(status.as_u16(), body));
        }
        if status.is_client_error() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ClientError::Rejected(rejection_message(&body, status.as_u16())));
        }
        Ok(resp)
    }
}

#[async_trait]
impl DeviceTransport for DeviceClient {
    async fn start(&self, request: &StartRequest) -> Result<(), ClientError> {
        let req = self
            .request(reqwest::Method::POST, "/calibration")
            .json(request);
        let resp = self.send(req).await?;
        Self::check(resp).await?;
        tracing::debug!(device = %request.device_id, "start request delivered");
        Ok(())
    }

    async fn status(&self) -> Result<StatusSnapshot, ClientError> {
        let req = self.request(reqwest::Method::GET, "/status");
        let resp = Self::check(self.send(req).await?).await?;
        resp.json::<StatusSnapshot>()
            .await
            .map_err(|e| ClientError::ParseError(e.to_string()))
    }
}

/// Human-readable message from a rejection body.
///
/// Bridges answer with `{"message": ...}` or `{"error": ...}`; anything else
/// is used verbatim, and an empty body falls back to the status code.
fn rejection_message(body: &str, status: u16) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        for key in ["message", "error"] {
            if let Some(msg) = value.get(key).and_then(|v| v.as_str())
                && !msg.trim().is_empty()
            {
                return msg.to_string();
            }
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        format!("request refused with status {status}")
    } else {
        trimmed.to_string()
    }
}

// =============================================================================
// TESTS
// =============================================================================
