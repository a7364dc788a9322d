//! # Configuration
//!
//! Layered, last one wins:
//!
//! 1. built-in defaults
//! 2. TOML file (`--config <path>`, else `calibra.toml` if present)
//! 3. `CALIBRA_*` environment variables
//! 4. CLI flags (applied by the caller)
//!
//! ```toml
//! device_url = "http://printer.local:8989"
//! device_id = "01P00A000000001"
//! dual_extrusion = false
//! database = "calibra.db"
//! poll_interval_ms = 1000
//! host = "127.0.0.1"
//! port = 8080
//! ```
//!
//! Security settings (`CALIBRA_API_KEY`, `CALIBRA_RATE_LIMIT`,
//! `CALIBRA_CORS_ORIGINS`) are read by the HTTP layer directly.

use calibra_core::{CalibraError, DeviceId, DeviceProfile};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Config file looked up in the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "calibra.toml";

/// Lower bound for the status poll period.
const MIN_POLL_INTERVAL_MS: u64 = 100;

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Base URL of the device bridge.
    pub device_url: String,
    /// Bearer token for the device bridge, if it needs one.
    pub device_token: Option<String>,
    /// Device identity; keys the persisted selection.
    pub device_id: String,
    /// Whether the device has two extruders.
    pub dual_extrusion: bool,
    /// redb file holding persisted selections.
    pub database: PathBuf,
    pub poll_interval_ms: u64,
    pub host: String,
    pub port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device_url: "http://127.0.0.1:8989".to_string(),
            device_token: None,
            device_id: "default".to_string(),
            dual_extrusion: false,
            database: PathBuf::from("calibra.db"),
            poll_interval_ms: 1000,
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

impl Config {
    /// Load defaults, then the config file, then the environment.
    ///
    /// An explicit `path` must exist; the implicit `calibra.toml` is optional.
    pub fn load(path: Option<&Path>) -> Result<Self, CalibraError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let implicit = Path::new(DEFAULT_CONFIG_FILE);
                if implicit.is_file() {
                    Self::from_file(implicit)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env_with(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Read a TOML config file.
    pub fn from_file(path: &Path) -> Result<Self, CalibraError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            CalibraError::ConfigError(format!("Cannot read {}: {}", path.display(), e))
        })?;
        tracing::debug!(path = %path.display(), "loaded config file");
        Self::from_toml_str(&content)
    }

    /// Parse TOML. Missing keys take their defaults; unknown keys are errors.
    pub fn from_toml_str(content: &str) -> Result<Self, CalibraError> {
        toml::from_str(content)
            .map_err(|e| CalibraError::ConfigError(format!("Invalid config: {}", e)))
    }

    /// Override fields from `CALIBRA_*` variables returned by `lookup`.
    pub fn apply_env_with(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), CalibraError> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = var("CALIBRA_DEVICE_URL") {
            self.device_url = url;
        }
        if let Some(token) = var("CALIBRA_DEVICE_TOKEN") {
            self.device_token = Some(token);
        }
        if let Some(id) = var("CALIBRA_DEVICE_ID") {
            self.device_id = id;
        }
        if let Some(raw) = var("CALIBRA_DUAL_EXTRUSION") {
            self.dual_extrusion = parse_bool("CALIBRA_DUAL_EXTRUSION", &raw)?;
        }
        if let Some(path) = var("CALIBRA_DATABASE") {
            self.database = PathBuf::from(path);
        }
        if let Some(raw) = var("CALIBRA_POLL_INTERVAL_MS") {
            self.poll_interval_ms = parse_number("CALIBRA_POLL_INTERVAL_MS", &raw)?;
        }
        if let Some(host) = var("CALIBRA_HOST") {
            self.host = host;
        }
        if let Some(raw) = var("CALIBRA_PORT") {
            self.port = parse_number("CALIBRA_PORT", &raw)?;
        }
        Ok(())
    }

    /// Device identity and capability.
    pub fn device_profile(&self) -> Result<DeviceProfile, CalibraError> {
        Ok(DeviceProfile::new(
            DeviceId::new(self.device_id.as_str())?,
            self.dual_extrusion,
        ))
    }

    /// Status poll period, never below 100 ms.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(MIN_POLL_INTERVAL_MS))
    }

    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_bool(key: &str, raw: &str) -> Result<bool, CalibraError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(CalibraError::ConfigError(format!(
            "{key}: expected a boolean, got {other:?}"
        ))),
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, CalibraError> {
    raw.trim()
        .parse()
        .map_err(|_| CalibraError::ConfigError(format!("{key}: expected a number, got {raw:?}")))
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: BTreeMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = Config::from_toml_str(
            r#"
            device_id = "X1C-42"
            dual_extrusion = true
            "#,
        )
        .expect("parse");
        assert_eq!(config.device_id, "X1C-42");
        assert!(config.dual_extrusion);
        assert_eq!(config.port, 8080);
        assert_eq!(config.database, PathBuf::from("calibra.db"));
    }

    #[test]
    fn unknown_key_rejected() {
        let err = Config::from_toml_str("colour = \"red\"").expect_err("unknown key");
        assert!(matches!(err, CalibraError::ConfigError(_)));
    }

    #[test]
    fn malformed_toml_rejected() {
        assert!(Config::from_toml_str("port = ").is_err());
    }

    #[test]
    fn env_overrides_file() {
        let mut config = Config::from_toml_str("port = 9000").expect("parse");
        config
            .apply_env_with(env(&[
                ("CALIBRA_PORT", "9100"),
                ("CALIBRA_DUAL_EXTRUSION", "yes"),
                ("CALIBRA_DEVICE_URL", "http://10.0.0.7:8989"),
            ]))
            .expect("env");
        assert_eq!(config.port, 9100);
        assert!(config.dual_extrusion);
        assert_eq!(config.device_url, "http://10.0.0.7:8989");
    }

    #[test]
    fn bad_env_value_is_an_error() {
        let mut config = Config::default();
        assert!(
            config
                .apply_env_with(env(&[("CALIBRA_PORT", "eighty")]))
                .is_err()
        );
        assert!(
            config
                .apply_env_with(env(&[("CALIBRA_DUAL_EXTRUSION", "maybe")]))
                .is_err()
        );
    }

    #[test]
    fn poll_interval_has_floor() {
        let config = Config {
            poll_interval_ms: 5,
            ..Config::default()
        };
        assert_eq!(config.poll_interval(), Duration::from_millis(100));
    }

    #[test]
    fn load_from_explicit_file() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        file.write_all(b"device_id = \"P1S-7\"\nport = 8181\n")
            .expect("write");
        let config = Config::from_file(file.path()).expect("load");
        assert_eq!(config.device_id, "P1S-7");
        assert_eq!(config.port, 8181);
        assert_eq!(
            config.device_profile().expect("profile").id.as_str(),
            "P1S-7"
        );
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        assert!(Config::load(Some(Path::new("/nonexistent/calibra.toml"))).is_err());
    }
}
