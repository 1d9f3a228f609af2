//! Ambient configuration surface: logging level and default recycle/dwell
//! values, loadable from a TOML file and overridable by environment
//! variables.
//!
//! Grounded on `knhk-workflow-engine/src/config/mod.rs`'s `ConfigLoader` /
//! `AppConfig` split (load-from-file, load-from-str, load-from-env, then
//! `validate()`), with TOML parsing actually wired up rather than left as a
//! `FUTURE:` comment, and the `KNHK_*` env var prefix replaced with
//! `SWITCHCTL_*`.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

use crate::error::{SwitchError, SwitchResult};

/// Application-level configuration for the switch controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// `tracing` env-filter directive, e.g. `"info"` or `"switchcore=debug"`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Recycle window applied to switches that don't specify their own.
    #[serde(default)]
    pub default_recycle_seconds: f64,
    /// Dwell applied to handlers registered without an explicit dwell.
    #[serde(default)]
    pub default_dwell_ms: u64,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            default_recycle_seconds: 0.0,
            default_dwell_ms: 0,
        }
    }
}

impl AppConfig {
    /// Reject configurations that can't correspond to real controller
    /// behavior: negative timings, or a log level `tracing` won't parse.
    pub fn validate(&self) -> SwitchResult<()> {
        if self.default_recycle_seconds < 0.0 {
            return Err(SwitchError::InvalidConfig {
                reason: "default_recycle_seconds must be >= 0".to_string(),
            });
        }
        if self.default_dwell_ms > i64::MAX as u64 {
            return Err(SwitchError::InvalidConfig {
                reason: "default_dwell_ms is out of range".to_string(),
            });
        }
        if tracing_subscriber::EnvFilter::from_str(&self.log_level).is_err() {
            return Err(SwitchError::InvalidConfig {
                reason: format!("unrecognized log level: {}", self.log_level),
            });
        }
        Ok(())
    }
}

/// Loads and validates [`AppConfig`] from the process's environment or a
/// TOML file.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load and validate configuration from a TOML file at `path`.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> SwitchResult<AppConfig> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| SwitchError::InvalidConfig {
            reason: format!("failed to read {}: {e}", path.as_ref().display()),
        })?;
        Self::load_from_str(&content)
    }

    /// Load and validate configuration from a TOML file at `path`, falling
    /// back to [`AppConfig::default`] if the file is missing. Callers must
    /// opt in to this fallback explicitly; a missing file is a hard error
    /// through [`ConfigLoader::load_from_file`] otherwise. Any error other
    /// than "not found" (permissions, malformed TOML, failed validation)
    /// still propagates.
    pub fn load_from_file_or_default<P: AsRef<Path>>(path: P, allow_missing: bool) -> SwitchResult<AppConfig> {
        match Self::load_from_file(path.as_ref()) {
            Ok(config) => Ok(config),
            Err(_) if allow_missing && !path.as_ref().exists() => Ok(AppConfig::default()),
            Err(err) => Err(err),
        }
    }

    /// Parse and validate configuration from a TOML string.
    pub fn load_from_str(content: &str) -> SwitchResult<AppConfig> {
        let config: AppConfig = toml::from_str(content).map_err(|e| SwitchError::InvalidConfig {
            reason: format!("failed to parse configuration: {e}"),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Start from `base` (or [`AppConfig::default`] if `None`) and overlay
    /// `SWITCHCTL_LOG_LEVEL`, `SWITCHCTL_DEFAULT_RECYCLE_SECONDS`, and
    /// `SWITCHCTL_DEFAULT_DWELL_MS` where set. An env var present but
    /// unparsable is a fatal configuration error, not a silent fallback.
    pub fn load_from_env(base: Option<AppConfig>) -> SwitchResult<AppConfig> {
        let mut config = base.unwrap_or_default();

        if let Ok(val) = std::env::var("SWITCHCTL_LOG_LEVEL") {
            config.log_level = val;
        }
        if let Ok(val) = std::env::var("SWITCHCTL_DEFAULT_RECYCLE_SECONDS") {
            config.default_recycle_seconds = val.parse().map_err(|_| SwitchError::InvalidConfig {
                reason: format!("SWITCHCTL_DEFAULT_RECYCLE_SECONDS is not a number: {val}"),
            })?;
        }
        if let Ok(val) = std::env::var("SWITCHCTL_DEFAULT_DWELL_MS") {
            config.default_dwell_ms = val.parse().map_err(|_| SwitchError::InvalidConfig {
                reason: format!("SWITCHCTL_DEFAULT_DWELL_MS is not a number: {val}"),
            })?;
        }

        config.validate()?;
        Ok(config)
    }
}
