//! Application settings
//!
//! Persisted as JSON. Every field has a default so older or partial
//! files keep loading.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use ardu_configurator_core::configuration::{ResetPolicy, DEFAULT_RESET_SUFFIXES};
use ardu_configurator_core::parameters::{Tolerance, DEFAULT_ATOL, DEFAULT_RTOL};

use crate::error::SettingsError;

/// Default per-message timeout while receiving a parameter list
pub const DEFAULT_PARAM_TIMEOUT_MS: u64 = 10_000;

/// Default sleep between polls of a targeted parameter read
pub const DEFAULT_FETCH_POLL_INTERVAL_MS: u64 = 10;

/// Default probe timeout when searching for log files
///
/// Must stay above the transport's 1 s idle detection or missing
/// replies are mistaken for missing files.
pub const DEFAULT_LOG_PROBE_TIMEOUT_MS: u64 = 2_000;

/// Default timeout for whole-file transfers
pub const DEFAULT_FILE_TIMEOUT_MS: u64 = 5_000;

/// Persistent configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// MAVLink connection string, `udpin:<bind>` or `udpout:<peer>`
    pub connection: String,
    /// Per-message timeout while receiving a parameter list (ms)
    pub param_timeout_ms: u64,
    /// Sleep between polls of a targeted parameter read (ms)
    pub fetch_poll_interval_ms: u64,
    /// Existence probe timeout for log discovery (ms)
    pub log_probe_timeout_ms: u64,
    /// Timeout for whole-file transfers (ms)
    pub file_timeout_ms: u64,
    /// Try bulk (file based) parameter download first
    pub prefer_bulk_download: bool,
    /// Absolute tolerance for value comparison
    pub tolerance_atol: f64,
    /// Relative tolerance for value comparison
    pub tolerance_rtol: f64,
    /// Parameter name suffixes that may need a reset
    pub reset_suffixes: Vec<String>,
    /// Last used vehicle directory
    pub vehicle_dir: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            connection: "udpin:0.0.0.0:14550".to_string(),
            param_timeout_ms: DEFAULT_PARAM_TIMEOUT_MS,
            fetch_poll_interval_ms: DEFAULT_FETCH_POLL_INTERVAL_MS,
            log_probe_timeout_ms: DEFAULT_LOG_PROBE_TIMEOUT_MS,
            file_timeout_ms: DEFAULT_FILE_TIMEOUT_MS,
            prefer_bulk_download: true,
            tolerance_atol: DEFAULT_ATOL,
            tolerance_rtol: DEFAULT_RTOL,
            reset_suffixes: DEFAULT_RESET_SUFFIXES.iter().map(|s| s.to_string()).collect(),
            vehicle_dir: None,
        }
    }
}

impl Settings {
    /// Load settings, falling back to defaults if the file does not exist
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        match fs::read_to_string(path) {
            Ok(text) => Ok(serde_json::from_str(&text)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                crate::log_info!("No settings at {}, using defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Write settings as pretty-printed JSON
    pub fn save(&self, path: &Path) -> Result<(), SettingsError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Value comparator
    pub fn tolerance(&self) -> Tolerance {
        Tolerance::new(self.tolerance_atol, self.tolerance_rtol)
    }

    /// Reset-required suffix table
    pub fn reset_policy(&self) -> ResetPolicy {
        ResetPolicy::with_suffixes(self.reset_suffixes.iter().cloned())
    }

    /// Per-message parameter timeout
    pub fn param_timeout(&self) -> Duration {
        Duration::from_millis(self.param_timeout_ms)
    }

    /// Sleep between targeted read polls
    pub fn fetch_poll_interval(&self) -> Duration {
        Duration::from_millis(self.fetch_poll_interval_ms)
    }

    /// Log discovery probe timeout
    pub fn log_probe_timeout(&self) -> Duration {
        Duration::from_millis(self.log_probe_timeout_ms)
    }

    /// Whole-file transfer timeout
    pub fn file_timeout(&self) -> Duration {
        Duration::from_millis(self.file_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.param_timeout(), Duration::from_secs(10));
        assert_eq!(settings.tolerance(), Tolerance::default());
        assert_eq!(settings.reset_policy(), ResetPolicy::default());
        assert!(settings.prefer_bulk_download);
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load(&dir.path().join("settings.json")).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");
        let settings = Settings {
            connection: "tcpout:127.0.0.1:5760".into(),
            reset_suffixes: vec!["_PROTOCOL".into()],
            ..Default::default()
        };
        settings.save(&path).unwrap();
        assert_eq!(Settings::load(&path).unwrap(), settings);
    }

    #[test]
    fn test_partial_file_uses_defaults_for_missing_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"param_timeout_ms": 500}"#).unwrap();
        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings.param_timeout_ms, 500);
        assert_eq!(settings.fetch_poll_interval_ms, DEFAULT_FETCH_POLL_INTERVAL_MS);
    }

    #[test]
    fn test_malformed_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(Settings::load(&path), Err(SettingsError::Json(_))));
    }
}
