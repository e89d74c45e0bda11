//! Configuration structures.
//!
//! Configuration is loaded from environment variables and config files.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use super::errors::{Error, Result};

/// Global kernel configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Observability configuration.
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Deferred task queue configuration.
    #[serde(default)]
    pub tasks: TaskQueueConfig,
}

impl Config {
    /// Load configuration from environment variables, starting from defaults.
    ///
    /// Recognized variables: `AXON_LOG_LEVEL`, `AXON_JSON_LOGS`,
    /// `AXON_TASK_PENDING_WARN`, `AXON_SLOW_TASK_MS`.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(level) = std::env::var("AXON_LOG_LEVEL") {
            config.observability.log_level = level;
        }

        if let Ok(json) = std::env::var("AXON_JSON_LOGS") {
            config.observability.json_logs = match json.to_ascii_lowercase().as_str() {
                "1" | "true" => true,
                "0" | "false" => false,
                other => {
                    return Err(Error::validation(format!(
                        "AXON_JSON_LOGS must be true or false, got: {}",
                        other
                    )))
                }
            };
        }

        if let Ok(threshold) = std::env::var("AXON_TASK_PENDING_WARN") {
            config.tasks.pending_warn_threshold = threshold.parse().map_err(|_| {
                Error::validation(format!(
                    "AXON_TASK_PENDING_WARN must be an integer, got: {}",
                    threshold
                ))
            })?;
        }

        if let Ok(millis) = std::env::var("AXON_SLOW_TASK_MS") {
            let millis: u64 = millis.parse().map_err(|_| {
                Error::validation(format!(
                    "AXON_SLOW_TASK_MS must be an integer, got: {}",
                    millis
                ))
            })?;
            config.tasks.slow_task_warning = Duration::from_millis(millis);
        }

        Ok(config)
    }

    /// Load configuration from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Tracing log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable JSON log formatting.
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

/// Deferred task queue configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskQueueConfig {
    /// Pending task count at which a backlog warning is logged.
    pub pending_warn_threshold: usize,

    /// Tasks running longer than this are logged as slow.
    #[serde(with = "humantime_serde")]
    pub slow_task_warning: Duration,
}

impl Default for TaskQueueConfig {
    fn default() -> Self {
        Self {
            pending_warn_threshold: 1024,
            slow_task_warning: Duration::from_millis(100),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.observability.log_level, "info");
        assert!(!config.observability.json_logs);
        assert_eq!(config.tasks.pending_warn_threshold, 1024);
        assert_eq!(config.tasks.slow_task_warning, Duration::from_millis(100));
    }

    #[test]
    fn test_json_round_trip() {
        let config = Config::default();
        let json = serde_json::to_string_pretty(&config).unwrap();

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(json.as_bytes()).unwrap();

        let loaded = Config::from_json_file(file.path()).unwrap();
        assert_eq!(loaded.observability.log_level, config.observability.log_level);
        assert_eq!(
            loaded.tasks.pending_warn_threshold,
            config.tasks.pending_warn_threshold
        );
        assert_eq!(loaded.tasks.slow_task_warning, config.tasks.slow_task_warning);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(br#"{"observability": {"log_level": "debug", "json_logs": true}}"#)
            .unwrap();

        let loaded = Config::from_json_file(file.path()).unwrap();
        assert_eq!(loaded.observability.log_level, "debug");
        assert!(loaded.observability.json_logs);
        assert_eq!(loaded.tasks.pending_warn_threshold, 1024);
    }

    #[test]
    fn test_from_json_file_missing() {
        let result = Config::from_json_file("/nonexistent/axon.json");
        assert!(matches!(result, Err(Error::Io(_))));
    }

    // Env vars are process-global, so all from_env assertions live in one test.
    #[test]
    fn test_from_env_overrides_and_rejects_garbage() {
        std::env::set_var("AXON_LOG_LEVEL", "trace");
        std::env::set_var("AXON_JSON_LOGS", "true");
        std::env::set_var("AXON_TASK_PENDING_WARN", "64");
        std::env::set_var("AXON_SLOW_TASK_MS", "250");

        let config = Config::from_env().unwrap();
        assert_eq!(config.observability.log_level, "trace");
        assert!(config.observability.json_logs);
        assert_eq!(config.tasks.pending_warn_threshold, 64);
        assert_eq!(config.tasks.slow_task_warning, Duration::from_millis(250));

        std::env::set_var("AXON_JSON_LOGS", "purple");
        assert!(Config::from_env().is_err());

        std::env::set_var("AXON_JSON_LOGS", "false");
        std::env::set_var("AXON_TASK_PENDING_WARN", "not-a-number");
        assert!(Config::from_env().is_err());

        std::env::remove_var("AXON_LOG_LEVEL");
        std::env::remove_var("AXON_JSON_LOGS");
        std::env::remove_var("AXON_TASK_PENDING_WARN");
        std::env::remove_var("AXON_SLOW_TASK_MS");
    }
}
