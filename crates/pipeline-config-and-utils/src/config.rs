//! Configuration management for the pipeline.

use crate::{CoreError, CoreResult, Paths};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::warn;
use url::Url;

/// Default featurization service URL (can be overridden at compile time via FEATURIZATION_URL env var).
pub const DEFAULT_FEATURIZATION_URL: &str = match option_env!("FEATURIZATION_URL") {
    Some(url) => url,
    None => "https://featurization.content-analytics.dev/v1",
};

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

const DEFAULT_MAX_BATCH_SIZE: usize = 10;
const DEFAULT_FLUSH_INTERVAL_MS: u64 = 2_000;
const DEFAULT_MAX_WAIT_MULTIPLIER: f64 = 2.5;
/// Largest accepted `max_wait_multiplier` in a config file.
const MAX_WAIT_MULTIPLIER_LIMIT: f64 = 1_000.0;

/// Batching behaviour for the event pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchingConfig {
    /// When false every event is flushed as soon as it is added.
    pub batching_enabled: bool,
    /// Flush once this many events (assets + experiences) are pending.
    pub max_batch_size: usize,
    /// Flush timer period in milliseconds.
    pub flush_interval_ms: u64,
    /// Multiple of the flush interval after which a window is force-flushed
    /// even if the timer has not fired.
    pub max_wait_multiplier: f64,
}

impl Default for BatchingConfig {
    fn default() -> Self {
        Self {
            batching_enabled: true,
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            flush_interval_ms: DEFAULT_FLUSH_INTERVAL_MS,
            max_wait_multiplier: DEFAULT_MAX_WAIT_MULTIPLIER,
        }
    }
}

impl BatchingConfig {
    /// Effective batch size. Zero is treated as one.
    pub fn max_batch_size(&self) -> usize {
        self.max_batch_size.max(1)
    }

    /// Flush timer period.
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    /// Upper bound on how long the first event of a window may wait.
    ///
    /// Never shorter than the flush interval. Saturates at `Duration::MAX`.
    pub fn max_wait_time(&self) -> Duration {
        let multiplier = if self.max_wait_multiplier.is_finite() {
            self.max_wait_multiplier.max(1.0)
        } else {
            DEFAULT_MAX_WAIT_MULTIPLIER
        };
        Duration::try_from_secs_f64(self.flush_interval().as_secs_f64() * multiplier)
            .unwrap_or(Duration::MAX)
    }
}

/// Settings for the featurization (experience registration) service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeaturizationConfig {
    /// Base URL of the featurization service.
    pub base_url: String,
    /// IMS organization id.
    pub org_id: String,
    /// Edge datastream id.
    pub datastream_id: String,
    /// Initial retry delay in milliseconds.
    pub backoff_base_ms: u64,
    /// Maximum retry delay in milliseconds.
    pub backoff_max_ms: u64,
    /// Request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for FeaturizationConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_FEATURIZATION_URL.to_string(),
            org_id: String::new(),
            datastream_id: String::new(),
            backoff_base_ms: 5_000,
            backoff_max_ms: 300_000,
            request_timeout_secs: 30,
        }
    }
}

/// Main pipeline configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Event batching settings.
    #[serde(default)]
    pub batching: BatchingConfig,
    /// Featurization service settings.
    #[serde(default)]
    pub featurization: FeaturizationConfig,
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            batching: BatchingConfig::default(),
            featurization: FeaturizationConfig::default(),
        }
    }
}

impl Config {
    /// Create a new Config with default values, then override from environment.
    pub fn new() -> Self {
        let mut config = Self::default();
        config.load_from_env();
        config
    }

    /// Load configuration from `<base>/config.json`, falling back to defaults,
    /// then apply environment overrides.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        config.load_from_env();
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects settings the featurization retry engine cannot run with.
    pub fn validate(&self) -> CoreResult<()> {
        let multiplier = self.batching.max_wait_multiplier;
        if !multiplier.is_finite() || multiplier > MAX_WAIT_MULTIPLIER_LIMIT {
            return Err(CoreError::Config(format!(
                "max_wait_multiplier ({multiplier}) must be a number no larger than {MAX_WAIT_MULTIPLIER_LIMIT}"
            )));
        }

        let featurization = &self.featurization;
        if featurization.backoff_base_ms == 0 {
            return Err(CoreError::Config("backoff_base_ms must be positive".into()));
        }
        if featurization.backoff_max_ms < featurization.backoff_base_ms {
            return Err(CoreError::Config(format!(
                "backoff_max_ms ({}) is below backoff_base_ms ({})",
                featurization.backoff_max_ms, featurization.backoff_base_ms
            )));
        }
        if featurization.request_timeout_secs == 0 {
            return Err(CoreError::Config("request_timeout_secs must be positive".into()));
        }
        Ok(())
    }

    /// Save configuration to a file.
    pub fn save(&self, paths: &Paths) -> CoreResult<()> {
        paths.ensure_dirs()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(paths.config_file(), content)?;
        Ok(())
    }

    /// Parsed featurization base URL.
    pub fn featurization_url(&self) -> CoreResult<Url> {
        Url::parse(&self.featurization.base_url).map_err(CoreError::from)
    }

    fn load_from_env(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    /// Apply `CONTENT_ANALYTICS_*` overrides from the given lookup.
    ///
    /// Values that fail to parse are ignored with a warning.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(level) = lookup("CONTENT_ANALYTICS_LOG_LEVEL") {
            self.log_level = level;
        }
        if let Some(raw) = lookup("CONTENT_ANALYTICS_BATCHING_ENABLED") {
            match raw.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => self.batching.batching_enabled = true,
                "0" | "false" | "no" | "off" => self.batching.batching_enabled = false,
                _ => warn!(value = %raw, "Ignoring invalid CONTENT_ANALYTICS_BATCHING_ENABLED"),
            }
        }
        if let Some(raw) = lookup("CONTENT_ANALYTICS_MAX_BATCH_SIZE") {
            match raw.trim().parse::<usize>() {
                Ok(size) => self.batching.max_batch_size = size,
                Err(e) => warn!(value = %raw, error = %e, "Ignoring invalid CONTENT_ANALYTICS_MAX_BATCH_SIZE"),
            }
        }
        if let Some(raw) = lookup("CONTENT_ANALYTICS_FLUSH_INTERVAL_MS") {
            match raw.trim().parse::<u64>() {
                Ok(ms) => self.batching.flush_interval_ms = ms,
                Err(e) => warn!(value = %raw, error = %e, "Ignoring invalid CONTENT_ANALYTICS_FLUSH_INTERVAL_MS"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::path::PathBuf;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.log_level, DEFAULT_LOG_LEVEL);
        assert!(config.batching.batching_enabled);
        assert_eq!(config.batching.max_batch_size, 10);
        assert_eq!(config.batching.flush_interval(), Duration::from_millis(2000));
        assert_eq!(config.batching.max_wait_time(), Duration::from_millis(5000));
        assert_eq!(config.featurization.backoff_base_ms, 5_000);
        assert_eq!(config.featurization.backoff_max_ms, 300_000);
    }

    #[test]
    fn max_wait_never_below_interval() {
        let config = BatchingConfig {
            max_wait_multiplier: 0.2,
            ..BatchingConfig::default()
        };
        assert_eq!(config.max_wait_time(), config.flush_interval());

        let config = BatchingConfig {
            max_wait_multiplier: f64::NAN,
            ..BatchingConfig::default()
        };
        assert_eq!(config.max_wait_time(), Duration::from_millis(5000));
    }

    #[test]
    fn huge_multiplier_saturates() {
        let config = BatchingConfig {
            max_wait_multiplier: 1e300,
            ..BatchingConfig::default()
        };
        assert_eq!(config.max_wait_time(), Duration::MAX);
    }

    #[test]
    fn huge_multiplier_is_rejected_on_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "batching": { "max_wait_multiplier": 1e300 } }"#).unwrap();

        match Config::load_from_file(&path) {
            Err(CoreError::Config(msg)) => assert!(msg.contains("max_wait_multiplier"), "{msg}"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn zero_batch_size_is_normalised() {
        let config = BatchingConfig {
            max_batch_size: 0,
            ..BatchingConfig::default()
        };
        assert_eq!(config.max_batch_size(), 1);
    }

    #[test]
    fn test_config_load_from_file() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.json");

        let config_json = r#"{
            "log_level": "debug",
            "batching": { "max_batch_size": 25, "batching_enabled": false },
            "featurization": { "org_id": "ORG@AdobeOrg", "datastream_id": "ds-1" }
        }"#;
        std::fs::write(&config_path, config_json).unwrap();

        let config = Config::load_from_file(&config_path).unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.batching.max_batch_size, 25);
        assert!(!config.batching.batching_enabled);
        assert_eq!(config.batching.flush_interval_ms, 2_000);
        assert_eq!(config.featurization.org_id, "ORG@AdobeOrg");
        assert_eq!(config.featurization.datastream_id, "ds-1");
        assert_eq!(config.featurization.base_url, DEFAULT_FEATURIZATION_URL);
    }

    #[test]
    fn test_config_load_missing_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());
        let config = Config::load(&paths).unwrap();
        assert_eq!(config.batching, BatchingConfig::default());
    }

    #[test]
    fn test_config_save_and_reload() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().join("ca"));

        let mut config = Config::default();
        config.batching.max_batch_size = 3;
        config.featurization.datastream_id = "ds-9".to_string();
        config.save(&paths).unwrap();

        let reloaded = Config::load_from_file(&paths.config_file()).unwrap();
        assert_eq!(reloaded.batching.max_batch_size, 3);
        assert_eq!(reloaded.featurization.datastream_id, "ds-9");
    }

    #[test]
    fn test_config_invalid_json() {
        let dir = tempdir().unwrap();
        let path: PathBuf = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            Config::load_from_file(&path),
            Err(CoreError::Json(_))
        ));
    }

    #[test]
    fn inverted_backoff_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{ "featurization": { "backoff_base_ms": 10000, "backoff_max_ms": 500 } }"#,
        )
        .unwrap();

        match Config::load_from_file(&path) {
            Err(CoreError::Config(msg)) => assert!(msg.contains("backoff_max_ms"), "{msg}"),
            other => panic!("unexpected: {other:?}"),
        }
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn overrides_apply_valid_values_only() {
        let env: HashMap<&str, &str> = [
            ("CONTENT_ANALYTICS_LOG_LEVEL", "trace"),
            ("CONTENT_ANALYTICS_BATCHING_ENABLED", "off"),
            ("CONTENT_ANALYTICS_MAX_BATCH_SIZE", "not-a-number"),
            ("CONTENT_ANALYTICS_FLUSH_INTERVAL_MS", "750"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_overrides(|name| env.get(name).map(|v| v.to_string()));

        assert_eq!(config.log_level, "trace");
        assert!(!config.batching.batching_enabled);
        assert_eq!(config.batching.max_batch_size, 10);
        assert_eq!(config.batching.flush_interval_ms, 750);
    }

    #[test]
    fn featurization_url_parses() {
        let mut config = Config::default();
        assert!(config.featurization_url().is_ok());

        config.featurization.base_url = "not a url".to_string();
        assert!(matches!(
            config.featurization_url(),
            Err(CoreError::InvalidUrl(_))
        ));
    }
}
