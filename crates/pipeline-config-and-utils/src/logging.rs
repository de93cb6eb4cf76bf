//! Logging initialization for the pipeline.
//!
//! Thin wrapper over the observability package. Every binary calls
//! [`init_logging`] once; library code only uses `tracing` macros.

use observability::LogConfig;
use std::path::PathBuf;

/// Environment variable naming a JSONL log file.
const LOG_FILE_ENV: &str = "CONTENT_ANALYTICS_LOG_FILE";

/// Initialize the logging system.
///
/// - Log level from RUST_LOG or the provided default
/// - JSONL output to `$CONTENT_ANALYTICS_LOG_FILE` when set
/// - Compact stderr output otherwise (or in addition)
///
/// ```ignore
/// init_logging("info", None);
/// tracing::info!("pipeline started");
/// ```
pub fn init_logging(level: &str, log_file: Option<PathBuf>) {
    let log_path = log_file.or_else(|| {
        std::env::var(LOG_FILE_ENV)
            .ok()
            .and_then(non_empty_env)
            .map(PathBuf::from)
    });

    observability::init_with_config(LogConfig {
        service_name: "content-analytics".into(),
        default_level: level.into(),
        log_path,
        also_stderr: true,
    });
}

fn non_empty_env(raw: String) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Parse a log level string into a tracing Level.
pub fn parse_level(level: &str) -> tracing::Level {
    match level.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" | "warning" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    }
}
