//! Error types for featurization requests.

use thiserror::Error;

/// Featurization error type.
#[derive(Debug, Error)]
pub enum FeaturizationError {
    /// The service answered with a non-success status.
    #[error("Featurization service error: {status} - {message}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Response body.
        message: String,
    },

    /// The request never produced a response (connect, timeout, reset).
    #[error("Network error: {0}")]
    Network(String),

    /// Any other HTTP client failure, such as an unreadable response body.
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Missing or invalid settings. Never transient.
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON serialization or deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Durable queue error.
    #[error("Store error: {0}")]
    Store(#[from] hit_store::StoreError),

    /// The user has refused data collection.
    #[error("Consent denied")]
    ConsentDenied,
}

/// Result type alias using FeaturizationError.
pub type FeaturizationResult<T> = Result<T, FeaturizationError>;
