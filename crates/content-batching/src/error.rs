//! Batching error types.

use thiserror::Error;

/// Batching error type.
#[derive(Error, Debug)]
pub enum BatchError {
    /// Durable store error
    #[error("Store error: {0}")]
    Store(#[from] hit_store::StoreError),

    /// Event encode/decode error
    #[error("Codec error: {0}")]
    Codec(#[from] serde_json::Error),

    /// A batch callback rejected the batch
    #[error("Callback failed: {0}")]
    Callback(String),

    /// A blocking task could not complete
    #[error("Task failed: {0}")]
    Task(String),

    /// The coordinator has been closed
    #[error("Coordinator is closed")]
    Closed,
}

/// Result type alias using BatchError.
pub type BatchResult<T> = Result<T, BatchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn callback_error_display() {
        let err = BatchError::Callback("edge unavailable".to_string());
        assert_eq!(format!("{}", err), "Callback failed: edge unavailable");
    }

    #[test]
    fn codec_error_from_serde() {
        let serde_err = serde_json::from_str::<serde_json::Value>("{{{").unwrap_err();
        let err: BatchError = serde_err.into();
        assert!(format!("{}", err).starts_with("Codec error:"));
    }
}
