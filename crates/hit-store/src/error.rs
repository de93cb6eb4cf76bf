//! Hit store error types.

use thiserror::Error;

/// Hit store error type.
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A thread panicked while holding the store lock
    #[error("Store lock poisoned: {0}")]
    LockPoisoned(String),

    /// Record not found
    #[error("Record not found: {0}")]
    NotFound(String),

    /// The store was closed
    #[error("Store is closed")]
    Closed,
}

/// Result type alias using StoreError.
pub type StoreResult<T> = Result<T, StoreError>;
