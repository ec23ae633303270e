//! Event store error types.

use thiserror::Error;

/// Errors from event store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The requested thread, event, or row was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// A migration failed to apply.
    #[error("migration failed: {0}")]
    Migration(String),

    /// The underlying SQLite connection or query failed.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A stored payload did not round-trip through JSON.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An export/import request named a format this store does not support.
    #[error("unsupported export format: {0}")]
    UnsupportedFormat(String),
}

/// Result type for event store operations.
pub type StoreResult<T> = Result<T, StoreError>;
