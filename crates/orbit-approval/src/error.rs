//! Failure modes for resolving a pending approval.

use thiserror::Error;

/// Errors raised while resolving an approval decision.
#[derive(Debug, Error)]
pub enum ApprovalError {
    /// No pending approval exists for this rpc id — it was never recorded,
    /// already resolved, or its 60-second timer already fired.
    #[error("unknown or expired approval: {0}")]
    UnknownOrExpired(String),

    /// The adapter failed to deliver the resolved outcome to its
    /// subprocess/connection.
    #[error(transparent)]
    Adapter(#[from] orbit_adapters::AdapterError),
}

/// Convenience alias for fallible approval operations.
pub type ApprovalResult<T> = Result<T, ApprovalError>;
