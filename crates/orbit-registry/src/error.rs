//! Registry-level failure modes — registration conflicts, not provider
//! failures (those are isolated and recorded, never propagated; see
//! [`crate::registry::Registry::start_all`]).

use thiserror::Error;

/// Failure modes for registry bookkeeping operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// `register` was called twice for the same provider id.
    #[error("provider already registered: {0}")]
    AlreadyRegistered(String),

    /// An operation referenced a provider id that was never registered.
    #[error("unknown provider: {0}")]
    Unknown(String),
}

/// Convenience alias for fallible registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;
