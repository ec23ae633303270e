//! Errors an adapter can surface to its caller (the registry).
//!
//! Per §4.3's failure policy, none of these ever propagate past the
//! adapter boundary uncaught — the registry catches them, records the
//! provider as degraded/unhealthy, and moves on.

use thiserror::Error;

/// Failure modes for a single adapter operation.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// The adapter isn't started, or its subprocess/connection died.
    #[error("provider {provider} is not available: {reason}")]
    Unavailable {
        /// The provider id.
        provider: String,
        /// Human-readable reason.
        reason: String,
    },

    /// The requested capability isn't supported by this provider build.
    #[error("provider {provider} does not support {capability}")]
    CapabilityMissing {
        /// The provider id.
        provider: String,
        /// The missing capability name, matching `NamedFlags`' wire form.
        capability: &'static str,
    },

    /// The underlying JSON-RPC transport failed.
    #[error(transparent)]
    Rpc(#[from] orbit_rpc::RpcError),

    /// The underlying HTTP transport failed.
    #[error("http transport error: {0}")]
    Http(String),

    /// A session id or turn id the caller referenced doesn't exist.
    #[error("unknown session: {0}")]
    UnknownSession(String),
}

/// Convenience alias for fallible adapter operations.
pub type AdapterResult<T> = Result<T, AdapterError>;
