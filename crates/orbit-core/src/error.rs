//! Error kinds shared across the relay core.
//!
//! Individual components (the stdio RPC client, adapters, the relay fabric)
//! define their own richer `thiserror` enums; this one covers failures that
//! originate in shared data-model code itself (malformed thread ids,
//! serialization of the normalized model).

use thiserror::Error;

/// Errors raised by `orbit-core` data-model operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A value failed to (de)serialize to/from JSON.
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// A capability was requested that the provider does not advertise.
    #[error("capability not supported: provider {provider} lacks {capability}")]
    CapabilityMissing {
        /// The provider id that was targeted.
        provider: String,
        /// The missing capability flag.
        capability: &'static str,
    },
}

/// Convenience alias for fallible `orbit-core` operations.
pub type CoreResult<T> = Result<T, CoreError>;
