//! Failure modes for authentication, pairing, and rate limiting.

use std::time::Duration;

use thiserror::Error;

/// Errors from auth operations.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The bearer token did not match the legacy token or any live session.
    #[error("invalid token")]
    InvalidToken,

    /// The pairing code is unknown, already consumed, or expired.
    #[error("unknown or expired pairing code")]
    UnknownPairingCode,

    /// The session id has no matching row (never minted, already revoked).
    #[error("unknown session: {0}")]
    UnknownSession(String),

    /// The upload token is unknown, expired, or already consumed.
    #[error("unknown or expired upload token")]
    UnknownUploadToken,

    /// The scope for this request has been rate-limited.
    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited {
        /// How long the caller should wait before retrying.
        retry_after: Duration,
    },

    /// The underlying token-table query failed.
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// Result type for auth operations.
pub type AuthResult<T> = Result<T, AuthError>;
