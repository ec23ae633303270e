//! Relay-level failure modes (§7): mapped to either an HTTP status or a
//! JSON-RPC error object depending on which surface hit them.

use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

/// Failure modes raised by the relay fabric and its HTTP surface.
#[derive(Debug, Error)]
pub enum RelayError {
    /// No bearer token, or a token that resolves to neither the legacy
    /// token nor an unrevoked session token.
    #[error("unauthorized")]
    Unauthorized,

    /// A `read_only`-scoped client attempted a method off the safe list.
    #[error("method not permitted for read-only scope: {0}")]
    ReadOnlyDenied(String),

    /// A mutating call targeted a provider lacking the required capability.
    #[error("provider {provider} does not support {capability}")]
    CapabilityMissing {
        /// The provider id that was targeted.
        provider: String,
        /// The missing capability name.
        capability: &'static str,
    },

    /// The caller exceeded its rate-limit bucket.
    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited {
        /// Seconds until the bucket resets.
        retry_after_secs: u64,
    },

    /// A decision named an `rpcId` with no pending approval (never
    /// recorded, already resolved, or expired).
    #[error("unknown or expired approval")]
    UnknownApproval,

    /// A client attempted to decide an approval for a thread it is not
    /// subscribed to.
    #[error("not authorized to decide this approval")]
    ApprovalUnauthorized,

    /// A named provider has no running adapter.
    #[error("unavailable provider: {0}")]
    UnavailableProvider(String),

    /// A CLI run request named a command not on the configured allow-list.
    #[error("command not allow-listed: {0}")]
    CommandNotAllowed(String),

    /// An upload/pairing token was unknown, expired, or already consumed.
    #[error("unknown, expired, or already-consumed token")]
    UnknownToken,

    /// A request body failed validation (bad content-type, malformed JSON).
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The underlying adapter call failed.
    #[error(transparent)]
    Adapter(#[from] orbit_adapters::AdapterError),

    /// The event store failed to service a request (distinct from an
    /// append failure, which is logged and dropped rather than surfaced).
    #[error(transparent)]
    Store(#[from] orbit_store::StoreError),

    /// The auth manager failed to service a request.
    #[error(transparent)]
    Auth(#[from] orbit_auth::AuthError),

    /// The approval manager reported a failure other than unknown/expired.
    #[error(transparent)]
    Approval(#[from] orbit_approval::ApprovalError),

    /// Filesystem I/O failed (title store, upload storage).
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A side-table file (titles, upload metadata, config) held malformed
    /// JSON, or a value failed to serialize back to it.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience alias for fallible relay operations.
pub type RelayResult<T> = Result<T, RelayError>;

impl RelayError {
    /// The JSON-RPC error code this failure maps to (§7).
    #[must_use]
    pub fn rpc_code(&self) -> i64 {
        match self {
            Self::Unauthorized => -32003,
            Self::ReadOnlyDenied(_) => -32003,
            Self::CapabilityMissing { .. } => -32000,
            Self::RateLimited { .. } => -32001,
            Self::UnknownApproval | Self::ApprovalUnauthorized => -32002,
            Self::UnavailableProvider(_) => -32004,
            Self::BadRequest(_) | Self::Json(_) => -32602,
            _ => -32603,
        }
    }

    /// The JSON-RPC error `data` payload for this failure, if any (§6
    /// seed scenario 6: the capability-gate error carries
    /// `{provider, capability}`).
    #[must_use]
    pub fn rpc_data(&self) -> Option<serde_json::Value> {
        match self {
            Self::CapabilityMissing { provider, capability } => {
                Some(serde_json::json!({"provider": provider, "capability": capability}))
            }
            _ => None,
        }
    }

    /// The HTTP status this failure maps to, for the REST-shaped admin
    /// surface.
    #[must_use]
    pub fn http_status(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::ReadOnlyDenied(_) => StatusCode::FORBIDDEN,
            Self::CapabilityMissing { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::UnknownApproval | Self::ApprovalUnauthorized => StatusCode::NOT_FOUND,
            Self::UnavailableProvider(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::CommandNotAllowed(_) => StatusCode::FORBIDDEN,
            Self::UnknownToken => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Json(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Adapter(_) | Self::Store(_) | Self::Auth(_) | Self::Approval(_) | Self::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = self.http_status();
        let body = Json(serde_json::json!({"error": self.to_string()}));
        if let Self::RateLimited { retry_after_secs } = self {
            return (status, [("retry-after", retry_after_secs.to_string())], body).into_response();
        }
        (status, body).into_response()
    }
}
