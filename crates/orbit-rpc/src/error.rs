//! Errors raised by the stdio JSON-RPC transport.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A JSON-RPC 2.0 error object, as received from (or sent to) the peer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcErrorObject {
    /// JSON-RPC error code.
    pub code: i64,
    /// Human-readable message.
    pub message: String,
    /// Optional structured error data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl RpcErrorObject {
    /// Build an internal-error object (`-32603`) from a message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            code: -32603,
            message: message.into(),
            data: None,
        }
    }
}

/// Failure modes of the stdio JSON-RPC transport (§4.1, §7).
#[derive(Debug, Error)]
pub enum RpcError {
    /// No response arrived within the request's timeout.
    #[error("request timed out")]
    Timeout,

    /// The subprocess's stdout closed (EOF) or the writer task died.
    ///
    /// All outstanding requests fail with this; the client becomes
    /// unusable and restart is the adapter's responsibility.
    #[error("channel closed")]
    ChannelClosed,

    /// A JSON-RPC error response was received.
    #[error("rpc error {code}: {message}", code = .0.code, message = .0.message)]
    Rpc(RpcErrorObject),

    /// A line violated the wire protocol (not valid JSON, too long, or
    /// neither a request, response, nor notification).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Failed to spawn the subprocess.
    #[error("failed to spawn subprocess: {0}")]
    Spawn(#[source] std::io::Error),

    /// Underlying I/O failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Failed to (de)serialize a message.
    #[error(transparent)]
    Serde(#[from] serde_json::Error),
}

/// Convenience alias for fallible RPC operations.
pub type RpcResult<T> = Result<T, RpcError>;
