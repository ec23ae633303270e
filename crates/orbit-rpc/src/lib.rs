//! Bidirectional JSON-RPC 2.0 framed over a child process's stdio.
//!
//! One JSON object per line. Outbound requests are correlated to their
//! response by a numeric id we assign; inbound requests (the ACP
//! permission-prompt case) are dispatched to a registered handler whose
//! future is awaited before the response line is written back.

#![deny(unsafe_code)]

mod client;
mod error;
mod transport;
mod wire;

pub use client::{HandlerId, StdioRpcClient};
pub use error::{RpcError, RpcErrorObject, RpcResult};
pub use transport::{NotificationHandler, RequestHandler};
pub use wire::{classify, extract_session_id, Inbound, MAX_LINE_BYTES};
