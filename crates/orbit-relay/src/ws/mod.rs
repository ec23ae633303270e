//! Shared WebSocket transport plumbing for the client and anchor endpoints
//! (§4.5, §6): bearer-token resolution and the generic outbound writer
//! task every connection spawns.
//!
//! Each connection's write side is a dedicated task draining a bounded
//! mpsc channel into the socket — routing code (`client.rs`, `anchor.rs`,
//! and anything fanning a normalized event out) only ever calls
//! [`crate::connection::OutboundHandle::try_send`], never touches a sink
//! directly. This mirrors `turbomcp-transport`'s bidirectional dispatcher.

pub mod anchor;
pub mod client;

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use axum::http::HeaderMap;
use futures::stream::SplitSink;
use futures::SinkExt;
use serde_json::Value;
use std::borrow::Cow;
use std::collections::HashMap;
use tokio::sync::mpsc;

use crate::error::{RelayError, RelayResult};
use crate::state::RelayState;
use orbit_auth::Scope;

/// A frame with this `type` tells the writer task to send a real WS close
/// frame (`code`, `reason`) and stop, instead of serializing it as text.
pub const CLOSE_SENTINEL_TYPE: &str = "__relay_close__";

/// Build a close-sentinel frame routing code can push through an
/// [`crate::connection::OutboundHandle`] to actually terminate a socket.
#[must_use]
pub fn close_frame(code: u16, reason: &str) -> Value {
    serde_json::json!({"type": CLOSE_SENTINEL_TYPE, "code": code, "reason": reason})
}

/// Pull the bearer token from `?token=` or `Authorization: Bearer` (§4.5:
/// "bearer token (query param or `Authorization: Bearer`)").
#[must_use]
pub fn extract_token(headers: &HeaderMap, query: &HashMap<String, String>) -> Option<String> {
    if let Some(token) = query.get("token") {
        return Some(token.clone());
    }
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::to_string)
}

/// Resolve a bearer token to a scope against either the legacy token or a
/// live session token.
///
/// # Errors
///
/// Returns [`RelayError::Unauthorized`] if the token matches neither.
pub async fn resolve_scope(state: &RelayState, token: Option<&str>) -> RelayResult<Scope> {
    let Some(token) = token else {
        return Err(RelayError::Unauthorized);
    };
    if state.auth().verify_legacy(token).await {
        return Ok(Scope::Full);
    }
    match state.auth().verify_session(token).await {
        Ok(session) => Ok(session.scope),
        Err(_) => Err(RelayError::Unauthorized),
    }
}

/// Drain `receiver` into `sink`, serializing each frame as a WS text
/// message, until the channel closes, the socket errors, or a
/// [`CLOSE_SENTINEL_TYPE`] frame requests an explicit close.
pub async fn run_writer(mut receiver: mpsc::Receiver<Value>, mut sink: SplitSink<WebSocket, Message>) {
    while let Some(frame) = receiver.recv().await {
        if frame.get("type").and_then(Value::as_str) == Some(CLOSE_SENTINEL_TYPE) {
            let code = frame.get("code").and_then(Value::as_u64).unwrap_or(1000) as u16;
            let reason = frame.get("reason").and_then(Value::as_str).unwrap_or("").to_string();
            let _ = sink.send(Message::Close(Some(CloseFrame { code, reason: Cow::Owned(reason) }))).await;
            break;
        }
        let Ok(text) = serde_json::to_string(&frame) else {
            continue;
        };
        if sink.send(Message::Text(text)).await.is_err() {
            break;
        }
    }
}

/// A JSON-RPC 2.0 error response envelope for `id`.
#[must_use]
pub fn rpc_error_response(id: Value, err: &RelayError) -> Value {
    let mut error = serde_json::json!({"code": err.rpc_code(), "message": err.to_string()});
    if let Some(data) = err.rpc_data() {
        error["data"] = data;
    }
    serde_json::json!({"jsonrpc": "2.0", "id": id, "error": error})
}

/// A JSON-RPC 2.0 success response envelope for `id`.
#[must_use]
pub fn rpc_result_response(id: Value, result: Value) -> Value {
    serde_json::json!({"jsonrpc": "2.0", "id": id, "result": result})
}
