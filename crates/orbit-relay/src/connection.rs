//! Per-connection state and the outbound-message handle each WS role
//! holds (§4.5).
//!
//! A connection's outbound side is always a bounded mpsc channel feeding
//! one dedicated send task, not a shared `Mutex<WebSocket>` — the same
//! fan-in-to-a-single-writer shape `turbomcp-transport`'s bidirectional
//! dispatcher uses, so routing never blocks on a slow peer's socket
//! write; it only ever blocks on (or sheds past) that peer's queue.

use chrono::{DateTime, Utc};
use orbit_auth::Scope;
use serde_json::Value;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Outbound queue depth before a peer is considered saturated and its
/// socket is closed (§5 backpressure policy).
pub const OUTBOUND_QUEUE_CEILING: usize = 256;

/// A unique id assigned to a connection for the lifetime of its socket.
pub type ConnectionId = Uuid;

/// A handle routing code uses to push a frame at a connected client or
/// anchor, without touching the socket directly.
#[derive(Clone)]
pub struct OutboundHandle {
    sender: mpsc::Sender<Value>,
}

impl OutboundHandle {
    /// Wrap a channel sender feeding a connection's write task.
    #[must_use]
    pub fn new(sender: mpsc::Sender<Value>) -> Self {
        Self { sender }
    }

    /// Enqueue a frame. Returns `false` if the peer's queue is full or the
    /// connection already closed — the caller treats this the same as a
    /// saturated socket (§5: "if a peer's outbound queue crosses a
    /// configured ceiling, the socket is closed").
    pub fn try_send(&self, frame: Value) -> bool {
        self.sender.try_send(frame).is_ok()
    }
}

/// A connected client (browser/mobile UI) on `/ws/client`.
#[derive(Clone)]
pub struct ClientConnection {
    /// This connection's id.
    pub id: ConnectionId,
    /// The auth scope resolved from its bearer token.
    pub scope: Scope,
    /// The outbound handle for pushing frames to it.
    pub outbound: OutboundHandle,
}

/// A connected anchor (default-provider subprocess bridge) on
/// `/ws/anchor`.
#[derive(Clone)]
pub struct AnchorConnection {
    /// This connection's id.
    pub id: ConnectionId,
    /// The anchor's self-reported stable id, stable across reconnects.
    pub stable_id: String,
    /// The outbound handle for pushing frames to it.
    pub outbound: OutboundHandle,
}

/// Metadata an anchor reports in its `anchor.hello` control message,
/// surfaced by `list-anchors` (§4.5 state: `anchors: anchor -> {...}`).
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnchorInfo {
    /// The anchor's stable id.
    pub stable_id: String,
    /// Self-reported hostname.
    pub hostname: Option<String>,
    /// Self-reported platform (`"darwin"`, `"linux"`, ...).
    pub platform: Option<String>,
    /// When this socket connected.
    pub connected_at: DateTime<Utc>,
}

impl AnchorInfo {
    /// Build from an `anchor.hello` envelope's fields, falling back to
    /// `None` for anything the anchor didn't report.
    #[must_use]
    pub fn from_hello(stable_id: impl Into<String>, hello: &Value) -> Self {
        Self {
            stable_id: stable_id.into(),
            hostname: hello.get("hostname").and_then(Value::as_str).map(str::to_string),
            platform: hello.get("platform").and_then(Value::as_str).map(str::to_string),
            connected_at: Utc::now(),
        }
    }
}
