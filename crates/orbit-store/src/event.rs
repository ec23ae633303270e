//! The stored event record (§4.7) and the parameters its operations take.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Which side of the relay produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventDirection {
    /// From a client, into the relay.
    #[serde(rename = "client")]
    Inbound,
    /// From the relay, out to a client or anchor.
    #[serde(rename = "server")]
    Outbound,
}

/// An event before it has a store-assigned `seq` and `event_id`.
#[derive(Debug, Clone)]
pub struct NewEvent {
    /// Thread this event belongs to.
    pub thread_id: String,
    /// Turn this event belongs to, if applicable.
    pub turn_id: Option<String>,
    pub direction: EventDirection,
    /// `"user"`, `"agent"`, `"system"`, ...
    pub role: String,
    /// JSON-RPC method name, for RPC-shaped events.
    pub method: Option<String>,
    pub payload: Value,
    pub created_at: DateTime<Utc>,
}

/// A durably appended event, as read back from the store.
///
/// `seq` is the store's monotonic insertion id — the canonical tiebreaker
/// when two events share a `created_at` (§5: wall clock is informational
/// only). Wire-renamed to `id`, the field name clients see over
/// `GET /api/threads/:id/events` and the JSON export format.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredEvent {
    #[serde(rename = "id")]
    pub seq: i64,
    pub event_id: String,
    pub thread_id: String,
    pub turn_id: Option<String>,
    pub direction: EventDirection,
    pub role: String,
    pub method: Option<String>,
    pub payload: Value,
    #[serde(rename = "createdAtSeconds")]
    pub created_at: DateTime<Utc>,
}

/// Sort direction for [`crate::EventStore::read`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOrder {
    Ascending,
    Descending,
}

/// Parameters for a replay read.
#[derive(Debug, Clone, Copy)]
pub struct ReadOptions {
    pub limit: Option<i64>,
    pub order: ReadOrder,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self { limit: None, order: ReadOrder::Ascending }
    }
}

/// Export/`import` wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Markdown,
}
