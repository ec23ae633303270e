//! `StreamingContext`: per-`(sessionId, turnId)` aggregation state.

use chrono::{DateTime, Utc};
use orbit_core::event::EventCategory;
use serde_json::{Map, Value};

/// Scalar fields that merge into the rolling payload, last-write-wins,
/// distinct from `delta` which accumulates instead of overwriting.
const MERGED_FIELDS: &[&str] = &[
    "command", "args", "output", "exitCode", "path", "diff", "language", "status", "error",
];

/// Aggregation state for one `(sessionId, turnId)` key. Created on the
/// first chunk, destroyed on done, error, type switch, or timeout.
#[derive(Debug)]
pub(crate) struct StreamingContext {
    pub(crate) provider: String,
    pub(crate) session_id: String,
    pub(crate) turn_id: String,
    pub(crate) category: EventCategory,
    chunks: Vec<String>,
    payload: Map<String, Value>,
    last_timestamp: DateTime<Utc>,
    last_notification: Value,
    /// Bumped on every touch; a pending timeout task compares its captured
    /// generation against this value to tell whether it is still current.
    pub(crate) generation: u64,
}

impl StreamingContext {
    pub(crate) fn new(provider: String, session_id: String, turn_id: String, category: EventCategory) -> Self {
        Self {
            provider,
            session_id,
            turn_id,
            category,
            chunks: Vec::new(),
            payload: Map::new(),
            last_timestamp: Utc::now(),
            last_notification: Value::Null,
            generation: 0,
        }
    }

    pub(crate) fn has_chunks(&self) -> bool {
        !self.chunks.is_empty() || !self.payload.is_empty()
    }

    /// Apply one raw update's delta and merged scalar fields.
    pub(crate) fn apply(&mut self, update: &Value) {
        if let Some(delta) = update.get("delta").and_then(Value::as_str) {
            self.chunks.push(delta.to_string());
        }
        if let Some(obj) = update.as_object() {
            for field in MERGED_FIELDS {
                if let Some(value) = obj.get(*field) {
                    self.payload.insert((*field).to_string(), value.clone());
                }
            }
        }
        self.last_timestamp = Utc::now();
        self.last_notification = update.clone();
    }

    /// Produce the normalized event this context represents, per §4.2's
    /// flush rule. Consumes nothing — the caller removes the context from
    /// the map separately.
    pub(crate) fn flush(
        &self,
        event_id: String,
        thread_provider: &str,
    ) -> orbit_core::event::NormalizedEvent {
        let text = self.chunks.concat();
        orbit_core::event::NormalizedEvent {
            provider: thread_provider.to_string(),
            session_id: self.session_id.clone(),
            event_id,
            category: self.category,
            timestamp: self.last_timestamp,
            text: if text.is_empty() { None } else { Some(text) },
            payload: if self.payload.is_empty() {
                None
            } else {
                Some(Value::Object(self.payload.clone()))
            },
            parent_event_id: None,
            token_usage: None,
            raw_event: self.last_notification.clone(),
        }
    }
}

/// Map a raw update's `type` to a normalized category (§4.2 step 1).
pub(crate) fn map_category(update_type: &str) -> EventCategory {
    match update_type {
        "content" => EventCategory::AgentMessage,
        "reasoning" => EventCategory::Reasoning,
        "tool" => EventCategory::ToolCommand,
        "status" | "error" => EventCategory::LifecycleStatus,
        _ => EventCategory::Metadata,
    }
}
