//! The normalized, provider-agnostic event record (§3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The category a normalized event falls into.
///
/// Produced by the normalizer's `type -> category` mapping (§4.2) and used
/// by the relay's read-only gate and by the event store's indexing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    /// A message sent by the human user.
    UserMessage,
    /// A message produced by the agent.
    AgentMessage,
    /// Agent reasoning/thinking output.
    Reasoning,
    /// A plan emitted by the agent.
    Plan,
    /// A tool invocation (command, args, output, diff, ...).
    ToolCommand,
    /// A file diff produced by a tool.
    FileDiff,
    /// A server-initiated permission request.
    ApprovalRequest,
    /// A server-initiated request for more user input.
    UserInputRequest,
    /// A status/lifecycle transition (started, interrupted, errored, ...).
    LifecycleStatus,
    /// Anything that does not fit another category.
    Metadata,
}

/// Token usage accounting attached to an event, when the provider reports it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Input/prompt tokens consumed.
    #[serde(default)]
    pub input_tokens: u64,
    /// Output/completion tokens produced.
    #[serde(default)]
    pub output_tokens: u64,
    /// Tokens served from a prompt cache, if the provider reports it.
    #[serde(default)]
    pub cached_tokens: u64,
}

/// A single normalized event, as emitted by the normalizer and persisted by
/// the event store.
///
/// `event_id` is globally unique per process. Ordering within a session is
/// governed by the store's persistent monotonic insertion id, never by
/// `timestamp` — wall clock is informational only (§3, §5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedEvent {
    /// Provider id that produced this event.
    pub provider: String,
    /// Provider-internal session id.
    pub session_id: String,
    /// Globally unique id for this event within the process lifetime.
    pub event_id: String,
    /// The event's category.
    pub category: EventCategory,
    /// Wall-clock timestamp reported with the event (informational).
    pub timestamp: DateTime<Utc>,
    /// Aggregated human-readable text, if any. Absent (not empty-string)
    /// when there was no text content.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Aggregated structured payload fields (command, diff, status, ...).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    /// The event this one logically continues, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_event_id: Option<String>,
    /// Token usage, if the provider reported it for this event.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_usage: Option<TokenUsage>,
    /// The last raw provider notification that contributed to this event,
    /// retained for debugging.
    pub raw_event: Value,
}

impl NormalizedEvent {
    /// A fresh globally-unique event id.
    #[must_use]
    pub fn new_event_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }
}
