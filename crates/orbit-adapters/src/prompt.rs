//! The prompt shape sent to `sendPrompt` and its turn acknowledgment.

use serde::{Deserialize, Serialize};

/// A file or image attached to a prompt, when the provider's `attachments`
/// capability is true.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    /// Display name / filename.
    pub name: String,
    /// MIME type.
    pub mime_type: String,
    /// Base64-encoded content, for small inline attachments.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    /// A URI the adapter can dereference instead of inline data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
}

/// The content of a prompt sent to an agent session.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PromptInput {
    /// The user-authored text.
    pub text: String,
    /// Attachments, if the provider supports them.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
}

/// Per-call options accompanying a `sendPrompt`, provider-specific and
/// passed through opaquely.
pub type PromptOptions = serde_json::Value;

/// The synchronous acknowledgment `sendPrompt` returns; the actual
/// response content arrives later via the event stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnAck {
    /// The turn id the normalizer will key streaming updates under.
    pub turn_id: String,
    /// A short status string (`"started"`, `"queued"`, ...).
    pub status: String,
}
