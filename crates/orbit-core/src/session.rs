//! `NormalizedSession` — the provider-agnostic view of a thread's metadata.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Lifecycle state of a session as reported by its owning provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Actively processing a turn.
    Active,
    /// Idle, waiting for the next prompt.
    Idle,
    /// Finished normally.
    Completed,
    /// Ended in an error.
    Error,
    /// Ended because a streaming context timed out mid-turn.
    Interrupted,
}

/// A provider-agnostic description of a thread, as returned by
/// `ProviderAdapter::list_sessions`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedSession {
    /// Provider id that owns this session.
    pub provider: String,
    /// Provider-internal session id.
    pub session_id: String,
    /// Human-readable title. Falsibly derived (first user utterance
    /// truncated to 50 chars) when the provider does not supply one.
    pub title: String,
    /// Project name/path, if the provider associates one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    /// Repository identifier, if the provider associates one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repo: Option<String>,
    /// Current lifecycle status.
    pub status: SessionStatus,
    /// When the session was created.
    pub created_at: DateTime<Utc>,
    /// When the session was last updated.
    pub updated_at: DateTime<Utc>,
    /// Short preview of the most recent activity, for list views.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview: Option<String>,
    /// Free-form provider-specific metadata.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    /// The raw provider session payload, always retained for debugging.
    pub raw_session: Value,
}

impl NormalizedSession {
    /// Derive a title from a user utterance: truncate to 50 chars on a
    /// char boundary, trimming trailing whitespace.
    #[must_use]
    pub fn derive_title(first_user_utterance: &str) -> String {
        const MAX: usize = 50;
        let trimmed = first_user_utterance.trim();
        if trimmed.chars().count() <= MAX {
            return trimmed.to_string();
        }
        let truncated: String = trimmed.chars().take(MAX).collect();
        truncated.trim_end().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_short_enough_is_untouched() {
        assert_eq!(NormalizedSession::derive_title("fix the bug"), "fix the bug");
    }

    #[test]
    fn title_is_truncated_to_fifty_chars() {
        let long = "a".repeat(80);
        let title = NormalizedSession::derive_title(&long);
        assert_eq!(title.chars().count(), 50);
    }

    #[test]
    fn title_trims_whitespace() {
        assert_eq!(NormalizedSession::derive_title("  hello world  "), "hello world");
    }
}
