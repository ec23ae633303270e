//! `ProviderCapabilities` — the declarative flag set a `ProviderAdapter`
//! advertises, and the UI-facing named-flag map derived from it.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Fixed record of booleans describing what an adapter supports.
///
/// An adapter's live capabilities may depend on runtime configuration —
/// for example an "auto-approve" flag turns `approvals` to `false` because
/// the adapter never surfaces a permission prompt to approve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderCapabilities {
    /// Can list existing sessions.
    pub list_sessions: bool,
    /// Can open/resume a specific session.
    pub open_session: bool,
    /// Can send a prompt into a session (`sendPrompt`).
    pub send_prompt: bool,
    /// Emits a streaming event feed rather than one-shot responses.
    pub streaming: bool,
    /// Accepts file/image attachments on a prompt.
    pub attachments: bool,
    /// Surfaces tool-permission approval requests.
    pub approvals: bool,
    /// Supports more than one turn per session.
    pub multi_turn: bool,
    /// Supports filtering session history.
    pub filtering: bool,
    /// Supports paginated session listing.
    pub pagination: bool,
}

impl ProviderCapabilities {
    /// A capability set with every flag disabled — used as a safe default
    /// before a real probe has completed.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            list_sessions: false,
            open_session: false,
            send_prompt: false,
            streaming: false,
            attachments: false,
            approvals: false,
            multi_turn: false,
            filtering: false,
            pagination: false,
        }
    }

    /// The named-flag map the UI reads for feature gating.
    #[must_use]
    pub fn named_flags(&self) -> NamedFlags {
        NamedFlags {
            can_attach_files: self.attachments,
            can_filter_history: self.filtering,
            supports_approvals: self.approvals,
            supports_streaming: self.streaming,
        }
    }
}

impl Default for ProviderCapabilities {
    fn default() -> Self {
        Self::none()
    }
}

/// UI-hint flags derived from `ProviderCapabilities`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct NamedFlags {
    /// `CAN_ATTACH_FILES`
    pub can_attach_files: bool,
    /// `CAN_FILTER_HISTORY`
    pub can_filter_history: bool,
    /// `SUPPORTS_APPROVALS`
    pub supports_approvals: bool,
    /// `SUPPORTS_STREAMING`
    pub supports_streaming: bool,
}

/// A table of capability sets keyed by provider id, used by the relay to
/// inject `capabilities` into thread payloads it returns to clients.
pub type CapabilityTable = HashMap<String, ProviderCapabilities>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_has_every_flag_false() {
        let caps = ProviderCapabilities::none();
        let flags = caps.named_flags();
        assert!(!flags.can_attach_files);
        assert!(!flags.supports_approvals);
    }

    #[test]
    fn named_flags_mirror_source_flags() {
        let caps = ProviderCapabilities {
            attachments: true,
            approvals: true,
            ..ProviderCapabilities::none()
        };
        let flags = caps.named_flags();
        assert!(flags.can_attach_files);
        assert!(flags.supports_approvals);
        assert!(!flags.can_filter_history);
    }
}
