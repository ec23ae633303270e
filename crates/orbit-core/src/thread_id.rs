//! Thread id parsing and rendering.
//!
//! The `"<providerId>:<providerSessionId>"` prefix is load-bearing: it is
//! how the relay detects which adapter owns a thread and how it injects
//! capabilities (§9 design notes). A bare id (no colon) means the default
//! provider. Provider ids must never contain a colon.

use std::fmt;

use crate::ids::DEFAULT_PROVIDER;

/// A parsed thread id: which provider owns it, and the provider-internal
/// session id.
///
/// `providerId` is immutable once a thread is first observed — the relay
/// never re-derives it from anything but the wire string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ThreadId {
    provider: String,
    session_id: String,
}

impl ThreadId {
    /// Build a thread id for the given provider and provider-internal
    /// session id.
    pub fn new(provider: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            session_id: session_id.into(),
        }
    }

    /// Build a thread id owned by the default provider.
    pub fn default_provider(session_id: impl Into<String>) -> Self {
        Self::new(DEFAULT_PROVIDER, session_id)
    }

    /// Parse a wire-form thread id.
    ///
    /// `"foo:bar"` parses to provider `foo`, session `bar`. A string with
    /// no colon is treated as a default-provider session id. Only the
    /// first colon is significant — provider-internal session ids may
    /// themselves contain colons.
    pub fn parse(wire: &str) -> Self {
        match wire.split_once(':') {
            Some((provider, session_id)) if !provider.is_empty() => {
                Self::new(provider, session_id)
            }
            _ => Self::default_provider(wire),
        }
    }

    /// The provider id that owns this thread.
    #[must_use]
    pub fn provider(&self) -> &str {
        &self.provider
    }

    /// The provider-internal session id.
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Whether this thread belongs to the default provider (the anchor).
    #[must_use]
    pub fn is_default_provider(&self) -> bool {
        self.provider == DEFAULT_PROVIDER
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_default_provider() {
            write!(f, "{}", self.session_id)
        } else {
            write!(f, "{}:{}", self.provider, self.session_id)
        }
    }
}

impl From<&str> for ThreadId {
    fn from(wire: &str) -> Self {
        Self::parse(wire)
    }
}

impl From<String> for ThreadId {
    fn from(wire: String) -> Self {
        Self::parse(&wire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_id_is_default_provider() {
        let t = ThreadId::parse("abc123");
        assert_eq!(t.provider(), DEFAULT_PROVIDER);
        assert_eq!(t.session_id(), "abc123");
        assert_eq!(t.to_string(), "abc123");
    }

    #[test]
    fn prefixed_id_round_trips() {
        let t = ThreadId::parse("copilot-acp:xyz");
        assert_eq!(t.provider(), "copilot-acp");
        assert_eq!(t.session_id(), "xyz");
        assert_eq!(t.to_string(), "copilot-acp:xyz");
    }

    #[test]
    fn session_id_may_contain_colons() {
        let t = ThreadId::parse("codex:session:with:colons");
        assert_eq!(t.provider(), "codex");
        assert_eq!(t.session_id(), "session:with:colons");
    }

    #[test]
    fn leading_colon_is_not_a_provider_prefix() {
        let t = ThreadId::parse(":weird");
        assert!(t.is_default_provider());
        assert_eq!(t.session_id(), ":weird");
    }
}
