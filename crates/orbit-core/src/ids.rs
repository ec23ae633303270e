//! Identifier conventions shared across the relay.

/// The provider id used for threads that carry no explicit provider prefix.
///
/// Historically this is the "anchor" — the default-provider bridge that
/// speaks to the relay over `/ws/anchor` rather than through an in-process
/// adapter. See `ThreadId` for how the prefix convention is applied.
pub const DEFAULT_PROVIDER: &str = "default";
