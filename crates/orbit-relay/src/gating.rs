//! The read-only scope gate and the ACP write/capability gate (§4.5 steps
//! 2–3), plus thread-id extraction from a JSON-RPC params object (step 4).

use orbit_core::ThreadId;
use serde_json::Value;

/// Methods a `read_only`-scoped client may call regardless of this list,
/// beyond the suffix rule below.
const SAFE_METHODS: &[&str] = &[
    "thread/list",
    "thread/read",
    "thread/get",
    "thread/messages",
    "thread/events",
    "thread/history",
    "model/list",
    "health",
    "status",
];

/// Mutating methods that trigger the ACP write gate when targeting a
/// non-default provider's thread.
const MUTATING_METHODS: &[&str] = &["turn/start", "turn/stop", "thread/rename", "thread/archive", "thread/delete"];

/// `turn/start`'s alias, routed directly to the adapter rather than
/// forwarded to the anchor (§4.5 step 3).
pub const SEND_PROMPT_ALIASES: &[&str] = &["turn/start", "sendPrompt"];

/// Whether `method` is admitted for a `read_only`-scoped client.
#[must_use]
pub fn is_safe_method(method: &str) -> bool {
    SAFE_METHODS.contains(&method)
        || method.ends_with("/list")
        || method.ends_with("/get")
        || method.ends_with("/read")
        || method.ends_with("/status")
}

/// Whether `method` mutates state and therefore triggers the ACP write
/// gate against a non-default-provider thread.
#[must_use]
pub fn is_mutating_method(method: &str) -> bool {
    MUTATING_METHODS.contains(&method) || SEND_PROMPT_ALIASES.contains(&method)
}

/// Extract a thread id from the common positions a client's `params`
/// object carries one (§4.5 step 4).
#[must_use]
pub fn extract_thread_id(params: &Value) -> Option<ThreadId> {
    const PATHS: &[&[&str]] = &[
        &["threadId"],
        &["thread_id"],
        &["turn", "threadId"],
        &["item", "threadId"],
        &["thread", "id"],
    ];

    for path in PATHS {
        if let Some(value) = dig(params, path) {
            if let Some(wire) = value.as_str() {
                return Some(ThreadId::parse(wire));
            }
        }
    }
    None
}

fn dig<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    let mut current = value;
    for key in path {
        current = current.get(key)?;
    }
    Some(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn explicit_safe_methods_are_admitted() {
        assert!(is_safe_method("thread/list"));
        assert!(is_safe_method("health"));
    }

    #[test]
    fn suffix_rule_admits_unlisted_list_get_read_status_methods() {
        assert!(is_safe_method("model/get"));
        assert!(is_safe_method("provider/status"));
        assert!(is_safe_method("admin/token/sessions/list"));
    }

    #[test]
    fn mutating_methods_are_not_safe() {
        assert!(!is_safe_method("turn/start"));
        assert!(!is_safe_method("thread/archive"));
    }

    #[test]
    fn send_prompt_alias_is_mutating() {
        assert!(is_mutating_method("sendPrompt"));
        assert!(is_mutating_method("turn/start"));
        assert!(!is_mutating_method("thread/list"));
    }

    #[test]
    fn extracts_thread_id_from_every_documented_position() {
        assert_eq!(extract_thread_id(&json!({"threadId": "codex:a"})).map(|t| t.to_string()), Some("codex:a".into()));
        assert_eq!(extract_thread_id(&json!({"thread_id": "codex:b"})).map(|t| t.to_string()), Some("codex:b".into()));
        assert_eq!(
            extract_thread_id(&json!({"turn": {"threadId": "codex:c"}})).map(|t| t.to_string()),
            Some("codex:c".into())
        );
        assert_eq!(
            extract_thread_id(&json!({"item": {"threadId": "codex:d"}})).map(|t| t.to_string()),
            Some("codex:d".into())
        );
        assert_eq!(
            extract_thread_id(&json!({"thread": {"id": "codex:e"}})).map(|t| t.to_string()),
            Some("codex:e".into())
        );
    }

    #[test]
    fn missing_thread_id_is_none() {
        assert_eq!(extract_thread_id(&json!({"foo": "bar"})), None);
    }
}
