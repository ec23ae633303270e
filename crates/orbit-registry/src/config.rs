//! Config-driven enablement rule (§4.4): the default adapter starts
//! unless explicitly turned off; every opt-in adapter stays off unless
//! explicitly turned on.

use serde_json::Value;

/// Resolve whether a provider should be constructed and started, from its
/// `providers.<id>` config object and whether it's the default adapter.
///
/// The default adapter is enabled unless `enabled` is exactly `false`.
/// An opt-in adapter is enabled only when `enabled` is exactly `true`.
/// Both rules mean a missing `providers.<id>` entry entirely (`config` is
/// `Value::Null`) resolves to "enabled" for the default adapter and
/// "disabled" for everything else.
#[must_use]
pub fn resolve_enabled(config: &Value, is_default: bool) -> bool {
    let enabled = config.get("enabled").and_then(Value::as_bool);
    if is_default {
        enabled != Some(false)
    } else {
        enabled == Some(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn default_adapter_enabled_by_absence() {
        assert!(resolve_enabled(&Value::Null, true));
        assert!(resolve_enabled(&json!({}), true));
    }

    #[test]
    fn default_adapter_disabled_only_by_explicit_false() {
        assert!(!resolve_enabled(&json!({"enabled": false}), true));
        assert!(resolve_enabled(&json!({"enabled": true}), true));
        assert!(resolve_enabled(&json!({"enabled": "false"}), true));
    }

    #[test]
    fn opt_in_adapter_disabled_by_absence() {
        assert!(!resolve_enabled(&Value::Null, false));
        assert!(!resolve_enabled(&json!({}), false));
    }

    #[test]
    fn opt_in_adapter_enabled_only_by_explicit_true() {
        assert!(resolve_enabled(&json!({"enabled": true}), false));
        assert!(!resolve_enabled(&json!({"enabled": "true"}), false));
        assert!(!resolve_enabled(&json!({"enabled": false}), false));
    }
}
