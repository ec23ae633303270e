//! Registers the directly-managed, non-default providers with the
//! registry: the ACP-speaking agents (e.g. Copilot in ACP mode) via
//! [`orbit_adapters::AcpAdapter`], and HTTP/SSE agents (e.g. a
//! Claude-style backend) via [`orbit_adapters::HttpAdapter`] (§2
//! component table). Codex app-server is reached through `/ws/anchor`
//! instead, so it is never registered here (§4.3 "treat the anchor as a
//! privileged adapter with no subprocess ownership in-process").
//!
//! Neither adapter is the registry's "default" in `orbit-registry`'s
//! sense — both stay off unless `providers.<id>.enabled` is explicitly
//! `true` (§4.4a).

use std::collections::HashMap;
use std::sync::Arc;

use orbit_adapters::{AcpAdapter, AcpAdapterConfig, HttpAdapter, HttpAdapterConfig, ProviderAdapter};
use orbit_core::{ProviderCapabilities, ReliabilityCounters};
use orbit_registry::Registry;
use orbit_relay::ProviderConfig;
use serde_json::Value;

/// Provider id for the ACP-speaking agent, matching the `copilot-acp:xyz`
/// thread id example in §8's capability-gate scenario.
pub const COPILOT_PROVIDER_ID: &str = "copilot-acp";

/// Provider id for the HTTP/SSE-speaking agent.
pub const CLAUDE_PROVIDER_ID: &str = "claude";

fn acp_capabilities() -> ProviderCapabilities {
    ProviderCapabilities { list_sessions: true, open_session: true, send_prompt: true, streaming: true, attachments: true, approvals: true, multi_turn: true, filtering: false, pagination: false }
}

fn http_capabilities() -> ProviderCapabilities {
    ProviderCapabilities { list_sessions: true, open_session: true, send_prompt: true, streaming: true, attachments: false, approvals: false, multi_turn: true, filtering: false, pagination: true }
}

/// Register the known provider ids against `registry`, each as an opt-in
/// (non-default) adapter. `start_all` (called by the caller afterward)
/// decides which ones actually start based on `providers.<id>.enabled`.
/// `counters` is wired into each adapter's normalizer (and, for the ACP
/// adapter, its restart path) so `/admin/status` reflects their activity.
///
/// # Errors
///
/// Returns an error if a provider id was already registered (never
/// expected at startup, since this is the only place that registers
/// anything).
pub async fn register_all(registry: &Registry, providers: &HashMap<String, ProviderConfig>, counters: Arc<ReliabilityCounters>) -> anyhow::Result<()> {
    let copilot_config = providers.get(COPILOT_PROVIDER_ID).map(config_to_value).unwrap_or(Value::Null);
    registry.register(COPILOT_PROVIDER_ID, acp_factory(counters.clone()), copilot_config, false).await?;

    let claude_config = providers.get(CLAUDE_PROVIDER_ID).map(config_to_value).unwrap_or(Value::Null);
    registry.register(CLAUDE_PROVIDER_ID, http_factory(counters), claude_config, false).await?;

    Ok(())
}

fn config_to_value(config: &ProviderConfig) -> Value {
    serde_json::to_value(config).unwrap_or(Value::Null)
}

fn acp_factory(counters: Arc<ReliabilityCounters>) -> orbit_registry::AdapterFactory {
    Arc::new(move |config: &Value| {
        let command = config.get("executablePath").and_then(Value::as_str).unwrap_or("copilot").to_string();
        let adapter_config = AcpAdapterConfig {
            command,
            args: vec!["--acp".to_string()],
            env: api_key_env(config),
            working_dir: None,
            capabilities: acp_capabilities(),
        };
        Arc::new(AcpAdapter::new(COPILOT_PROVIDER_ID, adapter_config).with_counters(counters.clone())) as Arc<dyn ProviderAdapter>
    })
}

fn http_factory(counters: Arc<ReliabilityCounters>) -> orbit_registry::AdapterFactory {
    Arc::new(move |config: &Value| {
        let base_url = config.get("baseUrl").and_then(Value::as_str).unwrap_or("https://api.anthropic.com").to_string();
        let api_key = config.get("apiKey").and_then(Value::as_str).map(str::to_string);
        let adapter_config = HttpAdapterConfig { base_url, api_key, headers: HashMap::new(), capabilities: http_capabilities() };
        Arc::new(HttpAdapter::new(CLAUDE_PROVIDER_ID, adapter_config).with_counters(counters.clone())) as Arc<dyn ProviderAdapter>
    })
}

fn api_key_env(config: &Value) -> HashMap<String, String> {
    let mut env = HashMap::new();
    if let Some(key) = config.get("apiKey").and_then(Value::as_str) {
        env.insert("COPILOT_API_KEY".to_string(), key.to_string());
    }
    env
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn registers_both_providers_disabled_by_default() {
        let registry = Registry::new();
        register_all(&registry, &HashMap::new(), Arc::new(ReliabilityCounters::new())).await.unwrap();

        let started = registry.start_all().await;
        assert!(started.is_empty());
    }

    #[tokio::test]
    async fn starts_a_provider_explicitly_enabled_in_config() {
        let registry = Registry::new();
        let mut providers = HashMap::new();
        providers.insert(CLAUDE_PROVIDER_ID.to_string(), ProviderConfig { enabled: true, executable_path: None, api_key: Some("sk-test".to_string()), model: None, timeout_secs: None });
        register_all(&registry, &providers, Arc::new(ReliabilityCounters::new())).await.unwrap();

        let started = registry.start_all().await;
        assert_eq!(started, vec![CLAUDE_PROVIDER_ID.to_string()]);
    }
}
