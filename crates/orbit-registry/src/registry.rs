//! The provider registry (§4.4): holds `{id -> config}` and, after
//! `start_all`, `{id -> running adapter}`. Built for one thing, imitating
//! `astrid-gateway`'s `AgentManager`: a flat id-keyed table behind a lock,
//! lifecycle methods that isolate one entry's failure from the rest.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use orbit_adapters::{AdapterResult, ProviderAdapter, ProviderHealth};
use orbit_core::ProviderCapabilities;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::config::resolve_enabled;
use crate::error::{RegistryError, RegistryResult};

/// Bound on how long `stop_all` waits for each adapter before moving on
/// (§7 shutdown grace; mirrors `orbit-adapters`' own `SHUTDOWN_GRACE`).
pub const STOP_GRACE: Duration = Duration::from_secs(5);

/// Builds a fresh adapter instance from its config object. Registered once
/// per provider id; invoked lazily by `start_all`, never at `register`
/// time (§4.4: "no instantiation yet").
pub type AdapterFactory = Arc<dyn Fn(&Value) -> Arc<dyn ProviderAdapter> + Send + Sync>;

struct Registration {
    factory: AdapterFactory,
    config: Value,
    is_default: bool,
}

/// A snapshot entry returned by `list`/`capabilities_table`.
#[derive(Clone)]
pub struct ProviderEntry {
    /// The provider id.
    pub id: String,
    /// The live adapter, if it was enabled and has been started.
    pub adapter: Option<Arc<dyn ProviderAdapter>>,
}

/// Owns every provider's configuration and (once started) its adapter.
#[derive(Default)]
pub struct Registry {
    registrations: RwLock<HashMap<String, Registration>>,
    adapters: RwLock<HashMap<String, Arc<dyn ProviderAdapter>>>,
}

impl Registry {
    /// An empty registry with nothing registered.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a provider's factory and config. Does not construct or start
    /// anything — that happens in `start_all`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::AlreadyRegistered`] if `id` was registered
    /// before.
    pub async fn register(
        &self,
        id: impl Into<String>,
        factory: AdapterFactory,
        config: Value,
        is_default: bool,
    ) -> RegistryResult<()> {
        let id = id.into();
        let mut registrations = self.registrations.write().await;
        if registrations.contains_key(&id) {
            return Err(RegistryError::AlreadyRegistered(id));
        }
        registrations.insert(
            id,
            Registration {
                factory,
                config,
                is_default,
            },
        );
        Ok(())
    }

    /// Construct and start every enabled provider concurrently. A single
    /// provider's `start()` never fails per the adapter contract (it marks
    /// itself degraded instead), so this reports which providers were
    /// skipped as disabled rather than failures to start.
    pub async fn start_all(&self) -> Vec<String> {
        let pending: Vec<(String, AdapterFactory, Value)> = {
            let registrations = self.registrations.read().await;
            registrations
                .iter()
                .filter(|(_, reg)| resolve_enabled(&reg.config, reg.is_default))
                .map(|(id, reg)| (id.clone(), reg.factory.clone(), reg.config.clone()))
                .collect()
        };

        let mut started = Vec::with_capacity(pending.len());
        let futures = pending.into_iter().map(|(id, factory, config)| async move {
            let adapter = factory(&config);
            adapter.start().await.ok();
            info!(provider = %id, "provider started");
            (id, adapter)
        });

        for (id, adapter) in join_all(futures).await {
            self.adapters.write().await.insert(id.clone(), adapter);
            started.push(id);
        }
        started
    }

    /// Stop every running adapter concurrently, each bounded by
    /// [`STOP_GRACE`]. Adapters that don't respond in time are abandoned,
    /// not awaited further — `stop()` itself is expected to be idempotent,
    /// so a slow stop never blocks a second attempt.
    pub async fn stop_all(&self) {
        let adapters: Vec<Arc<dyn ProviderAdapter>> = self.adapters.write().await.drain().map(|(_, a)| a).collect();
        let futures = adapters.into_iter().map(|adapter| async move {
            let id = adapter.provider_id().to_string();
            match tokio::time::timeout(STOP_GRACE, adapter.stop()).await {
                Ok(Ok(())) => info!(provider = %id, "provider stopped"),
                Ok(Err(err)) => warn!(provider = %id, error = %err, "provider stop reported an error"),
                Err(_) => warn!(provider = %id, "provider did not stop within grace period"),
            }
        });
        join_all(futures).await;
    }

    /// The running adapter for `id`, if it exists and was started.
    pub async fn get(&self, id: &str) -> Option<Arc<dyn ProviderAdapter>> {
        self.adapters.read().await.get(id).cloned()
    }

    /// Every running adapter.
    pub async fn list(&self) -> Vec<Arc<dyn ProviderAdapter>> {
        self.adapters.read().await.values().cloned().collect()
    }

    /// Health reports for every running adapter, gathered concurrently.
    pub async fn health_all(&self) -> HashMap<String, ProviderHealth> {
        let adapters = self.list().await;
        let futures = adapters.into_iter().map(|adapter| async move {
            let id = adapter.provider_id().to_string();
            let health = adapter.health().await;
            (id, health)
        });
        join_all(futures).await.into_iter().collect()
    }

    /// Capability flags for every running adapter, keyed by provider id —
    /// what the relay injects into thread payloads (§4.5 step 2).
    pub async fn capability_table(&self) -> HashMap<String, ProviderCapabilities> {
        self.adapters
            .read()
            .await
            .iter()
            .map(|(id, adapter)| (id.clone(), adapter.capabilities()))
            .collect()
    }

    /// Call `send_prompt` / `list_sessions` against a provider by id,
    /// surfacing `Unavailable` if it isn't running rather than panicking.
    ///
    /// # Errors
    ///
    /// Returns an error if `id` has no running adapter.
    pub async fn require(&self, id: &str) -> AdapterResult<Arc<dyn ProviderAdapter>> {
        self.get(id).await.ok_or_else(|| orbit_adapters::AdapterError::Unavailable {
            provider: id.to_string(),
            reason: "not registered or not started".into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use orbit_adapters::{ApprovalOutcome, ApprovalRequestHandler, ListSessionsParams, PromptInput, PromptOptions, TurnAck};
    use orbit_core::session::NormalizedSession;
    use orbit_core::ReliabilityCounters;
    use orbit_normalizer::Normalizer;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct FakeAdapter {
        id: String,
        started: AtomicBool,
        normalizer: Normalizer,
    }

    #[async_trait]
    impl ProviderAdapter for FakeAdapter {
        fn provider_id(&self) -> &str {
            &self.id
        }
        async fn start(&self) -> AdapterResult<()> {
            self.started.store(true, Ordering::SeqCst);
            Ok(())
        }
        async fn stop(&self) -> AdapterResult<()> {
            self.started.store(false, Ordering::SeqCst);
            Ok(())
        }
        async fn health(&self) -> ProviderHealth {
            if self.started.load(Ordering::SeqCst) {
                ProviderHealth::healthy(&self.id, "ok")
            } else {
                ProviderHealth::unhealthy(&self.id, "not started")
            }
        }
        fn capabilities(&self) -> ProviderCapabilities {
            ProviderCapabilities::none()
        }
        async fn list_sessions(&self, _params: ListSessionsParams) -> AdapterResult<Vec<NormalizedSession>> {
            Ok(vec![])
        }
        async fn send_prompt(&self, _session_id: &str, _prompt: PromptInput, _options: Option<PromptOptions>) -> AdapterResult<TurnAck> {
            Ok(TurnAck { turn_id: "t".into(), status: "started".into() })
        }
        async fn on_approval_request(&self, _handler: ApprovalRequestHandler) {}
        async fn resolve_approval(&self, _rpc_id: &str, _outcome: ApprovalOutcome) -> AdapterResult<()> {
            Ok(())
        }
        fn normalizer(&self) -> &Normalizer {
            &self.normalizer
        }
    }

    fn fake_factory(id: &'static str) -> AdapterFactory {
        Arc::new(move |_config: &Value| {
            Arc::new(FakeAdapter {
                id: id.to_string(),
                started: AtomicBool::new(false),
                normalizer: Normalizer::new().with_counters(Arc::new(ReliabilityCounters::new())),
            }) as Arc<dyn ProviderAdapter>
        })
    }

    #[tokio::test]
    async fn register_rejects_duplicate_ids() {
        let registry = Registry::new();
        registry.register("codex", fake_factory("codex"), json!({}), true).await.unwrap();
        let err = registry.register("codex", fake_factory("codex"), json!({}), true).await;
        assert!(matches!(err, Err(RegistryError::AlreadyRegistered(_))));
    }

    #[tokio::test]
    async fn start_all_skips_disabled_opt_in_adapters() {
        let registry = Registry::new();
        registry.register("codex", fake_factory("codex"), json!({}), true).await.unwrap();
        registry.register("copilot", fake_factory("copilot"), json!({}), false).await.unwrap();

        let started = registry.start_all().await;
        assert_eq!(started, vec!["codex".to_string()]);
        assert!(registry.get("codex").await.is_some());
        assert!(registry.get("copilot").await.is_none());
    }

    #[tokio::test]
    async fn start_all_respects_explicit_opt_in() {
        let registry = Registry::new();
        registry
            .register("copilot", fake_factory("copilot"), json!({"enabled": true}), false)
            .await
            .unwrap();

        let started = registry.start_all().await;
        assert_eq!(started, vec!["copilot".to_string()]);
    }

    #[tokio::test]
    async fn stop_all_empties_the_adapter_table() {
        let registry = Registry::new();
        registry.register("codex", fake_factory("codex"), json!({}), true).await.unwrap();
        registry.start_all().await;
        assert_eq!(registry.list().await.len(), 1);

        registry.stop_all().await;
        assert_eq!(registry.list().await.len(), 0);
    }

    #[tokio::test]
    async fn health_all_reports_every_started_provider() {
        let registry = Registry::new();
        registry.register("codex", fake_factory("codex"), json!({}), true).await.unwrap();
        registry.start_all().await;

        let health = registry.health_all().await;
        assert_eq!(health.len(), 1);
        assert_eq!(health["codex"].healthy, orbit_adapters::Healthy::Healthy);
    }

    #[tokio::test]
    async fn require_errors_for_unregistered_provider() {
        let registry = Registry::new();
        assert!(registry.require("ghost").await.is_err());
    }
}
