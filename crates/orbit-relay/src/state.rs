//! The relay's shared state: every component wired together behind the
//! `Arc` that axum hands to each request/connection handler (§4.5).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use orbit_approval::ApprovalManager;
use orbit_auth::AuthManager;
use orbit_core::ReliabilityCounters;
use orbit_registry::Registry;
use orbit_store::EventStore;
use tokio::sync::{broadcast, RwLock};

use crate::config::{ProviderConfig, RelayConfig};
use crate::dedup::DedupTracker;
use crate::subscriptions::SubscriptionIndex;
use crate::title_store::TitleStore;
use crate::upload_store::UploadStore;

/// Capacity of the internal shutdown-broadcast channel. One slot is
/// enough since it only ever carries a single "stop" signal.
const SHUTDOWN_CHANNEL_CAPACITY: usize = 1;

/// Everything a connection or HTTP handler needs, cloned cheaply (it's an
/// `Arc` around a bundle of already-cheap-to-clone components).
#[derive(Clone)]
pub struct RelayState(Arc<Inner>);

struct Inner {
    config: RelayConfig,
    store: EventStore,
    auth: AuthManager,
    registry: Arc<Registry>,
    approvals: ApprovalManager,
    subscriptions: SubscriptionIndex,
    dedup: DedupTracker,
    titles: TitleStore,
    uploads: UploadStore,
    providers: RwLock<HashMap<String, ProviderConfig>>,
    counters: Arc<ReliabilityCounters>,
    shutdown: broadcast::Sender<()>,
    started_at: chrono::DateTime<chrono::Utc>,
}

impl RelayState {
    /// Assemble the relay's shared state from its already-constructed
    /// components. Called once by `orbit-server` at startup.
    #[must_use]
    pub fn new(
        config: RelayConfig,
        store: EventStore,
        auth: AuthManager,
        registry: Arc<Registry>,
        approvals: ApprovalManager,
        counters: Arc<ReliabilityCounters>,
    ) -> Self {
        let titles = TitleStore::new(config.title_store_path.clone());
        let uploads = UploadStore::new(config.uploads.upload_dir.join(".metadata.json"));
        let providers = RwLock::new(config.providers.clone());
        let (shutdown, _) = broadcast::channel(SHUTDOWN_CHANNEL_CAPACITY);
        Self(Arc::new(Inner {
            config,
            store,
            auth,
            registry,
            approvals,
            subscriptions: SubscriptionIndex::new(),
            dedup: DedupTracker::new(),
            titles,
            uploads,
            providers,
            counters,
            shutdown,
            started_at: chrono::Utc::now(),
        }))
    }

    /// This relay's configuration slice.
    #[must_use]
    pub fn config(&self) -> &RelayConfig {
        &self.0.config
    }

    /// The shared event store.
    #[must_use]
    pub fn store(&self) -> &EventStore {
        &self.0.store
    }

    /// The shared auth manager.
    #[must_use]
    pub fn auth(&self) -> &AuthManager {
        &self.0.auth
    }

    /// The provider registry.
    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.0.registry
    }

    /// The approval manager.
    #[must_use]
    pub fn approvals(&self) -> &ApprovalManager {
        &self.0.approvals
    }

    /// The live connection/subscription tables.
    #[must_use]
    pub fn subscriptions(&self) -> &SubscriptionIndex {
        &self.0.subscriptions
    }

    /// The client-request duplicate-suppression tracker.
    #[must_use]
    pub fn dedup(&self) -> &DedupTracker {
        &self.0.dedup
    }

    /// The external thread-title store.
    #[must_use]
    pub fn titles(&self) -> &TitleStore {
        &self.0.titles
    }

    /// The upload-metadata side-table.
    #[must_use]
    pub fn uploads(&self) -> &UploadStore {
        &self.0.uploads
    }

    /// A snapshot of every provider's launch parameters, as currently
    /// held in memory (§6 `GET /api/config/providers`).
    pub async fn provider_configs(&self) -> HashMap<String, ProviderConfig> {
        self.0.providers.read().await.clone()
    }

    /// Merge `patch` into the in-memory provider config table and, if
    /// this relay was started from an on-disk config file, persist the
    /// merged `providers` key back into it (§6 `PATCH /api/config/providers`).
    ///
    /// # Errors
    ///
    /// Returns an error if the on-disk config file exists but cannot be
    /// read, parsed as JSON, or written back.
    pub async fn patch_provider_config(&self, provider_id: &str, patch: ProviderConfig) -> crate::error::RelayResult<()> {
        {
            let mut providers = self.0.providers.write().await;
            providers.insert(provider_id.to_string(), patch);
        }
        self.persist_provider_configs().await
    }

    async fn persist_provider_configs(&self) -> crate::error::RelayResult<()> {
        let Some(path) = self.0.config.config_file_path.clone() else {
            return Ok(());
        };
        let providers = self.0.providers.read().await.clone();
        tokio::task::spawn_blocking(move || crate::config::merge_providers_into_file(&path, &providers))
            .await
            .map_err(|err| crate::error::RelayError::BadRequest(format!("config write task panicked: {err}")))?
    }

    /// Process-wide reliability counters.
    #[must_use]
    pub fn counters(&self) -> &ReliabilityCounters {
        &self.0.counters
    }

    /// When this relay process started, for `/health`'s uptime field.
    #[must_use]
    pub fn started_at(&self) -> chrono::DateTime<chrono::Utc> {
        self.0.started_at
    }

    /// Subscribe to the shutdown broadcast; every open WS connection
    /// listens on this to close itself during graceful shutdown.
    #[must_use]
    pub fn subscribe_shutdown(&self) -> broadcast::Receiver<()> {
        self.0.shutdown.subscribe()
    }

    /// Broadcast the shutdown signal to every listener. Called once, from
    /// the signal handler installed by `orbit-server`.
    pub fn trigger_shutdown(&self) {
        let _ = self.0.shutdown.send(());
    }

    /// Close every open socket with reason "token rotated" (§4.5
    /// connection lifecycle, §4.9 rotation). Unlike [`Self::trigger_shutdown`]
    /// this does not stop the process — connections are expected to
    /// reconnect with the new token.
    pub fn close_all_for_token_rotation(&self) {
        let frame = crate::ws::close_frame(1000, "token rotated");
        for client in self.0.subscriptions.all_clients() {
            client.outbound.try_send(frame.clone());
        }
        for anchor in self.0.subscriptions.all_anchors() {
            anchor.outbound.try_send(frame.clone());
        }
    }

    /// How long the periodic event-store prune sweep sleeps between runs
    /// (§4.7: "scheduled every 6 hours").
    #[must_use]
    pub fn prune_interval(&self) -> Duration {
        Duration::from_secs(6 * 60 * 60)
    }

    /// Delete every upload whose `expiresAt` has passed, both the file on
    /// disk and its side-table entry. Driven by the same periodic sweep
    /// as `prune_interval`, and also reachable from `POST /admin/repair`.
    ///
    /// # Errors
    ///
    /// Returns an error if the side-table or filesystem can't be read.
    pub async fn prune_uploads(&self) -> crate::error::RelayResult<u64> {
        crate::http::uploads::prune_expired(self).await
    }
}
