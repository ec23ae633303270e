//! The approval manager (§4.6): records a `session/request_permission`
//! prompt surfaced by a `ProviderAdapter`, arms its 60-second expiry, and
//! forwards the eventual decision back through `resolve_approval`.
//!
//! Authorization (is the deciding client actually subscribed to this
//! approval's thread?) is the relay's concern, not this crate's — it owns
//! the subscription tables this manager has no reason to know about.
//! `thread_id_for` exposes just enough for the relay to make that call
//! before invoking `resolve`.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use orbit_adapters::{ApprovalOutcome, ApprovalRequest, ProviderAdapter};
use orbit_core::ReliabilityCounters;
use tracing::warn;

use crate::error::{ApprovalError, ApprovalResult};

/// How long a pending approval waits for a decision before it auto-resolves
/// as cancelled (§4.6 step 4).
pub const APPROVAL_TIMEOUT: Duration = Duration::from_secs(60);

struct PendingEntry {
    adapter: Arc<dyn ProviderAdapter>,
    thread_id: String,
    request: ApprovalRequest,
}

/// Correlates in-flight `session/request_permission` prompts with their
/// eventual decisions, one entry per `rpcId` (§4.6: "keyed by rpcId, not
/// by session" — multiple pending approvals per session are expected).
#[derive(Clone, Default)]
pub struct ApprovalManager {
    pending: Arc<DashMap<String, PendingEntry>>,
    counters: Option<Arc<ReliabilityCounters>>,
}

impl ApprovalManager {
    /// An approval manager with nothing pending and no reliability
    /// counters wired in.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach reliability counters; an auto-cancelled timeout increments
    /// `approval_timeouts`. Intended to be chained immediately after
    /// construction.
    #[must_use]
    pub fn with_counters(mut self, counters: Arc<ReliabilityCounters>) -> Self {
        self.counters = Some(counters);
        self
    }

    /// Record a newly surfaced approval request and arm its timeout. The
    /// caller (the relay, wired through `on_approval_request`) is still
    /// responsible for broadcasting the event to subscribed clients.
    pub fn record(&self, adapter: Arc<dyn ProviderAdapter>, thread_id: impl Into<String>, request: ApprovalRequest) {
        let thread_id = thread_id.into();
        let rpc_id = request.rpc_id.clone();
        self.pending.insert(
            rpc_id.clone(),
            PendingEntry {
                adapter: adapter.clone(),
                thread_id,
                request,
            },
        );
        self.arm_timeout(rpc_id, adapter);
    }

    fn arm_timeout(&self, rpc_id: String, adapter: Arc<dyn ProviderAdapter>) {
        let pending = self.pending.clone();
        let counters = self.counters.clone();
        tokio::spawn(async move {
            tokio::time::sleep(APPROVAL_TIMEOUT).await;
            if pending.remove(&rpc_id).is_none() {
                return;
            }
            warn!(rpc_id, "approval timed out with no decision, auto-cancelling");
            if let Some(counters) = &counters {
                counters.inc_approval_timeout();
            }
            if let Err(err) = adapter.resolve_approval(&rpc_id, ApprovalOutcome::Cancelled).await {
                warn!(rpc_id, error = %err, "failed to deliver timeout cancellation to adapter");
            }
        });
    }

    /// The thread id an in-flight approval belongs to, for the relay's
    /// subscription-authorization check.
    #[must_use]
    pub fn thread_id_for(&self, rpc_id: &str) -> Option<String> {
        self.pending.get(rpc_id).map(|entry| entry.thread_id.clone())
    }

    /// The full request detail for an in-flight approval, for rebuilding a
    /// broadcast payload (e.g. when a late-subscribing client needs replay).
    #[must_use]
    pub fn request_for(&self, rpc_id: &str) -> Option<ApprovalRequest> {
        self.pending.get(rpc_id).map(|entry| entry.request.clone())
    }

    /// Resolve a pending approval with a client's decision.
    ///
    /// # Errors
    ///
    /// Returns [`ApprovalError::UnknownOrExpired`] if `rpc_id` has no
    /// pending entry (never recorded, already resolved, or its timeout
    /// already fired), or [`ApprovalError::Adapter`] if the adapter failed
    /// to deliver the outcome.
    pub async fn resolve(&self, rpc_id: &str, outcome: ApprovalOutcome) -> ApprovalResult<()> {
        let (_, entry) = self
            .pending
            .remove(rpc_id)
            .ok_or_else(|| ApprovalError::UnknownOrExpired(rpc_id.to_string()))?;
        entry.adapter.resolve_approval(rpc_id, outcome).await?;
        Ok(())
    }

    /// Number of approvals currently awaiting a decision.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use orbit_adapters::{AdapterResult, ListSessionsParams, ProviderHealth, PromptInput, PromptOptions, TurnAck};
    use orbit_core::session::NormalizedSession;
    use orbit_core::ProviderCapabilities;
    use orbit_normalizer::Normalizer;
    use std::sync::Mutex;

    struct RecordingAdapter {
        resolved: Mutex<Vec<(String, ApprovalOutcome)>>,
        normalizer: Normalizer,
    }

    impl RecordingAdapter {
        fn new() -> Self {
            Self {
                resolved: Mutex::new(Vec::new()),
                normalizer: Normalizer::new().with_counters(Arc::new(ReliabilityCounters::new())),
            }
        }
    }

    #[async_trait]
    impl ProviderAdapter for RecordingAdapter {
        fn provider_id(&self) -> &str {
            "fake"
        }
        async fn start(&self) -> AdapterResult<()> {
            Ok(())
        }
        async fn stop(&self) -> AdapterResult<()> {
            Ok(())
        }
        async fn health(&self) -> ProviderHealth {
            ProviderHealth::healthy("fake", "ok")
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
        async fn on_approval_request(&self, _handler: orbit_adapters::ApprovalRequestHandler) {}
        async fn resolve_approval(&self, rpc_id: &str, outcome: ApprovalOutcome) -> AdapterResult<()> {
            self.resolved.lock().unwrap().push((rpc_id.to_string(), outcome));
            Ok(())
        }
        fn normalizer(&self) -> &Normalizer {
            &self.normalizer
        }
    }

    fn sample_request(rpc_id: &str) -> ApprovalRequest {
        ApprovalRequest {
            rpc_id: rpc_id.to_string(),
            session_id: "sess-1".to_string(),
            tool_call_id: "call-1".to_string(),
            tool_title: Some("Delete file".to_string()),
            tool_kind: Some("fs.delete".to_string()),
            options: vec![],
        }
    }

    #[tokio::test]
    async fn resolve_delivers_outcome_to_adapter_and_clears_entry() {
        let manager = ApprovalManager::new();
        let adapter = Arc::new(RecordingAdapter::new());
        manager.record(adapter.clone(), "codex:sess-1", sample_request("req-1"));

        assert_eq!(manager.pending_count(), 1);
        assert_eq!(manager.thread_id_for("req-1").as_deref(), Some("codex:sess-1"));

        manager
            .resolve("req-1", ApprovalOutcome::Selected { option_id: "allow".into() })
            .await
            .unwrap();

        assert_eq!(manager.pending_count(), 0);
        let resolved = adapter.resolved.lock().unwrap();
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].0, "req-1");
    }

    #[tokio::test]
    async fn resolve_unknown_rpc_id_errors() {
        let manager = ApprovalManager::new();
        let err = manager.resolve("ghost", ApprovalOutcome::Cancelled).await;
        assert!(matches!(err, Err(ApprovalError::UnknownOrExpired(_))));
    }

    #[tokio::test]
    async fn double_resolve_errors_on_second_call() {
        let manager = ApprovalManager::new();
        let adapter = Arc::new(RecordingAdapter::new());
        manager.record(adapter.clone(), "codex:sess-1", sample_request("req-1"));

        manager.resolve("req-1", ApprovalOutcome::Cancelled).await.unwrap();
        let second = manager.resolve("req-1", ApprovalOutcome::Cancelled).await;
        assert!(second.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_auto_cancels_and_clears_entry() {
        let manager = ApprovalManager::new();
        let adapter = Arc::new(RecordingAdapter::new());
        manager.record(adapter.clone(), "codex:sess-1", sample_request("req-1"));

        tokio::time::advance(APPROVAL_TIMEOUT + Duration::from_secs(1)).await;
        tokio::task::yield_now().await;

        assert_eq!(manager.pending_count(), 0);
        let resolved = adapter.resolved.lock().unwrap();
        assert_eq!(resolved.len(), 1);
        assert!(matches!(resolved[0].1, ApprovalOutcome::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_increments_the_approval_timeout_counter() {
        let counters = Arc::new(ReliabilityCounters::new());
        let manager = ApprovalManager::new().with_counters(counters.clone());
        let adapter = Arc::new(RecordingAdapter::new());
        manager.record(adapter.clone(), "codex:sess-1", sample_request("req-1"));

        tokio::time::advance(APPROVAL_TIMEOUT + Duration::from_secs(1)).await;
        tokio::task::yield_now().await;

        assert_eq!(counters.snapshot().approval_timeouts, 1);
    }
}
