//! The `ProviderAdapter` contract (§4.3): every provider, subprocess-backed
//! or HTTP-backed, implements the same surface so the registry and relay
//! never need to know which kind they're talking to.

use std::sync::Arc;

use async_trait::async_trait;
use orbit_core::session::NormalizedSession;
use orbit_core::ProviderCapabilities;
use orbit_normalizer::Normalizer;
use serde::{Deserialize, Serialize};

use crate::error::AdapterResult;
use crate::health::ProviderHealth;
use crate::prompt::{PromptInput, PromptOptions, TurnAck};

/// One selectable option on a permission prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalOption {
    /// The option's id, echoed back in the decision.
    pub id: String,
    /// Human-readable label, if the subprocess provided one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// A normalized `session/request_permission` prompt, surfaced to whatever
/// registered via [`ProviderAdapter::on_approval_request`] (the approval
/// manager).
#[derive(Debug, Clone)]
pub struct ApprovalRequest {
    /// The JSON-RPC request id this approval answers; the resolution key.
    pub rpc_id: String,
    /// The provider's session id the prompt belongs to.
    pub session_id: String,
    /// The tool call this permission prompt is gating.
    pub tool_call_id: String,
    /// Display title for the tool call, if any.
    pub tool_title: Option<String>,
    /// A provider-specific tool kind/category, if any.
    pub tool_kind: Option<String>,
    /// The options the user may choose from.
    pub options: Vec<ApprovalOption>,
}

/// A fire-and-forget notification callback: the adapter calls this once
/// per inbound approval request, then blocks its own RPC response future
/// until [`ProviderAdapter::resolve_approval`] is called (by the approval
/// manager, on a client decision or its own 60-second timeout) — the
/// adapter does not track the timeout itself.
pub type ApprovalRequestHandler = Arc<dyn Fn(ApprovalRequest) + Send + Sync>;

/// Outcome of a resolved approval, mirrored from §4.6's wire shape.
#[derive(Debug, Clone)]
pub enum ApprovalOutcome {
    /// The user picked a specific option.
    Selected {
        /// The chosen option's id.
        option_id: String,
    },
    /// The user dismissed the prompt without choosing, or the approval
    /// manager's timer fired.
    Cancelled,
}

/// Optional filters for `listSessions`.
#[derive(Debug, Clone, Default)]
pub struct ListSessionsParams {
    /// Only sessions updated after this point, if the adapter supports
    /// pagination/filtering capability.
    pub since: Option<chrono::DateTime<chrono::Utc>>,
    /// Maximum number of sessions to return.
    pub limit: Option<usize>,
}

/// A live provider connection: a running subprocess, or an HTTP/SSE
/// client, behind one uniform contract.
///
/// Every method here is infallible to the *caller's* caller — the
/// registry wraps adapter calls so a single provider's failure can never
/// propagate to another (§4.3's failure policy) — but the adapter itself
/// still reports `AdapterResult` so the registry can distinguish "this one
/// operation failed" from "the provider is down".
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// This adapter's provider id, stable for its lifetime.
    fn provider_id(&self) -> &str;

    /// Idempotent. Acquire resources (spawn the subprocess, open the HTTP
    /// client). Never returns an error for a recoverable failure — an
    /// unreachable backend is reported via `health()` as degraded, not by
    /// failing `start()`.
    async fn start(&self) -> AdapterResult<()>;

    /// Idempotent. Release resources within a bounded shutdown deadline.
    async fn stop(&self) -> AdapterResult<()>;

    /// A point-in-time health report.
    async fn health(&self) -> ProviderHealth;

    /// This adapter's capability flags for the running build/config.
    fn capabilities(&self) -> ProviderCapabilities;

    /// List this provider's known sessions.
    async fn list_sessions(&self, params: ListSessionsParams) -> AdapterResult<Vec<NormalizedSession>>;

    /// Send a prompt to a session; returns an acknowledgment immediately,
    /// with actual content following via the normalizer's event stream.
    async fn send_prompt(
        &self,
        session_id: &str,
        prompt: PromptInput,
        options: Option<PromptOptions>,
    ) -> AdapterResult<TurnAck>;

    /// Register the handler invoked for every inbound permission request.
    /// Adapters that never surface permission prompts (HTTP/SSE providers,
    /// typically) may implement this as a no-op.
    async fn on_approval_request(&self, handler: ApprovalRequestHandler);

    /// Resolve a pending permission request previously surfaced through
    /// the approval manager (§4.6).
    async fn resolve_approval(&self, rpc_id: &str, outcome: ApprovalOutcome) -> AdapterResult<()>;

    /// The shared normalizer this adapter feeds streaming updates into.
    /// Callers subscribe to it for normalized events rather than to the
    /// adapter directly.
    fn normalizer(&self) -> &Normalizer;
}
