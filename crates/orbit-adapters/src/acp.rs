//! The subprocess-backed ACP adapter: spawns a CLI, speaks JSON-RPC 2.0
//! over its stdio, and bridges `session/update` notifications into the
//! normalizer and `session/request_permission` requests into the
//! approval-request handler (§4.3).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use orbit_core::session::{NormalizedSession, SessionStatus};
use orbit_core::{ProviderCapabilities, ReliabilityCounters};
use orbit_normalizer::Normalizer;
use orbit_rpc::{RpcErrorObject, StdioRpcClient};
use serde_json::{json, Value};
use tokio::process::Command;
use tokio::sync::{oneshot, Mutex, RwLock};
use tracing::{info, warn};

use crate::adapter::{ApprovalOption, ApprovalOutcome, ApprovalRequest, ApprovalRequestHandler, ListSessionsParams, ProviderAdapter};
use crate::error::{AdapterError, AdapterResult};
use crate::health::ProviderHealth;
use crate::prompt::{PromptInput, PromptOptions, TurnAck};

/// Default bound on how long `stop()` waits for the subprocess to exit
/// before it's killed outright (§7 shutdown grace).
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Default per-request timeout for outbound JSON-RPC calls (§7).
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// How the subprocess is launched.
#[derive(Debug, Clone)]
pub struct AcpAdapterConfig {
    /// The binary to spawn.
    pub command: String,
    /// Arguments passed to it.
    pub args: Vec<String>,
    /// Extra environment variables.
    pub env: HashMap<String, String>,
    /// Working directory, if not the process's own.
    pub working_dir: Option<String>,
    /// Capability flags this provider build advertises.
    pub capabilities: ProviderCapabilities,
}

type PendingApprovals = Arc<Mutex<HashMap<String, oneshot::Sender<ApprovalOutcome>>>>;
type ApprovalHandlerSlot = Arc<RwLock<Option<ApprovalRequestHandler>>>;

/// A running (or not-yet-started) ACP subprocess adapter.
pub struct AcpAdapter {
    provider_id: String,
    config: AcpAdapterConfig,
    normalizer: Normalizer,
    client: RwLock<Option<StdioRpcClient>>,
    approval_handler: ApprovalHandlerSlot,
    pending_approvals: PendingApprovals,
    last_health: RwLock<ProviderHealth>,
    counters: Option<Arc<ReliabilityCounters>>,
}

impl AcpAdapter {
    /// Construct an adapter that has not yet spawned its subprocess.
    #[must_use]
    pub fn new(provider_id: impl Into<String>, config: AcpAdapterConfig) -> Self {
        let provider_id = provider_id.into();
        Self {
            last_health: RwLock::new(ProviderHealth::unhealthy(&provider_id, "not started")),
            provider_id,
            config,
            normalizer: Normalizer::new(),
            client: RwLock::new(None),
            approval_handler: Arc::new(RwLock::new(None)),
            pending_approvals: Arc::new(Mutex::new(HashMap::new())),
            counters: None,
        }
    }

    /// Attach reliability counters; a restarted dead subprocess increments
    /// `adapter_restarts`, and the normalizer's own timeout flushes
    /// increment `normalizer_timeouts`. Intended to be chained immediately
    /// after construction.
    #[must_use]
    pub fn with_counters(mut self, counters: Arc<ReliabilityCounters>) -> Self {
        self.normalizer = self.normalizer.with_counters(counters.clone());
        self.counters = Some(counters);
        self
    }

    fn build_command(&self) -> Command {
        let mut command = Command::new(&self.config.command);
        command.args(&self.config.args);
        for (key, value) in &self.config.env {
            command.env(key, value);
        }
        if let Some(dir) = &self.config.working_dir {
            command.current_dir(dir);
        }
        command
    }

    async fn wire_handlers(&self, client: &StdioRpcClient) {
        let normalizer = self.normalizer.clone();
        let provider_id = self.provider_id.clone();
        client
            .on_notification(
                "session/update",
                Arc::new(move |params| {
                    let Some(params) = params else { return };
                    let Some(session_id) = params.get("sessionId").and_then(Value::as_str) else {
                        return;
                    };
                    let Some(turn_id) = params.get("turnId").and_then(Value::as_str) else {
                        return;
                    };
                    let update = params.get("update").cloned().unwrap_or(Value::Null);
                    normalizer.process(&provider_id, session_id, turn_id, update);
                }),
            )
            .await;

        let pending_for_request = self.pending_approvals.clone();
        let notify_handler = self.approval_handler.clone();

        client
            .on_request(
                "session/request_permission",
                Arc::new(move |params| {
                    let pending = pending_for_request.clone();
                    let notify_handler = notify_handler.clone();
                    Box::pin(async move {
                        let Some(params) = params else {
                            return Err(RpcErrorObject::internal("missing params"));
                        };
                        let rpc_id = params
                            .get("requestId")
                            .or_else(|| params.get("rpcId"))
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string();
                        let session_id = params.get("sessionId").and_then(Value::as_str).unwrap_or_default().to_string();
                        let tool_call_id = params.get("toolCallId").and_then(Value::as_str).unwrap_or_default().to_string();
                        let tool_title = params.get("toolTitle").and_then(Value::as_str).map(str::to_string);
                        let tool_kind = params.get("toolKind").and_then(Value::as_str).map(str::to_string);
                        let options = params
                            .get("options")
                            .and_then(Value::as_array)
                            .map(|opts| {
                                opts.iter()
                                    .filter_map(|opt| {
                                        let id = opt.get("id").or_else(|| opt.get("optionId")).and_then(Value::as_str)?;
                                        Some(ApprovalOption {
                                            id: id.to_string(),
                                            label: opt.get("label").and_then(Value::as_str).map(str::to_string),
                                        })
                                    })
                                    .collect()
                            })
                            .unwrap_or_default();

                        let request = ApprovalRequest {
                            rpc_id: rpc_id.clone(),
                            session_id,
                            tool_call_id,
                            tool_title,
                            tool_kind,
                            options,
                        };

                        let (tx, rx) = oneshot::channel();
                        pending.lock().await.insert(rpc_id.clone(), tx);

                        if let Some(handler) = notify_handler.read().await.as_ref() {
                            handler(request);
                        } else {
                            warn!(rpc_id, "no approval handler registered, request will hang until resolved externally");
                        }

                        let outcome = rx.await.unwrap_or(ApprovalOutcome::Cancelled);
                        pending.lock().await.remove(&rpc_id);

                        Ok(match outcome {
                            ApprovalOutcome::Selected { option_id } => json!({"outcome": "selected", "optionId": option_id}),
                            ApprovalOutcome::Cancelled => json!({"outcome": "cancelled"}),
                        })
                    })
                }),
            )
            .await;
    }
}

#[async_trait]
impl ProviderAdapter for AcpAdapter {
    fn provider_id(&self) -> &str {
        &self.provider_id
    }

    async fn start(&self) -> AdapterResult<()> {
        // A present client that isn't closed is still alive; nothing to do.
        // A present client that *is* closed means the subprocess died and
        // this call is a restart, not a first start (§4.3 "restart is the
        // adapter's responsibility").
        let restart = match self.client.read().await.as_ref() {
            None => false,
            Some(client) if !client.is_closed() => return Ok(()),
            Some(_) => true,
        };

        let command = self.build_command();
        match StdioRpcClient::spawn(command).await {
            Ok(client) => {
                self.wire_handlers(&client).await;
                *self.client.write().await = Some(client);
                *self.last_health.write().await = ProviderHealth::healthy(&self.provider_id, "subprocess running");
                if restart {
                    if let Some(counters) = &self.counters {
                        counters.inc_adapter_restart();
                    }
                    info!(provider = %self.provider_id, "acp adapter subprocess restarted after crash");
                } else {
                    info!(provider = %self.provider_id, "acp adapter started");
                }
            }
            Err(err) => {
                warn!(provider = %self.provider_id, error = %err, "failed to spawn acp subprocess, marking degraded");
                *self.last_health.write().await =
                    ProviderHealth::degraded(&self.provider_id, format!("failed to spawn: {err}"));
            }
        }
        Ok(())
    }

    async fn stop(&self) -> AdapterResult<()> {
        if let Some(client) = self.client.write().await.take() {
            let _ = tokio::time::timeout(SHUTDOWN_GRACE, client.shutdown()).await;
        }
        *self.last_health.write().await = ProviderHealth::unhealthy(&self.provider_id, "stopped");
        Ok(())
    }

    async fn health(&self) -> ProviderHealth {
        if let Some(client) = self.client.read().await.as_ref() {
            if client.is_closed() {
                return ProviderHealth::unhealthy(&self.provider_id, "subprocess channel closed");
            }
        }
        self.last_health.read().await.clone()
    }

    fn capabilities(&self) -> ProviderCapabilities {
        self.config.capabilities
    }

    async fn list_sessions(&self, _params: ListSessionsParams) -> AdapterResult<Vec<NormalizedSession>> {
        let client = self.require_client().await?;
        let result = client.request("thread/list", json!({}), REQUEST_TIMEOUT).await?;
        let sessions = result
            .get("sessions")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        Ok(sessions
            .into_iter()
            .filter_map(|raw| parse_normalized_session(&self.provider_id, raw))
            .collect())
    }

    async fn send_prompt(
        &self,
        session_id: &str,
        prompt: PromptInput,
        options: Option<PromptOptions>,
    ) -> AdapterResult<TurnAck> {
        let client = self.require_client().await?;
        let mut params = json!({
            "sessionId": session_id,
            "prompt": prompt,
        });
        if let Some(options) = options {
            params["options"] = options;
        }
        let result = client.request("turn/start", params, REQUEST_TIMEOUT).await?;
        let turn_id = result
            .get("turnId")
            .and_then(Value::as_str)
            .ok_or_else(|| AdapterError::Unavailable {
                provider: self.provider_id.clone(),
                reason: "turn/start response missing turnId".into(),
            })?
            .to_string();
        let status = result.get("status").and_then(Value::as_str).unwrap_or("started").to_string();
        Ok(TurnAck { turn_id, status })
    }

    async fn on_approval_request(&self, handler: ApprovalRequestHandler) {
        *self.approval_handler.write().await = Some(handler);
    }

    async fn resolve_approval(&self, rpc_id: &str, outcome: ApprovalOutcome) -> AdapterResult<()> {
        let tx = self.pending_approvals.lock().await.remove(rpc_id);
        match tx {
            Some(tx) => {
                let _ = tx.send(outcome);
                Ok(())
            }
            None => Err(AdapterError::UnknownSession(rpc_id.to_string())),
        }
    }

    fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }
}

impl AcpAdapter {
    async fn require_client(&self) -> AdapterResult<StdioRpcClient> {
        self.client
            .read()
            .await
            .clone()
            .ok_or_else(|| AdapterError::Unavailable {
                provider: self.provider_id.clone(),
                reason: "adapter not started".into(),
            })
    }
}

fn parse_normalized_session(provider: &str, raw: Value) -> Option<NormalizedSession> {
    let session_id = raw.get("sessionId").and_then(Value::as_str)?.to_string();
    let status = match raw.get("status").and_then(Value::as_str) {
        Some("active") => SessionStatus::Active,
        Some("idle") => SessionStatus::Idle,
        Some("completed") => SessionStatus::Completed,
        Some("error") => SessionStatus::Error,
        Some("interrupted") => SessionStatus::Interrupted,
        _ => SessionStatus::Idle,
    };
    let now = chrono::Utc::now();
    Some(NormalizedSession {
        provider: provider.to_string(),
        session_id,
        title: raw.get("title").and_then(Value::as_str).map(str::to_string).unwrap_or_default(),
        project: raw.get("project").and_then(Value::as_str).map(str::to_string),
        repo: raw.get("repo").and_then(Value::as_str).map(str::to_string),
        status,
        created_at: raw.get("createdAt").and_then(Value::as_str).and_then(parse_timestamp).unwrap_or(now),
        updated_at: raw.get("updatedAt").and_then(Value::as_str).and_then(parse_timestamp).unwrap_or(now),
        preview: raw.get("preview").and_then(Value::as_str).map(str::to_string),
        metadata: raw.get("metadata").cloned(),
        raw_session: raw,
    })
}

fn parse_timestamp(raw: &str) -> Option<chrono::DateTime<chrono::Utc>> {
    chrono::DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.with_timezone(&chrono::Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter_with_script(script: &str) -> AcpAdapter {
        let config = AcpAdapterConfig {
            command: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
            env: HashMap::new(),
            working_dir: None,
            capabilities: ProviderCapabilities::none(),
        };
        AcpAdapter::new("test-provider", config)
    }

    #[tokio::test]
    async fn start_is_a_no_op_while_the_subprocess_is_alive() {
        let counters = Arc::new(ReliabilityCounters::new());
        let adapter = adapter_with_script("cat").with_counters(counters.clone());

        adapter.start().await.unwrap();
        adapter.start().await.unwrap();

        assert_eq!(counters.snapshot().adapter_restarts, 0);
        adapter.stop().await.unwrap();
    }

    #[tokio::test]
    async fn start_respawns_and_counts_a_restart_once_the_subprocess_has_exited() {
        let counters = Arc::new(ReliabilityCounters::new());
        let adapter = adapter_with_script("exit 0").with_counters(counters.clone());
        adapter.start().await.unwrap();

        for _ in 0..50 {
            let closed = adapter.client.read().await.as_ref().is_some_and(StdioRpcClient::is_closed);
            if closed {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        adapter.start().await.unwrap();

        assert_eq!(counters.snapshot().adapter_restarts, 1);
        adapter.stop().await.unwrap();
    }
}
