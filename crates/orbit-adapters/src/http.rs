//! The HTTP/SSE-backed adapter (§4.3): a provider reached over plain HTTP
//! for request/response calls, with a Server-Sent Events stream pushing
//! session updates and permission requests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use orbit_core::session::{NormalizedSession, SessionStatus};
use orbit_core::{ProviderCapabilities, ReliabilityCounters};
use orbit_normalizer::Normalizer;
use reqwest::Client as HttpClient;
use reqwest_eventsource::{Event, EventSource};
use serde_json::{json, Value};
use tokio::sync::{oneshot, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::adapter::{ApprovalOption, ApprovalOutcome, ApprovalRequest, ApprovalRequestHandler, ListSessionsParams, ProviderAdapter};
use crate::error::{AdapterError, AdapterResult};
use crate::health::ProviderHealth;
use crate::prompt::{PromptInput, PromptOptions, TurnAck};

/// Delay before the SSE stream reconnects after a dropped connection.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Request timeout for the adapter's HTTP calls (§7).
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration for a provider reached over HTTP/SSE.
#[derive(Debug, Clone)]
pub struct HttpAdapterConfig {
    /// Base URL, e.g. `https://api.example.com/agent`.
    pub base_url: String,
    /// Bearer token sent with every request, if the provider requires one.
    pub api_key: Option<String>,
    /// Extra static headers.
    pub headers: HashMap<String, String>,
    /// Capability flags this provider build advertises.
    pub capabilities: ProviderCapabilities,
}

type PendingApprovals = Arc<Mutex<HashMap<String, oneshot::Sender<ApprovalOutcome>>>>;
type ApprovalHandlerSlot = Arc<RwLock<Option<ApprovalRequestHandler>>>;

/// An HTTP/SSE-backed provider adapter.
pub struct HttpAdapter {
    provider_id: String,
    config: HttpAdapterConfig,
    http: HttpClient,
    normalizer: Normalizer,
    approval_handler: ApprovalHandlerSlot,
    pending_approvals: PendingApprovals,
    sse_task: Mutex<Option<JoinHandle<()>>>,
    last_health: RwLock<ProviderHealth>,
    started: AtomicBool,
}

impl HttpAdapter {
    /// Construct an adapter that has not yet opened its SSE stream.
    #[must_use]
    pub fn new(provider_id: impl Into<String>, config: HttpAdapterConfig) -> Self {
        let provider_id = provider_id.into();
        Self {
            last_health: RwLock::new(ProviderHealth::unhealthy(&provider_id, "not started")),
            provider_id,
            config,
            http: HttpClient::new(),
            normalizer: Normalizer::new(),
            approval_handler: Arc::new(RwLock::new(None)),
            pending_approvals: Arc::new(Mutex::new(HashMap::new())),
            sse_task: Mutex::new(None),
            started: AtomicBool::new(false),
        }
    }

    /// Attach reliability counters to this adapter's normalizer; its
    /// streaming-context timeout flushes increment `normalizer_timeouts`.
    /// Intended to be chained immediately after construction.
    #[must_use]
    pub fn with_counters(mut self, counters: Arc<ReliabilityCounters>) -> Self {
        self.normalizer = self.normalizer.with_counters(counters);
        self
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.config.base_url, path);
        let mut builder = self.http.request(method, url).timeout(REQUEST_TIMEOUT);
        if let Some(key) = &self.config.api_key {
            builder = builder.bearer_auth(key);
        }
        for (name, value) in &self.config.headers {
            builder = builder.header(name, value);
        }
        builder
    }

    fn spawn_sse_task(&self) -> JoinHandle<()> {
        let url = format!("{}/events", self.config.base_url);
        let api_key = self.config.api_key.clone();
        let headers = self.config.headers.clone();
        let provider_id = self.provider_id.clone();
        let normalizer = self.normalizer.clone();
        let pending = self.pending_approvals.clone();
        let approval_handler = self.approval_handler.clone();
        let http = self.http.clone();

        tokio::spawn(async move {
            loop {
                let mut builder = http.get(&url);
                if let Some(key) = &api_key {
                    builder = builder.bearer_auth(key);
                }
                for (name, value) in &headers {
                    builder = builder.header(name, value);
                }

                let mut source = match EventSource::new(builder) {
                    Ok(source) => source,
                    Err(err) => {
                        warn!(provider = %provider_id, error = %err, "failed to build SSE request, retrying");
                        tokio::time::sleep(RECONNECT_DELAY).await;
                        continue;
                    }
                };

                while let Some(event) = source.next().await {
                    match event {
                        Ok(Event::Open) => debug!(provider = %provider_id, "sse stream opened"),
                        Ok(Event::Message(message)) => {
                            handle_sse_message(&provider_id, &normalizer, &pending, &approval_handler, &message.data).await;
                        }
                        Err(err) => {
                            warn!(provider = %provider_id, error = %err, "sse stream error, reconnecting");
                            source.close();
                            break;
                        }
                    }
                }

                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        })
    }
}

async fn handle_sse_message(
    provider_id: &str,
    normalizer: &Normalizer,
    pending: &PendingApprovals,
    approval_handler: &ApprovalHandlerSlot,
    raw: &str,
) {
    let value: Value = match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(err) => {
            warn!(provider = provider_id, error = %err, "dropping malformed sse event");
            return;
        }
    };

    match value.get("type").and_then(Value::as_str) {
        Some("session_update") => {
            let (Some(session_id), Some(turn_id)) = (
                value.get("sessionId").and_then(Value::as_str),
                value.get("turnId").and_then(Value::as_str),
            ) else {
                return;
            };
            let update = value.get("update").cloned().unwrap_or(Value::Null);
            normalizer.process(provider_id, session_id, turn_id, update);
        }
        Some("permission_request") => {
            let rpc_id = value.get("rpcId").and_then(Value::as_str).unwrap_or_default().to_string();
            let request = ApprovalRequest {
                rpc_id: rpc_id.clone(),
                session_id: value.get("sessionId").and_then(Value::as_str).unwrap_or_default().to_string(),
                tool_call_id: value.get("toolCallId").and_then(Value::as_str).unwrap_or_default().to_string(),
                tool_title: value.get("toolTitle").and_then(Value::as_str).map(str::to_string),
                tool_kind: value.get("toolKind").and_then(Value::as_str).map(str::to_string),
                options: value
                    .get("options")
                    .and_then(Value::as_array)
                    .map(|opts| {
                        opts.iter()
                            .filter_map(|opt| {
                                let id = opt.get("id").and_then(Value::as_str)?;
                                Some(ApprovalOption {
                                    id: id.to_string(),
                                    label: opt.get("label").and_then(Value::as_str).map(str::to_string),
                                })
                            })
                            .collect()
                    })
                    .unwrap_or_default(),
            };

            let (tx, _rx) = oneshot::channel();
            pending.lock().await.insert(rpc_id, tx);
            if let Some(handler) = approval_handler.read().await.as_ref() {
                handler(request);
            }
            // The decision travels back out-of-band via `resolve_approval`'s
            // HTTP POST; there is no response to synchronously await here
            // the way the ACP adapter awaits its RPC response future.
        }
        other => debug!(provider = provider_id, kind = ?other, "ignoring unrecognized sse event"),
    }
}

#[async_trait]
impl ProviderAdapter for HttpAdapter {
    fn provider_id(&self) -> &str {
        &self.provider_id
    }

    async fn start(&self) -> AdapterResult<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let handle = self.spawn_sse_task();
        *self.sse_task.lock().await = Some(handle);
        *self.last_health.write().await = ProviderHealth::healthy(&self.provider_id, "sse stream started");
        info!(provider = %self.provider_id, "http adapter started");
        Ok(())
    }

    async fn stop(&self) -> AdapterResult<()> {
        if let Some(handle) = self.sse_task.lock().await.take() {
            handle.abort();
        }
        self.started.store(false, Ordering::SeqCst);
        *self.last_health.write().await = ProviderHealth::unhealthy(&self.provider_id, "stopped");
        Ok(())
    }

    async fn health(&self) -> ProviderHealth {
        self.last_health.read().await.clone()
    }

    fn capabilities(&self) -> ProviderCapabilities {
        self.config.capabilities
    }

    async fn list_sessions(&self, params: ListSessionsParams) -> AdapterResult<Vec<NormalizedSession>> {
        let mut request = self.request(reqwest::Method::GET, "/sessions");
        if let Some(limit) = params.limit {
            request = request.query(&[("limit", limit.to_string())]);
        }
        if let Some(since) = params.since {
            request = request.query(&[("since", since.to_rfc3339())]);
        }
        let response = request.send().await.map_err(|err| AdapterError::Http(err.to_string()))?;
        let body: Value = response.json().await.map_err(|err| AdapterError::Http(err.to_string()))?;
        let sessions = body.get("sessions").and_then(Value::as_array).cloned().unwrap_or_default();
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
        let mut body = json!({ "prompt": prompt });
        if let Some(options) = options {
            body["options"] = options;
        }
        let response = self
            .request(reqwest::Method::POST, &format!("/sessions/{session_id}/prompt"))
            .json(&body)
            .send()
            .await
            .map_err(|err| AdapterError::Http(err.to_string()))?;
        let result: Value = response.json().await.map_err(|err| AdapterError::Http(err.to_string()))?;
        let turn_id = result
            .get("turnId")
            .and_then(Value::as_str)
            .ok_or_else(|| AdapterError::Unavailable {
                provider: self.provider_id.clone(),
                reason: "prompt response missing turnId".into(),
            })?
            .to_string();
        let status = result.get("status").and_then(Value::as_str).unwrap_or("started").to_string();
        Ok(TurnAck { turn_id, status })
    }

    async fn on_approval_request(&self, handler: ApprovalRequestHandler) {
        *self.approval_handler.write().await = Some(handler);
    }

    async fn resolve_approval(&self, rpc_id: &str, outcome: ApprovalOutcome) -> AdapterResult<()> {
        if self.pending_approvals.lock().await.remove(rpc_id).is_none() {
            return Err(AdapterError::UnknownSession(rpc_id.to_string()));
        }
        let body = match outcome {
            ApprovalOutcome::Selected { option_id } => json!({"outcome": "selected", "optionId": option_id}),
            ApprovalOutcome::Cancelled => json!({"outcome": "cancelled"}),
        };
        self.request(reqwest::Method::POST, &format!("/approvals/{rpc_id}"))
            .json(&body)
            .send()
            .await
            .map_err(|err| AdapterError::Http(err.to_string()))?;
        Ok(())
    }

    fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }
}

fn parse_normalized_session(provider: &str, raw: Value) -> Option<NormalizedSession> {
    let session_id = raw.get("sessionId").and_then(Value::as_str)?.to_string();
    let status = match raw.get("status").and_then(Value::as_str) {
        Some("active") => SessionStatus::Active,
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
