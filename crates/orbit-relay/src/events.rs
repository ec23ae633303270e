//! Fans a directly-managed adapter's normalized events, and its
//! `session/request_permission` prompts, out to subscribed clients and
//! into the event store (§4.5's "Routing an anchor message to clients"
//! steps and §4.6's approval flow apply symmetrically here, since a
//! non-default provider's output never passes through `/ws/anchor`).
//!
//! `orbit-server` calls [`spawn_for_adapter`] once per started adapter at
//! startup; everything past that point is this module's concern.

use std::sync::Arc;

use orbit_adapters::{ApprovalRequest, ProviderAdapter};
use orbit_core::event::NormalizedEvent;
use orbit_core::ThreadId;
use orbit_store::{EventDirection, NewEvent};
use tokio::task::JoinHandle;
use tracing::warn;

use crate::state::RelayState;

/// Register this adapter's approval-request handler and spawn the task
/// that drains its normalizer into the relay. Returns the normalizer
/// task's handle so `orbit-server` can abort it on shutdown alongside
/// `Registry::stop_all`.
pub async fn spawn_for_adapter(state: RelayState, adapter: Arc<dyn ProviderAdapter>) -> JoinHandle<()> {
    let provider_id = adapter.provider_id().to_string();
    let handler_state = state.clone();
    let handler_adapter = adapter.clone();
    adapter
        .on_approval_request(Arc::new(move |request: ApprovalRequest| {
            let state = handler_state.clone();
            let adapter = handler_adapter.clone();
            tokio::spawn(async move {
                handle_approval_request(&state, adapter, request).await;
            });
        }))
        .await;

    let mut normalized = adapter.normalizer().subscribe();
    tokio::spawn(async move {
        loop {
            match normalized.recv().await {
                Ok(event) => dispatch(&state, event).await,
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(provider = %provider_id, skipped, "normalizer channel lagged, events dropped");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

async fn handle_approval_request(state: &RelayState, adapter: Arc<dyn ProviderAdapter>, request: ApprovalRequest) {
    let thread_id = ThreadId::new(adapter.provider_id(), request.session_id.clone());
    let envelope = serde_json::json!({
        "jsonrpc": "2.0",
        "method": "session/request_permission",
        "params": {
            "threadId": thread_id.to_string(),
            "rpcId": request.rpc_id,
            "sessionId": request.session_id,
            "toolCallId": request.tool_call_id,
            "toolTitle": request.tool_title,
            "toolKind": request.tool_kind,
            "options": request.options,
        },
    });

    state.approvals().record(adapter, thread_id.to_string(), request);

    let subscribed = state.subscriptions().clients_for_thread(&thread_id.to_string());
    let targets = if subscribed.is_empty() { state.subscriptions().all_clients() } else { subscribed };
    for client in targets {
        client.outbound.try_send(envelope.clone());
    }
}

/// Persist one normalized event under `"<provider>:<sessionId>"` and push
/// it to every client currently subscribed to that thread.
pub async fn dispatch(state: &RelayState, event: NormalizedEvent) {
    let thread_id = ThreadId::new(event.provider.clone(), event.session_id.clone());
    let payload = serde_json::json!({
        "threadId": thread_id.to_string(),
        "eventId": event.event_id,
        "category": event.category,
        "timestamp": event.timestamp,
        "text": event.text,
        "payload": event.payload,
        "parentEventId": event.parent_event_id,
        "tokenUsage": event.token_usage,
    });

    let new_event = NewEvent {
        thread_id: thread_id.to_string(),
        turn_id: None,
        direction: EventDirection::Outbound,
        role: "agent".to_string(),
        method: Some("session/update".to_string()),
        payload: payload.clone(),
        created_at: event.timestamp,
    };
    if state.store().append(new_event).await.is_err() {
        state.counters().inc_store_append_failure();
    }

    let envelope = serde_json::json!({
        "jsonrpc": "2.0",
        "method": "session/update",
        "params": payload,
    });
    let targets = state.subscriptions().clients_for_thread(&thread_id.to_string());
    for client in targets {
        client.outbound.try_send(envelope.clone());
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use orbit_approval::ApprovalManager;
    use orbit_auth::AuthManager;
    use orbit_core::event::EventCategory;
    use orbit_core::ReliabilityCounters;
    use orbit_registry::Registry;
    use uuid::Uuid;

    use super::*;
    use crate::config::RelayConfig;
    use crate::connection::{ClientConnection, OutboundHandle, OUTBOUND_QUEUE_CEILING};

    async fn test_state() -> RelayState {
        let store = orbit_store::EventStore::connect_memory().await.unwrap();
        let auth = AuthManager::new("legacy".to_string(), store.clone());
        RelayState::new(
            RelayConfig::default(),
            store,
            auth,
            Arc::new(Registry::new()),
            ApprovalManager::new(),
            Arc::new(ReliabilityCounters::new()),
        )
    }

    #[tokio::test]
    async fn dispatch_persists_and_fans_out_to_subscribed_client() {
        let state = test_state().await;
        let id = Uuid::new_v4();
        let (tx, mut rx) = tokio::sync::mpsc::channel(OUTBOUND_QUEUE_CEILING);
        let conn = ClientConnection { id, scope: orbit_auth::Scope::Full, outbound: OutboundHandle::new(tx) };
        state.subscriptions().add_client(conn);
        state.subscriptions().subscribe_client(id, "claude:s1");

        let event = NormalizedEvent {
            provider: "claude".to_string(),
            session_id: "s1".to_string(),
            event_id: "e1".to_string(),
            category: EventCategory::AgentMessage,
            timestamp: Utc::now(),
            text: Some("hi".to_string()),
            payload: None,
            parent_event_id: None,
            token_usage: None,
        };
        dispatch(&state, event).await;

        let received = rx.recv().await.unwrap();
        assert_eq!(received["method"], "session/update");

        let stored = state.store().read("claude:s1", orbit_store::ReadOptions::default()).await.unwrap();
        assert_eq!(stored.len(), 1);
    }
}
