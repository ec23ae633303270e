//! `/ws/client` (aliased at `/ws`): the browser/mobile UI endpoint (§4.5).

use std::collections::HashMap;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use futures::StreamExt;
use orbit_adapters::{ApprovalOutcome, PromptInput};
use orbit_core::{ProviderCapabilities, ThreadId};
use orbit_store::{EventDirection, NewEvent};
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::connection::{ClientConnection, OutboundHandle, OUTBOUND_QUEUE_CEILING};
use crate::error::RelayError;
use crate::gating::{self, SEND_PROMPT_ALIASES};
use crate::state::RelayState;
use crate::wire::{self, ControlMessage, Frame};
use crate::ws::{extract_token, resolve_scope, rpc_error_response, rpc_result_response};

/// `GET /ws/client` (and its `/ws` alias).
pub async fn handler(
    State(state): State<RelayState>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let token = extract_token(&headers, &query);
    let scope = match resolve_scope(&state, token.as_deref()).await {
        Ok(scope) => scope,
        Err(_) => return RelayError::Unauthorized.http_status().into_response(),
    };
    ws.on_upgrade(move |socket| run(socket, state, scope)).into_response()
}

async fn run(socket: WebSocket, state: RelayState, scope: orbit_auth::Scope) {
    let id = Uuid::new_v4();
    let (sink, mut receiver) = socket.split();
    let (tx, rx) = tokio::sync::mpsc::channel(OUTBOUND_QUEUE_CEILING);
    let outbound = OutboundHandle::new(tx);
    let conn = ClientConnection { id, scope, outbound };

    state.subscriptions().add_client(conn.clone());
    debug!(connection = %id, ?scope, "client connected");

    let mut shutdown = state.subscribe_shutdown();
    let writer = tokio::spawn(crate::ws::run_writer(rx, sink));

    loop {
        tokio::select! {
            _ = shutdown.recv() => break,
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => handle_text(&state, &conn, text).await,
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        warn!(connection = %id, error = %err, "client socket read error");
                        break;
                    }
                }
            }
        }
    }

    state.subscriptions().remove_client(id);
    writer.abort();
    debug!(connection = %id, "client disconnected");
}

async fn handle_text(state: &RelayState, conn: &ClientConnection, text: String) {
    let value: Value = match serde_json::from_str(&text) {
        Ok(value) => value,
        Err(_) => {
            state.counters().inc_malformed_frame();
            return;
        }
    };

    if let Some(client_request_id) = value.get("clientRequestId").and_then(Value::as_str) {
        if !state.dedup().record_if_new(client_request_id) {
            return;
        }
    }

    match wire::classify(value) {
        Ok(Frame::Control(ctrl)) => handle_control(state, conn, ctrl).await,
        Ok(Frame::Rpc(orbit_rpc::Inbound::Request { id, method, params })) => {
            route_rpc(state, conn, Some(id), method, params.unwrap_or(Value::Null)).await;
        }
        Ok(Frame::Rpc(orbit_rpc::Inbound::Notification { method, params })) => {
            route_rpc(state, conn, None, method, params.unwrap_or(Value::Null)).await;
        }
        Ok(Frame::Rpc(orbit_rpc::Inbound::Response { .. })) => {
            // The relay never issues requests to a client, so it has
            // nothing to correlate this against.
            state.counters().inc_malformed_frame();
        }
        Err(_) => state.counters().inc_malformed_frame(),
    }
}

async fn handle_control(state: &RelayState, conn: &ClientConnection, ctrl: ControlMessage) {
    match ctrl {
        ControlMessage::Ping => {
            conn.outbound.try_send(serde_json::json!({"type": "pong"}));
        }
        ControlMessage::ApprovalDecision { rpc_id, option_id } => {
            handle_approval_decision(state, conn, rpc_id, option_id).await;
        }
        ControlMessage::Other { message_type, value } => match message_type.as_str() {
            "orbit.subscribe" => {
                if let Some(thread_id) = value.get("threadId").and_then(Value::as_str) {
                    state.subscriptions().subscribe_client(conn.id, thread_id);
                }
            }
            "orbit.unsubscribe" => {
                if let Some(thread_id) = value.get("threadId").and_then(Value::as_str) {
                    state.subscriptions().unsubscribe_client(conn.id, thread_id);
                }
            }
            "orbit.list-anchors" => {
                let anchors = state.subscriptions().anchor_infos();
                conn.outbound.try_send(serde_json::json!({"type": "orbit.anchors", "anchors": anchors}));
            }
            _ => state.counters().inc_malformed_frame(),
        },
        ControlMessage::AnchorHello(_) => state.counters().inc_malformed_frame(),
    }
}

async fn handle_approval_decision(state: &RelayState, conn: &ClientConnection, rpc_id: String, option_id: Option<String>) {
    let Some(thread_id) = state.approvals().thread_id_for(&rpc_id) else {
        conn.outbound.try_send(serde_json::json!({
            "type": "acp:approval_error", "rpcId": rpc_id, "message": "Unknown or expired approval",
        }));
        return;
    };

    if !state.subscriptions().client_is_subscribed(conn.id, &thread_id) {
        conn.outbound.try_send(serde_json::json!({
            "type": "acp:approval_error", "rpcId": rpc_id, "message": "not authorized to decide this approval",
        }));
        return;
    }

    let outcome = match option_id {
        Some(option_id) => ApprovalOutcome::Selected { option_id },
        None => ApprovalOutcome::Cancelled,
    };

    if let Err(err) = state.approvals().resolve(&rpc_id, outcome).await {
        conn.outbound.try_send(serde_json::json!({
            "type": "acp:approval_error", "rpcId": rpc_id, "message": err.to_string(),
        }));
    }
}

/// Route one client JSON-RPC request or notification, per §4.5's
/// "Routing a client JSON-RPC message" steps 2 through 5.
async fn route_rpc(state: &RelayState, conn: &ClientConnection, id: Option<Value>, method: String, params: Value) {
    if conn.scope == orbit_auth::Scope::ReadOnly && !gating::is_safe_method(&method) {
        respond_error(conn, id, RelayError::ReadOnlyDenied(method));
        return;
    }

    let thread_id = gating::extract_thread_id(&params);

    if let Some(thread_id) = &thread_id {
        if !thread_id.is_default_provider() && gating::is_mutating_method(&method) {
            match provider_capabilities(state, thread_id.provider()).await {
                Some(caps) if caps.send_prompt => {
                    if SEND_PROMPT_ALIASES.contains(&method.as_str()) {
                        handle_direct_send_prompt(state, conn, id, thread_id, params).await;
                        return;
                    }
                }
                _ => {
                    respond_error(
                        conn,
                        id,
                        RelayError::CapabilityMissing { provider: thread_id.provider().to_string(), capability: "sendPrompt" },
                    );
                    return;
                }
            }
        }
    }

    persist_client_event(state, thread_id.as_ref(), &method, &params).await;
    forward_to_anchors(state, thread_id.as_ref(), rebuild_rpc_envelope(id, &method, params));
}

fn rebuild_rpc_envelope(id: Option<Value>, method: &str, params: Value) -> Value {
    match id {
        Some(id) => serde_json::json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params}),
        None => serde_json::json!({"jsonrpc": "2.0", "method": method, "params": params}),
    }
}

async fn provider_capabilities(state: &RelayState, provider: &str) -> Option<ProviderCapabilities> {
    state.registry().get(provider).await.map(|adapter| adapter.capabilities())
}

async fn handle_direct_send_prompt(state: &RelayState, conn: &ClientConnection, id: Option<Value>, thread_id: &ThreadId, params: Value) {
    let Some(id) = id else {
        return;
    };
    let Some(adapter) = state.registry().get(thread_id.provider()).await else {
        respond_error(conn, Some(id), RelayError::UnavailableProvider(thread_id.provider().to_string()));
        return;
    };

    let prompt: PromptInput = params
        .get("prompt")
        .cloned()
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or_else(|| PromptInput { text: params.get("text").and_then(Value::as_str).unwrap_or_default().to_string(), attachments: vec![] });
    let options = params.get("options").cloned();

    match adapter.send_prompt(thread_id.session_id(), prompt, options).await {
        Ok(ack) => conn.outbound.try_send(rpc_result_response(id, serde_json::to_value(ack).unwrap_or(Value::Null))),
        Err(err) => conn.outbound.try_send(rpc_error_response(id, &RelayError::from(err))),
    };
}

async fn persist_client_event(state: &RelayState, thread_id: Option<&ThreadId>, method: &str, params: &Value) {
    let Some(thread_id) = thread_id else {
        return;
    };
    let event = NewEvent {
        thread_id: thread_id.to_string(),
        turn_id: None,
        direction: EventDirection::Inbound,
        role: "client".to_string(),
        method: Some(method.to_string()),
        payload: params.clone(),
        created_at: chrono::Utc::now(),
    };
    if state.store().append(event).await.is_err() {
        state.counters().inc_store_append_failure();
    }
}

fn forward_to_anchors(state: &RelayState, thread_id: Option<&ThreadId>, envelope: Value) {
    let targets = match thread_id {
        Some(thread_id) => {
            let subscribed = state.subscriptions().anchors_for_thread(&thread_id.to_string());
            if subscribed.is_empty() {
                state.subscriptions().all_anchors()
            } else {
                subscribed
            }
        }
        None => state.subscriptions().all_anchors(),
    };
    for anchor in targets {
        anchor.outbound.try_send(envelope.clone());
    }
}

fn respond_error(conn: &ClientConnection, id: Option<Value>, err: RelayError) {
    if let Some(id) = id {
        conn.outbound.try_send(rpc_error_response(id, &err));
    }
}
