//! `/ws/anchor`: the default-provider subprocess bridge's endpoint (§4.5).
//!
//! The anchor speaks the same JSON-RPC wire protocol as a client would,
//! but plays the opposite role: its requests/notifications are responses
//! flowing *to* subscribed clients, enriched with titles and capability
//! flags along the way.

use std::collections::HashMap;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use futures::StreamExt;
use orbit_core::{DEFAULT_PROVIDER, ThreadId};
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::connection::{AnchorConnection, AnchorInfo, OutboundHandle, OUTBOUND_QUEUE_CEILING};
use crate::error::RelayError;
use crate::gating;
use crate::state::RelayState;
use crate::wire::{self, ControlMessage, Frame};
use crate::ws::{close_frame, extract_token, resolve_scope};

/// `GET /ws/anchor`.
pub async fn handler(
    State(state): State<RelayState>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let token = extract_token(&headers, &query);
    if resolve_scope(&state, token.as_deref()).await.is_err() {
        return RelayError::Unauthorized.http_status().into_response();
    }
    ws.on_upgrade(move |socket| run(socket, state)).into_response()
}

async fn run(socket: WebSocket, state: RelayState) {
    let id = Uuid::new_v4();
    let (sink, mut receiver) = socket.split();
    let (tx, rx) = tokio::sync::mpsc::channel(OUTBOUND_QUEUE_CEILING);
    let outbound = OutboundHandle::new(tx);
    let writer = tokio::spawn(crate::ws::run_writer(rx, sink));

    let Some((stable_id, hello)) = await_hello(&mut receiver, &state).await else {
        outbound.try_send(close_frame(1002, "expected anchor.hello"));
        writer.abort();
        return;
    };

    if let Some(prior) = state.subscriptions().anchor_by_stable_id(&stable_id) {
        prior.outbound.try_send(close_frame(1000, "replaced"));
    }

    let conn = AnchorConnection { id, stable_id: stable_id.clone(), outbound };
    let info = AnchorInfo::from_hello(stable_id.clone(), &hello);
    state.subscriptions().add_anchor(conn, info);
    debug!(connection = %id, stable_id, "anchor connected");

    let mut shutdown = state.subscribe_shutdown();
    loop {
        tokio::select! {
            _ = shutdown.recv() => break,
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => handle_text(&state, id, text).await,
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        warn!(connection = %id, error = %err, "anchor socket read error");
                        break;
                    }
                }
            }
        }
    }

    state.subscriptions().remove_anchor(id);
    broadcast_anchor_disconnected(&state, &stable_id);
    debug!(connection = %id, "anchor disconnected");
}

/// Wait for the anchor's first frame; it must be `anchor.hello` carrying
/// `stableId`. Returns the stable id alongside the full hello payload so
/// the caller can still recover `hostname`/`platform` for [`AnchorInfo`].
async fn await_hello(receiver: &mut futures::stream::SplitStream<WebSocket>, state: &RelayState) -> Option<(String, Value)> {
    let msg = receiver.next().await?;
    let Ok(Message::Text(text)) = msg else {
        return None;
    };
    let value: Value = serde_json::from_str(&text).ok()?;
    match wire::classify(value).ok()? {
        Frame::Control(ControlMessage::AnchorHello(hello)) => {
            let stable_id = hello.get("stableId").and_then(Value::as_str)?.to_string();
            Some((stable_id, hello))
        }
        _ => {
            state.counters().inc_malformed_frame();
            None
        }
    }
}

async fn handle_text(state: &RelayState, id: Uuid, text: String) {
    let value: Value = match serde_json::from_str(&text) {
        Ok(value) => value,
        Err(_) => {
            state.counters().inc_malformed_frame();
            return;
        }
    };

    match wire::classify(value) {
        Ok(Frame::Control(ControlMessage::Ping)) => {
            if let Some(anchor) = state.subscriptions().anchor(id) {
                anchor.outbound.try_send(serde_json::json!({"type": "pong"}));
            }
        }
        Ok(Frame::Control(_)) => state.counters().inc_malformed_frame(),
        Ok(Frame::Rpc(orbit_rpc::Inbound::Request { id: rpc_id, method, params })) => {
            route_to_clients(state, id, Some(rpc_id), Some(method), params.unwrap_or(Value::Null)).await;
        }
        Ok(Frame::Rpc(orbit_rpc::Inbound::Notification { method, params })) => {
            route_to_clients(state, id, None, Some(method), params.unwrap_or(Value::Null)).await;
        }
        Ok(Frame::Rpc(orbit_rpc::Inbound::Response { id: rpc_id, outcome })) => {
            let (result, is_ok) = match outcome {
                Ok(result) => (result, true),
                Err(err) => (serde_json::to_value(&err).unwrap_or(Value::Null), false),
            };
            route_response(state, id, rpc_id, result, is_ok).await;
        }
        Err(_) => state.counters().inc_malformed_frame(),
    }
}

/// Route an anchor request/notification to subscribed clients, per §4.5's
/// "Routing an anchor message to clients" enrichment steps.
async fn route_to_clients(state: &RelayState, anchor_id: Uuid, id: Option<Value>, method: Option<String>, mut params: Value) {
    let thread_id = gating::extract_thread_id(&params);

    if let Some(thread_id) = &thread_id {
        state.subscriptions().subscribe_anchor(anchor_id, thread_id.to_string());
        enrich_thread_payload(state, &mut params).await;
    }

    persist_anchor_event(state, thread_id.as_ref(), method.as_deref(), &params).await;

    let envelope = match (&id, &method) {
        (Some(id), Some(method)) => serde_json::json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params}),
        (None, Some(method)) => serde_json::json!({"jsonrpc": "2.0", "method": method, "params": params}),
        _ => params,
    };

    fan_out_to_clients(state, thread_id.as_ref(), envelope, id.is_some());
}

async fn route_response(state: &RelayState, _anchor_id: Uuid, rpc_id: Value, mut result: Value, is_ok: bool) {
    enrich_thread_payload(state, &mut result).await;
    let thread_id = gating::extract_thread_id(&result);

    let envelope = if is_ok {
        serde_json::json!({"jsonrpc": "2.0", "id": rpc_id, "result": result})
    } else {
        serde_json::json!({"jsonrpc": "2.0", "id": rpc_id, "error": result})
    };

    // A response always carries an id, so the symmetric safety-net
    // broadcast always applies when nobody is subscribed yet.
    fan_out_to_clients(state, thread_id.as_ref(), envelope, true);
}

async fn enrich_thread_payload(state: &RelayState, payload: &mut Value) {
    let capability_table = state.registry().capability_table().await;

    if let Some(threads) = payload.get_mut("threads").and_then(Value::as_array_mut) {
        for thread in threads.iter_mut() {
            enrich_one_thread(state, thread, &capability_table).await;
        }
        append_non_default_sessions(state, threads, &capability_table).await;
    } else if payload.is_object() {
        enrich_one_thread(state, payload, &capability_table).await;
    }
}

async fn enrich_one_thread(state: &RelayState, thread: &mut Value, capability_table: &std::collections::HashMap<String, orbit_core::ProviderCapabilities>) {
    let Some(obj) = thread.as_object_mut() else {
        return;
    };

    let thread_id_str = obj.get("threadId").or_else(|| obj.get("id")).and_then(Value::as_str).map(str::to_string);
    if let Some(thread_id_str) = &thread_id_str {
        let existing_title = obj.get("title").and_then(Value::as_str).map(str::to_string);
        if let Ok(merged) = state.titles().merge_title(thread_id_str, existing_title.as_deref()).await {
            if let Some(merged) = merged {
                obj.insert("title".to_string(), Value::String(merged));
            }
        }

        let provider = obj
            .get("provider")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| ThreadId::parse(thread_id_str).provider().to_string());
        if !obj.contains_key("capabilities") {
            if let Some(caps) = capability_table.get(&provider) {
                obj.insert("capabilities".to_string(), serde_json::to_value(caps.named_flags()).unwrap_or(Value::Null));
            }
        }
    }
}

/// §4.5 step 3: for `thread/list`-shaped payloads, append sessions from
/// every non-default enabled adapter whose `listSessions` capability is
/// true, each prefixed `"<providerId>:<sessionId>"`. Per-adapter failures
/// are isolated and simply contribute nothing.
async fn append_non_default_sessions(
    state: &RelayState,
    threads: &mut Vec<Value>,
    capability_table: &std::collections::HashMap<String, orbit_core::ProviderCapabilities>,
) {
    let adapters = state.registry().list().await;
    let futures = adapters
        .into_iter()
        .filter(|adapter| adapter.provider_id() != DEFAULT_PROVIDER)
        .filter(|adapter| capability_table.get(adapter.provider_id()).is_some_and(|c| c.list_sessions))
        .map(|adapter| async move {
            let provider = adapter.provider_id().to_string();
            match adapter.list_sessions(orbit_adapters::ListSessionsParams::default()).await {
                Ok(sessions) => sessions
                    .into_iter()
                    .map(|session| {
                        serde_json::json!({
                            "threadId": format!("{provider}:{}", session.session_id),
                            "provider": provider,
                            "capabilities": capability_table.get(&provider).map(|c| c.named_flags()),
                        })
                    })
                    .collect::<Vec<_>>(),
                Err(err) => {
                    warn!(provider, error = %err, "listSessions failed for non-default adapter");
                    Vec::new()
                }
            }
        });
    for extra in futures::future::join_all(futures).await {
        threads.extend(extra);
    }
}

async fn persist_anchor_event(state: &RelayState, thread_id: Option<&ThreadId>, method: Option<&str>, payload: &Value) {
    let Some(thread_id) = thread_id else {
        return;
    };
    let event = orbit_store::NewEvent {
        thread_id: thread_id.to_string(),
        turn_id: None,
        direction: orbit_store::EventDirection::Outbound,
        role: "anchor".to_string(),
        method: method.map(str::to_string),
        payload: payload.clone(),
        created_at: chrono::Utc::now(),
    };
    if state.store().append(event).await.is_err() {
        state.counters().inc_store_append_failure();
    }
}

fn fan_out_to_clients(state: &RelayState, thread_id: Option<&ThreadId>, envelope: Value, is_response: bool) {
    let subscribed = thread_id.map(|t| state.subscriptions().clients_for_thread(&t.to_string())).unwrap_or_default();

    let targets = if !subscribed.is_empty() {
        subscribed
    } else if is_response {
        state.subscriptions().all_clients()
    } else {
        Vec::new()
    };

    for client in targets {
        client.outbound.try_send(envelope.clone());
    }
}

fn broadcast_anchor_disconnected(state: &RelayState, stable_id: &str) {
    let envelope = serde_json::json!({"type": "orbit.anchor-disconnected", "stableId": stable_id});
    for client in state.subscriptions().all_clients() {
        client.outbound.try_send(envelope.clone());
    }
}
