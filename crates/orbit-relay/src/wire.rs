//! Inbound WS frame classification (§4.5).
//!
//! Control envelopes (`type: "orbit.*"`, `"ping"`, `"anchor.hello"`,
//! `"acp:approval_decision"`) are terminated at the relay and never
//! forwarded. Everything else is a JSON-RPC 2.0 object, classified by
//! `orbit_rpc::wire::classify` — the same line-classification rule the
//! stdio transport uses, reused here because the correlation rule
//! (`method`+`id` ⇒ request, `id`+`result`/`error` ⇒ response, `method`
//! alone ⇒ notification) doesn't change just because the transport is a
//! WebSocket instead of a child process's stdout.

use orbit_rpc::Inbound;
use serde_json::Value;

use crate::error::{RelayError, RelayResult};

pub use orbit_rpc::RpcErrorObject;

/// One decoded WS text frame.
#[derive(Debug, Clone)]
pub enum Frame {
    /// A control envelope, terminated at the relay.
    Control(ControlMessage),
    /// A JSON-RPC 2.0 object, routed per §4.5's client/anchor rules.
    Rpc(Inbound),
}

/// A parsed control envelope.
#[derive(Debug, Clone)]
pub enum ControlMessage {
    /// `{"type":"ping"}` — answered with `{"type":"pong"}`.
    Ping,
    /// `{"type":"anchor.hello",...}` — the anchor's identity announcement.
    AnchorHello(Value),
    /// `{"type":"acp:approval_decision", rpcId, optionId?}`.
    ApprovalDecision {
        /// The approval this decides.
        rpc_id: String,
        /// The chosen option, or absent for a dismissal.
        option_id: Option<String>,
    },
    /// Any other `orbit.*`-typed subscribe/unsubscribe/list-anchors/state
    /// control message, passed through to the caller as raw JSON.
    Other {
        /// The envelope's `type` value.
        message_type: String,
        /// The full envelope.
        value: Value,
    },
}

/// Classify one inbound WS text frame.
pub fn classify(value: Value) -> RelayResult<Frame> {
    if let Some(type_str) = value.get("type").and_then(Value::as_str) {
        return Ok(Frame::Control(classify_control(type_str, value)?));
    }

    let inbound = orbit_rpc::classify(value).map_err(|err| RelayError::BadRequest(err.to_string()))?;
    Ok(Frame::Rpc(inbound))
}

fn classify_control(message_type: &str, value: Value) -> RelayResult<ControlMessage> {
    match message_type {
        "ping" => Ok(ControlMessage::Ping),
        "anchor.hello" => Ok(ControlMessage::AnchorHello(value)),
        "acp:approval_decision" => {
            let rpc_id = value
                .get("rpcId")
                .and_then(Value::as_str)
                .ok_or_else(|| RelayError::BadRequest("approval decision missing rpcId".into()))?
                .to_string();
            let option_id = value.get("optionId").and_then(Value::as_str).map(str::to_string);
            Ok(ControlMessage::ApprovalDecision { rpc_id, option_id })
        }
        other => Ok(ControlMessage::Other {
            message_type: other.to_string(),
            value,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn classifies_ping() {
        let frame = classify(json!({"type": "ping"})).unwrap();
        assert!(matches!(frame, Frame::Control(ControlMessage::Ping)));
    }

    #[test]
    fn classifies_approval_decision() {
        let frame = classify(json!({"type": "acp:approval_decision", "rpcId": "r1", "optionId": "allow"})).unwrap();
        match frame {
            Frame::Control(ControlMessage::ApprovalDecision { rpc_id, option_id }) => {
                assert_eq!(rpc_id, "r1");
                assert_eq!(option_id.as_deref(), Some("allow"));
            }
            other => panic!("expected approval decision, got {other:?}"),
        }
    }

    #[test]
    fn classifies_subscribe_as_other_control() {
        let frame = classify(json!({"type": "orbit.subscribe", "threadId": "t1"})).unwrap();
        assert!(matches!(frame, Frame::Control(ControlMessage::Other { .. })));
    }

    #[test]
    fn classifies_json_rpc_request() {
        let frame = classify(json!({"jsonrpc": "2.0", "id": 1, "method": "thread/list", "params": {}})).unwrap();
        match frame {
            Frame::Rpc(Inbound::Request { method, .. }) => assert_eq!(method, "thread/list"),
            other => panic!("expected rpc request, got {other:?}"),
        }
    }
}
