//! Wire-level framing: classifying raw JSON lines as requests, responses,
//! or notifications (§4.1).
//!
//! One JSON object per line, UTF-8. Lines over `MAX_LINE_BYTES` are
//! rejected as protocol errors before they are even parsed.

use serde_json::Value;

use crate::error::{RpcError, RpcErrorObject};

/// Maximum accepted line length, in bytes.
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

/// A parsed inbound line.
#[derive(Debug)]
pub enum Inbound {
    /// Has `method` and `id` — the peer wants us to handle a request.
    Request {
        /// The request id, echoed back in our response.
        id: Value,
        /// The method name.
        method: String,
        /// The method params, if any.
        params: Option<Value>,
    },
    /// Has `id` and (`result` | `error`), no `method` — a response to one
    /// of our outstanding requests.
    Response {
        /// The id this responds to.
        id: Value,
        /// The outcome.
        outcome: Result<Value, RpcErrorObject>,
    },
    /// Has `method`, no `id` — one-way.
    Notification {
        /// The method name.
        method: String,
        /// The method params, if any.
        params: Option<Value>,
    },
}

/// Classify a raw JSON value per §4.1's correlation rule:
///
/// - request iff it has `method` and `id`
/// - response iff it has `id` and (`result`|`error`) and no `method`
/// - notification iff it has `method` and no `id`
/// - anything else is malformed
pub fn classify(value: Value) -> Result<Inbound, RpcError> {
    let obj = value
        .as_object()
        .ok_or_else(|| RpcError::Protocol("top-level value is not a JSON object".into()))?;

    let has_method = obj.contains_key("method");
    let has_id = obj.contains_key("id");

    if has_method && has_id {
        let id = obj.get("id").cloned().unwrap_or(Value::Null);
        let method = obj
            .get("method")
            .and_then(Value::as_str)
            .ok_or_else(|| RpcError::Protocol("method is not a string".into()))?
            .to_string();
        let params = obj.get("params").cloned();
        return Ok(Inbound::Request { id, method, params });
    }

    if has_id && (obj.contains_key("result") || obj.contains_key("error")) {
        let id = obj.get("id").cloned().unwrap_or(Value::Null);
        let outcome = if let Some(error) = obj.get("error") {
            let error_obj: RpcErrorObject = serde_json::from_value(error.clone())?;
            Err(error_obj)
        } else {
            Ok(obj.get("result").cloned().unwrap_or(Value::Null))
        };
        return Ok(Inbound::Response { id, outcome });
    }

    if has_method {
        let method = obj
            .get("method")
            .and_then(Value::as_str)
            .ok_or_else(|| RpcError::Protocol("method is not a string".into()))?
            .to_string();
        let params = obj.get("params").cloned();
        return Ok(Inbound::Notification { method, params });
    }

    Err(RpcError::Protocol(
        "neither a request, response, nor notification".into(),
    ))
}

/// Extract a session id from common notification-param shapes, used by
/// `onSessionEvent` multiplexing.
pub fn extract_session_id(params: &Value) -> Option<String> {
    params
        .get("sessionId")
        .or_else(|| params.get("session_id"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn classifies_request() {
        let v = json!({"jsonrpc":"2.0","id":1,"method":"foo","params":{}});
        match classify(v).unwrap() {
            Inbound::Request { method, .. } => assert_eq!(method, "foo"),
            other => panic!("expected request, got {other:?}"),
        }
    }

    #[test]
    fn classifies_response_with_result() {
        let v = json!({"jsonrpc":"2.0","id":1,"result":{"ok":true}});
        match classify(v).unwrap() {
            Inbound::Response { outcome, .. } => assert!(outcome.is_ok()),
            other => panic!("expected response, got {other:?}"),
        }
    }

    #[test]
    fn classifies_response_with_error() {
        let v = json!({"jsonrpc":"2.0","id":1,"error":{"code":-32000,"message":"nope"}});
        match classify(v).unwrap() {
            Inbound::Response { outcome, .. } => assert!(outcome.is_err()),
            other => panic!("expected response, got {other:?}"),
        }
    }

    #[test]
    fn classifies_notification() {
        let v = json!({"jsonrpc":"2.0","method":"session/update","params":{"sessionId":"s1"}});
        match classify(v).unwrap() {
            Inbound::Notification { method, .. } => assert_eq!(method, "session/update"),
            other => panic!("expected notification, got {other:?}"),
        }
    }

    #[test]
    fn rejects_malformed() {
        let v = json!({"jsonrpc":"2.0","foo":"bar"});
        assert!(classify(v).is_err());
    }

    #[test]
    fn extracts_session_id_from_either_casing() {
        assert_eq!(
            extract_session_id(&json!({"sessionId":"a"})),
            Some("a".to_string())
        );
        assert_eq!(
            extract_session_id(&json!({"session_id":"b"})),
            Some("b".to_string())
        );
        assert_eq!(extract_session_id(&json!({})), None);
    }
}
