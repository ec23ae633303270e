//! Integration tests for the HTTP/SSE adapter against a mock server.

use std::time::Duration;

use orbit_adapters::{HttpAdapter, HttpAdapterConfig, ListSessionsParams, ProviderAdapter};
use orbit_core::ProviderCapabilities;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config(base_url: String) -> HttpAdapterConfig {
    HttpAdapterConfig {
        base_url,
        api_key: None,
        headers: Default::default(),
        capabilities: ProviderCapabilities::default(),
    }
}

#[tokio::test]
async fn list_sessions_parses_response_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/sessions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "sessions": [{
                "sessionId": "sess-1",
                "status": "active",
                "title": "hello",
            }]
        })))
        .mount(&server)
        .await;

    let adapter = HttpAdapter::new("claude", config(server.uri()));
    let sessions = adapter.list_sessions(ListSessionsParams::default()).await.unwrap();

    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].session_id, "sess-1");
    assert_eq!(sessions[0].provider, "claude");
}

#[tokio::test]
async fn send_prompt_returns_turn_ack() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/sessions/sess-1/prompt"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "turnId": "turn-1",
            "status": "started",
        })))
        .mount(&server)
        .await;

    let adapter = HttpAdapter::new("claude", config(server.uri()));
    let ack = adapter
        .send_prompt("sess-1", Default::default(), None)
        .await
        .unwrap();

    assert_eq!(ack.turn_id, "turn-1");
    assert_eq!(ack.status, "started");
}

#[tokio::test]
async fn send_prompt_errors_when_turn_id_missing() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/sessions/sess-1/prompt"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "started"})))
        .mount(&server)
        .await;

    let adapter = HttpAdapter::new("claude", config(server.uri()));
    let result = adapter.send_prompt("sess-1", Default::default(), None).await;

    assert!(result.is_err());
}

#[tokio::test]
async fn sse_session_update_reaches_normalizer() {
    let server = MockServer::start().await;
    let body = "data: {\"type\":\"session_update\",\"sessionId\":\"sess-1\",\"turnId\":\"turn-1\",\"update\":{\"type\":\"content\",\"delta\":\"hi\",\"done\":true}}\n\n";
    Mock::given(method("GET"))
        .and(path("/events"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(body, "text/event-stream")
                .append_header("cache-control", "no-cache"),
        )
        .mount(&server)
        .await;

    let adapter = HttpAdapter::new("claude", config(server.uri()));
    let mut events = adapter.normalizer().subscribe();
    adapter.start().await.unwrap();

    let event = tokio::time::timeout(Duration::from_secs(2), events.recv())
        .await
        .expect("normalized event within timeout")
        .unwrap();
    adapter.stop().await.unwrap();

    assert_eq!(event.text.as_deref(), Some("hi"));
    assert_eq!(event.session_id, "sess-1");
}
