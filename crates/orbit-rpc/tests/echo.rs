//! Integration tests that spawn a real `sh` subprocess standing in for an
//! ACP/MCP-style JSON-RPC peer over stdio.

use std::time::Duration;

use orbit_rpc::StdioRpcClient;
use serde_json::json;
use tokio::process::Command;

fn sh_script(script: &str) -> Command {
    let mut command = Command::new("sh");
    command.arg("-c").arg(script);
    command
}

#[tokio::test]
async fn request_receives_matching_response() {
    let command = sh_script(
        r#"read -r line; echo '{"jsonrpc":"2.0","id":1,"result":{"pong":true}}'; cat >/dev/null"#,
    );
    let client = StdioRpcClient::spawn(command).await.unwrap();

    let result = client
        .request("ping", json!({}), Duration::from_secs(5))
        .await
        .unwrap();

    assert_eq!(result, json!({"pong": true}));
    client.shutdown().await;
}

#[tokio::test]
async fn request_surfaces_rpc_error() {
    let command = sh_script(
        r#"read -r line; echo '{"jsonrpc":"2.0","id":1,"error":{"code":-32000,"message":"denied"}}'; cat >/dev/null"#,
    );
    let client = StdioRpcClient::spawn(command).await.unwrap();

    let err = client
        .request("act", json!({}), Duration::from_secs(5))
        .await
        .unwrap_err();

    match err {
        orbit_rpc::RpcError::Rpc(obj) => {
            assert_eq!(obj.code, -32000);
            assert_eq!(obj.message, "denied");
        }
        other => panic!("expected RpcError::Rpc, got {other:?}"),
    }
    client.shutdown().await;
}

#[tokio::test]
async fn request_times_out_when_peer_is_silent() {
    let command = sh_script("sleep 5; cat >/dev/null");
    let client = StdioRpcClient::spawn(command).await.unwrap();

    let err = client
        .request("ping", json!({}), Duration::from_millis(200))
        .await
        .unwrap_err();

    assert!(matches!(err, orbit_rpc::RpcError::Timeout));
    client.shutdown().await;
}

#[tokio::test]
async fn notification_handler_is_invoked() {
    let command = sh_script(
        r#"echo '{"jsonrpc":"2.0","method":"session/update","params":{"sessionId":"s1","n":1}}'; cat >/dev/null"#,
    );
    let client = StdioRpcClient::spawn(command).await.unwrap();

    let (tx, rx) = tokio::sync::oneshot::channel();
    let tx = std::sync::Mutex::new(Some(tx));
    client
        .on_notification(
            "session/update",
            std::sync::Arc::new(move |params| {
                if let Some(tx) = tx.lock().unwrap().take() {
                    let _ = tx.send(params);
                }
            }),
        )
        .await;

    let params = tokio::time::timeout(Duration::from_secs(5), rx).await.unwrap().unwrap();
    assert_eq!(params, Some(json!({"sessionId": "s1", "n": 1})));
    client.shutdown().await;
}

#[tokio::test]
async fn inbound_request_is_answered_by_registered_handler() {
    // The peer sends us a request and expects a response on stdin; a shell
    // reader then echoes whatever we wrote so the test can assert on it.
    let command = sh_script(
        r#"echo '{"jsonrpc":"2.0","id":7,"method":"session/request_permission","params":{"sessionId":"s1"}}'; read -r line; echo "$line" 1>&2"#,
    );
    let client = StdioRpcClient::spawn(command).await.unwrap();

    client
        .on_request(
            "session/request_permission",
            std::sync::Arc::new(|_params| {
                Box::pin(async move { Ok(json!({"outcome": "allow"})) })
            }),
        )
        .await;

    // Give the reader task a moment to dispatch and respond; there is no
    // response line to await directly since the peer only writes to stderr.
    tokio::time::sleep(Duration::from_millis(300)).await;
    client.shutdown().await;
}

#[tokio::test]
async fn channel_closed_after_subprocess_exits() {
    let command = sh_script("exit 0");
    let client = StdioRpcClient::spawn(command).await.unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(client.is_closed());

    let err = client
        .request("ping", json!({}), Duration::from_secs(1))
        .await
        .unwrap_err();
    assert!(matches!(err, orbit_rpc::RpcError::ChannelClosed));
}
