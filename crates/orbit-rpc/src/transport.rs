//! The reader/writer tasks that drive the stdio transport.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{ChildStderr, ChildStdin, ChildStdout};
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, trace, warn};

use crate::error::RpcErrorObject;
use crate::wire::{self, Inbound, MAX_LINE_BYTES};

pub(crate) type PendingRequests = Arc<Mutex<HashMap<u64, oneshot::Sender<Result<Value, RpcErrorObject>>>>>;
pub(crate) type NotificationHandler = Arc<dyn Fn(Option<Value>) + Send + Sync>;
pub(crate) type RequestHandler =
    Arc<dyn Fn(Option<Value>) -> futures::future::BoxFuture<'static, Result<Value, RpcErrorObject>> + Send + Sync>;

pub(crate) type NotificationHandlers = Arc<Mutex<HashMap<String, Vec<NotificationHandler>>>>;
pub(crate) type RequestHandlers = Arc<Mutex<HashMap<String, RequestHandler>>>;
pub(crate) type SessionHandlers = Arc<Mutex<HashMap<String, Vec<(u64, NotificationHandler)>>>>;

/// Writes one JSON line per outgoing message; drops the child's stdin on
/// close (the EOF this produces lets a well-behaved subprocess exit).
pub(crate) async fn writer_task(mut stdin: ChildStdin, mut rx: mpsc::UnboundedReceiver<String>) {
    while let Some(line) = rx.recv().await {
        if stdin.write_all(line.as_bytes()).await.is_err() {
            break;
        }
        if stdin.write_all(b"\n").await.is_err() {
            break;
        }
        if stdin.flush().await.is_err() {
            break;
        }
    }
    let _ = stdin.shutdown().await;
}

/// Reads and dispatches inbound lines until EOF, then marks the transport
/// closed and fails every outstanding request.
#[allow(clippy::too_many_arguments)]
pub(crate) async fn reader_task(
    stdout: ChildStdout,
    pending: PendingRequests,
    notification_handlers: NotificationHandlers,
    request_handlers: RequestHandlers,
    session_handlers: SessionHandlers,
    writer: mpsc::UnboundedSender<String>,
    closed: Arc<AtomicBool>,
) {
    let mut reader = BufReader::new(stdout);
    let mut line = String::new();

    loop {
        line.clear();
        let read = reader.read_line(&mut line).await;
        match read {
            Ok(0) => break, // EOF
            Ok(n) if n > MAX_LINE_BYTES => {
                warn!(bytes = n, "dropping oversized protocol line");
                continue;
            }
            Ok(_) => {}
            Err(err) => {
                warn!(error = %err, "stdio read error, closing transport");
                break;
            }
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let value: Value = match serde_json::from_str(trimmed) {
            Ok(v) => v,
            Err(err) => {
                warn!(error = %err, "dropping malformed JSON line");
                continue;
            }
        };

        match wire::classify(value) {
            Ok(Inbound::Response { id, outcome }) => {
                let Some(id) = id.as_u64() else {
                    warn!("dropping response with unmatchable id");
                    continue;
                };
                let sender = pending.lock().await.remove(&id);
                match sender {
                    Some(tx) => {
                        let _ = tx.send(outcome);
                    }
                    None => warn!(id, "dropping response with no outstanding request"),
                }
            }
            Ok(Inbound::Notification { method, params }) => {
                if let Some(session_id) = params.as_ref().and_then(wire::extract_session_id) {
                    let handlers = session_handlers.lock().await;
                    if let Some(list) = handlers.get(&session_id) {
                        for (_, handler) in list {
                            run_notification_handler(handler, params.clone());
                        }
                    }
                }
                let handlers = notification_handlers.lock().await;
                if let Some(list) = handlers.get(&method) {
                    for handler in list {
                        run_notification_handler(handler, params.clone());
                    }
                } else {
                    trace!(method, "no handler registered for notification");
                }
            }
            Ok(Inbound::Request { id, method, params }) => {
                let handler = request_handlers.lock().await.get(&method).cloned();
                let writer = writer.clone();
                tokio::spawn(async move {
                    let outcome = match handler {
                        Some(handler) => handler(params).await,
                        None => Err(RpcErrorObject {
                            code: -32601,
                            message: format!("method not found: {method}"),
                            data: None,
                        }),
                    };
                    let response = match outcome {
                        Ok(result) => serde_json::json!({"jsonrpc":"2.0","id":id,"result":result}),
                        Err(error) => serde_json::json!({"jsonrpc":"2.0","id":id,"error":error}),
                    };
                    if let Ok(line) = serde_json::to_string(&response) {
                        let _ = writer.send(line);
                    }
                });
            }
            Err(err) => {
                warn!(error = %err, "dropping malformed protocol line");
            }
        }
    }

    debug!("stdio transport reached EOF, failing outstanding requests");
    closed.store(true, Ordering::SeqCst);
    let mut guard = pending.lock().await;
    for (_, tx) in guard.drain() {
        let _ = tx.send(Err(RpcErrorObject {
            code: -32099,
            message: "channel closed".into(),
            data: None,
        }));
    }
}

fn run_notification_handler(handler: &NotificationHandler, params: Option<Value>) {
    // A panicking handler must not take down the reader loop or starve the
    // other handlers registered for this event (§4.1).
    let handler = handler.clone();
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| handler(params)));
    if let Err(payload) = result {
        let msg = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        warn!(error = %msg, "notification handler panicked");
    }
}

/// Reads and logs subprocess stderr lines at debug level.
pub(crate) async fn stderr_task(stderr: ChildStderr) {
    let mut reader = BufReader::new(stderr);
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) | Err(_) => break,
            Ok(_) => debug!(target: "orbit_rpc::stderr", "{}", line.trim_end()),
        }
    }
}
