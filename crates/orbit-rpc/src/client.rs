//! The public `StdioRpcClient` API: spawn a subprocess, send requests and
//! notifications, and register notification/request/session handlers
//! (§4.1).

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::warn;

use crate::error::{RpcError, RpcErrorObject, RpcResult};
use crate::transport::{self, NotificationHandler, NotificationHandlers, RequestHandler, RequestHandlers, SessionHandlers};

/// Opaque handle returned by [`StdioRpcClient::on_session_event`], passed
/// back to [`StdioRpcClient::off_session_event`] to remove exactly that
/// registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandlerId(u64);

/// A bidirectional JSON-RPC 2.0 client framed over a child process's stdio.
///
/// Cloning shares the same underlying subprocess and handler registry; the
/// subprocess is killed when the last clone drops.
#[derive(Clone)]
pub struct StdioRpcClient {
    inner: Arc<Inner>,
}

struct Inner {
    writer: mpsc::UnboundedSender<String>,
    pending: transport::PendingRequests,
    notification_handlers: NotificationHandlers,
    request_handlers: RequestHandlers,
    session_handlers: SessionHandlers,
    next_id: AtomicU64,
    next_handler_id: AtomicU64,
    closed: Arc<AtomicBool>,
    child: Mutex<Option<Child>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl StdioRpcClient {
    /// Spawn `command` and start the writer/reader/stderr tasks.
    ///
    /// The command's stdin, stdout, and stderr are overridden to piped
    /// regardless of what the caller set.
    pub async fn spawn(mut command: Command) -> RpcResult<Self> {
        command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(RpcError::Spawn)?;
        let stdin = child.stdin.take().ok_or(RpcError::ChannelClosed)?;
        let stdout = child.stdout.take().ok_or(RpcError::ChannelClosed)?;
        let stderr = child.stderr.take().ok_or(RpcError::ChannelClosed)?;

        let (writer_tx, writer_rx) = mpsc::unbounded_channel();
        let pending: transport::PendingRequests = Arc::new(Mutex::new(HashMap::new()));
        let notification_handlers: NotificationHandlers = Arc::new(Mutex::new(HashMap::new()));
        let request_handlers: RequestHandlers = Arc::new(Mutex::new(HashMap::new()));
        let session_handlers: SessionHandlers = Arc::new(Mutex::new(HashMap::new()));
        let closed = Arc::new(AtomicBool::new(false));

        let writer_task = tokio::spawn(transport::writer_task(stdin, writer_rx));
        let reader_task = tokio::spawn(transport::reader_task(
            stdout,
            pending.clone(),
            notification_handlers.clone(),
            request_handlers.clone(),
            session_handlers.clone(),
            writer_tx.clone(),
            closed.clone(),
        ));
        let stderr_task = tokio::spawn(transport::stderr_task(stderr));

        Ok(Self {
            inner: Arc::new(Inner {
                writer: writer_tx,
                pending,
                notification_handlers,
                request_handlers,
                session_handlers,
                next_id: AtomicU64::new(1),
                next_handler_id: AtomicU64::new(1),
                closed,
                child: Mutex::new(Some(child)),
                tasks: Mutex::new(vec![writer_task, reader_task, stderr_task]),
            }),
        })
    }

    /// Send a request and await its matching response, or `RpcError::Timeout`
    /// if none arrives within `timeout`.
    pub async fn request(&self, method: &str, params: Value, timeout: Duration) -> RpcResult<Value> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(RpcError::ChannelClosed);
        }

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.inner.pending.lock().await.insert(id, tx);

        let frame = serde_json::json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        let line = serde_json::to_string(&frame)?;
        if self.inner.writer.send(line).is_err() {
            self.inner.pending.lock().await.remove(&id);
            return Err(RpcError::ChannelClosed);
        }

        let outcome = match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => {
                return Err(RpcError::ChannelClosed);
            }
            Err(_) => {
                self.inner.pending.lock().await.remove(&id);
                return Err(RpcError::Timeout);
            }
        };

        outcome.map_err(RpcError::Rpc)
    }

    /// Send a one-way notification; never awaits a response.
    pub fn notify(&self, method: &str, params: Value) -> RpcResult<()> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(RpcError::ChannelClosed);
        }
        let frame = serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
        });
        let line = serde_json::to_string(&frame)?;
        self.inner.writer.send(line).map_err(|_| RpcError::ChannelClosed)
    }

    /// Register a handler invoked for every inbound notification whose
    /// `method` matches. Multiple handlers per method all run.
    pub async fn on_notification(&self, method: impl Into<String>, handler: NotificationHandler) {
        self.inner
            .notification_handlers
            .lock()
            .await
            .entry(method.into())
            .or_default()
            .push(handler);
    }

    /// Register a handler for an inbound peer-initiated request. Only one
    /// handler per method is kept; registering again replaces it.
    ///
    /// The handler's future is awaited before a response is written back to
    /// the subprocess's stdin — a handler that holds its future open (for
    /// example while a human approves or denies a tool call) simply delays
    /// the response, which is the intended mechanism for approval prompts.
    pub async fn on_request(&self, method: impl Into<String>, handler: RequestHandler) {
        self.inner.request_handlers.lock().await.insert(method.into(), handler);
    }

    /// Register a handler invoked for every notification whose params carry
    /// a matching `sessionId`/`session_id`, in addition to any
    /// method-keyed handler. Returns an id for later removal.
    pub async fn on_session_event(&self, session_id: impl Into<String>, handler: NotificationHandler) -> HandlerId {
        let id = self.inner.next_handler_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .session_handlers
            .lock()
            .await
            .entry(session_id.into())
            .or_default()
            .push((id, handler));
        HandlerId(id)
    }

    /// Remove a single session-event handler previously returned by
    /// [`Self::on_session_event`].
    pub async fn off_session_event(&self, session_id: &str, id: HandlerId) {
        let mut handlers = self.inner.session_handlers.lock().await;
        if let Some(list) = handlers.get_mut(session_id) {
            list.retain(|(handler_id, _)| *handler_id != id.0);
            if list.is_empty() {
                handlers.remove(session_id);
            }
        }
    }

    /// Whether the transport has observed EOF or a fatal I/O error.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Kill the subprocess and abort the background tasks.
    pub async fn shutdown(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        if let Some(mut child) = self.inner.child.lock().await.take() {
            if let Err(err) = child.kill().await {
                warn!(error = %err, "failed to kill subprocess on shutdown");
            }
        }
        for task in self.inner.tasks.lock().await.drain(..) {
            task.abort();
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
        if let Ok(mut guard) = self.child.try_lock() {
            if let Some(child) = guard.as_mut() {
                let _ = child.start_kill();
            }
        }
        if let Ok(mut tasks) = self.tasks.try_lock() {
            for task in tasks.drain(..) {
                task.abort();
            }
        }
    }
}

impl RpcErrorObject {
    /// Build a request-handler error object for an approval/denied/timeout
    /// outcome that should surface verbatim to the subprocess.
    #[must_use]
    pub fn denied(message: impl Into<String>) -> Self {
        Self {
            code: -32000,
            message: message.into(),
            data: None,
        }
    }
}
