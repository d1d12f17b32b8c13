// SPDX-FileCopyrightText: 2026 Costplane Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Multiplexed request/response client for one plugin connection.
//!
//! A writer task serialises outgoing lines; a reader task routes each reply
//! to the caller waiting on its request id. Many calls can be in flight on
//! one connection at once.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use costplane_core::{CostplaneError, ProtocolErrorKind, StatusCode};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::protocol::{Method, Request, Response, encode_line};

type Reply = Result<serde_json::Value, CostplaneError>;

/// State shared between callers and the reader task.
struct Shared {
    plugin: String,
    pending: Mutex<HashMap<u64, oneshot::Sender<Reply>>>,
    closed: AtomicBool,
}

impl Shared {
    /// Mark the connection closed and fail every waiting call.
    async fn close(&self, reason: &str) {
        self.closed.store(true, Ordering::SeqCst);
        let mut pending = self.pending.lock().await;
        if !pending.is_empty() {
            debug!(plugin = %self.plugin, count = pending.len(), reason, "failing pending calls");
        }
        for (_, tx) in pending.drain() {
            let _ = tx.send(Err(CostplaneError::protocol(
                &self.plugin,
                ProtocolErrorKind::ConnectionClosed,
                reason,
            )));
        }
    }
}

/// Client side of one plugin connection.
pub struct TransportClient {
    shared: Arc<Shared>,
    writer_tx: mpsc::Sender<Vec<u8>>,
    next_id: AtomicU64,
    reader_handle: JoinHandle<()>,
    writer_handle: JoinHandle<()>,
}

impl TransportClient {
    /// Start the reader and writer tasks over `reader`/`writer`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn connect<R, W>(plugin: impl Into<String>, reader: R, writer: W) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let shared = Arc::new(Shared {
            plugin: plugin.into(),
            pending: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        });
        let (writer_tx, writer_rx) = mpsc::channel::<Vec<u8>>(64);

        let writer_handle = tokio::spawn(writer_loop(writer, writer_rx, Arc::clone(&shared)));
        let reader_handle = tokio::spawn(reader_loop(reader, Arc::clone(&shared)));

        Self {
            shared,
            writer_tx,
            next_id: AtomicU64::new(1),
            reader_handle,
            writer_handle,
        }
    }

    pub fn plugin(&self) -> &str {
        &self.shared.plugin
    }

    /// True once the peer hung up or the connection was shut down.
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    /// Send one request and wait for its reply.
    ///
    /// Fails with a `Protocol` error on deadline expiry or connection loss,
    /// `Plugin` when the plugin replies with an error status, and
    /// `Cancelled` when `cancel` fires first.
    pub async fn call(
        &self,
        method: Method,
        params: serde_json::Value,
        deadline: Duration,
        cancel: &CancellationToken,
    ) -> Result<serde_json::Value, CostplaneError> {
        if self.is_closed() {
            return Err(self.closed_error("connection already closed"));
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let line = encode_line(&Request { id, method, params }).map_err(|e| {
            CostplaneError::protocol(&self.shared.plugin, ProtocolErrorKind::Malformed, e.to_string())
        })?;

        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.shared.pending.lock().await;
            if self.is_closed() {
                return Err(self.closed_error("connection closed"));
            }
            pending.insert(id, tx);
        }

        if self.writer_tx.send(line).await.is_err() {
            self.forget(id).await;
            return Err(self.closed_error("writer stopped"));
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                self.forget(id).await;
                Err(CostplaneError::Cancelled)
            }
            reply = tokio::time::timeout(deadline, rx) => match reply {
                Ok(Ok(reply)) => reply,
                Ok(Err(_)) => Err(self.closed_error("reply channel dropped")),
                Err(_) => {
                    self.forget(id).await;
                    Err(CostplaneError::protocol(
                        &self.shared.plugin,
                        ProtocolErrorKind::DeadlineExceeded,
                        format!("{method} did not answer within {}ms", deadline.as_millis()),
                    ))
                }
            },
        }
    }

    /// Stop both tasks. Dropping the writer closes the plugin's input.
    pub async fn shutdown(&self) {
        self.writer_handle.abort();
        self.reader_handle.abort();
        self.shared.close("connection shut down").await;
    }

    async fn forget(&self, id: u64) {
        self.shared.pending.lock().await.remove(&id);
    }

    fn closed_error(&self, message: &str) -> CostplaneError {
        CostplaneError::protocol(&self.shared.plugin, ProtocolErrorKind::ConnectionClosed, message)
    }
}

impl std::fmt::Debug for TransportClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportClient")
            .field("plugin", &self.plugin())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl Drop for TransportClient {
    fn drop(&mut self) {
        self.writer_handle.abort();
        self.reader_handle.abort();
    }
}

async fn writer_loop<W: AsyncWrite + Unpin>(
    mut writer: W,
    mut rx: mpsc::Receiver<Vec<u8>>,
    shared: Arc<Shared>,
) {
    while let Some(line) = rx.recv().await {
        let written = async {
            writer.write_all(&line).await?;
            writer.flush().await
        }
        .await;
        if let Err(e) = written {
            warn!(plugin = %shared.plugin, error = %e, "plugin write failed");
            shared.close("write failed").await;
            return;
        }
    }
}

async fn reader_loop<R: AsyncRead + Unpin>(reader: R, shared: Arc<Shared>) {
    let mut lines = BufReader::new(reader).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => {
                debug!(plugin = %shared.plugin, "plugin closed its output");
                shared.close("plugin closed the connection").await;
                return;
            }
            Err(e) => {
                warn!(plugin = %shared.plugin, error = %e, "plugin read failed");
                shared.close("read failed").await;
                return;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let response: Response = match serde_json::from_str(&line) {
            Ok(r) => r,
            Err(e) => {
                warn!(plugin = %shared.plugin, error = %e, "dropping malformed reply");
                continue;
            }
        };

        let Some(tx) = shared.pending.lock().await.remove(&response.id) else {
            debug!(plugin = %shared.plugin, id = response.id, "reply for unknown or abandoned request");
            continue;
        };

        let reply = match (response.result, response.error) {
            (_, Some(error)) => Err(CostplaneError::Plugin {
                plugin: shared.plugin.clone(),
                code: StatusCode::from_wire(&error.code),
                message: error.message,
            }),
            (Some(result), None) => Ok(result),
            (None, None) => Ok(serde_json::Value::Null),
        };
        let _ = tx.send(reply);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};

    /// Plugin side of a duplex pair that answers with `respond`.
    fn serve<F>(stream: DuplexStream, respond: F)
    where
        F: Fn(Request) -> Option<Response> + Send + 'static,
    {
        tokio::spawn(async move {
            let (read, mut write) = tokio::io::split(stream);
            let mut lines = BufReader::new(read).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let req: Request = serde_json::from_str(&line).unwrap();
                if let Some(resp) = respond(req) {
                    write.write_all(&encode_line(&resp).unwrap()).await.unwrap();
                }
            }
        });
    }

    fn client(respond: impl Fn(Request) -> Option<Response> + Send + 'static) -> TransportClient {
        let (host, plugin) = tokio::io::duplex(64 * 1024);
        serve(plugin, respond);
        let (r, w) = tokio::io::split(host);
        TransportClient::connect("mock", r, w)
    }

    #[tokio::test]
    async fn call_returns_result() {
        let c = client(|req| Some(Response::ok(req.id, json!({"name": "mock"}))));
        let v = c
            .call(Method::Name, json!(null), Duration::from_secs(1), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(v["name"], "mock");
    }

    #[tokio::test]
    async fn error_reply_becomes_plugin_error() {
        let c = client(|req| Some(Response::err(req.id, "INVALID_ARGUMENT", "bad sku")));
        let err = c
            .call(Method::GetProjectedCost, json!({}), Duration::from_secs(1), &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), Some(StatusCode::InvalidArgument));
    }

    #[tokio::test]
    async fn concurrent_calls_are_routed_by_id() {
        let c = Arc::new(client(|req| Some(Response::ok(req.id, req.params))));
        let cancel = CancellationToken::new();
        let calls = (0..16).map(|i| {
            let c = Arc::clone(&c);
            let cancel = cancel.clone();
            async move {
                c.call(Method::GetProjectedCost, json!({"n": i}), Duration::from_secs(1), &cancel)
                    .await
                    .unwrap()
            }
        });
        let results = futures::future::join_all(calls).await;
        for (i, v) in results.iter().enumerate() {
            assert_eq!(v["n"], i);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn silence_hits_deadline() {
        let c = client(|_| None);
        let err = c
            .call(Method::Name, json!(null), Duration::from_millis(200), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CostplaneError::Protocol {
                kind: ProtocolErrorKind::DeadlineExceeded,
                ..
            }
        ));
        assert!(!c.is_closed());
    }

    #[tokio::test]
    async fn cancellation_wins() {
        let c = client(|_| None);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = c
            .call(Method::Name, json!(null), Duration::from_secs(5), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, CostplaneError::Cancelled));
    }

    #[tokio::test]
    async fn peer_hangup_fails_pending_and_closes() {
        let (host, plugin) = tokio::io::duplex(1024);
        let (r, w) = tokio::io::split(host);
        let c = TransportClient::connect("mock", r, w);

        let cancel = CancellationToken::new();
        let pending = c.call(Method::Name, json!(null), Duration::from_secs(5), &cancel);
        let hangup = async move {
            tokio::task::yield_now().await;
            drop(plugin);
        };
        let (err, ()) = tokio::join!(pending, hangup);
        assert!(matches!(
            err.unwrap_err(),
            CostplaneError::Protocol {
                kind: ProtocolErrorKind::ConnectionClosed,
                ..
            }
        ));
        assert!(c.is_closed());

        let again = c
            .call(Method::Name, json!(null), Duration::from_secs(1), &CancellationToken::new())
            .await;
        assert!(again.is_err());
    }

    #[tokio::test]
    async fn malformed_lines_are_skipped() {
        let (host, plugin) = tokio::io::duplex(4096);
        tokio::spawn(async move {
            let (read, mut write) = tokio::io::split(plugin);
            let mut lines = BufReader::new(read).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let req: Request = serde_json::from_str(&line).unwrap();
                write.write_all(b"not json\n").await.unwrap();
                write
                    .write_all(&encode_line(&Response::ok(req.id, json!(1))).unwrap())
                    .await
                    .unwrap();
            }
        });
        let (r, w) = tokio::io::split(host);
        let c = TransportClient::connect("mock", r, w);
        let v = c
            .call(Method::Name, json!(null), Duration::from_secs(1), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(v, json!(1));
    }
}
