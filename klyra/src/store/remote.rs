//! WebSocket client for a `klyra-store` server.
//!
//! Implements [`BoardStore`] by sending one postcard-encoded
//! [`StoreRequest`] per binary frame and matching responses to callers by
//! request id, so concurrent moves can share one connection.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{Mutex, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use klyra_proto::audit::AuditRecord;
use klyra_proto::board::Board;
use klyra_proto::planner::TaskReorder;
use klyra_proto::store::{
    self, BoardLocator, PositionUpdate, StoreOp, StoreReply, StoreRequest,
};

use super::{BoardStore, StoreError};

/// Type alias for the write half of a WebSocket connection.
type WsSender = futures_util::stream::SplitSink<
    WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>,
    Message,
>;

/// Type alias for the read half of a WebSocket connection.
type WsReader =
    futures_util::stream::SplitStream<WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>>;

/// Requests waiting for their response, keyed by request id.
type Pending = Arc<parking_lot::Mutex<HashMap<u64, oneshot::Sender<StoreReply>>>>;

/// Board store reached over a WebSocket connection.
///
/// Created via [`WsBoardStore::connect`], which opens the connection and
/// spawns a background task that routes responses to waiting requests.
pub struct WsBoardStore {
    /// The server URL (ws:// or wss://).
    url: String,
    /// Write half of the WebSocket connection (shared for concurrent requests).
    ws_sender: Mutex<WsSender>,
    /// Requests awaiting a response.
    pending: Pending,
    /// Id for the next request.
    next_id: AtomicU64,
    /// Whether the connection is still usable.
    connected: Arc<AtomicBool>,
    /// How long a single request may wait for its response.
    request_timeout: Duration,
    /// Background response reader.
    reader_handle: tokio::task::JoinHandle<()>,
}

impl WsBoardStore {
    /// Connect to a store server.
    ///
    /// # Errors
    ///
    /// - [`StoreError::InvalidUrl`] if `url` is not a ws:// or wss:// URL.
    /// - [`StoreError::Timeout`] if the handshake takes longer than `connect_timeout`.
    /// - [`StoreError::Unavailable`] if the server cannot be reached.
    pub async fn connect(
        url: &str,
        connect_timeout: Duration,
        request_timeout: Duration,
    ) -> Result<Self, StoreError> {
        let parsed =
            url::Url::parse(url).map_err(|e| StoreError::InvalidUrl(format!("{url}: {e}")))?;
        if !matches!(parsed.scheme(), "ws" | "wss") {
            return Err(StoreError::InvalidUrl(format!(
                "{url}: expected ws:// or wss://"
            )));
        }

        let (ws_stream, _response) = tokio::time::timeout(connect_timeout, connect_async(url))
            .await
            .map_err(|_| {
                tracing::warn!(url, "store WebSocket connect timed out");
                StoreError::Timeout
            })?
            .map_err(|e| {
                tracing::warn!(url, err = %e, "store WebSocket connect failed");
                map_ws_connect_error(e)
            })?;

        let (ws_sender, ws_reader) = ws_stream.split();
        let pending: Pending = Arc::default();
        let connected = Arc::new(AtomicBool::new(true));
        let reader_handle = tokio::spawn(reader_loop(
            ws_reader,
            Arc::clone(&pending),
            Arc::clone(&connected),
        ));

        tracing::info!(url, "connected to board store");
        Ok(Self {
            url: url.to_string(),
            ws_sender: Mutex::new(ws_sender),
            pending,
            next_id: AtomicU64::new(1),
            connected,
            request_timeout,
            reader_handle,
        })
    }

    /// Return the server URL this store is connected to.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Returns `true` while the connection is open.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    async fn request(&self, op: StoreOp) -> Result<StoreReply, StoreError> {
        if !self.is_connected() {
            return Err(StoreError::ConnectionClosed);
        }

        let request_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let bytes = store::encode_request(&StoreRequest { request_id, op })
            .map_err(|e| StoreError::Protocol(e.to_string()))?;

        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(request_id, tx);

        let sent = self
            .ws_sender
            .lock()
            .await
            .send(Message::Binary(bytes.into()))
            .await;
        if let Err(e) = sent {
            tracing::warn!(err = %e, request_id, "store send failed");
            self.connected.store(false, Ordering::Relaxed);
            self.pending.lock().remove(&request_id);
            return Err(StoreError::ConnectionClosed);
        }

        match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(StoreError::ConnectionClosed),
            Err(_) => {
                self.pending.lock().remove(&request_id);
                tracing::debug!(request_id, "store request timed out");
                Err(StoreError::Timeout)
            }
        }
    }

    async fn write(&self, op: StoreOp) -> Result<(), StoreError> {
        match self.request(op).await? {
            StoreReply::Done => Ok(()),
            other => Err(reply_error(other)),
        }
    }
}

impl Drop for WsBoardStore {
    fn drop(&mut self) {
        self.reader_handle.abort();
    }
}

impl BoardStore for WsBoardStore {
    async fn fetch_board(&self, locator: &BoardLocator) -> Result<Board, StoreError> {
        match self.request(StoreOp::FetchBoard(locator.clone())).await? {
            StoreReply::Board(board) => Ok(board),
            other => Err(reply_error(other)),
        }
    }

    async fn update_task_position(&self, update: &PositionUpdate) -> Result<(), StoreError> {
        self.write(StoreOp::UpdateTaskPosition(update.clone())).await
    }

    async fn update_task_positions(
        &self,
        moved: &PositionUpdate,
        reorders: &[TaskReorder],
    ) -> Result<(), StoreError> {
        self.write(StoreOp::UpdateTaskPositions {
            moved: moved.clone(),
            reorders: reorders.to_vec(),
        })
        .await
    }

    async fn insert_audit_record(&self, record: &AuditRecord) -> Result<(), StoreError> {
        self.write(StoreOp::InsertAuditRecord(record.clone())).await
    }
}

fn reply_error(reply: StoreReply) -> StoreError {
    match reply {
        StoreReply::Rejected { reason } => StoreError::Rejected(reason),
        StoreReply::Failed { reason } => StoreError::Unavailable(reason),
        StoreReply::Board(_) => StoreError::Protocol("board snapshot for a write".into()),
        StoreReply::Done => StoreError::Protocol("write acknowledgment for a fetch".into()),
    }
}

/// Background task that routes responses to waiting requests.
///
/// Malformed frames and responses nobody waits for (the request already
/// timed out) are logged and skipped. On exit every waiting request sees
/// [`StoreError::ConnectionClosed`].
async fn reader_loop(mut ws_reader: WsReader, pending: Pending, connected: Arc<AtomicBool>) {
    while let Some(msg_result) = ws_reader.next().await {
        match msg_result {
            Ok(Message::Binary(data)) => match store::decode_response(&data) {
                Ok(response) => {
                    let waiter = pending.lock().remove(&response.request_id);
                    match waiter {
                        Some(tx) => {
                            let _ = tx.send(response.reply);
                        }
                        None => tracing::debug!(
                            request_id = response.request_id,
                            "response for unknown or expired request"
                        ),
                    }
                }
                Err(e) => tracing::warn!(err = %e, "malformed store frame, skipping"),
            },
            Ok(Message::Close(_)) => {
                tracing::info!("store WebSocket closed by server");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(err = %e, "store WebSocket read error");
                break;
            }
        }
    }
    connected.store(false, Ordering::Relaxed);
    pending.lock().clear();
    tracing::info!("store reader task exiting");
}

/// Map a `tokio_tungstenite` connection error to a [`StoreError`].
fn map_ws_connect_error(err: tokio_tungstenite::tungstenite::Error) -> StoreError {
    use tokio_tungstenite::tungstenite::Error as WsError;
    match err {
        WsError::Io(io_err) => StoreError::Unavailable(io_err.to_string()),
        WsError::Http(response) => {
            StoreError::Unavailable(format!("HTTP error: status {}", response.status()))
        }
        WsError::Url(e) => StoreError::InvalidUrl(e.to_string()),
        other => StoreError::Unavailable(other.to_string()),
    }
}
