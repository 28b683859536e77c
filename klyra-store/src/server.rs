//! WebSocket front end of the board store.
//!
//! Each connection carries postcard-encoded [`StoreRequest`] frames. Every
//! request is answered with a [`StoreResponse`] echoing its id. Frames over
//! the size limit are dropped before decoding, and undecodable frames are
//! skipped too. Both are logged and the connection stays open.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use klyra_proto::store::{self, StoreOp, StoreReply, StoreRequest, StoreResponse};

use crate::store::BoardDb;

/// Default maximum accepted request frame size in bytes (256 KB).
const DEFAULT_MAX_FRAME_SIZE: usize = 256 * 1024;

/// Shared server state.
pub struct StoreState {
    /// The board tables.
    pub db: BoardDb,
    /// Maximum accepted request frame size in bytes.
    max_frame_size: usize,
}

impl Default for StoreState {
    fn default() -> Self {
        Self::new(BoardDb::new())
    }
}

impl StoreState {
    /// Wrap a database with the default frame size limit.
    #[must_use]
    pub const fn new(db: BoardDb) -> Self {
        Self::with_config(db, DEFAULT_MAX_FRAME_SIZE)
    }

    /// Wrap a database with a custom frame size limit.
    #[must_use]
    pub const fn with_config(db: BoardDb, max_frame_size: usize) -> Self {
        Self { db, max_frame_size }
    }
}

/// Runs one request against the database.
pub async fn dispatch(state: &StoreState, request: StoreRequest) -> StoreResponse {
    let StoreRequest { request_id, op } = request;
    let result = match op {
        StoreOp::FetchBoard(locator) => {
            state.db.fetch_board(&locator).await.map(StoreReply::Board)
        }
        StoreOp::UpdateTaskPosition(update) => {
            tracing::debug!(
                request_id,
                task_id = %update.task_id,
                column_id = %update.column_id,
                order = update.order,
                "update card position"
            );
            state
                .db
                .update_task_position(&update)
                .await
                .map(|()| StoreReply::Done)
        }
        StoreOp::UpdateTaskPositions { moved, reorders } => {
            tracing::debug!(
                request_id,
                task_id = %moved.task_id,
                reorders = reorders.len(),
                "update card positions"
            );
            state
                .db
                .update_task_positions(&moved, &reorders)
                .await
                .map(|()| StoreReply::Done)
        }
        StoreOp::InsertAuditRecord(record) => {
            state.db.insert_activity(&record).await.map(|id| {
                tracing::debug!(
                    request_id,
                    activity_id = %id,
                    task_id = %record.task_id,
                    "activity recorded"
                );
                StoreReply::Done
            })
        }
    };

    let reply = result.unwrap_or_else(|e| {
        tracing::warn!(request_id, error = %e, "request rejected");
        StoreReply::Rejected {
            reason: e.to_string(),
        }
    });
    StoreResponse { request_id, reply }
}

/// Serves one client connection until it closes.
pub async fn handle_socket(socket: WebSocket, state: Arc<StoreState>) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

    let mut write_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if ws_sender.send(msg).await.is_err() {
                tracing::warn!("WebSocket write failed");
                break;
            }
        }
    });

    let mut read_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_receiver.next().await {
            match msg {
                Message::Binary(data) => {
                    let Some(response) = handle_frame(&data, &state).await else {
                        continue;
                    };
                    match store::encode_response(&response) {
                        Ok(bytes) => {
                            if tx.send(Message::Binary(bytes.into())).is_err() {
                                break;
                            }
                        }
                        Err(e) => tracing::error!(
                            request_id = response.request_id,
                            error = %e,
                            "failed to encode response"
                        ),
                    }
                }
                Message::Close(_) => {
                    tracing::info!("received close frame");
                    break;
                }
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut read_task => {
            write_task.abort();
        }
        _ = &mut write_task => {
            read_task.abort();
        }
    }
    tracing::info!("client disconnected");
}

/// Decodes and runs one frame. Returns `None` for frames to skip.
async fn handle_frame(data: &[u8], state: &StoreState) -> Option<StoreResponse> {
    if data.len() > state.max_frame_size {
        tracing::warn!(
            size = data.len(),
            max = state.max_frame_size,
            "request frame exceeds size limit, skipping"
        );
        return None;
    }

    match store::decode_request(data) {
        Ok(request) => Some(dispatch(state, request).await),
        Err(e) => {
            tracing::warn!(error = %e, len = data.len(), "failed to decode request, skipping");
            None
        }
    }
}

/// Starts the store server on the given address with an empty database.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server(
    addr: &str,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    start_server_with_state(addr, Arc::new(StoreState::default())).await
}

/// Starts the store server with a pre-populated [`StoreState`].
///
/// Returns the bound address (useful with port 0) and the server task.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server_with_state(
    addr: &str,
    state: Arc<StoreState>,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    let app = axum::Router::new()
        .route("/ws", axum::routing::get(ws_handler))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "store server error");
        }
    });

    Ok((bound_addr, handle))
}

/// axum handler that upgrades an HTTP request to a WebSocket connection.
async fn ws_handler(
    ws: axum::extract::ws::WebSocketUpgrade,
    axum::extract::State(state): axum::extract::State<Arc<StoreState>>,
) -> impl axum::response::IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}
