//! Wire protocol between a board client and the board store server.
//!
//! Each WebSocket binary frame carries exactly one postcard-encoded
//! [`StoreRequest`] (client to server) or [`StoreResponse`] (server to
//! client). Responses echo the request id so a client can keep several
//! requests in flight on one connection.

use serde::{Deserialize, Serialize};

use crate::audit::AuditRecord;
use crate::board::{Board, ColumnId, ProjectId, TaskId};
use crate::planner::TaskReorder;

/// Error type for codec encode/decode operations.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// How a client addresses the board it wants to load.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BoardLocator {
    /// Team view, by project id.
    Project(ProjectId),
    /// Client view, by shareable access link token.
    AccessLink(String),
}

impl std::fmt::Display for BoardLocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Project(id) => write!(f, "project {id}"),
            Self::AccessLink(link) => write!(f, "access link {link}"),
        }
    }
}

/// New position of one task row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionUpdate {
    /// The task row to update.
    pub task_id: TaskId,
    /// Column it belongs to after the update.
    pub column_id: ColumnId,
    /// Order value to store.
    pub order: u32,
}

/// Operations a client may ask the store to perform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoreOp {
    /// Load a board snapshot.
    FetchBoard(BoardLocator),
    /// Write one task's column and order.
    UpdateTaskPosition(PositionUpdate),
    /// Write the moved task's position plus the order of every task it
    /// shifted; all succeed or none do.
    UpdateTaskPositions {
        /// The moved task.
        moved: PositionUpdate,
        /// Tasks whose order changed within their own column.
        reorders: Vec<TaskReorder>,
    },
    /// Append an activity log entry.
    InsertAuditRecord(AuditRecord),
}

/// A request frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreRequest {
    /// Client-chosen id echoed in the response.
    pub request_id: u64,
    /// The operation to perform.
    pub op: StoreOp,
}

/// Result of a store operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoreReply {
    /// A board snapshot, answering [`StoreOp::FetchBoard`].
    Board(Board),
    /// The write was applied.
    Done,
    /// The store refused the operation (unknown row, constraint violation).
    Rejected {
        /// Human-readable reason.
        reason: String,
    },
    /// The store could not process the request right now.
    Failed {
        /// Human-readable reason.
        reason: String,
    },
}

/// A response frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreResponse {
    /// Id of the request being answered.
    pub request_id: u64,
    /// The outcome.
    pub reply: StoreReply,
}

/// Encodes a [`StoreRequest`] into bytes using postcard.
///
/// # Errors
///
/// Returns `CodecError::Serialization` if the request cannot be serialized.
pub fn encode_request(request: &StoreRequest) -> Result<Vec<u8>, CodecError> {
    postcard::to_allocvec(request).map_err(|e| CodecError::Serialization(e.to_string()))
}

/// Decodes a [`StoreRequest`] from bytes using postcard.
///
/// # Errors
///
/// Returns `CodecError::Serialization` if the bytes cannot be deserialized.
pub fn decode_request(bytes: &[u8]) -> Result<StoreRequest, CodecError> {
    postcard::from_bytes(bytes).map_err(|e| CodecError::Serialization(e.to_string()))
}

/// Encodes a [`StoreResponse`] into bytes using postcard.
///
/// # Errors
///
/// Returns `CodecError::Serialization` if the response cannot be serialized.
pub fn encode_response(response: &StoreResponse) -> Result<Vec<u8>, CodecError> {
    postcard::to_allocvec(response).map_err(|e| CodecError::Serialization(e.to_string()))
}

/// Decodes a [`StoreResponse`] from bytes using postcard.
///
/// # Errors
///
/// Returns `CodecError::Serialization` if the bytes cannot be deserialized.
pub fn decode_response(bytes: &[u8]) -> Result<StoreResponse, CodecError> {
    postcard::from_bytes(bytes).map_err(|e| CodecError::Serialization(e.to_string()))
}
