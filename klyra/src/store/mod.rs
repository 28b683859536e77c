//! Board store abstraction for Klyra.
//!
//! Defines the [`BoardStore`] trait: the snapshot loader and remote mutation
//! sink the engine talks to. Concrete implementations include:
//! - [`memory::InMemoryBoardStore`] — in-process store for testing, with
//!   scripted failures and a pause gate
//! - [`remote::WsBoardStore`] — WebSocket client for a `klyra-store` server

pub mod memory;
pub mod remote;

use klyra_proto::audit::AuditRecord;
use klyra_proto::board::Board;
use klyra_proto::planner::TaskReorder;
use klyra_proto::store::{BoardLocator, PositionUpdate};

/// Errors that can occur while talking to a board store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The store could not be reached or failed to process the request.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The request did not complete in time.
    #[error("store request timed out")]
    Timeout,

    /// The connection to the store has been closed.
    #[error("connection closed")]
    ConnectionClosed,

    /// The store refused the operation (missing row, constraint violation).
    #[error("rejected by store: {0}")]
    Rejected(String),

    /// The store answered with something the request did not ask for.
    #[error("unexpected store reply: {0}")]
    Protocol(String),

    /// The store address is malformed.
    #[error("invalid store url: {0}")]
    InvalidUrl(String),
}

impl StoreError {
    /// Returns `true` for failures worth retrying.
    ///
    /// Only an explicit rejection or a bad address is permanent; everything
    /// else is a transport problem.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        !matches!(self, Self::Rejected(_) | Self::InvalidUrl(_))
    }
}

/// Async access to durable board state.
///
/// Implementations never hold a board on behalf of the caller: each call is
/// a self-contained read or write.
pub trait BoardStore: Send + Sync {
    /// Load a board snapshot, columns and tasks ordered by their `order`.
    fn fetch_board(
        &self,
        locator: &BoardLocator,
    ) -> impl std::future::Future<Output = Result<Board, StoreError>> + Send;

    /// Write one task's column and order.
    fn update_task_position(
        &self,
        update: &PositionUpdate,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;

    /// Write a moved task and the orders it shifted, all or nothing.
    fn update_task_positions(
        &self,
        moved: &PositionUpdate,
        reorders: &[TaskReorder],
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;

    /// Append an activity log entry.
    fn insert_audit_record(
        &self,
        record: &AuditRecord,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;
}
