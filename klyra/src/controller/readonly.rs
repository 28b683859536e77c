//! Read-only board view for shareable client links.
//!
//! Uses the same model as [`BoardController`](super::BoardController) but has
//! no move operation and never writes to the store.

use klyra_proto::board::{Board, BoardError, Column, ColumnId, Task, TaskId, TaskLocation};
use klyra_proto::store::BoardLocator;

use crate::store::BoardStore;

use super::ControllerError;

/// A validated board snapshot that can only be queried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadOnlyBoard {
    board: Board,
}

impl ReadOnlyBoard {
    /// Fetch and validate a board.
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::Load`] if the fetch fails, or
    /// [`ControllerError::InvalidSnapshot`] if the snapshot is malformed.
    pub async fn load<S: BoardStore>(
        store: &S,
        locator: &BoardLocator,
    ) -> Result<Self, ControllerError> {
        let board = store.fetch_board(locator).await?;
        Ok(Self::from_snapshot(board)?)
    }

    /// Wrap an already-fetched snapshot.
    ///
    /// # Errors
    ///
    /// Returns the first invariant the snapshot breaks.
    pub fn from_snapshot(board: Board) -> Result<Self, BoardError> {
        board.validate()?;
        Ok(Self { board })
    }

    /// The snapshot.
    #[must_use]
    pub const fn board(&self) -> &Board {
        &self.board
    }

    /// Looks up a column by id.
    #[must_use]
    pub fn find_column(&self, column_id: &ColumnId) -> Option<&Column> {
        self.board.find_column(column_id)
    }

    /// Finds where a task sits.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::TaskNotFound`] if no column holds the task.
    pub fn find_task_location(&self, task_id: &TaskId) -> Result<TaskLocation, BoardError> {
        self.board.find_task_location(task_id)
    }

    /// Tasks whose title or description contains `term`.
    #[must_use]
    pub fn search(&self, term: &str) -> Vec<&Task> {
        self.board.search(term)
    }
}
