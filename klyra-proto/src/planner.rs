//! Move planner: validates a drag gesture and computes its effect.
//!
//! [`plan`] never touches its input board. A successful move yields a fresh
//! [`Board`] together with a [`MoveDiff`] describing exactly which tasks
//! changed column or position, which is all the persistence layer needs.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::board::{Board, ColumnId, TaskId};
use crate::list;

/// A single drag gesture, expressed against the board it was computed on.
///
/// Both indices are positions *before* the move is applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveRequest {
    /// The task being dragged.
    pub task_id: TaskId,
    /// Column the task is dragged out of.
    pub source_column_id: ColumnId,
    /// Position of the task in the source column.
    pub source_index: usize,
    /// Column the task is dropped into.
    pub dest_column_id: ColumnId,
    /// Drop position in the destination column.
    pub dest_index: usize,
}

impl MoveRequest {
    /// Creates a move request.
    pub fn new(
        task_id: impl Into<TaskId>,
        source_column_id: impl Into<ColumnId>,
        source_index: usize,
        dest_column_id: impl Into<ColumnId>,
        dest_index: usize,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            source_column_id: source_column_id.into(),
            source_index,
            dest_column_id: dest_column_id.into(),
            dest_index,
        }
    }

    /// Returns `true` if the task is dropped back into its own column.
    #[must_use]
    pub fn is_same_column(&self) -> bool {
        self.source_column_id == self.dest_column_id
    }

    /// Builds the request that undoes this move, given the diff it produced.
    #[must_use]
    pub fn inverse(&self, diff: &MoveDiff) -> Self {
        Self {
            task_id: self.task_id.clone(),
            source_column_id: diff.to_column_id.clone(),
            source_index: diff.new_order as usize,
            dest_column_id: diff.from_column_id.clone(),
            dest_index: self.source_index,
        }
    }
}

/// A task whose position changed as a side effect of a move.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskReorder {
    /// The shifted task.
    pub task_id: TaskId,
    /// Its new position within its (unchanged) column.
    pub new_order: u32,
}

/// The minimal description of what a move changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveDiff {
    /// The moved task.
    pub task_id: TaskId,
    /// Column the task left.
    pub from_column_id: ColumnId,
    /// Column the task now belongs to.
    pub to_column_id: ColumnId,
    /// Position of the moved task in `to_column_id`.
    pub new_order: u32,
    /// Every other task whose order value changed, source column first.
    pub affected_task_reorders: Vec<TaskReorder>,
}

impl MoveDiff {
    /// Returns `true` if the task changed column.
    #[must_use]
    pub fn is_cross_column(&self) -> bool {
        self.from_column_id != self.to_column_id
    }
}

/// Errors that reject a move request before anything is applied.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MoveError {
    /// The source or destination column does not exist.
    #[error("column not found: {0}")]
    ColumnNotFound(ColumnId),

    /// The task is not on the board.
    #[error("task not found: {0}")]
    TaskNotFound(TaskId),

    /// The task is no longer at the position the gesture was computed against.
    #[error("stale move request: task {task_id} is not at index {index} of column {column_id}")]
    StaleMoveRequest {
        /// Task named by the request.
        task_id: TaskId,
        /// Claimed source column.
        column_id: ColumnId,
        /// Claimed source index.
        index: usize,
    },
}

/// Outcome of planning a move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MovePlan<'a> {
    /// The gesture does not change the board. Nothing to persist or notify.
    Unchanged(&'a Board),
    /// The gesture produces a new board.
    Moved {
        /// The board after the move.
        board: Board,
        /// What changed, for persistence.
        diff: MoveDiff,
    },
}

impl MovePlan<'_> {
    /// Returns the resulting board.
    #[must_use]
    pub fn board(&self) -> &Board {
        match self {
            Self::Unchanged(board) => *board,
            Self::Moved { board, .. } => board,
        }
    }

    /// Returns the diff, or `None` for a no-op.
    #[must_use]
    pub const fn diff(&self) -> Option<&MoveDiff> {
        match self {
            Self::Unchanged(_) => None,
            Self::Moved { diff, .. } => Some(diff),
        }
    }

    /// Returns `true` if the gesture changes nothing.
    #[must_use]
    pub const fn is_noop(&self) -> bool {
        matches!(self, Self::Unchanged(_))
    }
}

/// Plans a move against `board`.
///
/// Validation runs in order: both columns must exist, the task must sit at
/// `source_index` of the source column, and a drop onto the task's own
/// position short-circuits to [`MovePlan::Unchanged`]. A destination index
/// past the end of the column appends.
///
/// # Errors
///
/// Returns [`MoveError::ColumnNotFound`] or [`MoveError::StaleMoveRequest`].
pub fn plan<'a>(board: &'a Board, request: &MoveRequest) -> Result<MovePlan<'a>, MoveError> {
    let source_idx = board
        .column_index(&request.source_column_id)
        .ok_or_else(|| MoveError::ColumnNotFound(request.source_column_id.clone()))?;
    let dest_idx = board
        .column_index(&request.dest_column_id)
        .ok_or_else(|| MoveError::ColumnNotFound(request.dest_column_id.clone()))?;

    let source = &board.columns[source_idx];
    let stale = || MoveError::StaleMoveRequest {
        task_id: request.task_id.clone(),
        column_id: request.source_column_id.clone(),
        index: request.source_index,
    };
    match source.tasks.get(request.source_index) {
        Some(task) if task.id == request.task_id => {}
        _ => return Err(stale()),
    }

    if source_idx == dest_idx {
        // After removal the column is one shorter, so any index at or past
        // the last slot lands on the last slot.
        let landing = request.dest_index.min(source.len() - 1);
        if landing == request.source_index {
            return Ok(MovePlan::Unchanged(board));
        }
    }

    let mut next = board.clone();
    let tasks = std::mem::take(&mut next.columns[source_idx].tasks);
    let (mut task, remaining) = list::remove_at(tasks, request.source_index).map_err(|_| stale())?;

    if source_idx == dest_idx {
        let column = &mut next.columns[source_idx];
        column.tasks = list::insert_at(remaining, request.dest_index, task);
        column.restamp();
    } else {
        next.columns[source_idx].tasks = remaining;
        next.columns[source_idx].restamp();

        task.column_id = request.dest_column_id.clone();
        let dest = &mut next.columns[dest_idx];
        let tasks = std::mem::take(&mut dest.tasks);
        dest.tasks = list::insert_at(tasks, request.dest_index, task);
        dest.restamp();
    }

    let diff = diff_columns(board, &next, request, source_idx, dest_idx);
    Ok(MovePlan::Moved { board: next, diff })
}

/// Compares the touched columns of `before` and `after` task by task.
fn diff_columns(
    before: &Board,
    after: &Board,
    request: &MoveRequest,
    source_idx: usize,
    dest_idx: usize,
) -> MoveDiff {
    let touched: &[usize] = if source_idx == dest_idx {
        &[source_idx]
    } else {
        &[source_idx, dest_idx]
    };

    let old_orders: HashMap<&TaskId, u32> = touched
        .iter()
        .flat_map(|&i| before.columns[i].tasks.iter())
        .map(|t| (&t.id, t.order))
        .collect();

    let mut new_order = 0;
    let mut affected_task_reorders = Vec::new();
    for task in touched.iter().flat_map(|&i| after.columns[i].tasks.iter()) {
        if task.id == request.task_id {
            new_order = task.order;
        } else if old_orders.get(&task.id) != Some(&task.order) {
            affected_task_reorders.push(TaskReorder {
                task_id: task.id.clone(),
                new_order: task.order,
            });
        }
    }

    MoveDiff {
        task_id: request.task_id.clone(),
        from_column_id: request.source_column_id.clone(),
        to_column_id: request.dest_column_id.clone(),
        new_order,
        affected_task_reorders,
    }
}
