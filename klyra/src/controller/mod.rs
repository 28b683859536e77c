//! Board controller: the single owner of a live board.
//!
//! Each move runs `Idle -> Moving -> Idle`. Entering `Moving` applies the
//! planned board and notifies observers before the store is written; the
//! awaited commit is the only suspension point and no lock is held across
//! it. A failed commit rolls the board back inside one lock acquisition, so
//! the task goes straight from `Moving` to `Idle`. Dropping a
//! [`BoardController::move_task`] future before the store answers rolls the
//! move back the same way. At most one move per task is in flight; moves of
//! other tasks proceed concurrently.
//!
//! Observers receive [`BoardEvent`]s through the channel returned by
//! [`BoardController::new`].

pub mod readonly;

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use klyra_proto::board::{Board, BoardError, ColumnId, ProjectId, TaskId};
use klyra_proto::planner::{self, MoveDiff, MoveError, MovePlan, MoveRequest};
use klyra_proto::store::BoardLocator;

use crate::store::{BoardStore, StoreError};
use crate::sync::{PersistError, PersistenceSynchronizer, SyncConfig};

/// Errors surfaced by [`BoardController`] operations.
#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    /// The move was rejected locally; nothing changed.
    #[error(transparent)]
    Move(#[from] MoveError),

    /// Another move of the same task has not resolved yet.
    #[error("task {0} is already being moved")]
    MoveInProgress(TaskId),

    /// The store did not accept the move; the board was rolled back.
    #[error("move not saved: {0}")]
    Persist(#[from] PersistError),

    /// A loaded snapshot breaks the board invariants.
    #[error("invalid board snapshot: {0}")]
    InvalidSnapshot(#[from] BoardError),

    /// The snapshot could not be fetched.
    #[error("failed to load board: {0}")]
    Load(#[from] StoreError),
}

/// Lifecycle phase of one task's move.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MovePhase {
    /// No move of the task is in flight.
    #[default]
    Idle,
    /// The move is applied locally and waiting on the store.
    Moving,
}

/// Notifications for whoever renders the board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoardEvent {
    /// The live board changed (optimistic apply, rollback, or reload).
    BoardUpdated(Board),
    /// A move was persisted.
    TaskMoved {
        /// The moved task.
        task_id: TaskId,
        /// Title of the column it landed in.
        column_title: String,
    },
    /// A move could not be persisted and was undone.
    MoveFailed {
        /// The task whose move failed.
        task_id: TaskId,
        /// Why the store did not take it.
        error: PersistError,
    },
}

impl std::fmt::Display for BoardEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BoardUpdated(board) => write!(f, "Board {} updated", board.project_id),
            Self::TaskMoved { column_title, .. } => write!(f, "Task moved to {column_title}"),
            Self::MoveFailed { error, .. } => write!(f, "Failed to move task: {error}"),
        }
    }
}

/// Result of a successful [`BoardController::move_task`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveOutcome {
    /// The drop left the board as it was; nothing was written.
    Unchanged,
    /// The move was applied and persisted.
    Committed(MoveDiff),
}

struct ControllerState {
    board: Board,
    /// Bumped on every change of `board`.
    revision: u64,
    in_flight: HashMap<TaskId, MovePhase>,
}

/// Owns a project's live board and drives moves through the store.
pub struct BoardController<S> {
    project_id: ProjectId,
    actor: String,
    store: Arc<S>,
    sync: PersistenceSynchronizer<S>,
    state: Mutex<ControllerState>,
    event_tx: mpsc::Sender<BoardEvent>,
}

impl<S: BoardStore + 'static> BoardController<S> {
    /// Create a controller for an already-loaded board.
    ///
    /// Returns the controller and the receiver for its [`BoardEvent`]s.
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::InvalidSnapshot`] if `board` breaks the
    /// dense-order or column-ownership invariants.
    pub fn new(
        board: Board,
        actor: impl Into<String>,
        store: Arc<S>,
        config: SyncConfig,
        event_buffer: usize,
    ) -> Result<(Self, mpsc::Receiver<BoardEvent>), ControllerError> {
        board.validate()?;
        let (event_tx, event_rx) = mpsc::channel(event_buffer.max(1));
        let controller = Self {
            project_id: board.project_id.clone(),
            actor: actor.into(),
            sync: PersistenceSynchronizer::new(Arc::clone(&store), config),
            store,
            state: Mutex::new(ControllerState {
                board,
                revision: 0,
                in_flight: HashMap::new(),
            }),
            event_tx,
        };
        Ok((controller, event_rx))
    }

    /// Fetch a board from `store` and create a controller for it.
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::Load`] if the fetch fails, or
    /// [`ControllerError::InvalidSnapshot`] if the snapshot is malformed.
    pub async fn load(
        store: Arc<S>,
        locator: &BoardLocator,
        actor: impl Into<String>,
        config: SyncConfig,
        event_buffer: usize,
    ) -> Result<(Self, mpsc::Receiver<BoardEvent>), ControllerError> {
        let board = store.fetch_board(locator).await?;
        tracing::info!(
            locator = %locator,
            columns = board.columns.len(),
            tasks = board.task_count(),
            "board loaded"
        );
        Self::new(board, actor, store, config, event_buffer)
    }

    /// The project this controller owns.
    #[must_use]
    pub const fn project_id(&self) -> &ProjectId {
        &self.project_id
    }

    /// A copy of the live board.
    #[must_use]
    pub fn board(&self) -> Board {
        self.state.lock().board.clone()
    }

    /// Current move phase of a task.
    #[must_use]
    pub fn phase(&self, task_id: &TaskId) -> MovePhase {
        self.state
            .lock()
            .in_flight
            .get(task_id)
            .copied()
            .unwrap_or_default()
    }

    /// Wait for the audit records of committed moves to be written.
    pub async fn flush_audits(&self) {
        self.sync.flush_audits().await;
    }

    /// Apply a move optimistically and persist it.
    ///
    /// The planned board is visible through [`board`](Self::board) and a
    /// [`BoardEvent::BoardUpdated`] before the store answers. A no-op drop
    /// returns [`MoveOutcome::Unchanged`] without touching the store.
    ///
    /// # Errors
    ///
    /// - [`ControllerError::Move`] or [`ControllerError::MoveInProgress`]:
    ///   rejected locally, nothing changed.
    /// - [`ControllerError::Persist`]: the store failed; the board has been
    ///   rolled back and a [`BoardEvent::MoveFailed`] emitted.
    pub async fn move_task(&self, request: &MoveRequest) -> Result<MoveOutcome, ControllerError> {
        let (snapshot, diff, applied_revision) = {
            let mut state = self.state.lock();
            if state.in_flight.contains_key(&request.task_id) {
                return Err(ControllerError::MoveInProgress(request.task_id.clone()));
            }
            let planned = planner::plan(&state.board, request)?;
            let MovePlan::Moved { board, diff } = planned else {
                tracing::debug!(task_id = %request.task_id, "drop onto own position, nothing to do");
                return Ok(MoveOutcome::Unchanged);
            };

            let snapshot = std::mem::replace(&mut state.board, board);
            state.revision += 1;
            state
                .in_flight
                .insert(request.task_id.clone(), MovePhase::Moving);
            self.notify(BoardEvent::BoardUpdated(state.board.clone()));
            (snapshot, diff, state.revision)
        };

        tracing::debug!(
            task_id = %diff.task_id,
            from = %diff.from_column_id,
            to = %diff.to_column_id,
            new_order = diff.new_order,
            "move applied, committing"
        );

        let pending = PendingMove {
            controller: self,
            request,
            diff: &diff,
            snapshot: Some(snapshot),
            applied_revision,
        };
        let result = self.sync.commit(&diff, &self.project_id, &self.actor).await;
        let snapshot = pending.settle();

        match result {
            Ok(()) => {
                let column_title = {
                    let mut state = self.state.lock();
                    state.in_flight.remove(&diff.task_id);
                    column_title(&state.board, &diff.to_column_id)
                };
                self.notify(BoardEvent::TaskMoved {
                    task_id: diff.task_id.clone(),
                    column_title,
                });
                Ok(MoveOutcome::Committed(diff))
            }
            Err(err) => {
                if let Some(snapshot) = snapshot {
                    self.roll_back(request, &diff, snapshot, applied_revision, &err);
                }
                Err(err.into())
            }
        }
    }

    /// Move a task wherever it currently is to `dest_index` of `dest_column_id`.
    ///
    /// # Errors
    ///
    /// Returns [`MoveError::TaskNotFound`] if the task is not on the board,
    /// otherwise the same errors as [`move_task`](Self::move_task).
    pub async fn move_task_to(
        &self,
        task_id: &TaskId,
        dest_column_id: &ColumnId,
        dest_index: usize,
    ) -> Result<MoveOutcome, ControllerError> {
        let location = self
            .state
            .lock()
            .board
            .find_task_location(task_id)
            .map_err(|_| MoveError::TaskNotFound(task_id.clone()))?;
        let request = MoveRequest {
            task_id: task_id.clone(),
            source_column_id: location.column_id,
            source_index: location.index,
            dest_column_id: dest_column_id.clone(),
            dest_index,
        };
        self.move_task(&request).await
    }

    /// Replace the live board with a fresh snapshot from the store.
    ///
    /// Moves still in flight keep running; later gestures against the old
    /// positions are caught by the planner's stale check.
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::Load`] or [`ControllerError::InvalidSnapshot`];
    /// the live board is left unchanged in both cases.
    pub async fn reload(&self) -> Result<(), ControllerError> {
        let board = self
            .store
            .fetch_board(&BoardLocator::Project(self.project_id.clone()))
            .await?;
        board.validate()?;

        let mut state = self.state.lock();
        state.board = board;
        state.revision += 1;
        tracing::info!(project_id = %self.project_id, "board reloaded");
        self.notify(BoardEvent::BoardUpdated(state.board.clone()));
        Ok(())
    }

    /// Undo a failed move.
    ///
    /// If nothing else touched the board since the move was applied, the
    /// pre-move snapshot is restored. Otherwise the task alone is moved back
    /// to its original column and index on the live board; if that is not
    /// possible the live board stays as it is.
    fn roll_back(
        &self,
        request: &MoveRequest,
        diff: &MoveDiff,
        snapshot: Board,
        applied_revision: u64,
        err: &PersistError,
    ) {
        let mut state = self.state.lock();
        if state.revision == applied_revision {
            state.board = snapshot;
            state.revision += 1;
        } else {
            match undo_on_live_board(&state.board, request, diff) {
                Some(board) => {
                    state.board = board;
                    state.revision += 1;
                }
                None => tracing::warn!(
                    task_id = %request.task_id,
                    "cannot move task back on the changed board, leaving it in place"
                ),
            }
        }

        state.in_flight.remove(&request.task_id);
        tracing::warn!(task_id = %request.task_id, error = %err, "move rolled back");
        self.notify(BoardEvent::BoardUpdated(state.board.clone()));
        self.notify(BoardEvent::MoveFailed {
            task_id: request.task_id.clone(),
            error: err.clone(),
        });
    }

    fn notify(&self, event: BoardEvent) {
        if let Err(e) = self.event_tx.try_send(event) {
            tracing::debug!(error = %e, "board event dropped");
        }
    }
}

/// An applied move waiting on the store.
///
/// Dropped without [`settle`](Self::settle), as happens when the
/// `move_task` future is cancelled, it rolls the move back.
struct PendingMove<'a, S: BoardStore + 'static> {
    controller: &'a BoardController<S>,
    request: &'a MoveRequest,
    diff: &'a MoveDiff,
    snapshot: Option<Board>,
    applied_revision: u64,
}

impl<S: BoardStore + 'static> PendingMove<'_, S> {
    /// The commit resolved; hand back the pre-move snapshot.
    fn settle(mut self) -> Option<Board> {
        self.snapshot.take()
    }
}

impl<S: BoardStore + 'static> Drop for PendingMove<'_, S> {
    fn drop(&mut self) {
        let Some(snapshot) = self.snapshot.take() else {
            return;
        };
        tracing::warn!(
            task_id = %self.request.task_id,
            "move cancelled before the store answered"
        );
        self.controller.roll_back(
            self.request,
            self.diff,
            snapshot,
            self.applied_revision,
            &PersistError::Unavailable("move cancelled".into()),
        );
    }
}

/// Plans the move of `request.task_id` back to where `request` took it from,
/// starting at wherever the task sits on `live` now.
fn undo_on_live_board(live: &Board, request: &MoveRequest, diff: &MoveDiff) -> Option<Board> {
    let location = live.find_task_location(&request.task_id).ok()?;
    let undo = MoveRequest {
        task_id: request.task_id.clone(),
        source_column_id: location.column_id,
        source_index: location.index,
        dest_column_id: diff.from_column_id.clone(),
        dest_index: request.source_index,
    };
    match planner::plan(live, &undo).ok()? {
        MovePlan::Unchanged(_) => None,
        MovePlan::Moved { board, .. } => Some(board),
    }
}

fn column_title(board: &Board, column_id: &ColumnId) -> String {
    board
        .find_column(column_id)
        .map_or_else(|| column_id.to_string(), |c| c.title.clone())
}
