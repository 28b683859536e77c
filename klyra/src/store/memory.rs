//! In-process board store for testing.
//!
//! [`InMemoryBoardStore`] keeps boards as plain rows in memory and applies
//! writes the same way the `klyra-store` server does: a position write
//! slots the row in at index `order` of its column and renumbers every
//! column it touched, and a fetch sorts by order before numbering
//! positions densely.
//!
//! Tests can script failures per operation and hold position writes behind
//! a gate to observe a move while it is in flight.

use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;
use tokio::sync::watch;

use klyra_proto::audit::AuditRecord;
use klyra_proto::board::{Board, ColumnId, ProjectId, TaskId};
use klyra_proto::list;
use klyra_proto::planner::TaskReorder;
use klyra_proto::store::{BoardLocator, PositionUpdate};

use super::{BoardStore, StoreError};

#[derive(Default)]
struct State {
    boards: HashMap<ProjectId, Board>,
    access_links: HashMap<String, ProjectId>,
    audit_log: Vec<AuditRecord>,
    fetch_failures: VecDeque<StoreError>,
    update_failures: VecDeque<StoreError>,
    audit_failures: VecDeque<StoreError>,
    fetch_calls: usize,
    update_calls: usize,
    audit_calls: usize,
}

/// In-memory implementation of [`BoardStore`] for testing.
///
/// Not persistent: all data is lost when the store is dropped.
pub struct InMemoryBoardStore {
    state: Mutex<State>,
    /// `true` while position writes may proceed.
    gate: watch::Sender<bool>,
}

impl InMemoryBoardStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        let (gate, _) = watch::channel(true);
        Self {
            state: Mutex::new(State::default()),
            gate,
        }
    }

    /// Create a store holding one board.
    #[must_use]
    pub fn with_board(board: Board) -> Self {
        let store = Self::new();
        store.insert_board(board);
        store
    }

    /// Add or replace a board, keyed by its project id.
    pub fn insert_board(&self, board: Board) {
        self.state
            .lock()
            .boards
            .insert(board.project_id.clone(), board);
    }

    /// Register a shareable access link for a project.
    pub fn add_access_link(&self, link: impl Into<String>, project_id: ProjectId) {
        self.state.lock().access_links.insert(link.into(), project_id);
    }

    /// Make the next fetch fail with `err`. Failures queue up in call order.
    pub fn fail_next_fetch(&self, err: StoreError) {
        self.state.lock().fetch_failures.push_back(err);
    }

    /// Make the next position write fail with `err`.
    pub fn fail_next_update(&self, err: StoreError) {
        self.state.lock().update_failures.push_back(err);
    }

    /// Make the next audit insert fail with `err`.
    pub fn fail_next_audit(&self, err: StoreError) {
        self.state.lock().audit_failures.push_back(err);
    }

    /// Hold every position write until [`resume_updates`](Self::resume_updates).
    pub fn pause_updates(&self) {
        self.gate.send_replace(false);
    }

    /// Release held position writes.
    pub fn resume_updates(&self) {
        self.gate.send_replace(true);
    }

    /// The board as a fresh fetch would return it.
    #[must_use]
    pub fn board(&self, project_id: &ProjectId) -> Option<Board> {
        self.state.lock().boards.get(project_id).map(normalized)
    }

    /// Every audit record written so far, in insertion order.
    #[must_use]
    pub fn audit_log(&self) -> Vec<AuditRecord> {
        self.state.lock().audit_log.clone()
    }

    /// Number of fetches attempted, including failed ones.
    #[must_use]
    pub fn fetch_calls(&self) -> usize {
        self.state.lock().fetch_calls
    }

    /// Number of position writes attempted, including failed ones.
    #[must_use]
    pub fn update_calls(&self) -> usize {
        self.state.lock().update_calls
    }

    /// Number of audit inserts attempted, including failed ones.
    #[must_use]
    pub fn audit_calls(&self) -> usize {
        self.state.lock().audit_calls
    }

    async fn wait_for_gate(&self) -> Result<(), StoreError> {
        let mut open = self.gate.subscribe();
        if open.wait_for(|open| *open).await.is_err() {
            return Err(StoreError::ConnectionClosed);
        }
        Ok(())
    }
}

impl Default for InMemoryBoardStore {
    fn default() -> Self {
        Self::new()
    }
}

impl BoardStore for InMemoryBoardStore {
    async fn fetch_board(&self, locator: &BoardLocator) -> Result<Board, StoreError> {
        let mut state = self.state.lock();
        state.fetch_calls += 1;
        if let Some(err) = state.fetch_failures.pop_front() {
            return Err(err);
        }
        let project_id = match locator {
            BoardLocator::Project(id) => id.clone(),
            BoardLocator::AccessLink(link) => state
                .access_links
                .get(link)
                .cloned()
                .ok_or_else(|| StoreError::Rejected(format!("unknown access link {link}")))?,
        };
        state
            .boards
            .get(&project_id)
            .map(normalized)
            .ok_or_else(|| StoreError::Rejected(format!("project not found: {project_id}")))
    }

    async fn update_task_position(&self, update: &PositionUpdate) -> Result<(), StoreError> {
        self.wait_for_gate().await?;
        let mut state = self.state.lock();
        state.update_calls += 1;
        if let Some(err) = state.update_failures.pop_front() {
            return Err(err);
        }
        let board = locate_task(&mut state.boards, &update.task_id)?;
        check_column(board, &update.column_id)?;
        place(board, update);
        Ok(())
    }

    async fn update_task_positions(
        &self,
        moved: &PositionUpdate,
        reorders: &[TaskReorder],
    ) -> Result<(), StoreError> {
        self.wait_for_gate().await?;
        let mut state = self.state.lock();
        state.update_calls += 1;
        if let Some(err) = state.update_failures.pop_front() {
            return Err(err);
        }
        let board = locate_task(&mut state.boards, &moved.task_id)?;
        check_column(board, &moved.column_id)?;
        for reorder in reorders {
            if board.find_task_location(&reorder.task_id).is_err() {
                return Err(StoreError::Rejected(format!(
                    "card not found: {}",
                    reorder.task_id
                )));
            }
        }

        place(board, moved);
        for reorder in reorders {
            for column in &mut board.columns {
                if let Some(task) = column.tasks.iter_mut().find(|t| t.id == reorder.task_id) {
                    task.order = reorder.new_order;
                }
            }
        }
        Ok(())
    }

    async fn insert_audit_record(&self, record: &AuditRecord) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        state.audit_calls += 1;
        if let Some(err) = state.audit_failures.pop_front() {
            return Err(err);
        }
        if !state.boards.contains_key(&record.project_id) {
            return Err(StoreError::Rejected(format!(
                "project not found: {}",
                record.project_id
            )));
        }
        state.audit_log.push(record.clone());
        Ok(())
    }
}

fn locate_task<'a>(
    boards: &'a mut HashMap<ProjectId, Board>,
    task_id: &TaskId,
) -> Result<&'a mut Board, StoreError> {
    boards
        .values_mut()
        .find(|b| b.task(task_id).is_some())
        .ok_or_else(|| StoreError::Rejected(format!("card not found: {task_id}")))
}

fn check_column(board: &Board, column_id: &ColumnId) -> Result<(), StoreError> {
    if board.find_column(column_id).is_none() {
        return Err(StoreError::Rejected(format!(
            "column not found in project {}: {column_id}",
            board.project_id
        )));
    }
    Ok(())
}

/// Slots the row in at index `order` of its destination column, then
/// renumbers the column it left and the column it joined.
fn place(board: &mut Board, update: &PositionUpdate) {
    let mut row = None;
    for column in &mut board.columns {
        if let Some(pos) = column.position_of(&update.task_id) {
            row = Some(column.tasks.remove(pos));
            column.tasks.sort_by_key(|t| t.order);
            list::resequence(&mut column.tasks);
            break;
        }
    }
    let Some(mut task) = row else { return };
    task.column_id = update.column_id.clone();
    if let Some(column) = board.columns.iter_mut().find(|c| c.id == update.column_id) {
        let mut tasks = std::mem::take(&mut column.tasks);
        tasks.sort_by_key(|t| t.order);
        column.tasks = list::insert_at(tasks, update.order as usize, task);
        list::resequence(&mut column.tasks);
    }
}

fn normalized(board: &Board) -> Board {
    let mut board = board.clone();
    board.columns.sort_by_key(|c| c.order);
    list::resequence(&mut board.columns);
    for column in &mut board.columns {
        column.tasks.sort_by_key(|t| t.order);
        list::resequence(&mut column.tasks);
    }
    board
}
