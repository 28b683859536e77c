//! Integration tests for moving tasks on a live board.
//!
//! Drives a [`BoardController`] against an [`InMemoryBoardStore`] and checks
//! what the user sees (board and events) against what the store ends up
//! holding.

use std::sync::Arc;
use std::time::Duration;

use klyra::controller::readonly::ReadOnlyBoard;
use klyra::controller::{BoardController, BoardEvent, ControllerError, MoveOutcome, MovePhase};
use klyra::store::StoreError;
use klyra::store::memory::InMemoryBoardStore;
use klyra::sync::{PersistError, ReorderPolicy, SyncConfig};

use klyra_proto::audit::ActionType;
use klyra_proto::board::{Board, Column, ColumnId, ProjectId, Task, TaskId};
use klyra_proto::planner::{MoveError, MoveRequest};
use klyra_proto::store::BoardLocator;

use tokio::sync::mpsc;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

type Controller = BoardController<InMemoryBoardStore>;

fn project() -> ProjectId {
    ProjectId::new("website")
}

/// "To Do" = [T1, T2, T3], "Doing" = [], "Done" = [].
fn board() -> Board {
    Board::new(
        project(),
        vec![
            Column::new("todo", "To Do").with_tasks(vec![
                Task::new("T1", "Homepage design"),
                Task::new("T2", "Logo refresh"),
                Task::new("T3", "Contact form"),
            ]),
            Column::new("doing", "Doing"),
            Column::new("done", "Done"),
        ],
    )
}

fn fast_sync() -> SyncConfig {
    SyncConfig {
        retry_delay: Duration::from_millis(5),
        ..SyncConfig::default()
    }
}

fn setup_with(
    initial: Board,
    config: SyncConfig,
) -> (Arc<InMemoryBoardStore>, Controller, mpsc::Receiver<BoardEvent>) {
    let store = Arc::new(InMemoryBoardStore::with_board(initial.clone()));
    let (controller, events) =
        BoardController::new(initial, "alice", Arc::clone(&store), config, 32).unwrap();
    (store, controller, events)
}

fn setup() -> (Arc<InMemoryBoardStore>, Controller, mpsc::Receiver<BoardEvent>) {
    setup_with(board(), fast_sync())
}

/// Task ids of one column, in display order.
fn ids(board: &Board, column: &str) -> Vec<String> {
    board
        .find_column(&ColumnId::new(column))
        .unwrap()
        .tasks
        .iter()
        .map(|t| t.id.to_string())
        .collect()
}

fn drain(events: &mut mpsc::Receiver<BoardEvent>) -> Vec<BoardEvent> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}

async fn next_event(events: &mut mpsc::Receiver<BoardEvent>) -> BoardEvent {
    tokio::time::timeout(Duration::from_secs(2), events.recv())
        .await
        .expect("timed out waiting for a board event")
        .expect("event channel closed")
}

// ---------------------------------------------------------------------------
// Reorder within a column
// ---------------------------------------------------------------------------

#[tokio::test]
async fn reorder_within_column_is_applied_and_persisted() {
    let (store, controller, mut events) = setup();

    let outcome = controller
        .move_task(&MoveRequest::new("T1", "todo", 0, "todo", 2))
        .await
        .unwrap();

    let MoveOutcome::Committed(diff) = outcome else {
        panic!("expected a committed move");
    };
    assert_eq!(diff.new_order, 2);
    assert_eq!(diff.affected_task_reorders.len(), 2);

    let live = controller.board();
    assert_eq!(ids(&live, "todo"), ["T2", "T3", "T1"]);
    let orders: Vec<u32> = live.columns[0].tasks.iter().map(|t| t.order).collect();
    assert_eq!(orders, [0, 1, 2]);
    live.validate().unwrap();

    let stored = store.board(&project()).unwrap();
    assert_eq!(ids(&stored, "todo"), ["T2", "T3", "T1"]);
    assert_eq!(store.update_calls(), 1);

    let events = drain(&mut events);
    assert!(matches!(&events[0], BoardEvent::BoardUpdated(b) if *b == live));
    assert_eq!(
        events[1],
        BoardEvent::TaskMoved {
            task_id: TaskId::new("T1"),
            column_title: "To Do".into(),
        }
    );
    assert_eq!(controller.phase(&TaskId::new("T1")), MovePhase::Idle);
}

#[tokio::test]
async fn reorder_with_all_affected_policy_writes_whole_column() {
    let (store, controller, _events) = setup_with(
        board(),
        SyncConfig {
            reorder_policy: ReorderPolicy::AllAffected,
            ..fast_sync()
        },
    );

    controller
        .move_task(&MoveRequest::new("T3", "todo", 2, "todo", 0))
        .await
        .unwrap();

    let stored = store.board(&project()).unwrap();
    assert_eq!(ids(&stored, "todo"), ["T3", "T1", "T2"]);
    assert_eq!(stored, controller.board());
}

// ---------------------------------------------------------------------------
// Move across columns
// ---------------------------------------------------------------------------

#[tokio::test]
async fn move_into_empty_column() {
    let initial = Board::new(
        project(),
        vec![
            Column::new("todo", "To Do").with_tasks(vec![Task::new("T1", "Homepage design")]),
            Column::new("doing", "Doing"),
        ],
    );
    let (store, controller, mut events) = setup_with(initial, fast_sync());

    let MoveOutcome::Committed(diff) = controller
        .move_task(&MoveRequest::new("T1", "todo", 0, "doing", 0))
        .await
        .unwrap()
    else {
        panic!("expected a committed move");
    };
    assert_eq!(diff.from_column_id, ColumnId::new("todo"));
    assert_eq!(diff.to_column_id, ColumnId::new("doing"));

    let live = controller.board();
    assert!(ids(&live, "todo").is_empty());
    let moved = live.task(&TaskId::new("T1")).unwrap();
    assert_eq!(moved.column_id, ColumnId::new("doing"));
    assert_eq!(moved.order, 0);

    assert_eq!(store.board(&project()).unwrap(), live);

    let events = drain(&mut events);
    assert!(events.contains(&BoardEvent::TaskMoved {
        task_id: TaskId::new("T1"),
        column_title: "Doing".into(),
    }));
}

#[tokio::test]
async fn drop_on_top_of_occupied_column_matches_store_with_moved_only_policy() {
    let initial = Board::new(
        project(),
        vec![
            Column::new("todo", "To Do").with_tasks(vec![
                Task::new("T1", "Homepage design"),
                Task::new("T2", "Logo refresh"),
            ]),
            Column::new("doing", "Doing").with_tasks(vec![
                Task::new("A", "Sitemap"),
                Task::new("B", "Copy review"),
            ]),
        ],
    );
    let (store, controller, _events) = setup_with(initial, fast_sync());
    assert_eq!(fast_sync().reorder_policy, ReorderPolicy::MovedOnly);

    controller
        .move_task(&MoveRequest::new("T1", "todo", 0, "doing", 0))
        .await
        .unwrap();

    let live = controller.board();
    assert_eq!(ids(&live, "doing"), ["T1", "A", "B"]);
    assert_eq!(ids(&live, "todo"), ["T2"]);
    assert_eq!(store.board(&project()).unwrap(), live);

    controller
        .move_task(&MoveRequest::new("B", "doing", 2, "doing", 1))
        .await
        .unwrap();
    assert_eq!(ids(&controller.board(), "doing"), ["T1", "B", "A"]);
    assert_eq!(store.board(&project()).unwrap(), controller.board());
}

#[tokio::test]
async fn move_task_to_finds_current_position() {
    let (store, controller, _events) = setup();

    controller
        .move_task_to(&TaskId::new("T2"), &ColumnId::new("done"), 0)
        .await
        .unwrap();
    controller
        .move_task_to(&TaskId::new("T3"), &ColumnId::new("done"), 5)
        .await
        .unwrap();

    let live = controller.board();
    assert_eq!(ids(&live, "todo"), ["T1"]);
    assert_eq!(ids(&live, "done"), ["T2", "T3"]);
    live.validate().unwrap();
    assert_eq!(store.board(&project()).unwrap(), live);
}

#[tokio::test]
async fn committed_move_is_audited() {
    let (store, controller, _events) = setup();

    controller
        .move_task(&MoveRequest::new("T2", "todo", 1, "doing", 0))
        .await
        .unwrap();
    controller.flush_audits().await;

    let log = store.audit_log();
    assert_eq!(log.len(), 1);
    let record = &log[0];
    assert_eq!(record.project_id, project());
    assert_eq!(record.task_id, TaskId::new("T2"));
    assert_eq!(record.action_type, ActionType::MoveCard);
    assert_eq!(record.details.from_column, ColumnId::new("todo"));
    assert_eq!(record.details.to_column, ColumnId::new("doing"));
    assert_eq!(record.details.new_order, 0);
    assert_eq!(record.performed_by, "alice");
}

// ---------------------------------------------------------------------------
// Rejected locally
// ---------------------------------------------------------------------------

#[tokio::test]
async fn drop_on_own_position_touches_nothing() {
    let (store, controller, mut events) = setup();

    let outcome = controller
        .move_task(&MoveRequest::new("T2", "todo", 1, "todo", 1))
        .await
        .unwrap();

    assert_eq!(outcome, MoveOutcome::Unchanged);
    assert_eq!(controller.board(), board());
    assert_eq!(store.update_calls(), 0);
    assert!(drain(&mut events).is_empty());
}

#[tokio::test]
async fn unknown_column_is_rejected_before_apply() {
    let (store, controller, mut events) = setup();

    let err = controller
        .move_task(&MoveRequest::new("T1", "todo", 0, "archive", 0))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ControllerError::Move(MoveError::ColumnNotFound(ref c)) if c.as_str() == "archive"
    ));
    assert_eq!(controller.board(), board());
    assert_eq!(store.update_calls(), 0);
    assert!(drain(&mut events).is_empty());
}

#[tokio::test]
async fn gesture_against_old_board_is_stale_after_reload() {
    let (store, controller, mut events) = setup();

    // Someone else moved T3 to Done.
    store.insert_board(Board::new(
        project(),
        vec![
            Column::new("todo", "To Do").with_tasks(vec![
                Task::new("T1", "Homepage design"),
                Task::new("T2", "Logo refresh"),
            ]),
            Column::new("doing", "Doing"),
            Column::new("done", "Done").with_tasks(vec![Task::new("T3", "Contact form")]),
        ],
    ));
    controller.reload().await.unwrap();
    assert_eq!(ids(&controller.board(), "done"), ["T3"]);
    assert!(matches!(next_event(&mut events).await, BoardEvent::BoardUpdated(_)));

    let err = controller
        .move_task(&MoveRequest::new("T3", "todo", 2, "doing", 0))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ControllerError::Move(MoveError::StaleMoveRequest { .. })
    ));
    assert_eq!(ids(&controller.board(), "done"), ["T3"]);
    assert_eq!(store.update_calls(), 0);
}

// ---------------------------------------------------------------------------
// Persistence failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unavailable_store_rolls_back_after_one_retry() {
    let (store, controller, mut events) = setup();
    store.fail_next_update(StoreError::Unavailable("connection reset".into()));
    store.fail_next_update(StoreError::Unavailable("connection reset".into()));

    let err = controller
        .move_task(&MoveRequest::new("T1", "todo", 0, "doing", 0))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ControllerError::Persist(PersistError::Unavailable(_))
    ));
    assert_eq!(store.update_calls(), 2);
    assert_eq!(controller.board(), board());
    assert_eq!(store.board(&project()).unwrap(), board());
    assert_eq!(controller.phase(&TaskId::new("T1")), MovePhase::Idle);

    controller.flush_audits().await;
    assert!(store.audit_log().is_empty());

    let events = drain(&mut events);
    let failures = events
        .iter()
        .filter(|e| matches!(e, BoardEvent::MoveFailed { .. }))
        .count();
    assert_eq!(failures, 1);
    assert!(matches!(events.last(), Some(BoardEvent::MoveFailed { .. })));
    assert!(
        events
            .iter()
            .any(|e| matches!(e, BoardEvent::BoardUpdated(b) if *b == board()))
    );
}

#[tokio::test]
async fn single_transient_failure_is_retried() {
    let (store, controller, mut events) = setup();
    store.fail_next_update(StoreError::Timeout);

    controller
        .move_task(&MoveRequest::new("T1", "todo", 0, "doing", 0))
        .await
        .unwrap();

    assert_eq!(store.update_calls(), 2);
    assert_eq!(ids(&store.board(&project()).unwrap(), "doing"), ["T1"]);
    assert!(
        !drain(&mut events)
            .iter()
            .any(|e| matches!(e, BoardEvent::MoveFailed { .. }))
    );
}

#[tokio::test]
async fn rejected_write_is_not_retried() {
    let (store, controller, mut events) = setup();
    store.fail_next_update(StoreError::Rejected("card archived".into()));

    let err = controller
        .move_task(&MoveRequest::new("T2", "todo", 1, "done", 0))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ControllerError::Persist(PersistError::Rejected(ref reason)) if reason == "card archived"
    ));
    assert_eq!(store.update_calls(), 1);
    assert_eq!(controller.board(), board());

    let failed = drain(&mut events)
        .into_iter()
        .find(|e| matches!(e, BoardEvent::MoveFailed { .. }))
        .unwrap();
    assert_eq!(failed.to_string(), "Failed to move task: rejected by store: card archived");
}

#[tokio::test]
async fn audit_failure_keeps_the_move() {
    let (store, controller, _events) = setup();
    store.fail_next_audit(StoreError::Unavailable("activity table locked".into()));

    let outcome = controller
        .move_task(&MoveRequest::new("T1", "todo", 0, "done", 0))
        .await
        .unwrap();
    controller.flush_audits().await;

    assert!(matches!(outcome, MoveOutcome::Committed(_)));
    assert_eq!(ids(&controller.board(), "done"), ["T1"]);
    assert_eq!(ids(&store.board(&project()).unwrap(), "done"), ["T1"]);
    assert_eq!(store.audit_calls(), 1);
    assert!(store.audit_log().is_empty());
}

// ---------------------------------------------------------------------------
// Moves in flight
// ---------------------------------------------------------------------------

#[tokio::test]
async fn second_move_of_same_task_waits_for_first() {
    let (store, controller, mut events) = setup();
    let controller = Arc::new(controller);
    store.pause_updates();

    let first = tokio::spawn({
        let controller = Arc::clone(&controller);
        async move {
            controller
                .move_task(&MoveRequest::new("T1", "todo", 0, "doing", 0))
                .await
        }
    });

    // Applied before the store answers.
    assert!(matches!(next_event(&mut events).await, BoardEvent::BoardUpdated(_)));
    assert_eq!(ids(&controller.board(), "doing"), ["T1"]);
    assert_eq!(controller.phase(&TaskId::new("T1")), MovePhase::Moving);

    let err = controller
        .move_task(&MoveRequest::new("T1", "doing", 0, "done", 0))
        .await
        .unwrap_err();
    assert!(matches!(err, ControllerError::MoveInProgress(ref id) if id.as_str() == "T1"));

    store.resume_updates();
    let outcome = first.await.unwrap().unwrap();
    assert!(matches!(outcome, MoveOutcome::Committed(_)));
    assert_eq!(controller.phase(&TaskId::new("T1")), MovePhase::Idle);
    assert_eq!(store.update_calls(), 1);
}

#[tokio::test]
async fn cancelled_move_is_rolled_back() {
    let (store, controller, mut events) = setup();
    store.pause_updates();

    let cancelled = tokio::time::timeout(
        Duration::from_millis(50),
        controller.move_task(&MoveRequest::new("T1", "todo", 0, "doing", 0)),
    )
    .await;
    assert!(cancelled.is_err());

    assert_eq!(controller.phase(&TaskId::new("T1")), MovePhase::Idle);
    assert_eq!(controller.board(), board());
    let failures = drain(&mut events)
        .into_iter()
        .filter(|e| matches!(e, BoardEvent::MoveFailed { .. }))
        .count();
    assert_eq!(failures, 1);

    store.resume_updates();
    tokio::task::yield_now().await;
    assert_eq!(store.update_calls(), 0);
    assert_eq!(store.board(&project()).unwrap(), board());

    let outcome = controller
        .move_task(&MoveRequest::new("T1", "todo", 0, "doing", 0))
        .await
        .unwrap();
    assert!(matches!(outcome, MoveOutcome::Committed(_)));
    assert_eq!(store.board(&project()).unwrap(), controller.board());
}

#[tokio::test]
async fn moves_of_different_tasks_run_concurrently() {
    let (store, controller, mut events) = setup();
    let controller = Arc::new(controller);
    store.pause_updates();

    let first = tokio::spawn({
        let controller = Arc::clone(&controller);
        async move {
            controller
                .move_task_to(&TaskId::new("T1"), &ColumnId::new("doing"), 0)
                .await
        }
    });
    assert!(matches!(next_event(&mut events).await, BoardEvent::BoardUpdated(_)));

    let second = tokio::spawn({
        let controller = Arc::clone(&controller);
        async move {
            controller
                .move_task_to(&TaskId::new("T3"), &ColumnId::new("doing"), 1)
                .await
        }
    });
    assert!(matches!(next_event(&mut events).await, BoardEvent::BoardUpdated(_)));
    assert_eq!(controller.phase(&TaskId::new("T1")), MovePhase::Moving);
    assert_eq!(controller.phase(&TaskId::new("T3")), MovePhase::Moving);

    store.resume_updates();
    first.await.unwrap().unwrap();
    second.await.unwrap().unwrap();

    let live = controller.board();
    assert_eq!(ids(&live, "todo"), ["T2"]);
    assert_eq!(ids(&live, "doing"), ["T1", "T3"]);
    live.validate().unwrap();
    assert_eq!(store.board(&project()).unwrap(), live);
}

#[tokio::test]
async fn failed_move_after_reload_keeps_reloaded_board() {
    let (store, controller, mut events) = setup();
    let controller = Arc::new(controller);
    store.fail_next_update(StoreError::Rejected("column locked".into()));
    store.pause_updates();

    let moving = tokio::spawn({
        let controller = Arc::clone(&controller);
        async move {
            controller
                .move_task(&MoveRequest::new("T1", "todo", 0, "doing", 0))
                .await
        }
    });
    assert!(matches!(next_event(&mut events).await, BoardEvent::BoardUpdated(_)));

    // The store has not seen the move yet, so the reload puts T1 back.
    controller.reload().await.unwrap();
    assert_eq!(controller.board(), board());

    store.resume_updates();
    let err = moving.await.unwrap().unwrap_err();
    assert!(matches!(
        err,
        ControllerError::Persist(PersistError::Rejected(_))
    ));
    assert_eq!(controller.board(), board());
    controller.board().validate().unwrap();
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

#[tokio::test]
async fn controller_loads_from_store() {
    let store = Arc::new(InMemoryBoardStore::with_board(board()));

    let (controller, _events) = BoardController::load(
        Arc::clone(&store),
        &BoardLocator::Project(project()),
        "bob",
        fast_sync(),
        8,
    )
    .await
    .unwrap();

    assert_eq!(controller.project_id(), &project());
    assert_eq!(controller.board(), board());
    assert_eq!(store.fetch_calls(), 1);
}

#[tokio::test]
async fn load_failure_is_reported() {
    let store = Arc::new(InMemoryBoardStore::with_board(board()));
    store.fail_next_fetch(StoreError::ConnectionClosed);

    let result = BoardController::load(
        Arc::clone(&store),
        &BoardLocator::Project(project()),
        "bob",
        fast_sync(),
        8,
    )
    .await;

    assert!(matches!(
        result,
        Err(ControllerError::Load(StoreError::ConnectionClosed))
    ));
}

#[tokio::test]
async fn client_view_through_access_link() {
    let store = InMemoryBoardStore::with_board(board());
    store.add_access_link("c0ffee", project());

    let view = ReadOnlyBoard::load(&store, &BoardLocator::AccessLink("c0ffee".into()))
        .await
        .unwrap();

    assert_eq!(view.board(), &board());
    let hits: Vec<&str> = view.search("LOGO").iter().map(|t| t.id.as_str()).collect();
    assert_eq!(hits, ["T2"]);
}
