//! Property-based tests for the move planner.
//!
//! Uses proptest to verify:
//! 1. Any sequence of valid moves keeps every column dense and every task in
//!    the column it claims.
//! 2. A move followed by its inverse restores the original board.
//! 3. A destination index past the end behaves exactly like appending.
//! 4. A request naming the wrong task at the source index is always stale.

use proptest::prelude::*;

use klyra_proto::board::{Board, Column, Task};
use klyra_proto::planner::{MoveError, MovePlan, MoveRequest, plan};

/// Strategy for boards of 1..5 columns holding 0..6 tasks each.
fn arb_board() -> impl Strategy<Value = Board> {
    prop::collection::vec(0usize..6, 1..5).prop_map(|sizes| {
        let mut next_task = 0;
        let columns = sizes
            .iter()
            .enumerate()
            .map(|(c, &size)| {
                let tasks = (0..size)
                    .map(|_| {
                        next_task += 1;
                        Task::new(format!("T{next_task}"), format!("task {next_task}"))
                    })
                    .collect();
                Column::new(format!("col{c}"), format!("Column {c}")).with_tasks(tasks)
            })
            .collect();
        Board::new("proj", columns)
    })
}

/// Raw gesture coordinates; resolved against a concrete board by [`gesture`].
#[derive(Debug, Clone)]
struct Gesture {
    source_pick: usize,
    dest_col: usize,
    dest_index: usize,
}

fn arb_gesture() -> impl Strategy<Value = Gesture> {
    (any::<usize>(), any::<usize>(), 0usize..10).prop_map(|(source_pick, dest_col, dest_index)| {
        Gesture {
            source_pick,
            dest_col,
            dest_index,
        }
    })
}

/// Turns a gesture into a valid request for `board`, or `None` if the board
/// has no tasks.
fn gesture(board: &Board, g: &Gesture) -> Option<MoveRequest> {
    let slots: Vec<(usize, usize)> = board
        .columns
        .iter()
        .enumerate()
        .flat_map(|(c, col)| (0..col.tasks.len()).map(move |i| (c, i)))
        .collect();
    if slots.is_empty() {
        return None;
    }
    let (c, i) = slots[g.source_pick % slots.len()];
    let source = &board.columns[c];
    let dest = &board.columns[g.dest_col % board.columns.len()];
    Some(MoveRequest {
        task_id: source.tasks[i].id.clone(),
        source_column_id: source.id.clone(),
        source_index: i,
        dest_column_id: dest.id.clone(),
        dest_index: g.dest_index,
    })
}

fn assert_invariants(board: &Board) {
    assert!(board.validate().is_ok(), "invariant broken: {board:?}");
}

proptest! {
    #[test]
    fn any_move_sequence_preserves_invariants(
        board in arb_board(),
        gestures in prop::collection::vec(arb_gesture(), 0..20),
    ) {
        let total = board.task_count();
        let mut current = board;
        for g in &gestures {
            let Some(request) = gesture(&current, g) else { break };
            let next = plan(&current, &request).unwrap().board().clone();
            assert_invariants(&next);
            prop_assert_eq!(next.task_count(), total);
            current = next;
        }
    }

    #[test]
    fn move_then_inverse_round_trips(board in arb_board(), g in arb_gesture()) {
        let Some(request) = gesture(&board, &g) else { return Ok(()) };
        let forward = plan(&board, &request).unwrap();
        if let MovePlan::Moved { board: moved, diff } = &forward {
            let back = plan(moved, &request.inverse(diff)).unwrap();
            prop_assert_eq!(back.board(), &board);
        } else {
            prop_assert!(std::ptr::eq(forward.board(), &board));
        }
    }

    #[test]
    fn dest_past_end_equals_append(board in arb_board(), g in arb_gesture(), extra in 1usize..50) {
        let Some(request) = gesture(&board, &g) else { return Ok(()) };
        let dest_len = board
            .find_column(&request.dest_column_id)
            .map_or(0, Column::len);

        let at_len = MoveRequest { dest_index: dest_len, ..request.clone() };
        let past = MoveRequest { dest_index: dest_len + extra, ..request };

        let a = plan(&board, &at_len).unwrap();
        let b = plan(&board, &past).unwrap();
        prop_assert_eq!(a.board(), b.board());
        prop_assert_eq!(a.diff(), b.diff());
    }

    #[test]
    fn mismatched_task_is_stale(board in arb_board(), g in arb_gesture()) {
        let Some(mut request) = gesture(&board, &g) else { return Ok(()) };
        request.task_id = "not-on-board".into();
        let err = plan(&board, &request).unwrap_err();
        let is_stale = matches!(err, MoveError::StaleMoveRequest { .. });
        prop_assert!(is_stale);
    }

    #[test]
    fn diff_lists_exactly_the_tasks_that_moved(board in arb_board(), g in arb_gesture()) {
        let Some(request) = gesture(&board, &g) else { return Ok(()) };
        let planned = plan(&board, &request).unwrap();
        let Some(diff) = planned.diff() else { return Ok(()) };
        let after = planned.board();

        for reorder in &diff.affected_task_reorders {
            let old = board.task(&reorder.task_id).unwrap();
            let new = after.task(&reorder.task_id).unwrap();
            prop_assert_ne!(old.order, new.order);
            prop_assert_eq!(new.order, reorder.new_order);
        }
        let listed = diff.affected_task_reorders.len();
        let changed = board
            .columns
            .iter()
            .flat_map(|c| c.tasks.iter())
            .filter(|t| t.id != diff.task_id)
            .filter(|t| after.task(&t.id).map(|n| n.order) != Some(t.order))
            .count();
        prop_assert_eq!(listed, changed);

        let moved = after.task(&diff.task_id).unwrap();
        prop_assert_eq!(&moved.column_id, &diff.to_column_id);
        prop_assert_eq!(moved.order, diff.new_order);
        prop_assert_eq!(&diff.to_column_id, &request.dest_column_id);
    }
}
