//! `klyra` — command-line client for project boards.
//!
//! # Usage
//!
//! ```bash
//! # Print a project's board
//! klyra show p1
//!
//! # Print the client view behind a shareable link, filtered
//! klyra show --access-link 0190f0c2... --search logo
//!
//! # Move task T1 to the top of the "doing" column
//! klyra --actor alice move p1 T1 doing 0
//! ```

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{CommandFactory, Parser};
use tracing_appender::non_blocking::WorkerGuard;

use klyra::config::{CliArgs, ClientConfig, Command};
use klyra::controller::readonly::ReadOnlyBoard;
use klyra::controller::{BoardController, BoardEvent, ControllerError, MoveOutcome};
use klyra::store::remote::WsBoardStore;
use klyra_proto::board::{Board, ColumnId, ProjectId, Task, TaskId};
use klyra_proto::store::BoardLocator;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = CliArgs::parse();

    let config = match ClientConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    let _log_guard = init_logging(&cli.log_level, cli.log_file.as_deref());

    let Some(command) = cli.command else {
        let _ = CliArgs::command().print_help();
        return ExitCode::from(2);
    };

    let result = match command {
        Command::Show {
            project,
            access_link,
            search,
        } => {
            // clap guarantees one of the two is present.
            let locator = match access_link {
                Some(link) => BoardLocator::AccessLink(link),
                None => BoardLocator::Project(ProjectId::new(project.unwrap_or_default())),
            };
            show(&config, &locator, search.as_deref()).await
        }
        Command::Move {
            project,
            task,
            column,
            index,
        } => {
            move_task(
                &config,
                ProjectId::new(project),
                &TaskId::new(task),
                &ColumnId::new(column),
                index,
            )
            .await
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initialize the tracing subscriber.
///
/// Logs go to `file_path` when given (the returned [`WorkerGuard`] must be
/// held until exit to flush them), otherwise to stderr so stdout carries
/// only command output.
fn init_logging(level: &str, file_path: Option<&Path>) -> Option<WorkerGuard> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let Some(log_path) = file_path else {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_env_filter(env_filter)
            .init();
        return None;
    };

    let log_dir = log_path.parent()?;
    let file_name = log_path.file_name()?.to_str()?;
    let file_appender = tracing_appender::rolling::never(log_dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(env_filter)
        .with_ansi(false)
        .init();

    Some(guard)
}

async fn connect(config: &ClientConfig) -> Result<WsBoardStore, ControllerError> {
    let store =
        WsBoardStore::connect(&config.store_url, config.connect_timeout, config.request_timeout)
            .await?;
    Ok(store)
}

async fn show(
    config: &ClientConfig,
    locator: &BoardLocator,
    search: Option<&str>,
) -> Result<(), ControllerError> {
    let store = connect(config).await?;
    let view = ReadOnlyBoard::load(&store, locator).await?;

    match search {
        Some(term) => {
            for task in view.search(term) {
                let column = view
                    .find_column(&task.column_id)
                    .map_or(task.column_id.as_str(), |c| c.title.as_str());
                println!("{column}: {}", format_task(task));
            }
        }
        None => print_board(view.board()),
    }
    Ok(())
}

async fn move_task(
    config: &ClientConfig,
    project_id: ProjectId,
    task_id: &TaskId,
    column_id: &ColumnId,
    index: usize,
) -> Result<(), ControllerError> {
    let store = Arc::new(connect(config).await?);
    let (controller, mut events) = BoardController::load(
        store,
        &BoardLocator::Project(project_id),
        config.actor.clone(),
        config.sync.clone(),
        config.event_buffer,
    )
    .await?;

    let outcome = controller.move_task_to(task_id, column_id, index).await;
    controller.flush_audits().await;

    while let Ok(event) = events.try_recv() {
        if let Some(line) = notice(&event) {
            println!("{line}");
        }
    }
    if let MoveOutcome::Unchanged = outcome? {
        println!("Task {task_id} is already there");
    }
    Ok(())
}

/// The line to print for a controller event, if any. Failures reach the
/// user through the returned error instead.
fn notice(event: &BoardEvent) -> Option<String> {
    match event {
        BoardEvent::TaskMoved { .. } => Some(event.to_string()),
        BoardEvent::BoardUpdated(_) | BoardEvent::MoveFailed { .. } => None,
    }
}

fn print_board(board: &Board) {
    for column in &board.columns {
        println!("{} ({})", column.title, column.len());
        for task in &column.tasks {
            println!("  {}. {}", task.order, format_task(task));
        }
    }
}

fn format_task(task: &Task) -> String {
    let mut line = format!("[{}] {} ({})", task.id, task.title, task.priority);
    if let Some(due) = task.due_date {
        line.push_str(&format!(" due {due}"));
    }
    line
}
