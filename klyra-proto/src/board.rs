//! Board model: a project's ordered columns, each owning ordered tasks.
//!
//! The model is plain data with read-only queries. All changes go through
//! the [`planner`](crate::planner), which returns a new [`Board`] instead of
//! editing one in place.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::list::{self, Positioned};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates an identifier from its string form.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Returns the string form of this identifier.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self::new(id)
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }
    };
}

string_id!(
    /// Unique, immutable identifier of a task (a "card" in the store).
    TaskId
);
string_id!(
    /// Unique identifier of a column.
    ColumnId
);
string_id!(
    /// Unique identifier of a project; one project owns one board.
    ProjectId
);

/// Errors raised by board queries and snapshot validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BoardError {
    /// No column of the board holds the task.
    #[error("task not found: {0}")]
    TaskNotFound(TaskId),

    /// Column orders are not exactly `0..count`.
    #[error("column orders are not dense")]
    ColumnOrderNotDense,

    /// Task orders in a column are not exactly `0..count`.
    #[error("task orders in column {0} are not dense")]
    TaskOrderNotDense(ColumnId),

    /// A task claims a different column than the one holding it.
    #[error("task {task} is held by column {held_by} but claims column {claims}")]
    ColumnMismatch {
        /// The misplaced task.
        task: TaskId,
        /// Column whose task list contains it.
        held_by: ColumnId,
        /// Column recorded on the task.
        claims: ColumnId,
    },

    /// The same task id appears more than once on the board.
    #[error("task {0} appears more than once")]
    DuplicateTask(TaskId),

    /// The same column id appears more than once on the board.
    #[error("column {0} appears more than once")]
    DuplicateColumn(ColumnId),
}

/// Task priority.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Can wait.
    Low,
    /// The default for tasks without an explicit priority.
    #[default]
    Medium,
    /// Needs attention first.
    High,
}

impl Priority {
    /// Parses a stored priority string.
    ///
    /// Matching is case-insensitive; a missing or unrecognised value falls
    /// back to [`Priority::Medium`].
    #[must_use]
    pub fn from_stored(raw: Option<&str>) -> Self {
        match raw.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
            Some("low") => Self::Low,
            Some("high") => Self::High,
            _ => Self::Medium,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

/// A task card on the board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Unique task identifier.
    pub id: TaskId,
    /// Short title shown on the card.
    pub title: String,
    /// Optional longer description.
    #[serde(default)]
    pub description: Option<String>,
    /// Optional due date.
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    /// Task priority.
    #[serde(default)]
    pub priority: Priority,
    /// Column that owns this task.
    pub column_id: ColumnId,
    /// Dense 0-based position within the owning column.
    pub order: u32,
}

impl Task {
    /// Creates a medium-priority task with no description or due date.
    ///
    /// The column and order are placeholders until the task is placed in a
    /// column with [`Column::with_tasks`].
    pub fn new(id: impl Into<TaskId>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: None,
            due_date: None,
            priority: Priority::Medium,
            column_id: ColumnId::new(""),
            order: 0,
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets the due date.
    #[must_use]
    pub const fn with_due_date(mut self, due_date: NaiveDate) -> Self {
        self.due_date = Some(due_date);
        self
    }

    /// Sets the priority.
    #[must_use]
    pub const fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    fn matches(&self, needle: &str) -> bool {
        self.title.to_lowercase().contains(needle)
            || self
                .description
                .as_deref()
                .is_some_and(|d| d.to_lowercase().contains(needle))
    }
}

impl Positioned for Task {
    fn order(&self) -> u32 {
        self.order
    }

    fn set_order(&mut self, order: u32) {
        self.order = order;
    }
}

/// A column of the board and the tasks it holds, in display order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    /// Unique column identifier.
    pub id: ColumnId,
    /// Column heading, e.g. "To Do".
    pub title: String,
    /// Dense 0-based position within the board.
    pub order: u32,
    /// Tasks in display order.
    #[serde(default)]
    pub tasks: Vec<Task>,
}

impl Column {
    /// Creates an empty column at position 0.
    pub fn new(id: impl Into<ColumnId>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            order: 0,
            tasks: Vec::new(),
        }
    }

    /// Replaces the task list, stamping each task with this column's id and
    /// its positional order.
    #[must_use]
    pub fn with_tasks(mut self, tasks: Vec<Task>) -> Self {
        self.tasks = tasks;
        self.restamp();
        self
    }

    /// Returns the number of tasks in the column.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Returns `true` if the column holds no tasks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Returns the position of a task within this column.
    #[must_use]
    pub fn position_of(&self, task_id: &TaskId) -> Option<usize> {
        self.tasks.iter().position(|t| &t.id == task_id)
    }

    /// Re-derives `column_id` and `order` for every task from this column.
    pub(crate) fn restamp(&mut self) {
        for task in &mut self.tasks {
            task.column_id = self.id.clone();
        }
        list::resequence(&mut self.tasks);
    }
}

impl Positioned for Column {
    fn order(&self) -> u32 {
        self.order
    }

    fn set_order(&mut self, order: u32) {
        self.order = order;
    }
}

/// Where a task currently sits on the board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskLocation {
    /// Column holding the task.
    pub column_id: ColumnId,
    /// Position of the task within that column.
    pub index: usize,
}

/// The full ordered columns/tasks structure of one project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Board {
    /// Project this board belongs to.
    pub project_id: ProjectId,
    /// Columns in display order.
    #[serde(default)]
    pub columns: Vec<Column>,
}

impl Board {
    /// Creates a board, numbering the columns by position.
    pub fn new(project_id: impl Into<ProjectId>, mut columns: Vec<Column>) -> Self {
        list::resequence(&mut columns);
        Self {
            project_id: project_id.into(),
            columns,
        }
    }

    /// Looks up a column by id.
    #[must_use]
    pub fn find_column(&self, column_id: &ColumnId) -> Option<&Column> {
        self.columns.iter().find(|c| &c.id == column_id)
    }

    /// Returns the position of a column within the board.
    #[must_use]
    pub fn column_index(&self, column_id: &ColumnId) -> Option<usize> {
        self.columns.iter().position(|c| &c.id == column_id)
    }

    /// Finds the column and position currently holding a task.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::TaskNotFound`] if no column holds the task.
    pub fn find_task_location(&self, task_id: &TaskId) -> Result<TaskLocation, BoardError> {
        self.columns
            .iter()
            .find_map(|column| {
                column.position_of(task_id).map(|index| TaskLocation {
                    column_id: column.id.clone(),
                    index,
                })
            })
            .ok_or_else(|| BoardError::TaskNotFound(task_id.clone()))
    }

    /// Looks up a task by id.
    #[must_use]
    pub fn task(&self, task_id: &TaskId) -> Option<&Task> {
        self.columns
            .iter()
            .flat_map(|c| c.tasks.iter())
            .find(|t| &t.id == task_id)
    }

    /// Returns the total number of tasks on the board.
    #[must_use]
    pub fn task_count(&self) -> usize {
        self.columns.iter().map(Column::len).sum()
    }

    /// Returns the tasks whose title or description contains `term`,
    /// ignoring case, in board order. An empty term matches every task.
    #[must_use]
    pub fn search(&self, term: &str) -> Vec<&Task> {
        let needle = term.trim().to_lowercase();
        self.columns
            .iter()
            .flat_map(|c| c.tasks.iter())
            .filter(|t| needle.is_empty() || t.matches(&needle))
            .collect()
    }

    /// Checks the structural invariants of a snapshot.
    ///
    /// Column orders and each column's task orders must be dense, every task
    /// must name the column holding it, and ids must be unique.
    ///
    /// # Errors
    ///
    /// Returns the first [`BoardError`] violation found.
    pub fn validate(&self) -> Result<(), BoardError> {
        if !list::is_dense(&self.columns) {
            return Err(BoardError::ColumnOrderNotDense);
        }

        let mut seen_columns = std::collections::HashSet::new();
        let mut seen_tasks = std::collections::HashSet::new();
        for column in &self.columns {
            if !seen_columns.insert(&column.id) {
                return Err(BoardError::DuplicateColumn(column.id.clone()));
            }
            if !list::is_dense(&column.tasks) {
                return Err(BoardError::TaskOrderNotDense(column.id.clone()));
            }
            for task in &column.tasks {
                if task.column_id != column.id {
                    return Err(BoardError::ColumnMismatch {
                        task: task.id.clone(),
                        held_by: column.id.clone(),
                        claims: task.column_id.clone(),
                    });
                }
                if !seen_tasks.insert(&task.id) {
                    return Err(BoardError::DuplicateTask(task.id.clone()));
                }
            }
        }
        Ok(())
    }
}
