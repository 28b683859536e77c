//! Audit trail records appended after a task move is persisted.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::board::{ColumnId, ProjectId, TaskId};
use crate::planner::MoveDiff;

/// Milliseconds since the UNIX epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Creates a timestamp for the current instant.
    #[must_use]
    pub fn now() -> Self {
        let millis = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        Self(u64::try_from(millis).unwrap_or(u64::MAX))
    }

    /// Creates a timestamp from milliseconds since the UNIX epoch.
    #[must_use]
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    /// Returns the timestamp as milliseconds since the UNIX epoch.
    #[must_use]
    pub const fn as_millis(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

/// Kind of action recorded in the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    /// A card changed column and/or position.
    MoveCard,
}

impl ActionType {
    /// Returns the stored name of the action.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MoveCard => "move_card",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Details of a `move_card` action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveDetails {
    /// Column the card left.
    pub from_column: ColumnId,
    /// Column the card entered.
    pub to_column: ColumnId,
    /// Position of the card in `to_column`.
    pub new_order: u32,
}

/// One entry of a project's activity log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Project the action happened in.
    pub project_id: ProjectId,
    /// Card the action applies to.
    pub task_id: TaskId,
    /// What happened.
    pub action_type: ActionType,
    /// Action payload.
    pub details: MoveDetails,
    /// Who did it.
    pub performed_by: String,
    /// When it was recorded by the client.
    pub timestamp: Timestamp,
}

impl AuditRecord {
    /// Builds the `move_card` record for a persisted move.
    pub fn card_moved(
        project_id: ProjectId,
        diff: &MoveDiff,
        performed_by: impl Into<String>,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            project_id,
            task_id: diff.task_id.clone(),
            action_type: ActionType::MoveCard,
            details: MoveDetails {
                from_column: diff.from_column_id.clone(),
                to_column: diff.to_column_id.clone(),
                new_order: diff.new_order,
            },
            performed_by: performed_by.into(),
            timestamp,
        }
    }
}
