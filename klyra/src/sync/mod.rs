//! Persistence synchronizer: writes a planned move to the board store.
//!
//! [`PersistenceSynchronizer::commit`] turns a [`MoveDiff`] into position
//! writes, retrying transport failures a bounded number of times, and once
//! the position is durable queues the `move_card` audit record as a
//! fire-and-forget task. A failed audit insert is logged and never undoes
//! the move.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use klyra_proto::audit::{AuditRecord, Timestamp};
use klyra_proto::board::ProjectId;
use klyra_proto::planner::MoveDiff;
use klyra_proto::store::PositionUpdate;

use crate::store::{BoardStore, StoreError};

/// Which rows a committed move writes.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
#[value(rename_all = "snake_case")]
pub enum ReorderPolicy {
    /// Write only the moved task; the store resequences on read.
    #[default]
    MovedOnly,
    /// Write the moved task and every shifted task as one batch.
    AllAffected,
}

impl std::fmt::Display for ReorderPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MovedOnly => write!(f, "moved_only"),
            Self::AllAffected => write!(f, "all_affected"),
        }
    }
}

/// Retry and timeout behaviour of a commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Extra attempts after a transient write failure.
    pub retries: u32,
    /// Pause before each retry.
    pub retry_delay: Duration,
    /// Upper bound on the whole commit, retries included.
    pub commit_timeout: Duration,
    /// Which rows to write.
    pub reorder_policy: ReorderPolicy,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            retries: 1,
            retry_delay: Duration::from_millis(250),
            commit_timeout: Duration::from_secs(5),
            reorder_policy: ReorderPolicy::MovedOnly,
        }
    }
}

/// Final outcome of a failed commit.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PersistError {
    /// The store could not be reached, even after retrying.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The store refused the write.
    #[error("rejected by store: {0}")]
    Rejected(String),
}

impl From<StoreError> for PersistError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Rejected(reason) => Self::Rejected(reason),
            other => Self::Unavailable(other.to_string()),
        }
    }
}

/// Writes committed moves to a [`BoardStore`].
pub struct PersistenceSynchronizer<S> {
    store: Arc<S>,
    config: SyncConfig,
    /// Audit inserts that may still be running. Dropping a handle detaches
    /// the task, it is never aborted.
    audits: Mutex<Vec<JoinHandle<()>>>,
}

impl<S: BoardStore + 'static> PersistenceSynchronizer<S> {
    /// Create a synchronizer writing to `store`.
    #[must_use]
    pub fn new(store: Arc<S>, config: SyncConfig) -> Self {
        Self {
            store,
            config,
            audits: Mutex::new(Vec::new()),
        }
    }

    /// The active configuration.
    #[must_use]
    pub const fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Persist a move, then queue its audit record.
    ///
    /// # Errors
    ///
    /// - [`PersistError::Unavailable`] if every attempt failed in transport,
    ///   or the commit did not finish within the configured timeout.
    /// - [`PersistError::Rejected`] as soon as the store refuses the write.
    pub async fn commit(
        &self,
        diff: &MoveDiff,
        project_id: &ProjectId,
        actor: &str,
    ) -> Result<(), PersistError> {
        match tokio::time::timeout(self.config.commit_timeout, self.write_with_retry(diff)).await
        {
            Ok(result) => result?,
            Err(_) => {
                tracing::warn!(
                    task_id = %diff.task_id,
                    timeout = ?self.config.commit_timeout,
                    "commit timed out"
                );
                return Err(PersistError::Unavailable("commit timed out".into()));
            }
        }

        tracing::info!(
            task_id = %diff.task_id,
            to_column = %diff.to_column_id,
            new_order = diff.new_order,
            "move committed"
        );
        self.spawn_audit(AuditRecord::card_moved(
            project_id.clone(),
            diff,
            actor,
            Timestamp::now(),
        ));
        Ok(())
    }

    async fn write_with_retry(&self, diff: &MoveDiff) -> Result<(), PersistError> {
        let moved = PositionUpdate {
            task_id: diff.task_id.clone(),
            column_id: diff.to_column_id.clone(),
            order: diff.new_order,
        };

        let mut last_err = None;
        for attempt in 0..=self.config.retries {
            if attempt > 0 {
                tokio::time::sleep(self.config.retry_delay).await;
            }
            let result = match self.config.reorder_policy {
                ReorderPolicy::MovedOnly => self.store.update_task_position(&moved).await,
                ReorderPolicy::AllAffected => {
                    self.store
                        .update_task_positions(&moved, &diff.affected_task_reorders)
                        .await
                }
            };
            match result {
                Ok(()) => return Ok(()),
                Err(e) if e.is_transient() => {
                    tracing::debug!(
                        attempt,
                        max_retries = self.config.retries,
                        error = %e,
                        "position write failed, will retry"
                    );
                    last_err = Some(e);
                }
                // Rejections are not retryable.
                Err(e) => return Err(e.into()),
            }
        }

        Err(last_err.map_or_else(
            || PersistError::Unavailable("no write attempted".into()),
            PersistError::from,
        ))
    }

    /// Wait until every queued audit insert has finished.
    pub async fn flush_audits(&self) {
        let pending = std::mem::take(&mut *self.audits.lock());
        for handle in pending {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "audit task did not complete");
            }
        }
    }

    fn spawn_audit(&self, record: AuditRecord) {
        let store = Arc::clone(&self.store);
        let handle = tokio::spawn(async move {
            if let Err(e) = store.insert_audit_record(&record).await {
                tracing::warn!(
                    task_id = %record.task_id,
                    error = %e,
                    "audit insert failed, move stays committed"
                );
            }
        });
        let mut audits = self.audits.lock();
        audits.retain(|h| !h.is_finished());
        audits.push(handle);
    }
}
