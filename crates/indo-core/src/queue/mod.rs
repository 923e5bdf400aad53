//! Durable mutation queue service.
//!
//! Writes that could not reach the remote store wait here, ordered by
//! enqueue time, until a drain replays them. A drain stops at the first
//! failure so a later write never lands before an earlier one it depends on.

use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::db::{Database, LibSqlMutationQueueRepository, MutationQueueRepository};
use crate::models::{MutationId, QueuedMutation};
use crate::remote::RemoteError;
use crate::Result;

/// Result of one `drain` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrainReport {
    /// Another drain was in flight; nothing was touched
    AlreadyRunning,
    /// Every pending mutation was replayed and removed
    Completed { applied: usize },
    /// Replay stopped at `failed`; it and everything after it stay queued
    Halted {
        applied: usize,
        failed: MutationId,
        error: String,
        /// The failure was a lost connection rather than a rejection
        unreachable: bool,
        remaining: usize,
    },
}

impl DrainReport {
    pub const fn applied(&self) -> usize {
        match self {
            Self::AlreadyRunning => 0,
            Self::Completed { applied } | Self::Halted { applied, .. } => *applied,
        }
    }
}

/// Handle to the single durable queue instance.
///
/// Cloning shares the same storage and drain guard.
#[derive(Clone)]
pub struct MutationQueue {
    db: Arc<Mutex<Database>>,
    db_path: Option<PathBuf>,
    draining: Arc<AtomicBool>,
}

impl MutationQueue {
    /// Open the queue backed by a file at `db_path`.
    pub async fn open_path(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = Database::open(&db_path).await?;
        tracing::info!("Opened mutation queue at {}", db_path.display());
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            db_path: Some(db_path),
            draining: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Open an in-memory queue (primarily for tests).
    pub async fn open_in_memory() -> Result<Self> {
        let db = Database::open_in_memory().await?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            db_path: None,
            draining: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Default on-disk location of the queue database.
    pub fn default_path() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("indo")
            .join("queue.db")
    }

    pub fn path(&self) -> Option<&PathBuf> {
        self.db_path.as_ref()
    }

    /// Append a mutation and return once it is committed.
    ///
    /// A bare payload is stamped with a fresh id and the current time.
    pub async fn try_enqueue(&self, mutation: impl Into<QueuedMutation>) -> Result<QueuedMutation> {
        let mutation = mutation.into();
        let db = self.db.lock().await;
        let repo = LibSqlMutationQueueRepository::new(db.connection());
        repo.insert(&mutation).await?;

        tracing::debug!(
            "Queued {} {} ({})",
            mutation.action(),
            mutation.entity_table(),
            mutation.id
        );
        Ok(mutation)
    }

    /// Append a mutation; storage failure is logged and swallowed.
    ///
    /// Returns `None` when the write could not be stored. The mutation is
    /// then lost: the caller's optimistic state stays applied and nothing
    /// retries the insert.
    pub async fn enqueue(&self, mutation: impl Into<QueuedMutation>) -> Option<QueuedMutation> {
        let mutation = mutation.into();
        let id = mutation.id;
        match self.try_enqueue(mutation).await {
            Ok(stored) => Some(stored),
            Err(error) => {
                tracing::error!("Failed to enqueue mutation {id}; change will not sync: {error}");
                None
            }
        }
    }

    /// Number of pending mutations.
    pub async fn count(&self) -> Result<usize> {
        let db = self.db.lock().await;
        let repo = LibSqlMutationQueueRepository::new(db.connection());
        repo.count().await
    }

    /// Pending mutations, oldest first.
    pub async fn pending(&self) -> Result<Vec<QueuedMutation>> {
        let db = self.db.lock().await;
        let repo = LibSqlMutationQueueRepository::new(db.connection());
        repo.list_pending().await
    }

    /// Whether any pending mutation addresses the row `target_id`.
    pub async fn has_pending_for(&self, target_id: &str) -> Result<bool> {
        Ok(self
            .pending()
            .await?
            .iter()
            .any(|mutation| mutation.payload.target_id() == target_id))
    }

    /// Whether a drain is currently replaying.
    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::Acquire)
    }

    /// Replay pending mutations in order through `process_one`.
    ///
    /// Each success deletes its mutation before the next one is attempted.
    /// The first failure stops the drain. A call made while another drain is
    /// in flight returns [`DrainReport::AlreadyRunning`] without effect.
    pub async fn drain<F, Fut>(&self, mut process_one: F) -> Result<DrainReport>
    where
        F: FnMut(QueuedMutation) -> Fut,
        Fut: Future<Output = std::result::Result<(), RemoteError>>,
    {
        let Some(_guard) = DrainGuard::acquire(&self.draining) else {
            tracing::debug!("Queue drain already in flight; skipping");
            return Ok(DrainReport::AlreadyRunning);
        };

        let pending = self.pending().await?;
        if pending.is_empty() {
            return Ok(DrainReport::Completed { applied: 0 });
        }

        let total = pending.len();
        let mut applied = 0;
        for mutation in pending {
            let id = mutation.id;
            tracing::debug!(
                "Replaying {} {} ({id})",
                mutation.action(),
                mutation.entity_table()
            );

            // The storage lock is not held here so enqueues keep flowing
            if let Err(error) = process_one(mutation).await {
                let remaining = total - applied;
                tracing::warn!(
                    "Queue drain halted at {id} after {applied} applied, {remaining} pending: {error}"
                );
                return Ok(DrainReport::Halted {
                    applied,
                    failed: id,
                    error: error.to_string(),
                    unreachable: error.is_connectivity(),
                    remaining,
                });
            }

            let db = self.db.lock().await;
            let repo = LibSqlMutationQueueRepository::new(db.connection());
            repo.delete(&id).await?;
            applied += 1;
        }

        tracing::info!("Queue drain applied {applied} mutation(s)");
        Ok(DrainReport::Completed { applied })
    }

    #[cfg(test)]
    pub(crate) async fn break_storage(&self) {
        let db = self.db.lock().await;
        db.connection()
            .execute("DROP TABLE mutation_queue", ())
            .await
            .unwrap();
    }
}

/// Holds the drain flag; clears it on drop, including on early return.
struct DrainGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> DrainGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}
