//! In-process remote store for tests and offline embedding.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::Semaphore;

use super::{RemoteError, RemoteResult, RemoteStore};
use crate::models::{MutationPayload, RemoteSnapshot, Task, TimeEntry, TimeEntryId};

#[derive(Default)]
struct Inner {
    snapshot: RemoteSnapshot,
    performed: Vec<MutationPayload>,
    fetch_count: usize,
    scripted_failures: VecDeque<RemoteError>,
    unreachable: bool,
    fetch_gate: Option<Arc<Semaphore>>,
}

/// Remote store that keeps rows in memory and records every call.
#[derive(Default)]
pub struct InMemoryRemoteStore {
    inner: Mutex<Inner>,
}

impl InMemoryRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(snapshot: RemoteSnapshot) -> Self {
        let store = Self::default();
        store.lock().snapshot = snapshot;
        store
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make the next `perform` call fail with `error`
    pub fn fail_next_perform(&self, error: RemoteError) {
        self.lock().scripted_failures.push_back(error);
    }

    /// Simulate a dead network: every call fails as unreachable
    pub fn set_unreachable(&self, unreachable: bool) {
        self.lock().unreachable = unreachable;
    }

    /// Make later `fetch_all` calls wait until released
    pub fn hold_fetches(&self) {
        self.lock().fetch_gate = Some(Arc::new(Semaphore::new(0)));
    }

    /// Let `count` held fetches proceed
    pub fn release_fetches(&self, count: usize) {
        if let Some(gate) = &self.lock().fetch_gate {
            gate.add_permits(count);
        }
    }

    /// Writes applied so far, in order
    pub fn performed(&self) -> Vec<MutationPayload> {
        self.lock().performed.clone()
    }

    pub fn perform_count(&self) -> usize {
        self.lock().performed.len()
    }

    pub fn fetch_count(&self) -> usize {
        self.lock().fetch_count
    }

    pub fn snapshot(&self) -> RemoteSnapshot {
        self.lock().snapshot.clone()
    }

    /// Replace a row directly, as another device would
    pub fn put_task(&self, task: Task) {
        let mut inner = self.lock();
        inner.snapshot.tasks.retain(|row| row.id != task.id);
        inner.snapshot.tasks.push(task);
    }

    pub fn put_time_entry(&self, entry: TimeEntry) {
        let mut inner = self.lock();
        inner.snapshot.time_entries.retain(|row| row.id != entry.id);
        inner.snapshot.time_entries.push(entry);
    }
}

#[async_trait]
impl RemoteStore for InMemoryRemoteStore {
    async fn perform(&self, payload: &MutationPayload) -> RemoteResult<()> {
        let mut inner = self.lock();
        if inner.unreachable {
            return Err(RemoteError::Unreachable("network down".to_string()));
        }
        if let Some(error) = inner.scripted_failures.pop_front() {
            return Err(error);
        }

        inner.snapshot.apply(payload);
        inner.performed.push(payload.clone());
        Ok(())
    }

    async fn fetch_all(&self) -> RemoteResult<RemoteSnapshot> {
        let gate = self.lock().fetch_gate.clone();
        if let Some(gate) = gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }

        let mut inner = self.lock();
        if inner.unreachable {
            return Err(RemoteError::Unreachable("network down".to_string()));
        }
        inner.fetch_count += 1;
        Ok(inner.snapshot.clone())
    }

    async fn fetch_time_entry(&self, id: TimeEntryId) -> RemoteResult<Option<TimeEntry>> {
        let inner = self.lock();
        if inner.unreachable {
            return Err(RemoteError::Unreachable("network down".to_string()));
        }
        Ok(inner
            .snapshot
            .time_entries
            .iter()
            .find(|row| row.id == id)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewTask, TaskStatus};
    use chrono::Utc;

    #[tokio::test]
    async fn perform_applies_to_snapshot() {
        let remote = InMemoryRemoteStore::new();
        let task = Task::from_new(NewTask::new("Call back"), Utc::now());

        remote
            .perform(&MutationPayload::TaskCreate { task: task.clone() })
            .await
            .unwrap();
        remote
            .perform(&MutationPayload::TaskStatus {
                id: task.id,
                status: TaskStatus::Done,
                completed_at: None,
            })
            .await
            .unwrap();

        let snapshot = remote.fetch_all().await.unwrap();
        assert_eq!(snapshot.tasks.len(), 1);
        assert_eq!(snapshot.tasks[0].status, TaskStatus::Done);
        assert_eq!(remote.perform_count(), 2);
    }

    #[tokio::test]
    async fn replayed_create_is_a_no_op() {
        let remote = InMemoryRemoteStore::new();
        let task = Task::from_new(NewTask::new("Once"), Utc::now());
        let payload = MutationPayload::TaskCreate { task };

        remote.perform(&payload).await.unwrap();
        remote.perform(&payload).await.unwrap();
        assert_eq!(remote.snapshot().tasks.len(), 1);
    }

    #[tokio::test]
    async fn scripted_failure_is_consumed_once() {
        let remote = InMemoryRemoteStore::new();
        remote.fail_next_perform(RemoteError::Rejected {
            status: 400,
            message: "bad".to_string(),
        });
        let payload = MutationPayload::TaskDelete {
            id: crate::models::TaskId::new(),
        };

        assert!(remote.perform(&payload).await.is_err());
        assert!(remote.perform(&payload).await.is_ok());
    }
}
