//! Optimistic mutation applier.
//!
//! Every user action is applied to the local view first. Online, the write
//! goes straight to the remote store and is rolled back if the store refuses
//! it. Offline, the write is queued and the local view stays as applied.

use std::sync::{Arc, PoisonError, RwLock};

use chrono::Utc;

use crate::connectivity::ConnectivityMonitor;
use crate::models::{
    MutationId, MutationPayload, NewTask, RemoteSnapshot, Task, TaskId, TaskStatus, TimeEntry,
    TimeEntryId,
};
use crate::queue::MutationQueue;
use crate::remote::RemoteStore;
use crate::sync::SnapshotSink;
use crate::{Error, Result};

/// What the user currently sees
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewState {
    pub tasks: Vec<Task>,
    pub time_entries: Vec<TimeEntry>,
}

impl ViewState {
    pub fn task(&self, id: TaskId) -> Option<&Task> {
        self.tasks.iter().find(|task| task.id == id)
    }

    pub fn time_entry(&self, id: TimeEntryId) -> Option<&TimeEntry> {
        self.time_entries.iter().find(|entry| entry.id == id)
    }

    pub fn running_entries(&self) -> Vec<TimeEntry> {
        self.time_entries
            .iter()
            .filter(|entry| entry.is_running)
            .cloned()
            .collect()
    }

    /// Insert or replace a task by id, keeping its position
    pub fn upsert_task(&mut self, task: Task) {
        match self.tasks.iter_mut().find(|row| row.id == task.id) {
            Some(row) => *row = task,
            None => self.tasks.push(task),
        }
    }

    /// Insert or replace a time entry by id, keeping its position
    pub fn upsert_time_entry(&mut self, entry: TimeEntry) {
        match self.time_entries.iter_mut().find(|row| row.id == entry.id) {
            Some(row) => *row = entry,
            None => self.time_entries.push(entry),
        }
    }
}

/// Shared handle to the local view.
///
/// Also receives refreshed server state, replacing the view wholesale.
#[derive(Clone, Default)]
pub struct LocalState {
    inner: Arc<RwLock<ViewState>>,
}

impl LocalState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> ViewState {
        self.read(Clone::clone)
    }

    pub fn read<R>(&self, f: impl FnOnce(&ViewState) -> R) -> R {
        let view = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        f(&view)
    }

    pub fn update<R>(&self, f: impl FnOnce(&mut ViewState) -> R) -> R {
        let mut view = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut view)
    }

    pub fn task(&self, id: TaskId) -> Option<Task> {
        self.read(|view| view.task(id).cloned())
    }

    pub fn time_entry(&self, id: TimeEntryId) -> Option<TimeEntry> {
        self.read(|view| view.time_entry(id).cloned())
    }
}

impl SnapshotSink for LocalState {
    fn apply_snapshot(&self, snapshot: RemoteSnapshot) {
        self.update(|view| {
            view.tasks = snapshot.tasks;
            view.time_entries = snapshot.time_entries;
        });
    }
}

/// Undoes one local transition
pub type Revert = Box<dyn FnOnce(&mut ViewState) + Send>;

/// How an optimistic write was settled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The remote store accepted the write
    Confirmed,
    /// Offline; the write waits in the durable queue. `id` is `None` when
    /// queue storage failed and the change will not sync.
    Queued { id: Option<MutationId> },
}

#[derive(Clone)]
pub struct OptimisticApplier {
    state: LocalState,
    queue: MutationQueue,
    remote: Arc<dyn RemoteStore>,
    connectivity: ConnectivityMonitor,
}

impl OptimisticApplier {
    pub fn new(
        state: LocalState,
        queue: MutationQueue,
        remote: Arc<dyn RemoteStore>,
        connectivity: ConnectivityMonitor,
    ) -> Self {
        Self {
            state,
            queue,
            remote,
            connectivity,
        }
    }

    pub const fn state(&self) -> &LocalState {
        &self.state
    }

    pub const fn connectivity(&self) -> &ConnectivityMonitor {
        &self.connectivity
    }

    /// Apply `transition` locally, then settle `payload` remotely or queue it.
    ///
    /// If `transition` fails nothing is sent. While earlier writes to the
    /// same row are still queued the payload is queued behind them, online or
    /// not. An online rejection runs the returned [`Revert`] and surfaces as
    /// [`Error::Remote`]; it is not retried.
    pub async fn apply<F>(&self, payload: MutationPayload, transition: F) -> Result<ApplyOutcome>
    where
        F: FnOnce(&mut ViewState) -> Result<Revert> + Send,
    {
        let revert = self.state.update(transition)?;

        if !self.connectivity.is_online() || self.has_queued_writes(&payload.target_id()).await {
            let stored = self.queue.enqueue(payload).await;
            return Ok(ApplyOutcome::Queued {
                id: stored.map(|mutation| mutation.id),
            });
        }

        match self.remote.perform(&payload).await {
            Ok(()) => Ok(ApplyOutcome::Confirmed),
            Err(error) => {
                tracing::warn!(
                    "Remote {} on {} failed; reverting local change: {error}",
                    payload.action(),
                    payload.table()
                );
                self.state.update(revert);
                Err(Error::Remote(error))
            }
        }
    }

    /// Whether writes to `target_id` are still waiting in the queue.
    ///
    /// An unreadable queue counts as empty.
    pub async fn has_queued_writes(&self, target_id: &str) -> bool {
        match self.queue.has_pending_for(target_id).await {
            Ok(found) => found,
            Err(error) => {
                tracing::warn!("Could not inspect mutation queue: {error}");
                false
            }
        }
    }

    /// Flip a task between done and todo
    pub async fn toggle_task(&self, id: TaskId) -> Result<ApplyOutcome> {
        let current = self
            .state
            .task(id)
            .ok_or_else(|| Error::NotFound(format!("task {id}")))?;
        self.set_task_status(id, current.status.toggled()).await
    }

    pub async fn set_task_status(&self, id: TaskId, status: TaskStatus) -> Result<ApplyOutcome> {
        let now = Utc::now();
        let completed_at = (status == TaskStatus::Done).then_some(now);
        let payload = MutationPayload::TaskStatus {
            id,
            status,
            completed_at,
        };

        self.apply(payload, move |view| {
            let task = view
                .tasks
                .iter_mut()
                .find(|task| task.id == id)
                .ok_or_else(|| Error::NotFound(format!("task {id}")))?;
            let previous = task.clone();
            task.set_status(status, now);
            Ok(Box::new(move |view: &mut ViewState| view.upsert_task(previous)) as Revert)
        })
        .await
    }

    pub async fn delete_task(&self, id: TaskId) -> Result<ApplyOutcome> {
        self.apply(MutationPayload::TaskDelete { id }, move |view| {
            let index = view
                .tasks
                .iter()
                .position(|task| task.id == id)
                .ok_or_else(|| Error::NotFound(format!("task {id}")))?;
            let removed = view.tasks.remove(index);
            Ok(Box::new(move |view: &mut ViewState| {
                let index = index.min(view.tasks.len());
                view.tasks.insert(index, removed);
            }) as Revert)
        })
        .await
    }

    /// Create a task with a client-generated id, visible immediately.
    pub async fn create_task(&self, new: NewTask) -> Result<(Task, ApplyOutcome)> {
        if new.title.trim().is_empty() {
            return Err(Error::InvalidInput("Task title cannot be empty".to_string()));
        }

        let task = Task::from_new(
            NewTask {
                title: new.title.trim().to_string(),
                ..new
            },
            Utc::now(),
        );
        let id = task.id;
        let row = task.clone();
        let outcome = self
            .apply(MutationPayload::TaskCreate { task: task.clone() }, move |view| {
                view.tasks.insert(0, row);
                Ok(Box::new(move |view: &mut ViewState| {
                    view.tasks.retain(|task| task.id != id);
                }) as Revert)
            })
            .await?;
        Ok((task, outcome))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::{InMemoryRemoteStore, RemoteError};
    use pretty_assertions::assert_eq;

    struct Fixture {
        applier: OptimisticApplier,
        remote: Arc<InMemoryRemoteStore>,
        queue: MutationQueue,
        connectivity: ConnectivityMonitor,
    }

    async fn fixture(online: bool) -> Fixture {
        let queue = MutationQueue::open_in_memory().await.unwrap();
        let remote = Arc::new(InMemoryRemoteStore::new());
        let connectivity = ConnectivityMonitor::fixed(online);
        let applier = OptimisticApplier::new(
            LocalState::new(),
            queue.clone(),
            remote.clone(),
            connectivity.clone(),
        );
        Fixture {
            applier,
            remote,
            queue,
            connectivity,
        }
    }

    fn seed_task(fx: &Fixture, title: &str) -> Task {
        let task = Task::from_new(NewTask::new(title), Utc::now());
        fx.applier
            .state()
            .update(|view| view.tasks.push(task.clone()));
        fx.remote.put_task(task.clone());
        task
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn online_toggle_matches_remote_state() {
        let fx = fixture(true).await;
        let task = seed_task(&fx, "Write report");

        let outcome = fx.applier.toggle_task(task.id).await.unwrap();
        assert_eq!(outcome, ApplyOutcome::Confirmed);

        let local = fx.applier.state().task(task.id).unwrap();
        let remote = fx.remote.fetch_all().await.unwrap();
        assert_eq!(local.status, TaskStatus::Done);
        assert!(local.completed_at.is_some());
        assert_eq!(remote.tasks[0].status, local.status);
        assert_eq!(fx.queue.count().await.unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn online_failure_reverts_toggle() {
        let fx = fixture(true).await;
        let task = seed_task(&fx, "Write report");
        fx.remote.fail_next_perform(RemoteError::Rejected {
            status: 400,
            message: "invalid status".to_string(),
        });

        let error = fx.applier.toggle_task(task.id).await.unwrap_err();
        assert!(matches!(error, Error::Remote(_)));
        assert_eq!(fx.applier.state().task(task.id).unwrap(), task);
        assert_eq!(fx.queue.count().await.unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn online_failure_restores_deleted_task_in_place() {
        let fx = fixture(true).await;
        let first = seed_task(&fx, "First");
        let second = seed_task(&fx, "Second");
        fx.remote.set_unreachable(true);

        let error = fx.applier.delete_task(first.id).await.unwrap_err();
        assert!(error.is_connectivity());

        let ids: Vec<_> = fx
            .applier
            .state()
            .read(|view| view.tasks.iter().map(|task| task.id).collect());
        assert_eq!(ids, vec![first.id, second.id]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn offline_delete_queues_without_remote_call() {
        let fx = fixture(false).await;
        let task = seed_task(&fx, "Offline");

        let outcome = fx.applier.delete_task(task.id).await.unwrap();
        assert!(matches!(outcome, ApplyOutcome::Queued { id: Some(_) }));
        assert!(fx.applier.state().task(task.id).is_none());
        assert_eq!(fx.remote.perform_count(), 0);

        let pending = fx.queue.pending().await.unwrap();
        assert_eq!(
            pending[0].payload,
            MutationPayload::TaskDelete { id: task.id }
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn missing_task_is_not_found_and_sends_nothing() {
        let fx = fixture(true).await;
        let error = fx.applier.toggle_task(TaskId::new()).await.unwrap_err();
        assert!(matches!(error, Error::NotFound(_)));
        assert_eq!(fx.remote.perform_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn create_task_is_visible_in_both_modes() {
        let fx = fixture(false).await;
        let (offline_task, outcome) = fx
            .applier
            .create_task(NewTask::new("  Draft invoice "))
            .await
            .unwrap();
        assert_eq!(offline_task.title, "Draft invoice");
        assert!(matches!(outcome, ApplyOutcome::Queued { .. }));

        fx.connectivity.set_online(true);
        let (online_task, outcome) = fx
            .applier
            .create_task(NewTask::new("Send invoice"))
            .await
            .unwrap();
        assert_eq!(outcome, ApplyOutcome::Confirmed);

        let titles: Vec<_> = fx
            .applier
            .state()
            .read(|view| view.tasks.iter().map(|task| task.title.clone()).collect());
        assert_eq!(titles, vec!["Send invoice", "Draft invoice"]);
        assert_eq!(fx.remote.snapshot().tasks, vec![online_task]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn online_write_waits_behind_queued_create() {
        let fx = fixture(false).await;
        let (task, _) = fx
            .applier
            .create_task(NewTask::new("Queued first"))
            .await
            .unwrap();

        fx.connectivity.set_online(true);
        assert!(fx.applier.has_queued_writes(&task.id.as_str()).await);

        let outcome = fx.applier.toggle_task(task.id).await.unwrap();
        assert!(matches!(outcome, ApplyOutcome::Queued { id: Some(_) }));
        assert_eq!(fx.remote.perform_count(), 0);
        assert_eq!(
            fx.applier.state().task(task.id).unwrap().status,
            TaskStatus::Done
        );

        let actions: Vec<_> = fx
            .queue
            .pending()
            .await
            .unwrap()
            .into_iter()
            .map(|mutation| mutation.action())
            .collect();
        assert_eq!(
            actions,
            vec![
                crate::models::MutationAction::Create,
                crate::models::MutationAction::Update
            ]
        );

        // Unrelated rows still go straight to the remote
        let other = seed_task(&fx, "Already synced");
        assert_eq!(
            fx.applier.toggle_task(other.id).await.unwrap(),
            ApplyOutcome::Confirmed
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn create_task_rejects_blank_title() {
        let fx = fixture(true).await;
        let error = fx.applier.create_task(NewTask::new("   ")).await.unwrap_err();
        assert!(matches!(error, Error::InvalidInput(_)));
    }

    #[test]
    fn snapshot_replaces_view() {
        let state = LocalState::new();
        let task = Task::from_new(NewTask::new("Stale"), Utc::now());
        state.update(|view| view.tasks.push(task));

        state.apply_snapshot(RemoteSnapshot::default());
        assert_eq!(state.snapshot(), ViewState::default());
    }
}
