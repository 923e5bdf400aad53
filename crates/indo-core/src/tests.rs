//! End-to-end behavior of the assembled engine.

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use pretty_assertions::assert_eq;

use crate::connectivity::ConnectivityMonitor;
use crate::engine::{EngineParts, SyncEngine};
use crate::listener::{BroadcastChangeFeed, ChangeEvent, ChangeKind};
use crate::models::{
    EntityTable, MutationPayload, NewTask, ProjectId, RemoteSnapshot, ResumeHint, SyncState,
    TaskStatus,
};
use crate::optimistic::ApplyOutcome;
use crate::queue::MutationQueue;
use crate::remote::{InMemoryRemoteStore, RemoteError, RemoteStore};
use crate::sync::{LifecycleEvent, SnapshotSink, SyncOutcome, SyncSettings};
use crate::timer::{Clock, ManualClock};

struct Harness {
    engine: SyncEngine,
    remote: Arc<InMemoryRemoteStore>,
    feed: BroadcastChangeFeed,
    clock: Arc<ManualClock>,
}

async fn harness(online: bool) -> Harness {
    harness_with(online, SyncSettings::default()).await
}

async fn harness_with(online: bool, settings: SyncSettings) -> Harness {
    let remote = Arc::new(InMemoryRemoteStore::new());
    let feed = BroadcastChangeFeed::default();
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2026, 3, 2, 10, 0, 0).unwrap(),
    ));
    let engine = SyncEngine::with_parts(EngineParts {
        queue: MutationQueue::open_in_memory().await.unwrap(),
        remote: remote.clone(),
        connectivity: ConnectivityMonitor::fixed(online),
        feed: Arc::new(feed.clone()),
        clock: clock.clone(),
        settings,
        realtime_tables: EntityTable::ALL.to_vec(),
    });
    Harness {
        engine,
        remote,
        feed,
        clock,
    }
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[tokio::test(flavor = "multi_thread")]
async fn pause_and_resume_scenario() {
    let h = harness(true).await;
    let project = ProjectId::new();
    let timer = h.engine.timer();

    let started = timer.start(Some(project), None).await.unwrap();
    assert_eq!(
        started.entry.start_time,
        Utc.with_ymd_and_hms(2026, 3, 2, 10, 0, 0).unwrap()
    );

    // Backgrounding and re-renders in between do not matter
    h.engine.notify(LifecycleEvent::Visible);
    h.clock.set(Utc.with_ymd_and_hms(2026, 3, 2, 10, 2, 5).unwrap());

    let (paused, hint) = timer.pause(started.entry.id).await.unwrap();
    assert_eq!(paused.entry.start_time, started.entry.start_time);
    assert_eq!(paused.entry.end_time, Some(h.clock.now()));
    assert_eq!(paused.entry.duration_seconds, Some(125));
    assert!(!paused.entry.is_running);
    assert_eq!(
        hint,
        ResumeHint {
            project_id: project,
            task_id: None
        }
    );

    let stored = h
        .remote
        .fetch_time_entry(started.entry.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.duration_seconds, Some(125));
    assert!(!stored.is_running);

    h.clock.advance(Duration::from_secs(300));
    let resumed = timer.resume(Some(hint.project_id), hint.task_id).await.unwrap();
    assert_ne!(resumed.entry.id, started.entry.id);
    assert_eq!(resumed.entry.start_time, h.clock.now());
    assert!(resumed.entry.is_running);
    assert_eq!(resumed.entry.duration_seconds, None);

    // The paused session keeps its own duration
    let paused_again = h
        .remote
        .fetch_time_entry(started.entry.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(paused_again.duration_seconds, Some(125));
}

#[tokio::test(flavor = "multi_thread")]
async fn offline_deletes_queue_then_replay_in_order() {
    let h = harness(false).await;
    let mut ids = Vec::new();
    for title in ["one", "two", "three"] {
        let (task, _) = h
            .engine
            .applier()
            .create_task(NewTask::new(title))
            .await
            .unwrap();
        ids.push(task.id);
    }
    // Creates were queued too; clear them so only the deletes remain
    h.engine
        .queue()
        .drain(|_| async { Ok::<(), RemoteError>(()) })
        .await
        .unwrap();

    for id in &ids {
        let outcome = h.engine.applier().delete_task(*id).await.unwrap();
        assert!(matches!(outcome, ApplyOutcome::Queued { id: Some(_) }));
    }
    assert_eq!(h.engine.pending_count().await, 3);
    assert_eq!(h.remote.perform_count(), 0);

    h.engine.connectivity().set_online(true);
    let outcome = h.engine.trigger_sync().await;
    assert_eq!(outcome, SyncOutcome::Synced { applied: 3 });

    let replayed: Vec<_> = h.remote.performed();
    let expected: Vec<_> = ids
        .iter()
        .map(|id| MutationPayload::TaskDelete { id: *id })
        .collect();
    assert_eq!(replayed, expected);
    assert_eq!(h.engine.pending_count().await, 0);
    assert_eq!(h.engine.status().state, SyncState::Synced);
}

#[tokio::test(flavor = "multi_thread")]
async fn timer_started_offline_stops_after_reconnect() {
    let h = harness(false).await;
    let timer = h.engine.timer();
    let started = timer.start(Some(ProjectId::new()), None).await.unwrap();

    h.engine.connectivity().set_online(true);
    h.clock.advance(Duration::from_secs(30));
    let stopped = timer.stop(started.entry.id).await.unwrap();
    assert!(matches!(stopped.outcome, ApplyOutcome::Queued { id: Some(_) }));
    assert_eq!(h.engine.pending_count().await, 2);

    assert_eq!(
        h.engine.trigger_sync().await,
        SyncOutcome::Synced { applied: 2 }
    );
    let replayed: Vec<_> = h
        .remote
        .performed()
        .into_iter()
        .map(|payload| payload.action())
        .collect();
    assert_eq!(
        replayed,
        vec![
            crate::models::MutationAction::Create,
            crate::models::MutationAction::Update
        ]
    );

    let remote = h.remote.snapshot().time_entries;
    assert_eq!(remote.len(), 1);
    assert!(!remote[0].is_running);
    assert_eq!(remote[0].duration_seconds, Some(30));
    assert_eq!(h.engine.state().snapshot().time_entries, remote);
}

#[tokio::test(flavor = "multi_thread")]
async fn halted_replay_keeps_tail_for_next_trigger() {
    let h = harness(false).await;
    let mut ids = Vec::new();
    for title in ["a", "b", "c"] {
        let (task, _) = h
            .engine
            .applier()
            .create_task(NewTask::new(title))
            .await
            .unwrap();
        ids.push(task.id);
    }

    h.engine.connectivity().set_online(true);
    h.remote.fail_next_perform(RemoteError::Rejected {
        status: 500,
        message: "database busy".to_string(),
    });

    assert!(matches!(
        h.engine.trigger_sync().await,
        SyncOutcome::Failed(_)
    ));
    assert_eq!(h.engine.status().state, SyncState::Error);
    assert_eq!(h.engine.pending_count().await, 3);

    assert_eq!(
        h.engine.trigger_sync().await,
        SyncOutcome::Synced { applied: 3 }
    );
    let created: Vec<_> = h
        .remote
        .snapshot()
        .tasks
        .into_iter()
        .map(|task| task.id)
        .collect();
    assert_eq!(created, ids);
}

#[tokio::test(flavor = "multi_thread")]
async fn optimistic_toggle_agrees_with_refresh() {
    let h = harness(true).await;
    let (task, outcome) = h
        .engine
        .applier()
        .create_task(NewTask::new("Review PR"))
        .await
        .unwrap();
    assert_eq!(outcome, ApplyOutcome::Confirmed);

    h.engine.applier().toggle_task(task.id).await.unwrap();
    let local = h.engine.state().snapshot();

    h.engine.trigger_sync().await;
    let refreshed = h.engine.state().snapshot();
    assert_eq!(refreshed.tasks.len(), 1);
    assert_eq!(refreshed.tasks[0].status, TaskStatus::Done);
    assert_eq!(refreshed.tasks[0].status, local.tasks[0].status);
}

#[tokio::test(flavor = "multi_thread")]
async fn started_engine_refreshes_on_push_and_stops_cleanly() {
    let h = harness(true).await;
    h.engine.start();
    h.engine.start();
    assert!(h.engine.is_running());

    wait_until(|| h.engine.status().last_synced_at.is_some()).await;
    wait_until(|| h.feed.subscriber_count() == 1).await;

    let other_device = crate::models::TimeEntry::start(ProjectId::new(), None, h.clock.now());
    h.remote.put_time_entry(other_device.clone());
    h.feed.publish(ChangeEvent {
        table: EntityTable::TimeEntries,
        event_type: ChangeKind::Insert,
        new_value: Some(serde_json::to_value(&other_device).unwrap()),
        old_value: None,
    });

    wait_until(|| h.engine.state().time_entry(other_device.id).is_some()).await;
    assert_eq!(h.engine.timer().running(), vec![other_device]);

    h.engine.shutdown().await;
    h.engine.shutdown().await;
    assert!(!h.engine.is_running());
    assert_eq!(h.feed.subscriber_count(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn started_engine_without_push_still_polls() {
    let h = harness_with(
        true,
        SyncSettings {
            poll_interval: Duration::from_millis(100),
            retry_base: Duration::from_millis(20),
        },
    )
    .await;
    h.engine.start();
    wait_until(|| h.engine.status().last_synced_at.is_some()).await;

    // Nothing is ever published to the feed
    let other_device = crate::models::TimeEntry::start(ProjectId::new(), None, h.clock.now());
    h.remote.put_time_entry(other_device.clone());

    wait_until(|| h.engine.state().time_entry(other_device.id).is_some()).await;
    h.engine.shutdown().await;
}

#[tokio::test]
async fn offline_view_is_rebuilt_from_queue() {
    let h = harness(false).await;
    let project = ProjectId::new();
    let (task, _) = h
        .engine
        .applier()
        .create_task(NewTask::new("Draft"))
        .await
        .unwrap();
    h.engine.applier().toggle_task(task.id).await.unwrap();
    let started = h.engine.timer().start(Some(project), None).await.unwrap();

    // A fresh view over the same queue, as a new process would see it
    h.engine.state().apply_snapshot(RemoteSnapshot::default());
    assert!(h.engine.state().snapshot().tasks.is_empty());

    assert_eq!(h.engine.restore_pending_view().await.unwrap(), 3);
    let view = h.engine.state().snapshot();
    assert_eq!(view.tasks.len(), 1);
    assert_eq!(view.tasks[0].status, TaskStatus::Done);
    assert_eq!(h.engine.timer().running(), vec![started.entry]);
}
