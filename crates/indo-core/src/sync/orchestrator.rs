use std::future::pending;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::{Backoff, LifecycleEvent, LifecycleEvents, Refresher, SyncOutcome, SyncTrigger};
use crate::connectivity::ConnectivityMonitor;
use crate::models::{SyncState, SyncStatus};
use crate::queue::{DrainReport, MutationQueue};
use crate::remote::RemoteStore;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(45);
pub const DEFAULT_RETRY_BASE: Duration = Duration::from_secs(5);
/// Bounds applied to `poll_interval` before the loop schedules anything
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(10);
pub const MAX_POLL_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Timing for the background trigger loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncSettings {
    pub poll_interval: Duration,
    /// First retry delay after a failed pass; doubles up to `poll_interval`
    pub retry_base: Duration,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            retry_base: DEFAULT_RETRY_BASE,
        }
    }
}

/// Owns the sync status and runs reconciliation passes.
pub struct SyncOrchestrator {
    queue: MutationQueue,
    remote: Arc<dyn RemoteStore>,
    refresher: Refresher,
    connectivity: ConnectivityMonitor,
    status: watch::Sender<SyncStatus>,
    in_flight: AtomicBool,
    settings: SyncSettings,
}

struct FailedPass {
    message: String,
    unreachable: bool,
}

impl SyncOrchestrator {
    pub fn new(
        queue: MutationQueue,
        remote: Arc<dyn RemoteStore>,
        refresher: Refresher,
        connectivity: ConnectivityMonitor,
        settings: SyncSettings,
    ) -> Self {
        let initial = SyncStatus {
            state: if connectivity.is_online() {
                SyncState::Synced
            } else {
                SyncState::Offline
            },
            last_synced_at: None,
        };
        let (status, _) = watch::channel(initial);
        Self {
            queue,
            remote,
            refresher,
            connectivity,
            status,
            in_flight: AtomicBool::new(false),
            settings,
        }
    }

    pub fn status(&self) -> SyncStatus {
        *self.status.borrow()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<SyncStatus> {
        self.status.subscribe()
    }

    /// Pending queue size; zero when storage cannot be read
    pub async fn pending_count(&self) -> usize {
        match self.queue.count().await {
            Ok(count) => count,
            Err(error) => {
                tracing::warn!("Failed to count pending mutations: {error}");
                0
            }
        }
    }

    pub const fn settings(&self) -> SyncSettings {
        self.settings
    }

    /// Explicit "sync now" request
    pub async fn trigger_sync(&self) -> SyncOutcome {
        self.perform_sync(SyncTrigger::Manual).await
    }

    /// Run one reconciliation pass.
    ///
    /// Collapses to [`SyncOutcome::Skipped`] while another pass is in
    /// flight. Failures are classified into the status and never returned
    /// as errors.
    pub async fn perform_sync(&self, trigger: SyncTrigger) -> SyncOutcome {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!("Sync pass already in flight; ignoring {trigger} trigger");
            return SyncOutcome::Skipped;
        }
        let _in_flight = InFlight(&self.in_flight);

        if !self.connectivity.is_online() {
            self.set_state(SyncState::Offline);
            return SyncOutcome::Offline;
        }

        tracing::debug!("Starting sync pass ({trigger})");
        self.set_state(SyncState::Syncing);

        match self.reconcile().await {
            Ok(applied) => {
                self.status.send_modify(|status| {
                    status.state = SyncState::Synced;
                    status.last_synced_at = Some(Utc::now());
                });
                tracing::info!("Sync pass ({trigger}) complete; {applied} queued change(s) applied");
                SyncOutcome::Synced { applied }
            }
            Err(failure) => {
                if failure.unreachable {
                    tracing::warn!("Sync pass ({trigger}) lost connection: {}", failure.message);
                    self.set_state(SyncState::Offline);
                } else {
                    tracing::error!("Sync pass ({trigger}) failed: {}", failure.message);
                    self.set_state(SyncState::Error);
                }
                SyncOutcome::Failed(failure.message)
            }
        }
    }

    async fn reconcile(&self) -> Result<usize, FailedPass> {
        let remote = Arc::clone(&self.remote);
        let report = self
            .queue
            .drain(move |mutation| {
                let remote = Arc::clone(&remote);
                async move { remote.perform(&mutation.payload).await }
            })
            .await
            .map_err(|error| FailedPass {
                message: format!("queue unavailable: {error}"),
                unreachable: false,
            })?;

        let applied = match report {
            DrainReport::Completed { applied } => applied,
            // Someone else is replaying; the refresh below is still useful
            DrainReport::AlreadyRunning => 0,
            DrainReport::Halted {
                failed,
                error,
                unreachable,
                remaining,
                ..
            } => {
                return Err(FailedPass {
                    message: format!("replay of {failed} failed ({remaining} pending): {error}"),
                    unreachable,
                });
            }
        };

        self.refresher
            .refresh()
            .await
            .map_err(|error| FailedPass {
                message: format!("refresh failed: {error}"),
                unreachable: error.is_connectivity(),
            })?;
        Ok(applied)
    }

    fn set_state(&self, state: SyncState) {
        self.status.send_if_modified(|status| {
            if status.state == state {
                false
            } else {
                status.state = state;
                true
            }
        });
    }

    /// Start the background trigger loop.
    ///
    /// The loop runs a startup pass, then reacts to ticks, reconnects,
    /// lifecycle events and retry deadlines until the handle is shut down.
    pub fn spawn(self: &Arc<Self>, lifecycle: LifecycleEvents) -> SyncHandle {
        let cancel = CancellationToken::new();
        // Subscribe before spawning so no transition is missed
        let signals = Signals {
            lifecycle: lifecycle.subscribe(),
            online: self.connectivity.subscribe(),
            _events: lifecycle,
        };
        let task = tokio::spawn(run_loop(Arc::clone(self), signals, cancel.clone()));
        SyncHandle { cancel, task }
    }
}

struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

struct Signals {
    lifecycle: broadcast::Receiver<LifecycleEvent>,
    online: watch::Receiver<bool>,
    // Keeps the lifecycle channel open for the loop's lifetime
    _events: LifecycleEvents,
}

async fn run_loop(
    orchestrator: Arc<SyncOrchestrator>,
    signals: Signals,
    cancel: CancellationToken,
) {
    let poll_interval = orchestrator
        .settings
        .poll_interval
        .clamp(MIN_POLL_INTERVAL, MAX_POLL_INTERVAL);
    let backoff = Backoff::new(orchestrator.settings.retry_base, poll_interval, true);
    let Signals {
        lifecycle: mut lifecycle_rx,
        online: mut online_rx,
        _events,
    } = signals;

    let mut ticker = tokio::time::interval_at(deadline_after(poll_interval), poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut consecutive_failures = 0u32;
    let mut retry_at: Option<Instant> = None;
    let mut trigger = Some(SyncTrigger::Startup);

    tracing::info!(
        "Sync scheduler started (interval {}s)",
        poll_interval.as_secs()
    );

    loop {
        if let Some(current) = trigger.take() {
            match orchestrator.perform_sync(current).await {
                SyncOutcome::Synced { .. } => {
                    consecutive_failures = 0;
                    retry_at = None;
                }
                SyncOutcome::Failed(_) => {
                    let delay = backoff.delay(consecutive_failures);
                    consecutive_failures = consecutive_failures.saturating_add(1);
                    tracing::debug!(
                        "Retrying sync in {}ms (consecutive failures: {consecutive_failures})",
                        delay.as_millis()
                    );
                    retry_at = Some(deadline_after(delay));
                }
                SyncOutcome::Offline => retry_at = None,
                SyncOutcome::Skipped => {}
            }
        }

        let retry = async move {
            match retry_at {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => pending::<()>().await,
            }
        };

        tokio::select! {
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {
                if orchestrator.connectivity.is_online() {
                    trigger = Some(SyncTrigger::Interval);
                }
            }
            changed = online_rx.changed() => {
                if changed.is_err() {
                    tracing::warn!("Connectivity monitor dropped; stopping sync scheduler");
                    break;
                }
                let online = *online_rx.borrow_and_update();
                if !online {
                    orchestrator.set_state(SyncState::Offline);
                    retry_at = None;
                } else if orchestrator.connectivity.verify_connectivity().await {
                    trigger = Some(SyncTrigger::Reconnected);
                } else {
                    tracing::warn!("Interface is up but the backend is unreachable; waiting");
                }
            }
            event = lifecycle_rx.recv() => {
                match event {
                    Ok(LifecycleEvent::FocusGained) => trigger = Some(SyncTrigger::Focus),
                    Ok(LifecycleEvent::Visible) => trigger = Some(SyncTrigger::Visible),
                    // Missed events collapse into one pass
                    Err(RecvError::Lagged(_)) => trigger = Some(SyncTrigger::Focus),
                    Err(RecvError::Closed) => break,
                }
            }
            () = retry => {
                retry_at = None;
                trigger = Some(SyncTrigger::Retry);
            }
        }
    }

    tracing::info!("Sync scheduler stopped");
}

/// `now + delay`, saturating at the furthest representable instant
fn deadline_after(delay: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(delay)
        .or_else(|| now.checked_add(MAX_POLL_INTERVAL))
        .unwrap_or(now)
}

/// Handle to the running trigger loop
pub struct SyncHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl SyncHandle {
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop the loop and wait for it to exit.
    ///
    /// A pass already in flight finishes first.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(error) = self.task.await {
            tracing::warn!("Sync scheduler task ended abnormally: {error}");
        }
    }
}
