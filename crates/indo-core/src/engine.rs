//! Composition root.
//!
//! [`SyncEngine`] owns the single queue instance and hands the same
//! handles to every component that needs them.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::watch;

use crate::config::EngineConfig;
use crate::connectivity::{ConnectivityMonitor, HttpHealthProbe};
use crate::listener::{BroadcastChangeFeed, ChangeFeed, RemoteChangeListener};
use crate::models::{EntityTable, RemoteSnapshot, SyncStatus};
use crate::optimistic::{LocalState, OptimisticApplier};
use crate::queue::MutationQueue;
use crate::remote::{RemoteStore, RestRemoteStore, RestRemoteStoreConfig};
use crate::sync::{
    LifecycleEvent, LifecycleEvents, Refresher, SnapshotSink, SyncHandle, SyncOrchestrator,
    SyncOutcome, SyncSettings,
};
use crate::timer::{Clock, SystemClock, TimerService};
use crate::Result;

/// Explicit collaborators for [`SyncEngine::with_parts`]
pub struct EngineParts {
    pub queue: MutationQueue,
    pub remote: Arc<dyn RemoteStore>,
    pub connectivity: ConnectivityMonitor,
    pub feed: Arc<dyn ChangeFeed>,
    pub clock: Arc<dyn Clock>,
    pub settings: SyncSettings,
    pub realtime_tables: Vec<EntityTable>,
}

struct Running {
    sync: SyncHandle,
    listener: RemoteChangeListener,
}

pub struct SyncEngine {
    queue: MutationQueue,
    connectivity: ConnectivityMonitor,
    state: LocalState,
    applier: OptimisticApplier,
    timer: TimerService,
    orchestrator: Arc<SyncOrchestrator>,
    refresher: Refresher,
    feed: Arc<dyn ChangeFeed>,
    realtime_tables: Vec<EntityTable>,
    lifecycle: LifecycleEvents,
    running: Mutex<Option<Running>>,
}

impl SyncEngine {
    /// Build the engine against the configured REST backend.
    ///
    /// Push notifications arrive through the returned in-process feed; the
    /// host publishes whatever its realtime transport delivers.
    pub async fn open(
        config: &EngineConfig,
        initially_online: bool,
    ) -> Result<(Self, BroadcastChangeFeed)> {
        let queue = MutationQueue::open_path(config.resolved_queue_path()).await?;
        let remote = RestRemoteStore::new(
            RestRemoteStoreConfig::new(&config.api_base_url, &config.api_key)
                .with_access_token(config.access_token.clone()),
        )?;
        let probe = HttpHealthProbe::new(
            &config.api_base_url,
            &config.health_path,
            config.probe_timeout(),
        )?;
        let feed = BroadcastChangeFeed::default();

        let engine = Self::with_parts(EngineParts {
            queue,
            remote: Arc::new(remote),
            connectivity: ConnectivityMonitor::new(initially_online, Arc::new(probe)),
            feed: Arc::new(feed.clone()),
            clock: Arc::new(SystemClock),
            settings: SyncSettings {
                poll_interval: config.poll_interval(),
                ..SyncSettings::default()
            },
            realtime_tables: config.realtime_tables.clone(),
        });
        Ok((engine, feed))
    }

    pub fn with_parts(parts: EngineParts) -> Self {
        let state = LocalState::new();
        let refresher = Refresher::new(Arc::clone(&parts.remote), Arc::new(state.clone()));
        let applier = OptimisticApplier::new(
            state.clone(),
            parts.queue.clone(),
            Arc::clone(&parts.remote),
            parts.connectivity.clone(),
        );
        let timer = TimerService::new(applier.clone(), Arc::clone(&parts.remote), parts.clock);
        let orchestrator = Arc::new(SyncOrchestrator::new(
            parts.queue.clone(),
            parts.remote,
            refresher.clone(),
            parts.connectivity.clone(),
            parts.settings,
        ));

        Self {
            queue: parts.queue,
            connectivity: parts.connectivity,
            state,
            applier,
            timer,
            orchestrator,
            refresher,
            feed: parts.feed,
            realtime_tables: parts.realtime_tables,
            lifecycle: LifecycleEvents::new(),
            running: Mutex::new(None),
        }
    }

    /// Start the sync scheduler and change listener; no-op if running.
    pub fn start(&self) {
        let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        if running.is_some() {
            return;
        }

        let sync = self.orchestrator.spawn(self.lifecycle.clone());
        let listener = RemoteChangeListener::spawn(
            Arc::clone(&self.feed),
            self.realtime_tables.clone(),
            self.refresher.clone(),
            &self.connectivity,
        );
        *running = Some(Running { sync, listener });
        tracing::info!("Sync engine started");
    }

    /// Stop background work and wait for it to finish.
    pub async fn shutdown(&self) {
        let running = self
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(running) = running {
            running.listener.close().await;
            running.sync.shutdown().await;
            tracing::info!("Sync engine stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    pub const fn timer(&self) -> &TimerService {
        &self.timer
    }

    pub const fn applier(&self) -> &OptimisticApplier {
        &self.applier
    }

    pub const fn state(&self) -> &LocalState {
        &self.state
    }

    pub const fn queue(&self) -> &MutationQueue {
        &self.queue
    }

    pub const fn connectivity(&self) -> &ConnectivityMonitor {
        &self.connectivity
    }

    pub const fn orchestrator(&self) -> &Arc<SyncOrchestrator> {
        &self.orchestrator
    }

    /// Forward a platform lifecycle signal to the scheduler
    pub fn notify(&self, event: LifecycleEvent) {
        self.lifecycle.emit(event);
    }

    pub fn status(&self) -> SyncStatus {
        self.orchestrator.status()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<SyncStatus> {
        self.orchestrator.subscribe_status()
    }

    pub async fn trigger_sync(&self) -> SyncOutcome {
        self.orchestrator.trigger_sync().await
    }

    pub async fn pending_count(&self) -> usize {
        self.orchestrator.pending_count().await
    }

    /// Rebuild the local view from queued writes alone.
    ///
    /// Used by short-lived hosts that start offline with nothing cached;
    /// returns how many queued writes were replayed onto the empty view.
    pub async fn restore_pending_view(&self) -> Result<usize> {
        let pending = self.queue.pending().await?;
        let mut snapshot = RemoteSnapshot::default();
        for mutation in &pending {
            snapshot.apply(&mutation.payload);
        }
        self.state.apply_snapshot(snapshot);
        Ok(pending.len())
    }
}
