//! Reconciliation between local intent and the remote store.
//!
//! The orchestrator drains the durable queue, refreshes server state and
//! owns the published [`SyncStatus`](crate::models::SyncStatus). Passes are
//! started by a periodic tick, reconnects, app lifecycle events, failed-pass
//! retries, or an explicit request.

mod backoff;
mod orchestrator;
mod refresh;

use std::fmt;

use tokio::sync::broadcast;

pub use backoff::Backoff;
pub use orchestrator::{SyncHandle, SyncOrchestrator, SyncSettings};
pub use refresh::{Refresher, SnapshotSink};

/// What started a reconciliation pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncTrigger {
    Startup,
    Interval,
    Reconnected,
    Focus,
    Visible,
    Manual,
    Retry,
}

impl SyncTrigger {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Startup => "startup",
            Self::Interval => "interval",
            Self::Reconnected => "reconnected",
            Self::Focus => "focus",
            Self::Visible => "visible",
            Self::Manual => "manual",
            Self::Retry => "retry",
        }
    }
}

impl fmt::Display for SyncTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one `perform_sync` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Another pass was in flight
    Skipped,
    /// The passive flag was down; no network call was made
    Offline,
    Synced { applied: usize },
    Failed(String),
}

/// Platform lifecycle signals that should prompt a pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    FocusGained,
    Visible,
}

/// Subscription point for lifecycle signals.
///
/// The host application calls [`emit`](Self::emit); the orchestrator loop
/// holds a receiver until its handle is shut down.
#[derive(Debug, Clone)]
pub struct LifecycleEvents {
    sender: broadcast::Sender<LifecycleEvent>,
}

impl LifecycleEvents {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(16);
        Self { sender }
    }

    pub fn emit(&self, event: LifecycleEvent) {
        // No receivers just means no loop is running yet
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.sender.subscribe()
    }
}

impl Default for LifecycleEvents {
    fn default() -> Self {
        Self::new()
    }
}
