//! Server-authoritative refresh path shared by the orchestrator and listener.

use std::sync::Arc;

use crate::models::RemoteSnapshot;
use crate::remote::{RemoteResult, RemoteStore};

/// Receives fresh remote state for the view collaborators
pub trait SnapshotSink: Send + Sync {
    fn apply_snapshot(&self, snapshot: RemoteSnapshot);
}

/// Fetches the full remote state and hands it to a sink.
#[derive(Clone)]
pub struct Refresher {
    remote: Arc<dyn RemoteStore>,
    sink: Arc<dyn SnapshotSink>,
}

impl Refresher {
    pub fn new(remote: Arc<dyn RemoteStore>, sink: Arc<dyn SnapshotSink>) -> Self {
        Self { remote, sink }
    }

    pub async fn refresh(&self) -> RemoteResult<()> {
        let snapshot = self.remote.fetch_all().await?;
        tracing::debug!(
            "Refreshed {} task(s) and {} time entries",
            snapshot.tasks.len(),
            snapshot.time_entries.len()
        );
        self.sink.apply_snapshot(snapshot);
        Ok(())
    }
}
