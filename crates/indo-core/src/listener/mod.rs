//! Remote change listener.
//!
//! Holds a push subscription while online and refreshes the local view on
//! every change notification. Notifications never drain the queue: the
//! remote already holds the change.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::connectivity::ConnectivityMonitor;
use crate::models::EntityTable;
use crate::remote::{RemoteError, RemoteResult};
use crate::sync::Refresher;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// One push notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub table: EntityTable,
    pub event_type: ChangeKind,
    #[serde(default)]
    pub new_value: Option<Value>,
    #[serde(default)]
    pub old_value: Option<Value>,
}

/// Live subscription to change notifications for a set of tables
pub struct ChangeSubscription {
    tables: Vec<EntityTable>,
    events: broadcast::Receiver<ChangeEvent>,
}

impl ChangeSubscription {
    pub fn new(tables: Vec<EntityTable>, events: broadcast::Receiver<ChangeEvent>) -> Self {
        Self { tables, events }
    }

    pub fn tables(&self) -> &[EntityTable] {
        &self.tables
    }

    /// Next event on a subscribed table; `None` once the feed is gone.
    pub async fn next(&mut self) -> Option<ChangeEvent> {
        loop {
            match self.events.recv().await {
                Ok(event) if self.tables.contains(&event.table) => return Some(event),
                Ok(_) => {}
                // A refresh reads everything, so missed events need no replay
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!("Change subscription lagged by {skipped} event(s)");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}

/// Push notification source
#[async_trait]
pub trait ChangeFeed: Send + Sync {
    async fn subscribe(&self, tables: &[EntityTable]) -> RemoteResult<ChangeSubscription>;
}

/// In-process feed; publishers call [`publish`](Self::publish).
#[derive(Debug, Clone)]
pub struct BroadcastChangeFeed {
    sender: broadcast::Sender<ChangeEvent>,
}

impl BroadcastChangeFeed {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Deliver an event; returns how many subscriptions received it
    pub fn publish(&self, event: ChangeEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for BroadcastChangeFeed {
    fn default() -> Self {
        Self::new(64)
    }
}

#[async_trait]
impl ChangeFeed for BroadcastChangeFeed {
    async fn subscribe(&self, tables: &[EntityTable]) -> RemoteResult<ChangeSubscription> {
        if tables.is_empty() {
            return Err(RemoteError::Subscription(
                "no tables to subscribe to".to_string(),
            ));
        }
        Ok(ChangeSubscription::new(
            tables.to_vec(),
            self.sender.subscribe(),
        ))
    }
}

/// Background task that keeps a change subscription alive while online.
pub struct RemoteChangeListener {
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl RemoteChangeListener {
    pub fn spawn(
        feed: Arc<dyn ChangeFeed>,
        tables: Vec<EntityTable>,
        refresher: Refresher,
        connectivity: &ConnectivityMonitor,
    ) -> Self {
        let cancel = CancellationToken::new();
        let online = connectivity.subscribe();
        let task = tokio::spawn(run(feed, tables, refresher, online, cancel.clone()));
        Self {
            cancel,
            task: Mutex::new(Some(task)),
        }
    }

    /// Tear down the subscription; safe to call more than once.
    pub async fn close(&self) {
        self.cancel.cancel();
        let task = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            if let Err(error) = task.await {
                tracing::warn!("Change listener task ended abnormally: {error}");
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for RemoteChangeListener {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run(
    feed: Arc<dyn ChangeFeed>,
    tables: Vec<EntityTable>,
    refresher: Refresher,
    mut online: tokio::sync::watch::Receiver<bool>,
    cancel: CancellationToken,
) {
    let mut subscription: Option<ChangeSubscription> = None;
    let mut connected = *online.borrow_and_update();
    if connected {
        subscription = open(feed.as_ref(), &tables).await;
    }

    loop {
        let next_event = async {
            match subscription.as_mut() {
                Some(active) => active.next().await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            () = cancel.cancelled() => break,
            changed = online.changed() => {
                if changed.is_err() {
                    break;
                }
                let now_online = *online.borrow_and_update();
                if now_online == connected {
                    continue;
                }
                connected = now_online;
                if connected {
                    subscription = open(feed.as_ref(), &tables).await;
                } else if subscription.take().is_some() {
                    tracing::info!("Offline; change subscription closed");
                }
            }
            event = next_event => match event {
                Some(event) => {
                    tracing::debug!("Remote {:?} on {}; refreshing", event.event_type, event.table);
                    if let Err(error) = refresher.refresh().await {
                        tracing::warn!("Refresh after remote change failed: {error}");
                    }
                }
                None => {
                    // Feed went away; wait for the next online transition
                    tracing::warn!("Change feed closed; resubscribing on next reconnect");
                    subscription = None;
                }
            },
        }
    }

    tracing::debug!("Change listener stopped");
}

async fn open(feed: &dyn ChangeFeed, tables: &[EntityTable]) -> Option<ChangeSubscription> {
    match feed.subscribe(tables).await {
        Ok(subscription) => {
            tracing::info!("Subscribed to changes on {} table(s)", tables.len());
            Some(subscription)
        }
        Err(error) => {
            tracing::warn!("Change subscription failed; retrying on next reconnect: {error}");
            None
        }
    }
}
