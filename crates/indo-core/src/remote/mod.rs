//! Remote store contracts.
//!
//! The engine only needs three calls from the backend: apply one write,
//! fetch the full server-authoritative state, and re-read one timer session.

mod memory;
mod rest;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{MutationPayload, RemoteSnapshot, TimeEntry, TimeEntryId};

pub use memory::InMemoryRemoteStore;
pub use rest::{RestRemoteStore, RestRemoteStoreConfig};

#[derive(Debug, Error)]
pub enum RemoteError {
    /// Transport-level failure: DNS, refused connection, timeout
    #[error("Remote service unreachable: {0}")]
    Unreachable(String),
    /// The backend answered and refused the request
    #[error("Remote rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("Remote HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Invalid remote payload: {0}")]
    InvalidPayload(String),
    #[error("Change subscription failed: {0}")]
    Subscription(String),
}

impl RemoteError {
    /// Whether this failure means the remote could not be reached at all.
    pub const fn is_connectivity(&self) -> bool {
        matches!(self, Self::Unreachable(_))
    }
}

pub type RemoteResult<T> = Result<T, RemoteError>;

/// Remote write/read boundary.
///
/// Replaying an already-applied create must be safe; idempotency is the
/// implementor's responsibility.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Apply one write to the remote store
    async fn perform(&self, payload: &MutationPayload) -> RemoteResult<()>;

    /// Fetch the full current state
    async fn fetch_all(&self) -> RemoteResult<RemoteSnapshot>;

    /// Re-read one timer session; `None` when it does not exist
    async fn fetch_time_entry(&self, id: TimeEntryId) -> RemoteResult<Option<TimeEntry>>;
}
