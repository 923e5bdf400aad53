//! indo-core - offline-resilient sync engine for In-Do-Time
//!
//! This crate keeps tasks and timer sessions usable without a network:
//! every action lands in the local view immediately, writes made offline
//! wait in a durable queue, and a background orchestrator replays them in
//! order and refreshes server state once the backend is reachable again.

pub mod config;
pub mod connectivity;
pub mod db;
pub mod engine;
pub mod error;
pub mod listener;
pub mod models;
pub mod optimistic;
pub mod queue;
pub mod remote;
pub mod sync;
pub mod timer;
pub mod util;

#[cfg(test)]
mod tests;

pub use engine::{EngineParts, SyncEngine};
pub use error::{Error, Result};
pub use models::{
    MutationPayload, ProjectId, QueuedMutation, SyncState, SyncStatus, Task, TaskId, TimeEntry,
    TimeEntryId,
};
