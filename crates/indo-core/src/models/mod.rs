//! Data models for In-Do-Time

mod ids;
mod mutation;
mod snapshot;
mod sync_status;
mod task;
mod time_entry;

pub use ids::{MutationId, ProjectId, TaskId, TimeEntryId};
pub use mutation::{EntityTable, MutationAction, MutationPayload, QueuedMutation};
pub use snapshot::RemoteSnapshot;
pub use sync_status::{SyncState, SyncStatus};
pub use task::{NewTask, Priority, Task, TaskStatus};
pub use time_entry::{duration_between, ResumeHint, TimeEntry, TimerState};
