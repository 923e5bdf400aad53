//! Queued mutation model
//!
//! A pending write is fully self-describing: the payload variant fixes the
//! target table and action, and carries every field the remote write needs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;
use std::str::FromStr;

use super::{MutationId, ProjectId, Task, TaskId, TaskStatus, TimeEntry, TimeEntryId};

/// Remote collection a mutation targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityTable {
    Tasks,
    Projects,
    Notes,
    TimeEntries,
}

impl EntityTable {
    /// Collections the change listener subscribes to by default
    pub const ALL: [Self; 4] = [Self::Tasks, Self::Projects, Self::Notes, Self::TimeEntries];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Tasks => "tasks",
            Self::Projects => "projects",
            Self::Notes => "notes",
            Self::TimeEntries => "time_entries",
        }
    }
}

impl fmt::Display for EntityTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityTable {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "tasks" => Ok(Self::Tasks),
            "projects" => Ok(Self::Projects),
            "notes" => Ok(Self::Notes),
            "time_entries" => Ok(Self::TimeEntries),
            other => Err(format!("unknown table '{other}'")),
        }
    }
}

/// Kind of remote write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationAction {
    Create,
    Update,
    Delete,
}

impl MutationAction {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for MutationAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One variant per `(table, action)` pair the engine issues
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MutationPayload {
    TaskCreate {
        task: Task,
    },
    TaskStatus {
        id: TaskId,
        status: TaskStatus,
        completed_at: Option<DateTime<Utc>>,
    },
    TaskDelete {
        id: TaskId,
    },
    TimeEntryCreate {
        entry: TimeEntry,
    },
    TimeEntryStop {
        id: TimeEntryId,
        end_time: DateTime<Utc>,
        duration_seconds: i64,
    },
    /// Re-attribute a stopped or manual session
    TimeEntryUpdate {
        id: TimeEntryId,
        project_id: ProjectId,
        task_id: Option<TaskId>,
        notes: Option<String>,
    },
    TimeEntryDelete {
        id: TimeEntryId,
    },
}

impl MutationPayload {
    pub const fn table(&self) -> EntityTable {
        match self {
            Self::TaskCreate { .. } | Self::TaskStatus { .. } | Self::TaskDelete { .. } => {
                EntityTable::Tasks
            }
            Self::TimeEntryCreate { .. }
            | Self::TimeEntryStop { .. }
            | Self::TimeEntryUpdate { .. }
            | Self::TimeEntryDelete { .. } => EntityTable::TimeEntries,
        }
    }

    pub const fn action(&self) -> MutationAction {
        match self {
            Self::TaskCreate { .. } | Self::TimeEntryCreate { .. } => MutationAction::Create,
            Self::TaskStatus { .. }
            | Self::TimeEntryStop { .. }
            | Self::TimeEntryUpdate { .. } => MutationAction::Update,
            Self::TaskDelete { .. } | Self::TimeEntryDelete { .. } => MutationAction::Delete,
        }
    }

    /// Id of the remote row the write addresses
    pub fn target_id(&self) -> String {
        match self {
            Self::TaskCreate { task } => task.id.as_str(),
            Self::TaskStatus { id, .. } | Self::TaskDelete { id } => id.as_str(),
            Self::TimeEntryCreate { entry } => entry.id.as_str(),
            Self::TimeEntryStop { id, .. }
            | Self::TimeEntryUpdate { id, .. }
            | Self::TimeEntryDelete { id } => id.as_str(),
        }
    }

    /// Column/value map sent as the remote write body.
    ///
    /// Deletes carry no body.
    pub fn to_fields(&self) -> serde_json::Result<Map<String, Value>> {
        let value = match self {
            Self::TaskCreate { task } => serde_json::to_value(task)?,
            Self::TaskStatus {
                status,
                completed_at,
                ..
            } => json!({
                "status": status,
                "completed_at": completed_at,
                "updated_at": Utc::now(),
            }),
            Self::TimeEntryCreate { entry } => serde_json::to_value(entry)?,
            Self::TimeEntryStop {
                end_time,
                duration_seconds,
                ..
            } => json!({
                "end_time": end_time,
                "duration_seconds": duration_seconds,
                "is_running": false,
                "updated_at": end_time,
            }),
            Self::TimeEntryUpdate {
                project_id,
                task_id,
                notes,
                ..
            } => json!({
                "project_id": project_id,
                "task_id": task_id,
                "notes": notes,
                "updated_at": Utc::now(),
            }),
            Self::TaskDelete { .. } | Self::TimeEntryDelete { .. } => return Ok(Map::new()),
        };

        match value {
            Value::Object(map) => Ok(map),
            _ => Ok(Map::new()),
        }
    }
}

/// One pending write awaiting remote application
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedMutation {
    /// Queue primary key
    pub id: MutationId,
    /// Self-describing write
    pub payload: MutationPayload,
    /// Enqueue timestamp (Unix ms); establishes replay order
    pub created_at: i64,
}

impl QueuedMutation {
    /// Wrap a payload with a fresh id stamped at the current time
    #[must_use]
    pub fn new(payload: MutationPayload) -> Self {
        Self {
            id: MutationId::new(),
            payload,
            created_at: crate::util::unix_millis_now(),
        }
    }

    pub const fn entity_table(&self) -> EntityTable {
        self.payload.table()
    }

    pub const fn action(&self) -> MutationAction {
        self.payload.action()
    }
}

impl From<MutationPayload> for QueuedMutation {
    fn from(payload: MutationPayload) -> Self {
        Self::new(payload)
    }
}
