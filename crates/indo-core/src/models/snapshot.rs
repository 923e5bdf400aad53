//! Server-authoritative state returned by a full refresh

use serde::{Deserialize, Serialize};

use super::{MutationPayload, Task, TimeEntry};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteSnapshot {
    pub tasks: Vec<Task>,
    pub time_entries: Vec<TimeEntry>,
}

impl RemoteSnapshot {
    /// Apply one write the way the backend would.
    ///
    /// Creates of an existing id are ignored; updates and deletes of a
    /// missing row do nothing.
    pub fn apply(&mut self, payload: &MutationPayload) {
        match payload {
            MutationPayload::TaskCreate { task } => {
                if !self.tasks.iter().any(|row| row.id == task.id) {
                    self.tasks.push(task.clone());
                }
            }
            MutationPayload::TaskStatus {
                id,
                status,
                completed_at,
            } => {
                if let Some(task) = self.tasks.iter_mut().find(|row| row.id == *id) {
                    task.status = *status;
                    task.completed_at = *completed_at;
                }
            }
            MutationPayload::TaskDelete { id } => self.tasks.retain(|row| row.id != *id),
            MutationPayload::TimeEntryCreate { entry } => {
                if !self.time_entries.iter().any(|row| row.id == entry.id) {
                    self.time_entries.push(entry.clone());
                }
            }
            MutationPayload::TimeEntryStop {
                id,
                end_time,
                duration_seconds,
            } => {
                if let Some(entry) = self.time_entries.iter_mut().find(|row| row.id == *id) {
                    entry.end_time = Some(*end_time);
                    entry.duration_seconds = Some(*duration_seconds);
                    entry.is_running = false;
                }
            }
            MutationPayload::TimeEntryUpdate {
                id,
                project_id,
                task_id,
                notes,
            } => {
                if let Some(entry) = self.time_entries.iter_mut().find(|row| row.id == *id) {
                    entry.project_id = *project_id;
                    entry.task_id = *task_id;
                    entry.notes.clone_from(notes);
                }
            }
            MutationPayload::TimeEntryDelete { id } => {
                self.time_entries.retain(|row| row.id != *id);
            }
        }
    }
}
