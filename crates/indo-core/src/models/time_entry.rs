//! Time entry model (one timer session)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ProjectId, TaskId, TimeEntryId};

/// Lifecycle state of a timer session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerState {
    Running,
    /// Terminal. Pausing also lands here.
    Stopped,
}

/// One continuous or completed interval of tracked time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeEntry {
    pub id: TimeEntryId,
    pub project_id: ProjectId,
    #[serde(default)]
    pub task_id: Option<TaskId>,
    pub start_time: DateTime<Utc>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub duration_seconds: Option<i64>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub is_manual: bool,
    pub is_running: bool,
}

impl TimeEntry {
    /// Start a new running session at `now`
    #[must_use]
    pub fn start(project_id: ProjectId, task_id: Option<TaskId>, now: DateTime<Utc>) -> Self {
        Self {
            id: TimeEntryId::new(),
            project_id,
            task_id,
            start_time: now,
            end_time: None,
            duration_seconds: None,
            notes: None,
            is_manual: false,
            is_running: true,
        }
    }

    /// A completed, manually logged session
    #[must_use]
    pub fn manual(
        project_id: ProjectId,
        task_id: Option<TaskId>,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        notes: Option<String>,
    ) -> Self {
        Self {
            id: TimeEntryId::new(),
            project_id,
            task_id,
            start_time,
            end_time: Some(end_time),
            duration_seconds: Some(duration_between(start_time, end_time)),
            notes,
            is_manual: true,
            is_running: false,
        }
    }

    pub const fn state(&self) -> TimerState {
        if self.is_running {
            TimerState::Running
        } else {
            TimerState::Stopped
        }
    }

    /// Whether this session tracks the given project/task pair
    pub fn tracks(&self, project_id: ProjectId, task_id: Option<TaskId>) -> bool {
        self.project_id == project_id && self.task_id == task_id
    }

    /// Close the session at `now`.
    ///
    /// Duration comes from the two timestamps, never from accumulated ticks.
    #[must_use]
    pub fn finished(&self, now: DateTime<Utc>) -> Self {
        Self {
            end_time: Some(now),
            duration_seconds: Some(duration_between(self.start_time, now)),
            is_running: false,
            ..self.clone()
        }
    }

    /// Seconds tracked so far; live for running sessions.
    pub fn elapsed_seconds(&self, now: DateTime<Utc>) -> i64 {
        match (self.duration_seconds, self.end_time) {
            (Some(duration), _) => duration,
            (None, Some(end)) => duration_between(self.start_time, end),
            (None, None) => duration_between(self.start_time, now),
        }
    }
}

/// `floor((end - start) / 1000)` in whole seconds, clamped at zero.
pub fn duration_between(start: DateTime<Utc>, end: DateTime<Utc>) -> i64 {
    let millis = (end - start).num_milliseconds();
    millis.max(0).div_euclid(1000)
}

/// Project/task pair handed back by `pause` so the caller can offer resume
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeHint {
    pub project_id: ProjectId,
    pub task_id: Option<TaskId>,
}

impl From<&TimeEntry> for ResumeHint {
    fn from(entry: &TimeEntry) -> Self {
        Self {
            project_id: entry.project_id,
            task_id: entry.task_id,
        }
    }
}
