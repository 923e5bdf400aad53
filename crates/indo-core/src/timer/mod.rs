//! Timer lifecycle.
//!
//! A session is either running or stopped. Pause is a stop that also hands
//! back the project/task pair so the caller can offer a one-tap resume;
//! resuming always starts a new session.

mod clock;

use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};

use crate::models::{MutationPayload, ProjectId, ResumeHint, TaskId, TimeEntry, TimeEntryId};
use crate::optimistic::{ApplyOutcome, OptimisticApplier, Revert, ViewState};
use crate::remote::RemoteStore;
use crate::util::normalize_text_option;
use crate::{Error, Result};

pub use clock::{Clock, ManualClock, SystemClock};

/// Input for a manually logged, already finished session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManualEntry {
    pub project_id: Option<ProjectId>,
    pub task_id: Option<TaskId>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub notes: Option<String>,
}

/// New attribution for an existing session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryEdit {
    pub project_id: Option<ProjectId>,
    pub task_id: Option<TaskId>,
    pub notes: Option<String>,
}

/// Seconds tracked in one day, overall and per project
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimeSummary {
    pub total_seconds: i64,
    /// Ordered by first appearance in the view
    pub by_project: Vec<(ProjectId, i64)>,
}

impl TimeSummary {
    /// Sum sessions that started on the UTC day containing `now`
    pub fn for_day(entries: &[TimeEntry], now: DateTime<Utc>) -> Self {
        let today = now.date_naive();
        let mut summary = Self::default();
        for entry in entries
            .iter()
            .filter(|entry| entry.start_time.date_naive() == today)
        {
            let seconds = entry.elapsed_seconds(now);
            summary.total_seconds += seconds;
            match summary
                .by_project
                .iter_mut()
                .find(|(project_id, _)| *project_id == entry.project_id)
            {
                Some((_, total)) => *total += seconds,
                None => summary.by_project.push((entry.project_id, seconds)),
            }
        }
        summary
    }

    #[allow(clippy::cast_precision_loss)]
    pub fn total_hours(&self) -> f64 {
        (self.total_seconds as f64 / 36.0).round() / 100.0
    }
}

/// Result of a successful start or stop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerChange {
    pub entry: TimeEntry,
    pub outcome: ApplyOutcome,
}

#[derive(Clone)]
pub struct TimerService {
    applier: OptimisticApplier,
    remote: Arc<dyn RemoteStore>,
    clock: Arc<dyn Clock>,
    last_paused: Arc<Mutex<Option<ResumeHint>>>,
}

impl TimerService {
    pub fn new(
        applier: OptimisticApplier,
        remote: Arc<dyn RemoteStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            applier,
            remote,
            clock,
            last_paused: Arc::new(Mutex::new(None)),
        }
    }

    /// Begin a new running session.
    pub async fn start(
        &self,
        project_id: Option<ProjectId>,
        task_id: Option<TaskId>,
    ) -> Result<TimerChange> {
        let project_id = project_id
            .ok_or_else(|| Error::InvalidInput("A project is required to start a timer".into()))?;

        let running = self.applier.state().read(|view| {
            view.time_entries
                .iter()
                .find(|entry| entry.is_running && entry.tracks(project_id, task_id))
                .map(|entry| entry.id)
        });
        if let Some(existing) = running {
            return Err(Error::TimerAlreadyRunning(existing));
        }

        let entry = TimeEntry::start(project_id, task_id, self.clock.now());
        let outcome = self.insert_entry(entry.clone()).await?;
        tracing::info!("Started timer {} for project {project_id}", entry.id);
        Ok(TimerChange { entry, outcome })
    }

    /// Close a running session.
    ///
    /// The session is re-read first (remote when online and nothing for it
    /// is queued) so a session already stopped elsewhere is reported rather
    /// than stopped twice.
    pub async fn stop(&self, id: TimeEntryId) -> Result<TimerChange> {
        let current = self.load_entry(id).await?;
        if !current.is_running {
            return Err(Error::TimerNotRunning(id));
        }

        let stopped = current.finished(self.clock.now());
        let payload = MutationPayload::TimeEntryStop {
            id,
            end_time: stopped.end_time.unwrap_or_else(|| self.clock.now()),
            duration_seconds: stopped.duration_seconds.unwrap_or_default(),
        };

        let row = stopped.clone();
        let outcome = self
            .applier
            .apply(payload, move |view| {
                let previous = view.time_entry(id).cloned();
                view.upsert_time_entry(row);
                Ok(Box::new(move |view: &mut ViewState| match previous {
                    Some(previous) => view.upsert_time_entry(previous),
                    None => view.time_entries.retain(|entry| entry.id != id),
                }) as Revert)
            })
            .await?;

        tracing::info!(
            "Stopped timer {id} after {}s",
            stopped.duration_seconds.unwrap_or_default()
        );
        Ok(TimerChange {
            entry: stopped,
            outcome,
        })
    }

    /// Stop the session and remember what it tracked for a later resume.
    pub async fn pause(&self, id: TimeEntryId) -> Result<(TimerChange, ResumeHint)> {
        let change = self.stop(id).await?;
        let hint = ResumeHint::from(&change.entry);
        *self.lock_hint() = Some(hint);
        Ok((change, hint))
    }

    /// Start a fresh session for the given pair; the paused one stays closed.
    pub async fn resume(
        &self,
        project_id: Option<ProjectId>,
        task_id: Option<TaskId>,
    ) -> Result<TimerChange> {
        let change = self.start(project_id, task_id).await?;
        *self.lock_hint() = None;
        Ok(change)
    }

    /// Resume whatever was paused last in this process.
    pub async fn resume_last(&self) -> Result<TimerChange> {
        let hint = self
            .last_paused()
            .ok_or_else(|| Error::InvalidInput("No paused timer to resume".to_string()))?;
        self.resume(Some(hint.project_id), hint.task_id).await
    }

    pub fn last_paused(&self) -> Option<ResumeHint> {
        *self.lock_hint()
    }

    /// Record a finished session after the fact
    pub async fn log_manual(&self, manual: ManualEntry) -> Result<TimerChange> {
        let project_id = manual
            .project_id
            .ok_or_else(|| Error::InvalidInput("A project is required to log time".into()))?;
        if manual.end_time <= manual.start_time {
            return Err(Error::InvalidInput(
                "End time must be after start time".to_string(),
            ));
        }

        let entry = TimeEntry::manual(
            project_id,
            manual.task_id,
            manual.start_time,
            manual.end_time,
            normalize_text_option(manual.notes),
        );
        let outcome = self.insert_entry(entry.clone()).await?;
        Ok(TimerChange { entry, outcome })
    }

    /// Remove a stopped session; running sessions must be stopped first.
    pub async fn delete(&self, id: TimeEntryId) -> Result<ApplyOutcome> {
        let current = self.load_entry(id).await?;
        if current.is_running {
            return Err(Error::InvalidInput(format!(
                "Timer {id} is still running; stop it before deleting"
            )));
        }

        self.applier
            .apply(MutationPayload::TimeEntryDelete { id }, move |view| {
                let index = view.time_entries.iter().position(|entry| entry.id == id);
                let removed = index.map(|index| (index, view.time_entries.remove(index)));
                Ok(Box::new(move |view: &mut ViewState| {
                    if let Some((index, entry)) = removed {
                        let index = index.min(view.time_entries.len());
                        view.time_entries.insert(index, entry);
                    }
                }) as Revert)
            })
            .await
    }

    /// Re-attribute a stopped or manual session.
    ///
    /// Timestamps and duration are left alone; running sessions must be
    /// stopped first.
    pub async fn update(&self, id: TimeEntryId, edit: EntryEdit) -> Result<TimerChange> {
        let project_id = edit
            .project_id
            .ok_or_else(|| Error::InvalidInput("Project is required".into()))?;
        let current = self.load_entry(id).await?;
        if current.is_running {
            return Err(Error::InvalidInput(format!(
                "Timer {id} is still running; stop it before editing"
            )));
        }

        let notes = normalize_text_option(edit.notes);
        let edited = TimeEntry {
            project_id,
            task_id: edit.task_id,
            notes: notes.clone(),
            ..current
        };
        let payload = MutationPayload::TimeEntryUpdate {
            id,
            project_id,
            task_id: edit.task_id,
            notes,
        };

        let row = edited.clone();
        let outcome = self
            .applier
            .apply(payload, move |view| {
                let previous = view.time_entry(id).cloned();
                view.upsert_time_entry(row);
                Ok(Box::new(move |view: &mut ViewState| match previous {
                    Some(previous) => view.upsert_time_entry(previous),
                    None => view.time_entries.retain(|entry| entry.id != id),
                }) as Revert)
            })
            .await?;

        Ok(TimerChange {
            entry: edited,
            outcome,
        })
    }

    /// Time tracked today (UTC) in the local view.
    ///
    /// Running sessions count up to the clock's current time.
    pub fn today(&self) -> TimeSummary {
        let now = self.clock.now();
        let entries = self.applier.state().read(|view| view.time_entries.clone());
        TimeSummary::for_day(&entries, now)
    }

    /// Running sessions in the local view, oldest first
    pub fn running(&self) -> Vec<TimeEntry> {
        let mut running = self.applier.state().read(ViewState::running_entries);
        running.sort_by_key(|entry| entry.start_time);
        running
    }

    async fn insert_entry(&self, entry: TimeEntry) -> Result<ApplyOutcome> {
        let id = entry.id;
        let row = entry.clone();
        self.applier
            .apply(MutationPayload::TimeEntryCreate { entry }, move |view| {
                view.time_entries.insert(0, row);
                Ok(Box::new(move |view: &mut ViewState| {
                    view.time_entries.retain(|entry| entry.id != id);
                }) as Revert)
            })
            .await
    }

    /// Current view of a session.
    ///
    /// The remote copy is authoritative unless writes to this session are
    /// still queued, in which case the remote has not seen them yet.
    async fn load_entry(&self, id: TimeEntryId) -> Result<TimeEntry> {
        let remote_is_current = self.applier.connectivity().is_online()
            && !self.applier.has_queued_writes(&id.as_str()).await;
        let found = if remote_is_current {
            match self.remote.fetch_time_entry(id).await {
                Ok(found) => found,
                Err(error) if error.is_connectivity() => {
                    tracing::warn!("Could not re-read timer {id} remotely; using local view");
                    self.applier.state().time_entry(id)
                }
                Err(error) => return Err(error.into()),
            }
        } else {
            self.applier.state().time_entry(id)
        };

        found.ok_or_else(|| Error::NotFound(format!("time entry {id}")))
    }

    fn lock_hint(&self) -> std::sync::MutexGuard<'_, Option<ResumeHint>> {
        self.last_paused
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
