use std::str::FromStr;

use chrono::{DateTime, Utc};
use indo_core::config::EngineConfig;
use indo_core::models::TaskStatus;
use indo_core::optimistic::ApplyOutcome;
use indo_core::sync::SyncOutcome;
use indo_core::{QueuedMutation, SyncEngine, SyncState, Task, TimeEntry};

use crate::error::CliError;

/// An opened engine plus the reconciliation pass run while opening it
pub struct Session {
    pub engine: SyncEngine,
    pub startup: SyncOutcome,
}

/// Open the engine and bring the local view up to date.
///
/// Online, this replays the queue and refreshes from the backend. When the
/// backend cannot be reached (or `offline` is set) the view is rebuilt from
/// queued writes and further writes are queued.
pub async fn open_session(config: &EngineConfig, offline: bool) -> Result<Session, CliError> {
    let (engine, _feed) = SyncEngine::open(config, !offline).await?;

    if !offline && !engine.connectivity().verify_connectivity().await {
        tracing::info!("Backend unreachable; working offline");
        engine.connectivity().set_online(false);
    }

    let startup = engine.trigger_sync().await;
    if engine.status().state == SyncState::Offline {
        engine.connectivity().set_online(false);
        let replayed = engine.restore_pending_view().await?;
        tracing::debug!("Rebuilt local view from {replayed} queued write(s)");
    }

    Ok(Session { engine, startup })
}

pub fn parse_arg<T: FromStr>(raw: &str, field: &'static str) -> Result<T, CliError>
where
    T::Err: std::fmt::Display,
{
    raw.parse().map_err(|error: T::Err| CliError::InvalidArgument {
        field,
        reason: error.to_string(),
    })
}

pub fn parse_optional_arg<T: FromStr>(
    raw: Option<&str>,
    field: &'static str,
) -> Result<Option<T>, CliError>
where
    T::Err: std::fmt::Display,
{
    raw.map(|value| parse_arg(value, field)).transpose()
}

/// Parse an RFC 3339 timestamp into UTC
pub fn parse_timestamp(raw: &str, field: &'static str) -> Result<DateTime<Utc>, CliError> {
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|value| value.with_timezone(&Utc))
        .map_err(|error| CliError::InvalidArgument {
            field,
            reason: error.to_string(),
        })
}

pub fn normalize_title(parts: &[String]) -> Option<String> {
    let joined = parts.join(" ");
    let trimmed = joined.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// `1h 02m 05s`, `2m 05s` or `45s`
pub fn format_duration(seconds: i64) -> String {
    let seconds = seconds.max(0);
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;

    if hours > 0 {
        format!("{hours}h {minutes:02}m {secs:02}s")
    } else if minutes > 0 {
        format!("{minutes}m {secs:02}s")
    } else {
        format!("{secs}s")
    }
}

pub const fn format_apply_outcome(outcome: ApplyOutcome) -> &'static str {
    match outcome {
        ApplyOutcome::Confirmed => "saved",
        ApplyOutcome::Queued { id: Some(_) } => "queued until online",
        ApplyOutcome::Queued { id: None } => "kept locally; queue unavailable",
    }
}

pub fn format_sync_outcome(outcome: &SyncOutcome, pending: usize) -> String {
    match outcome {
        SyncOutcome::Synced { applied } => {
            format!("Synced ({applied} queued write(s) applied, {pending} pending)")
        }
        SyncOutcome::Offline => format!("Offline ({pending} write(s) pending)"),
        SyncOutcome::Skipped => "Another sync is already running".to_string(),
        SyncOutcome::Failed(reason) => {
            format!("Sync failed: {reason} ({pending} write(s) pending)")
        }
    }
}

pub fn format_entry_line(entry: &TimeEntry, now: DateTime<Utc>) -> String {
    let state = if entry.is_running { "running" } else { "stopped" };
    let mut line = format!(
        "{}  project {}  {state} {}",
        entry.id,
        entry.project_id,
        format_duration(entry.elapsed_seconds(now)),
    );
    if let Some(task_id) = entry.task_id {
        line.push_str(&format!("  task {task_id}"));
    }
    line
}

pub fn format_task_line(task: &Task) -> String {
    let marker = match task.status {
        TaskStatus::Done => "[x]",
        TaskStatus::InProgress => "[~]",
        TaskStatus::Todo => "[ ]",
    };
    format!(
        "{marker} {}  {}  {}",
        task.id,
        task.priority.as_str(),
        task.title
    )
}

pub fn format_mutation_line(mutation: &QueuedMutation) -> String {
    let queued_at = DateTime::<Utc>::from_timestamp_millis(mutation.created_at)
        .map_or_else(|| mutation.created_at.to_string(), |value| value.to_rfc3339());
    format!(
        "{queued_at}  {} {}  {}",
        mutation.action(),
        mutation.entity_table(),
        mutation.payload.target_id()
    )
}
