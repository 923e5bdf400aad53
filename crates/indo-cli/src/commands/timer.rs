use chrono::Utc;
use indo_core::timer::{EntryEdit, ManualEntry, TimerChange};
use indo_core::{ProjectId, TaskId, TimeEntryId};

use crate::cli::TimerCommands;
use crate::commands::common::{
    format_apply_outcome, format_duration, format_entry_line, parse_arg, parse_optional_arg,
    parse_timestamp, Session,
};
use crate::error::CliError;

pub async fn run_timer(session: &Session, command: TimerCommands) -> Result<(), CliError> {
    let timer = session.engine.timer();

    match command {
        TimerCommands::Start { project, task } => {
            let project_id: ProjectId = parse_arg(&project, "project id")?;
            let task_id: Option<TaskId> = parse_optional_arg(task.as_deref(), "task id")?;
            let change = timer.start(Some(project_id), task_id).await?;
            print_change("Started", &change);
        }
        TimerCommands::Stop { id } => {
            let id: TimeEntryId = parse_arg(&id, "time entry id")?;
            let change = timer.stop(id).await?;
            print_change("Stopped", &change);
        }
        TimerCommands::Pause { id } => {
            let id: TimeEntryId = parse_arg(&id, "time entry id")?;
            let (change, hint) = timer.pause(id).await?;
            print_change("Paused", &change);
            match hint.task_id {
                Some(task_id) => println!(
                    "Resume with: indo timer resume --project {} --task {task_id}",
                    hint.project_id
                ),
                None => println!("Resume with: indo timer resume --project {}", hint.project_id),
            }
        }
        TimerCommands::Resume { project, task } => {
            let change = match project {
                Some(project) => {
                    let project_id: ProjectId = parse_arg(&project, "project id")?;
                    let task_id: Option<TaskId> = parse_optional_arg(task.as_deref(), "task id")?;
                    timer.resume(Some(project_id), task_id).await?
                }
                None => timer.resume_last().await?,
            };
            print_change("Resumed", &change);
        }
        TimerCommands::Log {
            project,
            task,
            start,
            end,
            notes,
        } => {
            let manual = ManualEntry {
                project_id: Some(parse_arg(&project, "project id")?),
                task_id: parse_optional_arg(task.as_deref(), "task id")?,
                start_time: parse_timestamp(&start, "start time")?,
                end_time: parse_timestamp(&end, "end time")?,
                notes,
            };
            let change = timer.log_manual(manual).await?;
            print_change("Logged", &change);
        }
        TimerCommands::Edit {
            id,
            project,
            task,
            notes,
        } => {
            let id: TimeEntryId = parse_arg(&id, "time entry id")?;
            let edit = EntryEdit {
                project_id: Some(parse_arg(&project, "project id")?),
                task_id: parse_optional_arg(task.as_deref(), "task id")?,
                notes,
            };
            let change = timer.update(id, edit).await?;
            print_change("Updated", &change);
        }
        TimerCommands::Today { json } => {
            let summary = timer.today();
            if json {
                let by_project: Vec<_> = summary
                    .by_project
                    .iter()
                    .map(|(project_id, seconds)| {
                        serde_json::json!({ "project_id": project_id, "seconds": seconds })
                    })
                    .collect();
                let report = serde_json::json!({
                    "total_seconds": summary.total_seconds,
                    "total_hours": summary.total_hours(),
                    "by_project": by_project,
                });
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("Today: {}", format_duration(summary.total_seconds));
                for (project_id, seconds) in &summary.by_project {
                    println!("  {project_id}  {}", format_duration(*seconds));
                }
            }
        }
        TimerCommands::Delete { id } => {
            let id: TimeEntryId = parse_arg(&id, "time entry id")?;
            let outcome = timer.delete(id).await?;
            println!("Deleted {id} ({})", format_apply_outcome(outcome));
        }
        TimerCommands::Running { json } => {
            let running = timer.running();
            if json {
                println!("{}", serde_json::to_string_pretty(&running)?);
            } else if running.is_empty() {
                println!("No running timers.");
            } else {
                let now = Utc::now();
                for entry in &running {
                    println!("{}", format_entry_line(entry, now));
                }
            }
        }
    }

    Ok(())
}

fn print_change(verb: &str, change: &TimerChange) {
    let entry = &change.entry;
    match entry.duration_seconds {
        Some(duration) => println!(
            "{verb} {} after {} ({})",
            entry.id,
            format_duration(duration),
            format_apply_outcome(change.outcome)
        ),
        None => println!(
            "{verb} {} ({})",
            entry.id,
            format_apply_outcome(change.outcome)
        ),
    }
}
