use chrono::NaiveDate;
use indo_core::models::{NewTask, Priority, TaskStatus};
use indo_core::{ProjectId, TaskId};

use crate::cli::TaskCommands;
use crate::commands::common::{
    format_apply_outcome, format_task_line, normalize_title, parse_arg, parse_optional_arg, Session,
};
use crate::error::CliError;

pub async fn run_task(session: &Session, command: TaskCommands) -> Result<(), CliError> {
    let applier = session.engine.applier();

    match command {
        TaskCommands::Add {
            title,
            priority,
            project,
            due,
        } => {
            let title = normalize_title(&title).ok_or(CliError::EmptyTitle)?;
            let priority: Priority = parse_arg(&priority, "priority")?;
            let project_id: Option<ProjectId> = parse_optional_arg(project.as_deref(), "project id")?;
            let due_date: Option<NaiveDate> = parse_optional_arg(due.as_deref(), "due date")?;
            let new = NewTask {
                priority,
                project_id,
                due_date,
                ..NewTask::new(title)
            };
            let (task, outcome) = applier.create_task(new).await?;
            println!("Created {} ({})", task.id, format_apply_outcome(outcome));
        }
        TaskCommands::Toggle { id } => {
            let id: TaskId = parse_arg(&id, "task id")?;
            let outcome = applier.toggle_task(id).await?;
            let status = session
                .engine
                .state()
                .task(id)
                .map_or("unknown", |task| task.status.as_str());
            println!("{id} is now {status} ({})", format_apply_outcome(outcome));
        }
        TaskCommands::Status { id, status } => {
            let id: TaskId = parse_arg(&id, "task id")?;
            let status: TaskStatus = parse_arg(&status, "status")?;
            let outcome = applier.set_task_status(id, status).await?;
            println!("{id} is now {status} ({})", format_apply_outcome(outcome));
        }
        TaskCommands::Delete { id } => {
            let id: TaskId = parse_arg(&id, "task id")?;
            let outcome = applier.delete_task(id).await?;
            println!("Deleted {id} ({})", format_apply_outcome(outcome));
        }
        TaskCommands::List { json } => {
            let tasks = session.engine.state().snapshot().tasks;
            if json {
                println!("{}", serde_json::to_string_pretty(&tasks)?);
            } else if tasks.is_empty() {
                println!("No tasks.");
            } else {
                for task in &tasks {
                    println!("{}", format_task_line(task));
                }
            }
        }
    }

    Ok(())
}
