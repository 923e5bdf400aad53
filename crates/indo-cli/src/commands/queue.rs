use indo_core::config::EngineConfig;
use indo_core::queue::MutationQueue;

use crate::cli::QueueCommands;
use crate::commands::common::format_mutation_line;
use crate::error::CliError;

/// Read the queue directly; opening a full session would drain it.
pub async fn run_queue(config: &EngineConfig, command: QueueCommands) -> Result<(), CliError> {
    let queue = MutationQueue::open_path(config.resolved_queue_path()).await?;

    match command {
        QueueCommands::List { json } => {
            let pending = queue.pending().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&pending)?);
            } else if pending.is_empty() {
                println!("Queue is empty.");
            } else {
                for mutation in &pending {
                    println!("{}", format_mutation_line(mutation));
                }
            }
        }
        QueueCommands::Count => println!("{}", queue.count().await?),
    }

    Ok(())
}
