//! In-Do-Time CLI - track tasks and time from the terminal

mod cli;
mod commands;
mod config;
mod error;


use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};
use crate::commands::common::open_session;
use crate::commands::completions::run_completions;
use crate::commands::queue::run_queue;
use crate::commands::sync::run_sync;
use crate::commands::task::run_task;
use crate::commands::timer::run_timer;
use crate::commands::watch::run_watch;
use crate::config::resolve_engine_config;
use crate::error::CliError;

const DEFAULT_LOG_DIRECTIVE: &str = "indo=info";

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    let directive = DEFAULT_LOG_DIRECTIVE
        .parse()
        .map_err(|error| CliError::Config(format!("invalid log directive: {error}")))?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(directive))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Commands::Completions { shell, output } = &cli.command {
        return run_completions(*shell, output.as_deref());
    }

    let config = resolve_engine_config(cli.config.as_deref(), cli.queue_path.clone())?;

    match cli.command {
        Commands::Timer { command } => {
            let session = open_session(&config, cli.offline).await?;
            run_timer(&session, command).await
        }
        Commands::Task { command } => {
            let session = open_session(&config, cli.offline).await?;
            run_task(&session, command).await
        }
        Commands::Queue { command } => run_queue(&config, command).await,
        Commands::Sync => {
            let session = open_session(&config, cli.offline).await?;
            run_sync(&session).await
        }
        Commands::Watch => run_watch(&config, cli.offline).await,
        Commands::Completions { .. } => Ok(()),
    }
}
