use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] indo_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Task title cannot be empty")]
    EmptyTitle,
    #[error("Invalid {field}: {reason}")]
    InvalidArgument { field: &'static str, reason: String },
    #[error("Sync failed: {0}")]
    SyncFailed(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error(
        "Backend is not configured. Pass --config, set INDO_API_URL and INDO_API_KEY, or create {0}."
    )]
    NotConfigured(String),
}
