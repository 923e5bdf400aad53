//! Error types for indo-core

use thiserror::Error;

use crate::models::TimeEntryId;
use crate::remote::RemoteError;

/// Result type alias using indo-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in indo-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// libSQL error
    #[error("libSQL error: {0}")]
    LibSql(#[from] libsql::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Record not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Remote store rejected or could not be reached
    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),

    /// Stop/pause attempted on a session that is no longer running
    #[error("Timer is not running: {0}")]
    TimerNotRunning(TimeEntryId),

    /// Start attempted while a session for the same project/task is running
    #[error("Timer already running for this project/task: {0}")]
    TimerAlreadyRunning(TimeEntryId),

    /// Invalid engine configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Whether the failure came from losing reach of the remote service.
    pub const fn is_connectivity(&self) -> bool {
        match self {
            Self::Remote(error) => error.is_connectivity(),
            _ => false,
        }
    }
}
