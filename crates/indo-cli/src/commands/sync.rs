use indo_core::sync::SyncOutcome;

use crate::commands::common::{format_sync_outcome, Session};
use crate::error::CliError;

/// Report the reconciliation pass that opening the session already ran.
pub async fn run_sync(session: &Session) -> Result<(), CliError> {
    let pending = session.engine.queue().count().await?;
    println!("{}", format_sync_outcome(&session.startup, pending));

    match &session.startup {
        SyncOutcome::Failed(reason) => Err(CliError::SyncFailed(reason.clone())),
        _ => Ok(()),
    }
}
