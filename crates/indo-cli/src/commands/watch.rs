use indo_core::config::EngineConfig;
use indo_core::SyncEngine;

use crate::error::CliError;

/// Run the background scheduler until Ctrl-C, printing each status change.
///
/// The CLI has no realtime transport, so nothing publishes into the change
/// feed and push-triggered refresh stays inactive. Remote changes show up on
/// the poll interval, on reconnect, or after a failed pass is retried.
pub async fn run_watch(config: &EngineConfig, offline: bool) -> Result<(), CliError> {
    let (engine, _feed) = SyncEngine::open(config, !offline).await?;
    tracing::info!(
        "No realtime transport; polling every {}s",
        config.poll_interval_secs
    );
    let mut status = engine.subscribe_status();
    engine.start();
    println!("Watching; press Ctrl-C to stop");

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal?;
                break;
            }
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = *status.borrow_and_update();
                let pending = engine.pending_count().await;
                match current.last_synced_at {
                    Some(at) => println!(
                        "{}  last synced {}  {pending} pending",
                        current.state.as_str(),
                        at.to_rfc3339()
                    ),
                    None => println!("{}  {pending} pending", current.state.as_str()),
                }
            }
        }
    }

    engine.shutdown().await;
    println!("Stopped");
    Ok(())
}
