use std::time::Duration;

use seatlock_core::client::{now_ms, QueueClient};
use seatlock_core::driver::{HeartbeatDriver, TickAction};
use seatlock_core::types::{AccessMode, Participant};
use seatlock_core::QueueResult;

/// Hold a place in the queue until Ctrl-C, beating on the configured
/// interval, then leave.
pub async fn run(client: QueueClient, resource_id: String, participant: Participant) -> QueueResult<()> {
    let interval = Duration::from_millis(client.config().heartbeat_interval_ms);
    let mut driver = HeartbeatDriver::new(resource_id, participant);
    let mut ticker = tokio::time::interval(interval);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    let mut last_access: Option<AccessMode> = None;
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                // Store calls block; keep them off the runtime's worker
                let tick = tokio::task::block_in_place(|| driver.tick(client.coordinator(), now_ms()));
                match tick {
                    Ok(tick) => {
                        let access = tick.view.access();
                        if last_access.as_ref() != Some(&access) {
                            report(driver.resource_id(), tick.action, &access);
                            last_access = Some(access);
                        }
                    }
                    Err(e) if e.is_transient() || matches!(e, seatlock_core::QueueError::RetriesExhausted { .. }) => {
                        tracing::warn!(error = %e, "Heartbeat skipped, will retry next tick");
                    }
                    Err(e) => return Err(e),
                }
            }
            _ = &mut shutdown => break,
        }
    }

    let outcome = tokio::task::block_in_place(|| driver.stop(client.coordinator(), now_ms()))?;
    tracing::info!(resource_id = %driver.resource_id(), removed = outcome.removed, "Session ended");
    Ok(())
}

fn report(resource_id: &str, action: TickAction, access: &AccessMode) {
    match access {
        AccessMode::ReadWrite => {
            tracing::info!(resource_id, ?action, "✏️  You are the editor");
        }
        AccessMode::ReadOnly { holder, position } => {
            let editor = holder
                .as_ref()
                .map(|h| h.user_email.clone().unwrap_or_else(|| h.user_id.clone()))
                .unwrap_or_else(|| "nobody".to_string());
            tracing::info!(resource_id, ?action, ?position, editor = %editor, "👀 Read-only, waiting for the lease");
        }
    }
}
