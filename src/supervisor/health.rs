//! Per-instance health loop: one task per live replica, ticking at
//! `health_check_interval` and deferring to
//! [`PhaseSupervisor::handle_health_tick`] for the restart/backoff logic
//! itself (spec §4.4 health loop, spec §5 "one health loop per live
//! instance").

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::supervisor::phase::PhaseSupervisor;

/// Spawns the loop and returns the sender side of its cancellation signal.
pub fn spawn_health_loop(
    supervisor: Arc<PhaseSupervisor>,
    replica_id: u32,
    interval: Duration,
) -> watch::Sender<bool> {
    let (cancel_tx, mut cancel_rx) = watch::channel(false);

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => supervisor.handle_health_tick(replica_id).await,
                _ = cancel_rx.changed() => break,
            }
        }
    });

    cancel_tx
}
