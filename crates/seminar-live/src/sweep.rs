//! Background expiry sweep.
//!
//! Sessions must close when their end time passes even if nobody is
//! connected to drive a status check, so a fixed-interval task walks all
//! open sessions and pushes the expired ones through auto-closure.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::Coordinator;

/// Spawns the sweep loop. Runs until the returned handle is aborted
/// (typically when the server shuts down).
pub fn spawn_expiry_sweep(
    coordinator: Arc<Coordinator>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // A slow pass shouldn't cause a burst of catch-up passes.
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(interval_secs = interval.as_secs(), "expiry sweep running");

        loop {
            ticker.tick().await;
            let closed = coordinator.sweep_expired().await;
            if closed > 0 {
                tracing::info!(closed, "expiry sweep auto-closed sessions");
            }
        }
    })
}
