//! Periodic sync trigger.
//!
//! Fires once at start and then every `interval`. Ticks that land while a run
//! is still in progress are absorbed by the orchestrator's single-flight
//! guard; missed ticks are skipped rather than bunched up.

use core_sync::SyncOrchestrator;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub struct Scheduler {
    orchestrator: Arc<SyncOrchestrator>,
    interval: Duration,
}

impl Scheduler {
    pub fn new(orchestrator: Arc<SyncOrchestrator>, interval: Duration) -> Self {
        Self {
            orchestrator,
            interval,
        }
    }

    /// Run until `shutdown` is cancelled. A run already in flight is left to
    /// finish on its own.
    pub async fn run(self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(interval_secs = self.interval.as_secs(), "Scheduler started");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    if self.orchestrator.is_running() {
                        debug!("Scheduled tick while a run is in progress, skipping");
                        continue;
                    }
                    let summary = self.orchestrator.trigger();
                    debug!(run_id = ?summary.run_id, "Scheduled sync triggered");
                }
            }
        }

        info!("Scheduler stopped");
    }

    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}
