//! Timer-driven sync scheduler
//!
//! Fires a cycle immediately on startup and then every `interval`. A tick that
//! lands while a manual cycle is running is dropped by the orchestrator's run
//! guard, and missed ticks are skipped rather than bunched up.

use crate::domain::CycleTrigger;
use crate::services::orchestrator::SyncOrchestrator;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::info;

/// Periodically runs sync cycles until shutdown
pub struct SyncScheduler {
    orchestrator: Arc<SyncOrchestrator>,
    interval: Duration,
}

impl SyncScheduler {
    pub fn new(orchestrator: Arc<SyncOrchestrator>, interval: Duration) -> Self {
        Self { orchestrator, interval }
    }

    /// Run until the shutdown signal flips to true
    ///
    /// A cycle that has started is allowed to finish before the loop exits.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(interval_secs = %self.interval.as_secs(), "sync_scheduler_started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.orchestrator.set_next_check(None);
                    self.orchestrator.run_cycle(CycleTrigger::Timer).await;
                    self.orchestrator.set_next_check(Some(self.next_check_at()));
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("sync_scheduler_shutdown");
                        return;
                    }
                }
            }
        }
    }

    fn next_check_at(&self) -> chrono::DateTime<Utc> {
        let step = chrono::Duration::from_std(self.interval).unwrap_or(chrono::Duration::zero());
        Utc::now() + step
    }
}
