//! Queue housekeeping: retry scheduling, retry-budget enforcement, stale
//! claim reclamation, and purging of finished items.

use crate::clock::SharedClock;
use crate::config::WorkerConfig;
use crate::database::error::DatabaseError;
use crate::database::no_show_queue_repository::NoShowQueueRepository;
use crate::workers::JobStats;
use chrono::Duration as ChronoDuration;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

pub struct QueueMaintenanceWorker {
    queue: Arc<NoShowQueueRepository>,
    clock: SharedClock,
    config: WorkerConfig,
    stats: Arc<JobStats>,
}

impl QueueMaintenanceWorker {
    pub fn new(
        queue: Arc<NoShowQueueRepository>,
        clock: SharedClock,
        config: WorkerConfig,
        stats: Arc<JobStats>,
    ) -> Self {
        Self {
            queue,
            clock,
            config,
            stats,
        }
    }

    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        info!(
            interval_secs = self.config.queue_maintenance_interval_secs,
            retry_cooldown_minutes = self.config.retry_cooldown_minutes,
            max_retry_count = self.config.max_retry_count,
            "queue maintenance worker started"
        );

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("queue maintenance worker stopping");
                        break;
                    }
                }
                _ = tokio::time::sleep(Duration::from_secs(self.config.queue_maintenance_interval_secs)) => {
                    if !self.stats.try_begin() {
                        warn!("previous maintenance run still in flight, skipping tick");
                        continue;
                    }
                    let result = self.run_cycle().await;
                    if let Err(e) = &result {
                        warn!(error = %e, "queue maintenance cycle failed");
                    }
                    self.stats.finish(result.is_err());
                }
            }
        }

        info!("queue maintenance worker stopped");
    }

    async fn run_cycle(&self) -> Result<(), DatabaseError> {
        let now = self.clock.now_utc();

        // Exhausted items first so a just-exhausted item isn't requeued once
        // more by the cooldown pass below.
        let skipped = self.queue.skip_exhausted(self.config.max_retry_count).await?;
        if skipped > 0 {
            warn!(count = skipped, "queue items exhausted retries, permanently skipped");
        }

        let cooldown_cutoff = now - ChronoDuration::minutes(self.config.retry_cooldown_minutes);
        let requeued = self
            .queue
            .requeue_cooled_down(cooldown_cutoff, self.config.max_retry_count)
            .await?;
        if requeued > 0 {
            info!(count = requeued, "failed queue items returned to pending");
        }

        let stale_cutoff = now - ChronoDuration::minutes(self.config.stale_processing_minutes);
        let reclaimed = self.queue.reclaim_stale(stale_cutoff).await?;
        if reclaimed > 0 {
            warn!(count = reclaimed, "stale processing claims reclaimed");
        }

        let purge_cutoff = now - ChronoDuration::days(self.config.queue_purge_days);
        let purged = self.queue.purge_finished(purge_cutoff).await?;
        if purged > 0 {
            info!(count = purged, "finished queue items purged");
        }

        Ok(())
    }
}
