//! Daily retention purge for the refund audit log.

use crate::clock::SharedClock;
use crate::config::WorkerConfig;
use crate::database::error::DatabaseError;
use crate::database::refund_audit_repository::RefundAuditRepository;
use crate::workers::JobStats;
use chrono::Duration as ChronoDuration;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

pub struct AuditRetentionWorker {
    audit: Arc<RefundAuditRepository>,
    clock: SharedClock,
    config: WorkerConfig,
    stats: Arc<JobStats>,
}

impl AuditRetentionWorker {
    pub fn new(
        audit: Arc<RefundAuditRepository>,
        clock: SharedClock,
        config: WorkerConfig,
        stats: Arc<JobStats>,
    ) -> Self {
        Self {
            audit,
            clock,
            config,
            stats,
        }
    }

    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        info!(
            interval_secs = self.config.audit_retention_interval_secs,
            retention_days = self.config.audit_retention_days,
            "audit retention worker started"
        );

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("audit retention worker stopping");
                        break;
                    }
                }
                _ = tokio::time::sleep(Duration::from_secs(self.config.audit_retention_interval_secs)) => {
                    if !self.stats.try_begin() {
                        warn!("previous retention run still in flight, skipping tick");
                        continue;
                    }
                    let result = self.run_cycle().await;
                    if let Err(e) = &result {
                        warn!(error = %e, "audit retention cycle failed");
                    }
                    self.stats.finish(result.is_err());
                }
            }
        }

        info!("audit retention worker stopped");
    }

    async fn run_cycle(&self) -> Result<(), DatabaseError> {
        let cutoff =
            self.clock.now_utc() - ChronoDuration::days(self.config.audit_retention_days);
        let purged = self.audit.purge_older_than(cutoff).await?;
        if purged > 0 {
            info!(count = purged, cutoff = %cutoff, "expired audit records purged");
        }
        Ok(())
    }
}
