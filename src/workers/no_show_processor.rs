//! No-show detection and refund queue draining.
//!
//! Runs every scan interval. A cycle is two steps: flag overdue confirmed
//! reservations as no-shows and enqueue them, then claim due queue items and
//! feed each through the refund processor with the no-show cancellation type.

use crate::clock::SharedClock;
use crate::config::WorkerConfig;
use crate::database::error::DatabaseError;
use crate::database::no_show_queue_repository::NoShowQueueRepository;
use crate::database::reservation_repository::{ReservationRepository, ReservationStatus};
use crate::services::notification::{NotificationEvent, NotificationSender};
use crate::services::refund_processor::{RefundProcessor, RefundRequest, RefundStatus};
use crate::services::refund_policy::CancellationType;
use crate::workers::JobStats;
use chrono::Duration as ChronoDuration;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum NoShowWorkerError {
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),
}

const DETECTION_BATCH_SIZE: i64 = 100;
const CLAIM_BATCH_SIZE: i64 = 50;

pub struct NoShowProcessorWorker {
    reservations: Arc<ReservationRepository>,
    queue: Arc<NoShowQueueRepository>,
    refunds: Arc<RefundProcessor>,
    notifications: NotificationSender,
    clock: SharedClock,
    config: WorkerConfig,
    stats: Arc<JobStats>,
}

impl NoShowProcessorWorker {
    pub fn new(
        reservations: Arc<ReservationRepository>,
        queue: Arc<NoShowQueueRepository>,
        refunds: Arc<RefundProcessor>,
        notifications: NotificationSender,
        clock: SharedClock,
        config: WorkerConfig,
        stats: Arc<JobStats>,
    ) -> Self {
        Self {
            reservations,
            queue,
            refunds,
            notifications,
            clock,
            config,
            stats,
        }
    }

    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        info!(
            scan_interval_secs = self.config.no_show_scan_interval_secs,
            attendance_grace_minutes = self.config.attendance_grace_minutes,
            "no-show processor worker started"
        );

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("no-show processor worker stopping");
                        break;
                    }
                }
                _ = tokio::time::sleep(Duration::from_secs(self.config.no_show_scan_interval_secs)) => {
                    if !self.stats.try_begin() {
                        warn!("previous no-show scan still running, skipping tick");
                        continue;
                    }
                    let result = self.run_cycle().await;
                    if let Err(e) = &result {
                        warn!(error = %e, "no-show scan cycle failed");
                    }
                    self.stats.finish(result.is_err());
                }
            }
        }

        info!("no-show processor worker stopped");
    }

    async fn run_cycle(&self) -> Result<(), NoShowWorkerError> {
        self.detect_no_shows().await?;
        self.drain_queue().await?;
        Ok(())
    }

    /// Confirmed reservations whose civil schedule plus the attendance grace
    /// is in the past become no-shows and enter the refund queue.
    async fn detect_no_shows(&self) -> Result<(), NoShowWorkerError> {
        let cutoff =
            self.clock.civil_now() - ChronoDuration::minutes(self.config.attendance_grace_minutes);
        let overdue = self
            .reservations
            .find_overdue_confirmed(cutoff, DETECTION_BATCH_SIZE)
            .await?;

        for reservation in overdue {
            // CAS so a customer completing or cancelling mid-scan wins.
            let flagged = self
                .reservations
                .update_status_checked(
                    reservation.id,
                    ReservationStatus::Confirmed,
                    ReservationStatus::NoShow,
                )
                .await?;
            if flagged.is_none() {
                continue;
            }

            let eligible_at = self.clock.now_utc()
                + ChronoDuration::minutes(self.config.processing_grace_minutes);
            let enqueued = self
                .queue
                .enqueue(reservation.id, reservation.user_id, eligible_at)
                .await?;

            if enqueued.is_some() {
                info!(
                    reservation_id = %reservation.id,
                    eligible_at = %eligible_at,
                    "reservation flagged as no-show and queued for refund"
                );
                if self
                    .notifications
                    .send(NotificationEvent::NoShowRecorded {
                        user_id: reservation.user_id,
                        reservation_id: reservation.id,
                    })
                    .is_err()
                {
                    warn!(reservation_id = %reservation.id, "notification channel closed");
                }
            }
        }

        Ok(())
    }

    /// Claim due items and run each refund. Item-level failures increment the
    /// retry count and leave the item `failed`; they never abort the batch.
    async fn drain_queue(&self) -> Result<(), NoShowWorkerError> {
        let claimed = self
            .queue
            .claim_due(self.clock.now_utc(), CLAIM_BATCH_SIZE)
            .await?;
        if claimed.is_empty() {
            return Ok(());
        }
        info!(count = claimed.len(), "processing no-show refund queue items");

        for item in claimed {
            let request = RefundRequest {
                reservation_id: item.reservation_id,
                user_id: item.user_id,
                cancellation_type: CancellationType::NoShow,
                preference: None,
                admin_override_percentage: None,
                reason: "automatic no-show refund".to_string(),
            };

            match self.refunds.process_refund(&request).await {
                Ok(outcome) if outcome.status != RefundStatus::Failed => {
                    // Not-eligible outcomes complete the item too; the audit
                    // row already records why nothing was paid out.
                    self.queue.mark_completed(item.id, outcome.audit_id).await?;
                    info!(
                        reservation_id = %item.reservation_id,
                        status = ?outcome.status,
                        refund_amount = outcome.refund_amount,
                        "no-show queue item completed"
                    );
                }
                Ok(outcome) => {
                    let reason = outcome
                        .failure_reason
                        .unwrap_or_else(|| "refund failed".to_string());
                    self.queue.mark_failed(item.id, &reason).await?;
                    warn!(
                        reservation_id = %item.reservation_id,
                        retry_count = item.retry_count + 1,
                        reason = %reason,
                        "no-show refund failed, queued for retry"
                    );
                }
                Err(e) => {
                    self.queue.mark_failed(item.id, &e.to_string()).await?;
                    error!(
                        reservation_id = %item.reservation_id,
                        error = %e,
                        "no-show refund errored, queued for retry"
                    );
                }
            }
        }

        Ok(())
    }
}
