use crate::database::error::DatabaseError;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

/// Queue item lifecycle: `pending → processing → completed | failed`, with
/// `failed` items returning to `pending` after the retry cooldown until the
/// retry budget is spent, at which point they become `skipped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueItemStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Skipped,
}

impl QueueItemStatus {
    pub fn as_db_status(&self) -> &'static str {
        match self {
            QueueItemStatus::Pending => "pending",
            QueueItemStatus::Processing => "processing",
            QueueItemStatus::Completed => "completed",
            QueueItemStatus::Failed => "failed",
            QueueItemStatus::Skipped => "skipped",
        }
    }

    pub fn from_db_status(status: &str) -> Option<Self> {
        match status {
            "pending" => Some(QueueItemStatus::Pending),
            "processing" => Some(QueueItemStatus::Processing),
            "completed" => Some(QueueItemStatus::Completed),
            "failed" => Some(QueueItemStatus::Failed),
            "skipped" => Some(QueueItemStatus::Skipped),
            _ => None,
        }
    }
}

/// No-show refund queue item
#[derive(Debug, Clone, FromRow)]
pub struct NoShowQueueItem {
    pub id: Uuid,
    pub reservation_id: Uuid,
    pub user_id: Uuid,
    pub status: String,
    pub retry_count: i32,
    pub scheduled_at: DateTime<Utc>,
    pub last_error: Option<String>,
    pub refund_audit_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl NoShowQueueItem {
    pub fn parsed_status(&self) -> Option<QueueItemStatus> {
        QueueItemStatus::from_db_status(&self.status)
    }
}

const QUEUE_COLUMNS: &str = "id, reservation_id, user_id, status, retry_count, scheduled_at, \
     last_error, refund_audit_id, created_at, updated_at";

/// Repository for the no-show refund queue
pub struct NoShowQueueRepository {
    pool: PgPool,
}

impl NoShowQueueRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Enqueue a reservation for no-show refund processing. The unique index
    /// on `reservation_id` makes re-detection idempotent: a second enqueue
    /// conflicts and returns `None`.
    pub async fn enqueue(
        &self,
        reservation_id: Uuid,
        user_id: Uuid,
        scheduled_at: DateTime<Utc>,
    ) -> Result<Option<NoShowQueueItem>, DatabaseError> {
        sqlx::query_as::<_, NoShowQueueItem>(&format!(
            "INSERT INTO no_show_refund_queue
                 (id, reservation_id, user_id, status, retry_count, scheduled_at,
                  created_at, updated_at)
             VALUES ($1, $2, $3, 'pending', 0, $4, NOW(), NOW())
             ON CONFLICT (reservation_id) DO NOTHING
             RETURNING {}",
            QUEUE_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(reservation_id)
        .bind(user_id)
        .bind(scheduled_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    /// Atomically claim due pending items by flipping them to `processing`.
    /// `FOR UPDATE SKIP LOCKED` keeps concurrent workers from claiming the
    /// same rows.
    pub async fn claim_due(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<NoShowQueueItem>, DatabaseError> {
        sqlx::query_as::<_, NoShowQueueItem>(&format!(
            "UPDATE no_show_refund_queue
             SET status = 'processing', updated_at = NOW()
             WHERE id IN (
                 SELECT id FROM no_show_refund_queue
                 WHERE status = 'pending' AND scheduled_at <= $1
                 ORDER BY scheduled_at
                 LIMIT $2
                 FOR UPDATE SKIP LOCKED
             )
             RETURNING {}",
            QUEUE_COLUMNS
        ))
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    pub async fn mark_completed(
        &self,
        id: Uuid,
        refund_audit_id: Option<Uuid>,
    ) -> Result<(), DatabaseError> {
        sqlx::query(
            "UPDATE no_show_refund_queue
             SET status = 'completed', refund_audit_id = $2, last_error = NULL,
                 updated_at = NOW()
             WHERE id = $1 AND status = 'processing'",
        )
        .bind(id)
        .bind(refund_audit_id)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;
        Ok(())
    }

    pub async fn mark_failed(&self, id: Uuid, error: &str) -> Result<(), DatabaseError> {
        sqlx::query(
            "UPDATE no_show_refund_queue
             SET status = 'failed', retry_count = retry_count + 1, last_error = $2,
                 updated_at = NOW()
             WHERE id = $1 AND status = 'processing'",
        )
        .bind(id)
        .bind(error)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;
        Ok(())
    }

    /// Return failed items with retry budget left to `pending` once their
    /// cooldown has elapsed (`updated_at < cutoff`).
    pub async fn requeue_cooled_down(
        &self,
        cutoff: DateTime<Utc>,
        max_retries: i32,
    ) -> Result<u64, DatabaseError> {
        let result = sqlx::query(
            "UPDATE no_show_refund_queue
             SET status = 'pending', updated_at = NOW()
             WHERE status = 'failed' AND retry_count < $1 AND updated_at < $2",
        )
        .bind(max_retries)
        .bind(cutoff)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;
        Ok(result.rows_affected())
    }

    /// Park failed items that exhausted their retries. Skipped items are never
    /// reprocessed automatically; they wait for manual intervention.
    pub async fn skip_exhausted(&self, max_retries: i32) -> Result<u64, DatabaseError> {
        let result = sqlx::query(
            "UPDATE no_show_refund_queue
             SET status = 'skipped', updated_at = NOW()
             WHERE status = 'failed' AND retry_count >= $1",
        )
        .bind(max_retries)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;
        Ok(result.rows_affected())
    }

    pub async fn purge_finished(&self, cutoff: DateTime<Utc>) -> Result<u64, DatabaseError> {
        let result = sqlx::query(
            "DELETE FROM no_show_refund_queue
             WHERE status IN ('completed', 'skipped') AND updated_at < $1",
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;
        Ok(result.rows_affected())
    }

    /// Items stuck in `processing` past the reclaim window were claimed by a
    /// worker that died mid-flight; put them back to `pending`.
    pub async fn reclaim_stale(&self, cutoff: DateTime<Utc>) -> Result<u64, DatabaseError> {
        let result = sqlx::query(
            "UPDATE no_show_refund_queue
             SET status = 'pending', updated_at = NOW()
             WHERE status = 'processing' AND updated_at < $1",
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_status_round_trips() {
        for status in [
            QueueItemStatus::Pending,
            QueueItemStatus::Processing,
            QueueItemStatus::Completed,
            QueueItemStatus::Failed,
            QueueItemStatus::Skipped,
        ] {
            assert_eq!(
                QueueItemStatus::from_db_status(status.as_db_status()),
                Some(status)
            );
        }
    }
}
