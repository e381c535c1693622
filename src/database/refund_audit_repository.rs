use crate::database::error::DatabaseError;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

/// Immutable refund audit record. Rows are append-only; there is no update
/// path in this repository by design of the table, only retention purges.
#[derive(Debug, Clone, FromRow)]
pub struct RefundAuditRecord {
    pub id: Uuid,
    pub reservation_id: Uuid,
    pub user_id: Uuid,
    pub cancellation_type: String,
    pub refund_percentage: i16,
    pub original_amount: i64,
    pub refund_amount: i64,
    pub cancellation_window: String,
    pub reason: String,
    pub applied_policies: JsonValue,
    pub decided_at_civil: String,
    pub reservation_at_civil: String,
    pub timezone: String,
    pub gateway_transaction_id: Option<String>,
    pub succeeded: bool,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Values for a new audit row
#[derive(Debug, Clone)]
pub struct NewRefundAuditRecord {
    pub reservation_id: Uuid,
    pub user_id: Uuid,
    pub cancellation_type: String,
    pub refund_percentage: i16,
    pub original_amount: i64,
    pub refund_amount: i64,
    pub cancellation_window: String,
    pub reason: String,
    pub applied_policies: JsonValue,
    pub decided_at_civil: String,
    pub reservation_at_civil: String,
    pub timezone: String,
    pub gateway_transaction_id: Option<String>,
    pub succeeded: bool,
    pub failure_reason: Option<String>,
}

const AUDIT_COLUMNS: &str = "id, reservation_id, user_id, cancellation_type, refund_percentage, \
     original_amount, refund_amount, cancellation_window, reason, applied_policies, \
     decided_at_civil, reservation_at_civil, timezone, gateway_transaction_id, succeeded, \
     failure_reason, created_at";

/// Repository for the refund audit log
pub struct RefundAuditRepository {
    pool: PgPool,
}

impl RefundAuditRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn append(
        &self,
        new: NewRefundAuditRecord,
    ) -> Result<RefundAuditRecord, DatabaseError> {
        sqlx::query_as::<_, RefundAuditRecord>(&format!(
            "INSERT INTO refund_audit_log
                 (id, reservation_id, user_id, cancellation_type, refund_percentage,
                  original_amount, refund_amount, cancellation_window, reason,
                  applied_policies, decided_at_civil, reservation_at_civil, timezone,
                  gateway_transaction_id, succeeded, failure_reason, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, NOW())
             RETURNING {}",
            AUDIT_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(new.reservation_id)
        .bind(new.user_id)
        .bind(new.cancellation_type)
        .bind(new.refund_percentage)
        .bind(new.original_amount)
        .bind(new.refund_amount)
        .bind(new.cancellation_window)
        .bind(new.reason)
        .bind(new.applied_policies)
        .bind(new.decided_at_civil)
        .bind(new.reservation_at_civil)
        .bind(new.timezone)
        .bind(new.gateway_transaction_id)
        .bind(new.succeeded)
        .bind(new.failure_reason)
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    pub async fn find_by_reservation(
        &self,
        reservation_id: Uuid,
    ) -> Result<Vec<RefundAuditRecord>, DatabaseError> {
        sqlx::query_as::<_, RefundAuditRecord>(&format!(
            "SELECT {} FROM refund_audit_log
             WHERE reservation_id = $1
             ORDER BY created_at",
            AUDIT_COLUMNS
        ))
        .bind(reservation_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    /// Retention purge. Returns the number of rows removed.
    pub async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, DatabaseError> {
        let result = sqlx::query("DELETE FROM refund_audit_log WHERE created_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?;
        Ok(result.rows_affected())
    }
}
