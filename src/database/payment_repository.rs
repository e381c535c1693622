use crate::database::error::DatabaseError;
use crate::payments::types::{PaymentStage, PaymentStatus};
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

/// Payment entity
#[derive(Debug, Clone, FromRow)]
pub struct Payment {
    pub id: Uuid,
    pub reservation_id: Uuid,
    pub user_id: Uuid,
    pub payment_stage: String,
    pub payment_status: String,
    pub amount: i64,
    pub is_deposit: bool,
    pub due_date: Option<DateTime<Utc>>,
    pub gateway_payment_key: Option<String>,
    pub metadata: JsonValue,
    pub created_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
}

impl Payment {
    pub fn parsed_status(&self) -> Option<PaymentStatus> {
        PaymentStatus::from_db_status(&self.payment_status)
    }

    pub fn parsed_stage(&self) -> Option<PaymentStage> {
        self.payment_stage.parse().ok()
    }
}

/// Values for a new pending payment row
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub reservation_id: Uuid,
    pub user_id: Uuid,
    pub stage: PaymentStage,
    pub status: PaymentStatus,
    pub amount: i64,
    pub due_date: Option<DateTime<Utc>>,
    pub gateway_payment_key: Option<String>,
    pub metadata: JsonValue,
}

const PAYMENT_COLUMNS: &str = "id, reservation_id, user_id, payment_stage, payment_status, \
     amount, is_deposit, due_date, gateway_payment_key, metadata, created_at, paid_at";

/// Repository for payment rows
pub struct PaymentRepository {
    pool: PgPool,
}

impl PaymentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a pending payment. Relies on the partial unique index over
    /// `(reservation_id, payment_stage)` for pending statuses: a concurrent
    /// duplicate hits `ON CONFLICT DO NOTHING` and this returns `None`, which
    /// the caller maps to a duplicate-pending error. No read-then-write race.
    pub async fn insert_pending(&self, new: NewPayment) -> Result<Option<Payment>, DatabaseError> {
        Self::insert_pending_on(&self.pool, new).await
    }

    /// Executor-generic variant for callers that bundle the insert with other
    /// writes in a transaction.
    pub async fn insert_pending_on<'e>(
        executor: impl sqlx::PgExecutor<'e>,
        new: NewPayment,
    ) -> Result<Option<Payment>, DatabaseError> {
        sqlx::query_as::<_, Payment>(&format!(
            "INSERT INTO payments
                 (id, reservation_id, user_id, payment_stage, payment_status,
                  amount, is_deposit, due_date, gateway_payment_key, metadata, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, NOW())
             ON CONFLICT (reservation_id, payment_stage)
                 WHERE payment_status IN ('deposit_pending', 'final_payment_pending')
                 DO NOTHING
             RETURNING {}",
            PAYMENT_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(new.reservation_id)
        .bind(new.user_id)
        .bind(new.stage.as_str())
        .bind(new.status.as_db_status())
        .bind(new.amount)
        .bind(new.stage.is_deposit())
        .bind(new.due_date)
        .bind(new.gateway_payment_key)
        .bind(new.metadata)
        .fetch_optional(executor)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Payment>, DatabaseError> {
        sqlx::query_as::<_, Payment>(&format!(
            "SELECT {} FROM payments WHERE id = $1",
            PAYMENT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    pub async fn find_by_stage(
        &self,
        reservation_id: Uuid,
        stage: PaymentStage,
    ) -> Result<Vec<Payment>, DatabaseError> {
        sqlx::query_as::<_, Payment>(&format!(
            "SELECT {} FROM payments
             WHERE reservation_id = $1 AND payment_stage = $2
             ORDER BY created_at",
            PAYMENT_COLUMNS
        ))
        .bind(reservation_id)
        .bind(stage.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    pub async fn find_pending_by_stage(
        &self,
        reservation_id: Uuid,
        stage: PaymentStage,
    ) -> Result<Option<Payment>, DatabaseError> {
        sqlx::query_as::<_, Payment>(&format!(
            "SELECT {} FROM payments
             WHERE reservation_id = $1
               AND payment_stage = $2
               AND payment_status IN ('deposit_pending', 'final_payment_pending')
             LIMIT 1",
            PAYMENT_COLUMNS
        ))
        .bind(reservation_id)
        .bind(stage.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    /// All gateway-confirmed payments for a reservation, oldest first. This is
    /// the refund base: refunds cancel each confirmed charge proportionally.
    pub async fn find_paid_by_reservation(
        &self,
        reservation_id: Uuid,
    ) -> Result<Vec<Payment>, DatabaseError> {
        sqlx::query_as::<_, Payment>(&format!(
            "SELECT {} FROM payments
             WHERE reservation_id = $1
               AND payment_status IN ('deposit_paid', 'fully_paid')
             ORDER BY created_at",
            PAYMENT_COLUMNS
        ))
        .bind(reservation_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    /// CAS pending → paid. `None` means the row already left `expected`.
    pub async fn mark_paid(
        &self,
        id: Uuid,
        expected: PaymentStatus,
        next: PaymentStatus,
    ) -> Result<Option<Payment>, DatabaseError> {
        sqlx::query_as::<_, Payment>(&format!(
            "UPDATE payments
             SET payment_status = $3, paid_at = NOW()
             WHERE id = $1 AND payment_status = $2
             RETURNING {}",
            PAYMENT_COLUMNS
        ))
        .bind(id)
        .bind(expected.as_db_status())
        .bind(next.as_db_status())
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    pub async fn update_status(
        &self,
        id: Uuid,
        expected: PaymentStatus,
        next: PaymentStatus,
    ) -> Result<Option<Payment>, DatabaseError> {
        sqlx::query_as::<_, Payment>(&format!(
            "UPDATE payments
             SET payment_status = $3
             WHERE id = $1 AND payment_status = $2
             RETURNING {}",
            PAYMENT_COLUMNS
        ))
        .bind(id)
        .bind(expected.as_db_status())
        .bind(next.as_db_status())
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    /// Whether any final-stage payment exists for the reservation, regardless
    /// of status. Used for the idempotent post-completion trigger.
    pub async fn exists_final(&self, reservation_id: Uuid) -> Result<bool, DatabaseError> {
        let (exists,): (bool,) = sqlx::query_as(
            "SELECT EXISTS(
                 SELECT 1 FROM payments
                 WHERE reservation_id = $1 AND payment_stage = 'final'
             )",
        )
        .bind(reservation_id)
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;
        Ok(exists)
    }
}
