use crate::database::error::DatabaseError;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

/// Reservation lifecycle state.
///
/// `Requested → Confirmed → Completed → FullyPaid`, with cancellation/no-show
/// branches reachable from `Requested` or `Confirmed`. Terminal states accept
/// no further transitions; callers hitting one receive a stale-state error.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    /// Booked, awaiting deposit payment
    Requested,
    /// Deposit confirmed by the gateway
    Confirmed,
    /// Service performed, final payment due
    Completed,
    /// Final payment confirmed
    FullyPaid,
    CancelledByUser,
    CancelledByShop,
    NoShow,
}

impl ReservationStatus {
    /// Get all valid transitions from this state
    pub fn valid_transitions(&self) -> Vec<ReservationStatus> {
        match self {
            ReservationStatus::Requested => vec![
                ReservationStatus::Confirmed,
                ReservationStatus::CancelledByUser,
                ReservationStatus::CancelledByShop,
                ReservationStatus::NoShow,
            ],
            ReservationStatus::Confirmed => vec![
                ReservationStatus::Completed,
                ReservationStatus::CancelledByUser,
                ReservationStatus::CancelledByShop,
                ReservationStatus::NoShow,
            ],
            ReservationStatus::Completed => vec![ReservationStatus::FullyPaid],
            // Terminal states - no valid transitions
            ReservationStatus::FullyPaid
            | ReservationStatus::CancelledByUser
            | ReservationStatus::CancelledByShop
            | ReservationStatus::NoShow => vec![],
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ReservationStatus::FullyPaid
                | ReservationStatus::CancelledByUser
                | ReservationStatus::CancelledByShop
                | ReservationStatus::NoShow
        )
    }

    pub fn can_transition_to(&self, target: ReservationStatus) -> bool {
        self.valid_transitions().contains(&target)
    }

    pub fn from_db_status(status: &str) -> Option<Self> {
        match status.to_lowercase().as_str() {
            "requested" => Some(ReservationStatus::Requested),
            "confirmed" => Some(ReservationStatus::Confirmed),
            "completed" => Some(ReservationStatus::Completed),
            "fully_paid" => Some(ReservationStatus::FullyPaid),
            "cancelled_by_user" => Some(ReservationStatus::CancelledByUser),
            "cancelled_by_shop" => Some(ReservationStatus::CancelledByShop),
            "no_show" => Some(ReservationStatus::NoShow),
            _ => None,
        }
    }

    pub fn as_db_status(&self) -> &'static str {
        match self {
            ReservationStatus::Requested => "requested",
            ReservationStatus::Confirmed => "confirmed",
            ReservationStatus::Completed => "completed",
            ReservationStatus::FullyPaid => "fully_paid",
            ReservationStatus::CancelledByUser => "cancelled_by_user",
            ReservationStatus::CancelledByShop => "cancelled_by_shop",
            ReservationStatus::NoShow => "no_show",
        }
    }
}

impl std::fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_db_status())
    }
}

/// Reservation entity
#[derive(Debug, Clone, FromRow)]
pub struct Reservation {
    pub id: Uuid,
    pub user_id: Uuid,
    pub shop_id: Uuid,
    pub status: String,
    pub reservation_date: NaiveDate,
    pub reservation_time: NaiveTime,
    pub total_amount: i64,
    pub deposit_amount: Option<i64>,
    pub remaining_amount: Option<i64>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl Reservation {
    pub fn parsed_status(&self) -> Option<ReservationStatus> {
        ReservationStatus::from_db_status(&self.status)
    }

    /// Scheduled wall-clock instant in the platform timezone.
    pub fn civil_datetime(&self) -> NaiveDateTime {
        crate::clock::civil_datetime(self.reservation_date, self.reservation_time)
    }
}

const RESERVATION_COLUMNS: &str = "id, user_id, shop_id, status, reservation_date, \
     reservation_time, total_amount, deposit_amount, remaining_amount, created_at, updated_at";

/// Repository for reservation rows
pub struct ReservationRepository {
    pool: PgPool,
}

impl ReservationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Reservation>, DatabaseError> {
        sqlx::query_as::<_, Reservation>(&format!(
            "SELECT {} FROM reservations WHERE id = $1",
            RESERVATION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    /// Persist the deposit split. Guarded by the pre-deposit status so a
    /// concurrent cancellation can't resurrect the amounts.
    pub async fn set_deposit_amounts(
        &self,
        id: Uuid,
        deposit_amount: i64,
        remaining_amount: i64,
    ) -> Result<Option<Reservation>, DatabaseError> {
        Self::set_deposit_amounts_on(&self.pool, id, deposit_amount, remaining_amount).await
    }

    /// Executor-generic variant so the deposit split can join the pending
    /// payment insert in one transaction.
    pub async fn set_deposit_amounts_on<'e>(
        executor: impl sqlx::PgExecutor<'e>,
        id: Uuid,
        deposit_amount: i64,
        remaining_amount: i64,
    ) -> Result<Option<Reservation>, DatabaseError> {
        sqlx::query_as::<_, Reservation>(&format!(
            "UPDATE reservations
             SET deposit_amount = $2, remaining_amount = $3, updated_at = NOW()
             WHERE id = $1 AND status = 'requested'
             RETURNING {}",
            RESERVATION_COLUMNS
        ))
        .bind(id)
        .bind(deposit_amount)
        .bind(remaining_amount)
        .fetch_optional(executor)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    /// Compare-and-set status transition. Returns `None` when the row was not
    /// in `expected` anymore; the caller maps that to a stale-state error
    /// instead of silently overwriting a concurrent writer.
    pub async fn update_status_checked(
        &self,
        id: Uuid,
        expected: ReservationStatus,
        next: ReservationStatus,
    ) -> Result<Option<Reservation>, DatabaseError> {
        sqlx::query_as::<_, Reservation>(&format!(
            "UPDATE reservations
             SET status = $3, updated_at = NOW()
             WHERE id = $1 AND status = $2
             RETURNING {}",
            RESERVATION_COLUMNS
        ))
        .bind(id)
        .bind(expected.as_db_status())
        .bind(next.as_db_status())
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    /// Confirmed reservations whose civil schedule is before `cutoff` — the
    /// no-show detection query. `reservation_date + reservation_time` is a
    /// wall-clock timestamp in the platform timezone, so `cutoff` must be too.
    pub async fn find_overdue_confirmed(
        &self,
        cutoff: NaiveDateTime,
        limit: i64,
    ) -> Result<Vec<Reservation>, DatabaseError> {
        sqlx::query_as::<_, Reservation>(&format!(
            "SELECT {} FROM reservations
             WHERE status = 'confirmed'
               AND (reservation_date + reservation_time) < $1
             ORDER BY reservation_date, reservation_time
             LIMIT $2",
            RESERVATION_COLUMNS
        ))
        .bind(cutoff)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_transitions_are_valid() {
        assert!(ReservationStatus::Requested.can_transition_to(ReservationStatus::Confirmed));
        assert!(ReservationStatus::Confirmed.can_transition_to(ReservationStatus::Completed));
        assert!(ReservationStatus::Completed.can_transition_to(ReservationStatus::FullyPaid));
    }

    #[test]
    fn cancellation_branches_only_from_requested_or_confirmed() {
        for status in [ReservationStatus::Requested, ReservationStatus::Confirmed] {
            assert!(status.can_transition_to(ReservationStatus::CancelledByUser));
            assert!(status.can_transition_to(ReservationStatus::CancelledByShop));
            assert!(status.can_transition_to(ReservationStatus::NoShow));
        }
        assert!(!ReservationStatus::Completed.can_transition_to(ReservationStatus::NoShow));
    }

    #[test]
    fn terminal_states_accept_nothing() {
        for status in [
            ReservationStatus::FullyPaid,
            ReservationStatus::CancelledByUser,
            ReservationStatus::CancelledByShop,
            ReservationStatus::NoShow,
        ] {
            assert!(status.is_terminal());
            assert!(status.valid_transitions().is_empty());
        }
    }

    #[test]
    fn status_round_trips_through_db_strings() {
        for status in [
            ReservationStatus::Requested,
            ReservationStatus::Confirmed,
            ReservationStatus::Completed,
            ReservationStatus::FullyPaid,
            ReservationStatus::CancelledByUser,
            ReservationStatus::CancelledByShop,
            ReservationStatus::NoShow,
        ] {
            assert_eq!(
                ReservationStatus::from_db_status(status.as_db_status()),
                Some(status)
            );
        }
        assert_eq!(ReservationStatus::from_db_status("unknown"), None);
    }
}
