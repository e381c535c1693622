//! Two-stage payment orchestration.
//!
//! Drives the deposit/final lifecycle: amount validation, duplicate-pending
//! protection, gateway checkout initialization, and reservation status
//! transitions. Status moves are compare-and-set at the datastore, so a
//! concurrent cancellation or confirmation loses cleanly with a stale-state
//! error instead of overwriting.

use crate::clock::SharedClock;
use crate::database::error::DatabaseError;
use crate::database::payment_repository::{NewPayment, Payment, PaymentRepository};
use crate::database::reservation_repository::{
    Reservation, ReservationRepository, ReservationStatus,
};
use crate::error::{AppError, AppResult, DomainError};
use crate::payments::gateway::PaymentGateway;
use crate::payments::types::{
    CheckoutSession, CustomerContact, InitializePaymentRequest, PaymentStage, PaymentStatus,
};
use chrono::Duration;
use serde::Serialize;
use serde_json::json;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::services::notification::{NotificationEvent, NotificationSender};

/// Deposit must fall within this band of the reservation total.
pub const MIN_DEPOSIT_PERCENT: i64 = 20;
pub const MAX_DEPOSIT_PERCENT: i64 = 30;

/// Final payments are due this long after the completion trigger.
pub const FINAL_PAYMENT_DUE_HOURS: i64 = 72;

/// Result of the idempotent completion trigger.
#[derive(Debug)]
pub enum FinalPaymentTrigger {
    Created(Payment),
    AlreadyExists,
}

/// Point-in-time view of a reservation's payments.
#[derive(Debug, Serialize)]
pub struct PaymentStatusSummary {
    pub reservation_id: Uuid,
    pub reservation_status: String,
    pub total_amount: i64,
    pub deposit_amount: Option<i64>,
    pub remaining_amount: Option<i64>,
    pub deposit_status: Option<String>,
    pub final_status: Option<String>,
    pub final_due_date: Option<chrono::DateTime<chrono::Utc>>,
    /// A pending final payment past its due date. Surfaced only; expiry is
    /// the caller's call.
    pub is_overdue: bool,
}

/// Two-stage payment orchestrator
pub struct PaymentOrchestrator {
    pool: PgPool,
    reservations: Arc<ReservationRepository>,
    payments: Arc<PaymentRepository>,
    gateway: Arc<dyn PaymentGateway>,
    clock: SharedClock,
    notifications: NotificationSender,
}

impl PaymentOrchestrator {
    pub fn new(
        pool: PgPool,
        reservations: Arc<ReservationRepository>,
        payments: Arc<PaymentRepository>,
        gateway: Arc<dyn PaymentGateway>,
        clock: SharedClock,
        notifications: NotificationSender,
    ) -> Self {
        Self {
            pool,
            reservations,
            payments,
            gateway,
            clock,
            notifications,
        }
    }

    /// Open a deposit checkout for a reservation the caller owns.
    pub async fn prepare_deposit_payment(
        &self,
        reservation_id: Uuid,
        user_id: Uuid,
        deposit_amount: i64,
        customer: CustomerContact,
    ) -> AppResult<CheckoutSession> {
        let reservation = self.load_owned(reservation_id, user_id).await?;

        let (min_allowed, max_allowed) = deposit_bounds(reservation.total_amount);
        if deposit_amount < min_allowed || deposit_amount > max_allowed {
            return Err(AppError::domain(DomainError::InvalidDepositAmount {
                deposit: deposit_amount,
                min_allowed,
                max_allowed,
            }));
        }

        // Fast duplicate check; the insert below is the authoritative one.
        if self
            .payments
            .find_pending_by_stage(reservation_id, PaymentStage::Deposit)
            .await
            .map_err(AppError::from)?
            .is_some()
        {
            return Err(duplicate_pending(reservation_id, PaymentStage::Deposit));
        }

        let session = self
            .gateway
            .initialize_payment(InitializePaymentRequest {
                reservation_id,
                user_id,
                amount: deposit_amount,
                stage: PaymentStage::Deposit,
                order_name: format!("Reservation deposit ({}%)", percent_of(deposit_amount, reservation.total_amount)),
                customer,
                metadata: None,
            })
            .await?;

        // Split and pending row commit together: a rollback leaves the
        // reservation untouched, and a losing concurrent prepare cannot
        // overwrite the winner's persisted amounts.
        let remaining = reservation.total_amount - deposit_amount;
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(DatabaseError::from_sqlx)
            .map_err(AppError::from)?;

        ReservationRepository::set_deposit_amounts_on(
            &mut *tx,
            reservation_id,
            deposit_amount,
            remaining,
        )
        .await
        .map_err(AppError::from)?
        .ok_or_else(|| stale_state(&reservation, ReservationStatus::Requested))?;

        let inserted = PaymentRepository::insert_pending_on(
            &mut *tx,
            NewPayment {
                reservation_id,
                user_id,
                stage: PaymentStage::Deposit,
                status: PaymentStatus::DepositPending,
                amount: deposit_amount,
                due_date: None,
                gateway_payment_key: Some(session.payment_key.clone()),
                metadata: json!({ "order_id": session.order_id }),
            },
        )
        .await
        .map_err(AppError::from)?;

        if inserted.is_none() {
            // Lost the race to another request; rolling back discards our
            // amounts and the orphaned gateway session expires on its own.
            return Err(duplicate_pending(reservation_id, PaymentStage::Deposit));
        }

        tx.commit()
            .await
            .map_err(DatabaseError::from_sqlx)
            .map_err(AppError::from)?;

        info!(
            reservation_id = %reservation_id,
            deposit_amount,
            remaining,
            "deposit checkout prepared"
        );
        Ok(session)
    }

    /// Open the final-balance checkout after service completion.
    pub async fn prepare_final_payment(
        &self,
        reservation_id: Uuid,
        user_id: Uuid,
        customer: CustomerContact,
    ) -> AppResult<CheckoutSession> {
        let reservation = self.load_owned(reservation_id, user_id).await?;

        if reservation.parsed_status() != Some(ReservationStatus::Completed) {
            return Err(AppError::domain(DomainError::ServiceNotCompleted {
                reservation_id: reservation_id.to_string(),
            }));
        }

        let deposit_paid = self
            .payments
            .find_by_stage(reservation_id, PaymentStage::Deposit)
            .await
            .map_err(AppError::from)?
            .into_iter()
            .any(|p| p.parsed_status() == Some(PaymentStatus::DepositPaid));
        if !deposit_paid {
            return Err(AppError::domain(DomainError::DepositNotPaid {
                reservation_id: reservation_id.to_string(),
            }));
        }

        if self
            .payments
            .exists_final(reservation_id)
            .await
            .map_err(AppError::from)?
        {
            return Err(duplicate_pending(reservation_id, PaymentStage::Final));
        }

        let final_amount = reservation.remaining_amount.unwrap_or(
            reservation.total_amount - reservation.deposit_amount.unwrap_or(0),
        );
        if final_amount <= 0 {
            return Err(AppError::domain(DomainError::NoRemainingBalance {
                reservation_id: reservation_id.to_string(),
            }));
        }

        let session = self
            .gateway
            .initialize_payment(InitializePaymentRequest {
                reservation_id,
                user_id,
                amount: final_amount,
                stage: PaymentStage::Final,
                order_name: "Reservation final payment".to_string(),
                customer,
                metadata: None,
            })
            .await?;

        let inserted = self
            .payments
            .insert_pending(NewPayment {
                reservation_id,
                user_id,
                stage: PaymentStage::Final,
                status: PaymentStatus::FinalPaymentPending,
                amount: final_amount,
                due_date: Some(self.clock.now_utc() + Duration::hours(FINAL_PAYMENT_DUE_HOURS)),
                gateway_payment_key: Some(session.payment_key.clone()),
                metadata: json!({ "order_id": session.order_id }),
            })
            .await
            .map_err(AppError::from)?;

        if inserted.is_none() {
            return Err(duplicate_pending(reservation_id, PaymentStage::Final));
        }

        info!(
            reservation_id = %reservation_id,
            final_amount,
            "final payment checkout prepared"
        );
        Ok(session)
    }

    /// System-invoked on the service-completion event. Idempotent: a second
    /// call observes the existing final payment and does nothing.
    pub async fn trigger_final_payment_after_completion(
        &self,
        reservation_id: Uuid,
    ) -> AppResult<FinalPaymentTrigger> {
        let reservation = self.load(reservation_id).await?;

        if self
            .payments
            .exists_final(reservation_id)
            .await
            .map_err(AppError::from)?
        {
            return Ok(FinalPaymentTrigger::AlreadyExists);
        }

        let final_amount = reservation.remaining_amount.unwrap_or(
            reservation.total_amount - reservation.deposit_amount.unwrap_or(0),
        );
        if final_amount <= 0 {
            return Err(AppError::domain(DomainError::NoRemainingBalance {
                reservation_id: reservation_id.to_string(),
            }));
        }

        let due_date = self.clock.now_utc() + Duration::hours(FINAL_PAYMENT_DUE_HOURS);
        let inserted = self
            .payments
            .insert_pending(NewPayment {
                reservation_id,
                user_id: reservation.user_id,
                stage: PaymentStage::Final,
                status: PaymentStatus::FinalPaymentPending,
                amount: final_amount,
                due_date: Some(due_date),
                gateway_payment_key: None,
                metadata: json!({ "auto_triggered": true }),
            })
            .await
            .map_err(AppError::from)?;

        let payment = match inserted {
            Some(payment) => payment,
            // Concurrent trigger won; same outcome as the existence check.
            None => return Ok(FinalPaymentTrigger::AlreadyExists),
        };

        // Post-commit event; a full dispatcher mailbox or dropped receiver
        // must not fail the trigger.
        if self
            .notifications
            .send(NotificationEvent::FinalPaymentRequested {
                user_id: reservation.user_id,
                reservation_id,
                amount: final_amount,
                due_in_hours: FINAL_PAYMENT_DUE_HOURS,
            })
            .is_err()
        {
            warn!(reservation_id = %reservation_id, "notification channel closed, event dropped");
        }

        info!(
            reservation_id = %reservation_id,
            final_amount,
            due_date = %due_date,
            "final payment auto-triggered"
        );
        Ok(FinalPaymentTrigger::Created(payment))
    }

    /// Gateway confirmed the deposit: payment row to `deposit_paid`, then the
    /// reservation to `confirmed`.
    pub async fn process_deposit_payment_confirmation(
        &self,
        reservation_id: Uuid,
    ) -> AppResult<Reservation> {
        let pending = self
            .payments
            .find_pending_by_stage(reservation_id, PaymentStage::Deposit)
            .await
            .map_err(AppError::from)?
            .ok_or_else(|| payment_not_found(reservation_id, PaymentStage::Deposit))?;

        self.payments
            .mark_paid(pending.id, PaymentStatus::DepositPending, PaymentStatus::DepositPaid)
            .await
            .map_err(AppError::from)?
            .ok_or_else(|| payment_not_found(reservation_id, PaymentStage::Deposit))?;

        let reservation = self.load(reservation_id).await?;
        self.transition(&reservation, ReservationStatus::Requested, ReservationStatus::Confirmed)
            .await
    }

    /// Gateway confirmed the final payment: payment row to `fully_paid`, then
    /// the reservation to `fully_paid`.
    pub async fn process_final_payment_confirmation(
        &self,
        reservation_id: Uuid,
    ) -> AppResult<Reservation> {
        let pending = self
            .payments
            .find_pending_by_stage(reservation_id, PaymentStage::Final)
            .await
            .map_err(AppError::from)?
            .ok_or_else(|| payment_not_found(reservation_id, PaymentStage::Final))?;

        self.payments
            .mark_paid(
                pending.id,
                PaymentStatus::FinalPaymentPending,
                PaymentStatus::FullyPaid,
            )
            .await
            .map_err(AppError::from)?
            .ok_or_else(|| payment_not_found(reservation_id, PaymentStage::Final))?;

        let reservation = self.load(reservation_id).await?;
        self.transition(&reservation, ReservationStatus::Completed, ReservationStatus::FullyPaid)
            .await
    }

    /// Service performed: move the reservation to `completed` and auto-create
    /// the final payment.
    pub async fn mark_service_completed(&self, reservation_id: Uuid) -> AppResult<Reservation> {
        let reservation = self.load(reservation_id).await?;
        let updated = self
            .transition(&reservation, ReservationStatus::Confirmed, ReservationStatus::Completed)
            .await?;
        self.trigger_final_payment_after_completion(reservation_id)
            .await?;
        Ok(updated)
    }

    /// Point-in-time payment summary with the overdue flag for the final stage.
    pub async fn payment_status_summary(
        &self,
        reservation_id: Uuid,
    ) -> AppResult<PaymentStatusSummary> {
        let reservation = self.load(reservation_id).await?;

        let deposit = self
            .payments
            .find_by_stage(reservation_id, PaymentStage::Deposit)
            .await
            .map_err(AppError::from)?
            .into_iter()
            .last();
        let final_payment = self
            .payments
            .find_by_stage(reservation_id, PaymentStage::Final)
            .await
            .map_err(AppError::from)?
            .into_iter()
            .last();

        let now = self.clock.now_utc();
        let is_overdue = final_payment
            .as_ref()
            .map(|p| {
                p.parsed_status() == Some(PaymentStatus::FinalPaymentPending)
                    && p.due_date.map(|due| due < now).unwrap_or(false)
            })
            .unwrap_or(false);

        Ok(PaymentStatusSummary {
            reservation_id,
            reservation_status: reservation.status.clone(),
            total_amount: reservation.total_amount,
            deposit_amount: reservation.deposit_amount,
            remaining_amount: reservation.remaining_amount,
            deposit_status: deposit.map(|p| p.payment_status),
            final_status: final_payment.as_ref().map(|p| p.payment_status.clone()),
            final_due_date: final_payment.as_ref().and_then(|p| p.due_date),
            is_overdue,
        })
    }

    async fn transition(
        &self,
        reservation: &Reservation,
        expected: ReservationStatus,
        next: ReservationStatus,
    ) -> AppResult<Reservation> {
        self.reservations
            .update_status_checked(reservation.id, expected, next)
            .await
            .map_err(AppError::from)?
            .ok_or_else(|| stale_state(reservation, next))
    }

    async fn load(&self, reservation_id: Uuid) -> AppResult<Reservation> {
        self.reservations
            .find_by_id(reservation_id)
            .await
            .map_err(AppError::from)?
            .ok_or_else(|| {
                AppError::domain(DomainError::ReservationNotFound {
                    reservation_id: reservation_id.to_string(),
                })
            })
    }

    async fn load_owned(&self, reservation_id: Uuid, user_id: Uuid) -> AppResult<Reservation> {
        let reservation = self.load(reservation_id).await?;
        if reservation.user_id != user_id {
            return Err(AppError::domain(
                DomainError::UnauthorizedReservationAccess {
                    reservation_id: reservation_id.to_string(),
                    user_id: user_id.to_string(),
                },
            ));
        }
        Ok(reservation)
    }
}

/// Allowed deposit band, rounded down at both boundaries.
pub fn deposit_bounds(total_amount: i64) -> (i64, i64) {
    (
        total_amount * MIN_DEPOSIT_PERCENT / 100,
        total_amount * MAX_DEPOSIT_PERCENT / 100,
    )
}

fn percent_of(part: i64, whole: i64) -> i64 {
    if whole == 0 {
        0
    } else {
        part * 100 / whole
    }
}

fn duplicate_pending(reservation_id: Uuid, stage: PaymentStage) -> AppError {
    AppError::domain(DomainError::DuplicatePendingPayment {
        reservation_id: reservation_id.to_string(),
        stage: stage.as_str().to_string(),
    })
}

fn payment_not_found(reservation_id: Uuid, stage: PaymentStage) -> AppError {
    AppError::domain(DomainError::PaymentNotFound {
        reservation_id: reservation_id.to_string(),
        stage: stage.as_str().to_string(),
    })
}

fn stale_state(reservation: &Reservation, requested: ReservationStatus) -> AppError {
    AppError::domain(DomainError::StaleState {
        reservation_id: reservation.id.to_string(),
        current: reservation.status.clone(),
        requested: requested.as_db_status().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deposit_bounds_round_down() {
        assert_eq!(deposit_bounds(100_000), (20_000, 30_000));
        // Odd totals floor at both ends
        assert_eq!(deposit_bounds(99_999), (19_999, 29_999));
        assert_eq!(deposit_bounds(0), (0, 0));
    }

    #[test]
    fn twenty_five_percent_deposit_is_inside_the_band() {
        let (min, max) = deposit_bounds(100_000);
        assert!(25_000 >= min && 25_000 <= max);
        assert!(40_000 > max);
        assert!(15_000 < min);
    }
}
