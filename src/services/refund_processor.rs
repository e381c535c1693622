//! Refund execution and the immutable audit trail.
//!
//! `calculate_refund_amount` is read-only: eligibility, adjustments, amount
//! and a processing-time estimate. `process_refund` re-runs the calculation,
//! cancels each collected payment at the gateway, and writes an audit record
//! whether or not the gateway cooperated. Audit-write failures are logged and
//! swallowed so they can never undo a refund that already happened.

use crate::clock::{format_civil, SharedClock, CIVIL_TZ_LABEL};
use crate::config::RefundPolicyConfig;
use crate::database::payment_repository::{Payment, PaymentRepository};
use crate::database::refund_audit_repository::{NewRefundAuditRecord, RefundAuditRepository};
use crate::database::reservation_repository::{Reservation, ReservationRepository};
use crate::error::{AppError, AppResult, DomainError};
use crate::payments::gateway::PaymentGateway;
use crate::payments::types::{CancelPaymentRequest, PaymentStatus};
use crate::services::refund_eligibility::{calculate_eligibility, EligibilityResult};
use crate::services::refund_policy::{
    apply_adjustments, AdjustedRefundDecision, CancellationType, RefundPreference,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Refund request from a cancellation flow or the no-show worker.
#[derive(Debug, Clone)]
pub struct RefundRequest {
    pub reservation_id: Uuid,
    pub user_id: Uuid,
    pub cancellation_type: CancellationType,
    pub preference: Option<RefundPreference>,
    /// Forced percentage for administrative overrides.
    pub admin_override_percentage: Option<u8>,
    pub reason: String,
}

/// Complete refund decision, before any gateway call.
#[derive(Debug, Clone, Serialize)]
pub struct RefundCalculation {
    pub reservation_id: Uuid,
    pub eligibility: EligibilityResult,
    pub decision: AdjustedRefundDecision,
    pub total_amount: i64,
    pub refund_amount: i64,
    pub processing_time_estimate: String,
    pub calculated_at_civil: String,
    pub reservation_at_civil: String,
    pub timezone: String,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RefundStatus {
    NotEligible,
    Succeeded,
    Failed,
}

/// Structured result of a refund attempt. Gateway failures surface here, not
/// as errors: the caller always gets a result it can record.
#[derive(Debug, Clone, Serialize)]
pub struct RefundOutcome {
    pub status: RefundStatus,
    pub refund_amount: i64,
    pub refund_percentage: u8,
    pub transaction_id: Option<String>,
    pub audit_id: Option<Uuid>,
    pub failure_reason: Option<String>,
    pub duration_ms: u128,
}

/// Refund processor service
pub struct RefundProcessor {
    reservations: Arc<ReservationRepository>,
    payments: Arc<PaymentRepository>,
    audit: Arc<RefundAuditRepository>,
    gateway: Arc<dyn PaymentGateway>,
    clock: SharedClock,
    policy: RefundPolicyConfig,
}

impl RefundProcessor {
    pub fn new(
        reservations: Arc<ReservationRepository>,
        payments: Arc<PaymentRepository>,
        audit: Arc<RefundAuditRepository>,
        gateway: Arc<dyn PaymentGateway>,
        clock: SharedClock,
        policy: RefundPolicyConfig,
    ) -> Self {
        Self {
            reservations,
            payments,
            audit,
            gateway,
            clock,
            policy,
        }
    }

    /// Read-only refund quote for a reservation.
    pub async fn calculate_refund_amount(
        &self,
        request: &RefundRequest,
    ) -> AppResult<RefundCalculation> {
        let reservation = self.load_reservation(request.reservation_id).await?;
        Ok(self.calculate_for(&reservation, request))
    }

    fn calculate_for(&self, reservation: &Reservation, request: &RefundRequest) -> RefundCalculation {
        let civil_now = self.clock.civil_now();
        let reservation_at = reservation.civil_datetime();

        let eligibility = calculate_eligibility(&self.policy, reservation_at, civil_now);
        let decision = apply_adjustments(
            &self.policy,
            &eligibility,
            request.cancellation_type,
            request.preference,
            request.admin_override_percentage,
        );

        let refund_amount =
            rounded_percentage(reservation.total_amount, decision.final_percentage);

        RefundCalculation {
            reservation_id: reservation.id,
            processing_time_estimate: processing_time_estimate(
                eligibility.hours_until_reservation,
            ),
            eligibility,
            decision,
            total_amount: reservation.total_amount,
            refund_amount,
            calculated_at_civil: format_civil(civil_now),
            reservation_at_civil: format_civil(reservation_at),
            timezone: CIVIL_TZ_LABEL.to_string(),
        }
    }

    /// Execute a refund. Cancels each collected payment proportionally and
    /// audits the outcome; infrastructure failures before the decision point
    /// still propagate as errors.
    pub async fn process_refund(&self, request: &RefundRequest) -> AppResult<RefundOutcome> {
        let started = Instant::now();
        let reservation = self.load_reservation(request.reservation_id).await?;
        let calculation = self.calculate_for(&reservation, request);

        if !calculation.decision.is_eligible || calculation.refund_amount <= 0 {
            info!(
                reservation_id = %request.reservation_id,
                cancellation_type = %request.cancellation_type,
                window = %calculation.eligibility.cancellation_window,
                "refund not eligible, gateway not contacted"
            );
            // Audited like any other outcome: the trail records why nothing
            // was paid out.
            let reason = Some(calculation.eligibility.reason.clone());
            let audit_id = self
                .write_audit(request, &calculation, None, false, &reason)
                .await;
            return Ok(RefundOutcome {
                status: RefundStatus::NotEligible,
                refund_amount: 0,
                refund_percentage: calculation.decision.final_percentage,
                transaction_id: None,
                audit_id,
                failure_reason: reason,
                duration_ms: started.elapsed().as_millis(),
            });
        }

        let paid_payments = self
            .payments
            .find_paid_by_reservation(request.reservation_id)
            .await
            .map_err(AppError::from)?;

        let percentage = calculation.decision.final_percentage;
        let mut refunded_total: i64 = 0;
        let mut transaction_id: Option<String> = None;
        let mut failure_reason: Option<String> = None;

        for payment in &paid_payments {
            let cancel_amount = rounded_percentage(payment.amount, percentage);
            if cancel_amount <= 0 {
                continue;
            }
            let payment_key = match &payment.gateway_payment_key {
                Some(key) => key.clone(),
                None => {
                    warn!(
                        payment_id = %payment.id,
                        "paid payment has no gateway key, skipping gateway cancel"
                    );
                    failure_reason =
                        Some(format!("payment {} has no gateway payment key", payment.id));
                    continue;
                }
            };

            match self
                .gateway
                .cancel_payment(CancelPaymentRequest {
                    payment_key,
                    reason: request.reason.clone(),
                    amount: cancel_amount,
                })
                .await
            {
                Ok(ack) => {
                    refunded_total += ack.cancelled_amount;
                    // Synthetic id when the gateway omits one, so the audit
                    // row always carries a traceable transaction reference.
                    transaction_id = Some(
                        ack.transaction_id
                            .unwrap_or_else(|| format!("refund-{}", Uuid::new_v4().simple())),
                    );
                    self.mark_payment(payment, PaymentStatus::Refunded).await;
                }
                Err(err) => {
                    error!(
                        payment_id = %payment.id,
                        reservation_id = %request.reservation_id,
                        error = %err,
                        "gateway cancel failed"
                    );
                    failure_reason = Some(err.to_string());
                    self.mark_payment(payment, PaymentStatus::PaymentFailed).await;
                }
            }
        }

        let succeeded = failure_reason.is_none() && !paid_payments.is_empty();
        let audit_id = self
            .write_audit(request, &calculation, transaction_id.clone(), succeeded, &failure_reason)
            .await;

        if succeeded {
            info!(
                reservation_id = %request.reservation_id,
                refund_amount = refunded_total,
                refund_percentage = percentage,
                "refund processed"
            );
        }

        Ok(RefundOutcome {
            status: if succeeded {
                RefundStatus::Succeeded
            } else {
                RefundStatus::Failed
            },
            refund_amount: refunded_total,
            refund_percentage: percentage,
            transaction_id,
            audit_id,
            failure_reason: if succeeded {
                None
            } else {
                Some(
                    failure_reason
                        .unwrap_or_else(|| "no collected payments to refund".to_string()),
                )
            },
            duration_ms: started.elapsed().as_millis(),
        })
    }

    /// CAS the payment row from its current paid status. A stale or failed
    /// update is logged only; the audit record is the source of truth.
    async fn mark_payment(&self, payment: &Payment, next: PaymentStatus) {
        let Some(current) = payment.parsed_status() else {
            warn!(
                payment_id = %payment.id,
                status = %payment.payment_status,
                "payment has an unrecognised status, leaving it untouched"
            );
            return;
        };
        match self.payments.update_status(payment.id, current, next).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                warn!(
                    payment_id = %payment.id,
                    "payment status changed concurrently, status not updated"
                );
            }
            Err(err) => {
                error!(
                    payment_id = %payment.id,
                    error = %err,
                    "payment status update failed after gateway cancel"
                );
            }
        }
    }

    /// Audit every attempted refund. A failed insert is logged and swallowed;
    /// the refund decision stands regardless.
    async fn write_audit(
        &self,
        request: &RefundRequest,
        calculation: &RefundCalculation,
        transaction_id: Option<String>,
        succeeded: bool,
        failure_reason: &Option<String>,
    ) -> Option<Uuid> {
        let applied_policies = serde_json::json!({
            "applied": calculation.decision.applied_policies,
            "exceptions": calculation.decision.exceptions,
            "notes": calculation.decision.advisory_notes,
        });

        let record = NewRefundAuditRecord {
            reservation_id: request.reservation_id,
            user_id: request.user_id,
            cancellation_type: request.cancellation_type.as_str().to_string(),
            refund_percentage: calculation.decision.final_percentage as i16,
            original_amount: calculation.total_amount,
            refund_amount: calculation.refund_amount,
            cancellation_window: calculation.eligibility.cancellation_window.clone(),
            reason: request.reason.clone(),
            applied_policies,
            decided_at_civil: calculation.calculated_at_civil.clone(),
            reservation_at_civil: calculation.reservation_at_civil.clone(),
            timezone: calculation.timezone.clone(),
            gateway_transaction_id: transaction_id,
            succeeded,
            failure_reason: failure_reason.clone(),
        };

        match self.audit.append(record).await {
            Ok(row) => Some(row.id),
            Err(err) => {
                error!(
                    reservation_id = %request.reservation_id,
                    error = %err,
                    "refund audit write failed; refund outcome is unaffected"
                );
                None
            }
        }
    }

    async fn load_reservation(&self, reservation_id: Uuid) -> AppResult<Reservation> {
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
}

/// `amount * percentage / 100`, rounded to the nearest currency unit.
fn rounded_percentage(amount: i64, percentage: u8) -> i64 {
    (amount * percentage as i64 + 50) / 100
}

/// Coarse settlement estimate shown to the customer, by cancellation window.
fn processing_time_estimate(hours_until_reservation: f64) -> String {
    if hours_until_reservation >= 48.0 {
        "1-2 business days".to_string()
    } else if hours_until_reservation >= 12.0 {
        "3-5 business days".to_string()
    } else {
        "5-7 business days".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refund_amount_rounds_to_nearest_unit() {
        assert_eq!(rounded_percentage(100_000, 100), 100_000);
        assert_eq!(rounded_percentage(100_000, 70), 70_000);
        assert_eq!(rounded_percentage(25_000, 50), 12_500);
        // 33% of 101 = 33.33 rounds down, 50% of 101 = 50.5 rounds up
        assert_eq!(rounded_percentage(101, 33), 33);
        assert_eq!(rounded_percentage(101, 50), 51);
        assert_eq!(rounded_percentage(100_000, 0), 0);
    }

    #[test]
    fn settlement_estimate_tracks_the_window() {
        assert_eq!(processing_time_estimate(50.0), "1-2 business days");
        assert_eq!(processing_time_estimate(24.0), "3-5 business days");
        assert_eq!(processing_time_estimate(2.0), "5-7 business days");
    }
}
