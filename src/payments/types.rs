use crate::payments::error::GatewayError;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::str::FromStr;
use uuid::Uuid;

/// The two stages of a reservation payment.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStage {
    Deposit,
    Final,
}

impl PaymentStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStage::Deposit => "deposit",
            PaymentStage::Final => "final",
        }
    }

    pub fn is_deposit(&self) -> bool {
        matches!(self, PaymentStage::Deposit)
    }
}

impl std::fmt::Display for PaymentStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PaymentStage {
    type Err = GatewayError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "deposit" => Ok(PaymentStage::Deposit),
            "final" => Ok(PaymentStage::Final),
            _ => Err(GatewayError::ValidationError {
                message: format!("unsupported payment stage: {}", value),
                field: Some("payment_stage".to_string()),
            }),
        }
    }
}

/// Payment row status. A monotonically-advancing projection of gateway events;
/// rows are never deleted, only moved forward.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    DepositPending,
    DepositPaid,
    FinalPaymentPending,
    FullyPaid,
    PaymentFailed,
    Cancelled,
    Refunded,
}

impl PaymentStatus {
    pub fn as_db_status(&self) -> &'static str {
        match self {
            PaymentStatus::DepositPending => "deposit_pending",
            PaymentStatus::DepositPaid => "deposit_paid",
            PaymentStatus::FinalPaymentPending => "final_payment_pending",
            PaymentStatus::FullyPaid => "fully_paid",
            PaymentStatus::PaymentFailed => "payment_failed",
            PaymentStatus::Cancelled => "cancelled",
            PaymentStatus::Refunded => "refunded",
        }
    }

    pub fn from_db_status(status: &str) -> Option<Self> {
        match status.to_lowercase().as_str() {
            "deposit_pending" => Some(PaymentStatus::DepositPending),
            "deposit_paid" => Some(PaymentStatus::DepositPaid),
            "final_payment_pending" => Some(PaymentStatus::FinalPaymentPending),
            "fully_paid" => Some(PaymentStatus::FullyPaid),
            "payment_failed" => Some(PaymentStatus::PaymentFailed),
            "cancelled" => Some(PaymentStatus::Cancelled),
            "refunded" => Some(PaymentStatus::Refunded),
            _ => None,
        }
    }

    /// Awaiting gateway confirmation. At most one pending payment may exist
    /// per (reservation, stage).
    pub fn is_pending(&self) -> bool {
        matches!(
            self,
            PaymentStatus::DepositPending | PaymentStatus::FinalPaymentPending
        )
    }

    /// Money has been collected and could be (partially) refunded.
    pub fn is_paid(&self) -> bool {
        matches!(self, PaymentStatus::DepositPaid | PaymentStatus::FullyPaid)
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_db_status())
    }
}

/// Customer contact details forwarded to the gateway checkout.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CustomerContact {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

/// Request to open a gateway checkout for one payment stage.
#[derive(Debug, Clone)]
pub struct InitializePaymentRequest {
    pub reservation_id: Uuid,
    pub user_id: Uuid,
    pub amount: i64,
    pub stage: PaymentStage,
    pub order_name: String,
    pub customer: CustomerContact,
    pub metadata: Option<JsonValue>,
}

impl InitializePaymentRequest {
    pub fn validate(&self) -> Result<(), GatewayError> {
        if self.amount <= 0 {
            return Err(GatewayError::ValidationError {
                message: "amount must be greater than zero".to_string(),
                field: Some("amount".to_string()),
            });
        }
        if self.order_name.trim().is_empty() {
            return Err(GatewayError::ValidationError {
                message: "order_name is required".to_string(),
                field: Some("order_name".to_string()),
            });
        }
        Ok(())
    }
}

/// Gateway-issued checkout handle returned to the API caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub payment_id: String,
    pub payment_key: String,
    pub order_id: String,
    pub checkout_url: String,
    pub amount: i64,
    pub stage: PaymentStage,
}

/// Request to cancel/refund a collected payment (full or partial amount).
#[derive(Debug, Clone)]
pub struct CancelPaymentRequest {
    pub payment_key: String,
    pub reason: String,
    pub amount: i64,
}

/// Gateway acknowledgement for a cancel/refund call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelAck {
    pub transaction_id: Option<String>,
    pub cancelled_amount: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payment_status_round_trips_through_db_strings() {
        for status in [
            PaymentStatus::DepositPending,
            PaymentStatus::DepositPaid,
            PaymentStatus::FinalPaymentPending,
            PaymentStatus::FullyPaid,
            PaymentStatus::PaymentFailed,
            PaymentStatus::Cancelled,
            PaymentStatus::Refunded,
        ] {
            assert_eq!(
                PaymentStatus::from_db_status(status.as_db_status()),
                Some(status)
            );
        }
        assert_eq!(PaymentStatus::from_db_status("bogus"), None);
    }

    #[test]
    fn pending_and_paid_predicates_do_not_overlap() {
        assert!(PaymentStatus::DepositPending.is_pending());
        assert!(PaymentStatus::FinalPaymentPending.is_pending());
        assert!(!PaymentStatus::DepositPaid.is_pending());

        assert!(PaymentStatus::DepositPaid.is_paid());
        assert!(PaymentStatus::FullyPaid.is_paid());
        assert!(!PaymentStatus::PaymentFailed.is_paid());
    }

    #[test]
    fn initialize_request_rejects_non_positive_amount() {
        let request = InitializePaymentRequest {
            reservation_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            amount: 0,
            stage: PaymentStage::Deposit,
            order_name: "cut & style".to_string(),
            customer: CustomerContact::default(),
            metadata: None,
        };
        assert!(request.validate().is_err());
    }

    #[test]
    fn stage_parses_from_db_strings() {
        assert_eq!("deposit".parse::<PaymentStage>().unwrap(), PaymentStage::Deposit);
        assert_eq!("final".parse::<PaymentStage>().unwrap(), PaymentStage::Final);
        assert!("installment".parse::<PaymentStage>().is_err());
    }
}
