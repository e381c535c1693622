//! Business-rule adjustments on top of the base eligibility verdict.
//!
//! Each cancellation type carries a configured percentage-point delta; the sum
//! with the base percentage is clamped to [0, 100]. Administrative overrides
//! bypass the timing gate entirely.

use crate::config::RefundPolicyConfig;
use crate::services::refund_eligibility::EligibilityResult;
use serde::{Deserialize, Serialize};

/// Who/why the cancellation happened.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CancellationType {
    UserRequest,
    ShopRequest,
    NoShow,
    AdminForce,
}

impl CancellationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CancellationType::UserRequest => "user_request",
            CancellationType::ShopRequest => "shop_request",
            CancellationType::NoShow => "no_show",
            CancellationType::AdminForce => "admin_force",
        }
    }
}

impl std::fmt::Display for CancellationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Customer-stated refund preference, captured at cancellation time.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RefundPreference {
    FullRefund,
    PartialRefund,
    NoRefund,
}

/// Final refund decision after adjustments.
#[derive(Debug, Clone, Serialize)]
pub struct AdjustedRefundDecision {
    pub is_eligible: bool,
    pub base_percentage: u8,
    pub final_percentage: u8,
    pub cancellation_type: CancellationType,
    pub applied_policies: Vec<String>,
    pub exceptions: Vec<String>,
    pub advisory_notes: Vec<String>,
}

/// Apply cancellation-type and preference deltas to a base verdict.
///
/// `admin_override_percentage` only matters for `AdminForce`: when set it is
/// the forced percentage, otherwise the override forces a full refund.
pub fn apply_adjustments(
    config: &RefundPolicyConfig,
    base: &EligibilityResult,
    cancellation_type: CancellationType,
    preference: Option<RefundPreference>,
    admin_override_percentage: Option<u8>,
) -> AdjustedRefundDecision {
    let mut applied_policies = vec![format!("base:{}", base.cancellation_window)];
    let mut exceptions = Vec::new();
    let mut advisory_notes = Vec::new();

    if cancellation_type == CancellationType::AdminForce {
        let forced = admin_override_percentage.unwrap_or(100).min(100);
        applied_policies.push("admin_force_override".to_string());
        exceptions.push("eligibility gate bypassed by administrative override".to_string());
        return AdjustedRefundDecision {
            is_eligible: forced > 0,
            base_percentage: base.refund_percentage,
            final_percentage: forced,
            cancellation_type,
            applied_policies,
            exceptions,
            advisory_notes,
        };
    }

    let mut delta: i32 = 0;

    match cancellation_type {
        CancellationType::ShopRequest => {
            delta += config.shop_request_delta;
            applied_policies.push("shop_request_adjustment".to_string());
        }
        CancellationType::NoShow => {
            delta += config.no_show_delta;
            applied_policies.push("no_show_penalty".to_string());
        }
        CancellationType::UserRequest | CancellationType::AdminForce => {}
    }

    match preference {
        Some(RefundPreference::NoRefund) => {
            delta += config.no_refund_preference_delta;
            applied_policies.push("customer_refund_waiver".to_string());
        }
        Some(RefundPreference::FullRefund) => {
            if base.refund_percentage < 100 {
                advisory_notes.push(
                    "customer requested full refund above the window entitlement; may require manual review"
                        .to_string(),
                );
            }
        }
        Some(RefundPreference::PartialRefund) | None => {}
    }

    let final_percentage = (base.refund_percentage as i32 + delta).clamp(0, 100) as u8;

    advisory_notes.push(format!(
        "decision made {:.1}h before the reservation; refunds settle on the next business day",
        base.hours_until_reservation
    ));

    AdjustedRefundDecision {
        is_eligible: final_percentage > 0,
        base_percentage: base.refund_percentage,
        final_percentage,
        cancellation_type,
        applied_policies,
        exceptions,
        advisory_notes,
    }
}
