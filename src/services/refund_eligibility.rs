//! Base refund eligibility by cancellation window.
//!
//! Pure tier lookup: hours until the reservation, measured on the platform's
//! civil wall-clock, select one configured tier. No I/O and no hidden "now" —
//! the caller supplies both instants, so decisions replay exactly under a
//! frozen clock.

use crate::clock::{format_civil, hours_between};
use crate::config::RefundPolicyConfig;
use chrono::NaiveDateTime;
use serde::Serialize;

/// Verdict of the tier lookup, before business-rule adjustments.
#[derive(Debug, Clone, Serialize)]
pub struct EligibilityResult {
    pub is_eligible: bool,
    pub refund_percentage: u8,
    pub hours_until_reservation: f64,
    /// Label of the tier that applied ("far-out", "standard", ...).
    pub cancellation_window: String,
    pub reason: String,
}

/// Select the refund tier for a cancellation decided at `civil_now` against a
/// reservation scheduled for `reservation_at` (both platform wall-clock).
///
/// A reservation already in the past falls through every positive tier and
/// lands on the final one, exactly like a cancellation inside the cutoff.
pub fn calculate_eligibility(
    config: &RefundPolicyConfig,
    reservation_at: NaiveDateTime,
    civil_now: NaiveDateTime,
) -> EligibilityResult {
    let hours = hours_between(civil_now, reservation_at);

    // Tiers are validated at startup to be ordered farthest-out first, so the
    // first matching boundary is the right one.
    let tier = config
        .tiers
        .iter()
        .find(|tier| hours >= tier.min_hours)
        .or_else(|| config.tiers.last());

    match tier {
        Some(tier) => {
            let is_eligible = tier.percentage > 0;
            let reason = if is_eligible {
                format!(
                    "cancelled {:.1}h before the reservation at {}; '{}' window refunds {}%",
                    hours,
                    format_civil(reservation_at),
                    tier.label,
                    tier.percentage
                )
            } else {
                format!(
                    "cancelled {:.1}h before the reservation at {}; '{}' window is past the refund cutoff",
                    hours,
                    format_civil(reservation_at),
                    tier.label
                )
            };
            EligibilityResult {
                is_eligible,
                refund_percentage: tier.percentage,
                hours_until_reservation: hours,
                cancellation_window: tier.label.clone(),
                reason,
            }
        }
        // Unreachable with a validated config; kept total instead of panicking.
        None => EligibilityResult {
            is_eligible: false,
            refund_percentage: 0,
            hours_until_reservation: hours,
            cancellation_window: "unconfigured".to_string(),
            reason: "no refund tiers configured".to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn civil(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    #[test]
    fn fifty_hours_out_lands_in_the_far_out_tier() {
        let config = RefundPolicyConfig::default();
        let result = calculate_eligibility(
            &config,
            civil(2025, 5, 3, 14, 0),
            civil(2025, 5, 1, 12, 0),
        );

        assert!(result.is_eligible);
        assert_eq!(result.refund_percentage, 100);
        assert_eq!(result.hours_until_reservation, 50.0);
        assert_eq!(result.cancellation_window, "far-out");
        assert!(result.reason.contains("Asia/Seoul"));
    }

    #[test]
    fn tier_boundaries_are_inclusive_on_the_far_side() {
        let config = RefundPolicyConfig::default();
        // Exactly 24h out takes the 24h tier, not the next one in.
        let result = calculate_eligibility(
            &config,
            civil(2025, 5, 2, 12, 0),
            civil(2025, 5, 1, 12, 0),
        );
        assert_eq!(result.refund_percentage, 70);
        assert_eq!(result.cancellation_window, "standard");
    }

    #[test]
    fn fractional_hours_pick_the_enclosing_tier() {
        let config = RefundPolicyConfig::default();
        // 23.5h out is inside the 12h tier.
        let result = calculate_eligibility(
            &config,
            civil(2025, 5, 2, 11, 30),
            civil(2025, 5, 1, 12, 0),
        );
        assert_eq!(result.refund_percentage, 50);
        assert_eq!(result.cancellation_window, "near-in");
    }

    #[test]
    fn inside_the_cutoff_is_not_eligible() {
        let config = RefundPolicyConfig::default();
        let result = calculate_eligibility(
            &config,
            civil(2025, 5, 1, 14, 0),
            civil(2025, 5, 1, 12, 0),
        );
        assert!(!result.is_eligible);
        assert_eq!(result.refund_percentage, 0);
        assert_eq!(result.cancellation_window, "cutoff");
    }

    #[test]
    fn past_reservations_fall_through_to_the_cutoff_tier() {
        let config = RefundPolicyConfig::default();
        let result = calculate_eligibility(
            &config,
            civil(2025, 5, 1, 10, 0),
            civil(2025, 5, 1, 12, 0),
        );
        assert!(!result.is_eligible);
        assert!(result.hours_until_reservation < 0.0);
    }

    #[test]
    fn same_inputs_always_produce_the_same_verdict() {
        let config = RefundPolicyConfig::default();
        let reservation = civil(2025, 7, 10, 18, 0);
        let now = civil(2025, 7, 9, 9, 0);

        let first = calculate_eligibility(&config, reservation, now);
        let second = calculate_eligibility(&config, reservation, now);
        assert_eq!(first.refund_percentage, second.refund_percentage);
        assert_eq!(first.reason, second.reason);
    }
}
