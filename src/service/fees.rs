// service/fees.rs
//
// Pure fee arithmetic. Each output field is rounded independently from its
// own multiplication; nothing is derived from another rounded field, so no
// cumulative drift.
use serde::Serialize;

use crate::{service::error::ServiceError, utils::currency::round2};

/// Platform cut taken from the hustler's side of the job amount.
pub const PLATFORM_FEE_RATE: f64 = 0.12;
/// Service fee charged to the customer on top of the job amount.
pub const CUSTOMER_FEE_RATE: f64 = 0.065;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FeeBreakdown {
    pub job_amount: f64,
    pub platform_fee: f64,
    pub customer_fee: f64,
    pub hustler_payout: f64,
    /// job_amount + customer_fee. Tip is excluded from fee math and passed
    /// through unchanged.
    pub total: f64,
    pub tip_amount: f64,
}

pub fn calculate_fees(job_amount: f64, tip_amount: f64) -> Result<FeeBreakdown, ServiceError> {
    if !job_amount.is_finite() || job_amount < 0.0 {
        return Err(ServiceError::Validation(format!(
            "job amount must be a non-negative number, got {job_amount}"
        )));
    }
    if !tip_amount.is_finite() || tip_amount < 0.0 {
        return Err(ServiceError::Validation(format!(
            "tip amount must be a non-negative number, got {tip_amount}"
        )));
    }

    let platform_fee = round2(job_amount * PLATFORM_FEE_RATE);
    let customer_fee = round2(job_amount * CUSTOMER_FEE_RATE);
    let hustler_payout = round2(job_amount - platform_fee);
    let total = round2(job_amount + customer_fee);

    Ok(FeeBreakdown {
        job_amount,
        platform_fee,
        customer_fee,
        hustler_payout,
        total,
        tip_amount,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hundred_dollar_flat_job() {
        let fees = calculate_fees(100.0, 0.0).unwrap();
        assert_eq!(fees.platform_fee, 12.00);
        assert_eq!(fees.customer_fee, 6.50);
        assert_eq!(fees.hustler_payout, 88.00);
        assert_eq!(fees.total, 106.50);
    }

    #[test]
    fn tip_is_passed_through_untouched() {
        let fees = calculate_fees(100.0, 15.0).unwrap();
        assert_eq!(fees.tip_amount, 15.0);
        // Fee math ignores the tip entirely.
        assert_eq!(fees.total, 106.50);
        assert_eq!(fees.platform_fee, 12.00);
    }

    #[test]
    fn fractional_amounts_round_half_up_per_field() {
        let fees = calculate_fees(33.33, 0.0).unwrap();
        assert_eq!(fees.platform_fee, 4.00); // 3.9996
        assert_eq!(fees.customer_fee, 2.17); // 2.16645
        assert_eq!(fees.hustler_payout, 29.33);
        assert_eq!(fees.total, 35.50);
    }

    #[test]
    fn payout_plus_platform_fee_reconstructs_amount() {
        for amount in [0.0, 1.0, 19.99, 33.33, 100.0, 250.55, 9876.54] {
            let fees = calculate_fees(amount, 0.0).unwrap();
            assert!((fees.hustler_payout + fees.platform_fee - amount).abs() < 0.01);
            assert!((fees.total - amount - fees.customer_fee).abs() < 0.01);
        }
    }

    #[test]
    fn rejects_negative_amount() {
        assert!(calculate_fees(-1.0, 0.0).is_err());
        assert!(calculate_fees(f64::NAN, 0.0).is_err());
        assert!(calculate_fees(100.0, -5.0).is_err());
    }

    #[test]
    fn zero_amount_is_allowed() {
        let fees = calculate_fees(0.0, 0.0).unwrap();
        assert_eq!(fees.total, 0.0);
        assert_eq!(fees.hustler_payout, 0.0);
    }
}
