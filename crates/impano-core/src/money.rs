//! Minor-unit money helpers.
//!
//! All monetary amounts in the platform are carried as `i64` minor units
//! (cents; RWF is held at 2 decimals for internal accounting uniformity,
//! matching the donation ledger's `localAmount` convention). For example
//! USD 50.00 = 5_000 minor units.

use crate::error::ValidationError;

/// Minor units per major unit (2 decimal places).
pub const MINOR_PER_MAJOR: i64 = 100;

/// The minimum chargeable amount: 0.01 in any currency.
pub const MIN_AMOUNT_MINOR: i64 = 1;

/// Format a minor-unit amount as a major-unit decimal string, e.g.
/// `5_000` → `"50.00"`. Negative amounts keep their sign.
pub fn format_minor(amount_minor: i64) -> String {
    let sign = if amount_minor < 0 { "-" } else { "" };
    let abs = amount_minor.unsigned_abs();
    format!(
        "{sign}{}.{:02}",
        abs / MINOR_PER_MAJOR as u64,
        abs % MINOR_PER_MAJOR as u64
    )
}

/// Validate that an amount is chargeable (at least 0.01).
///
/// # Errors
///
/// [`ValidationError::InvalidAmount`] for zero or negative amounts.
pub fn validate_charge_amount(amount_minor: i64) -> Result<i64, ValidationError> {
    if amount_minor < MIN_AMOUNT_MINOR {
        return Err(ValidationError::InvalidAmount {
            reason: format!(
                "charge amount must be at least 0.01, got {}",
                format_minor(amount_minor)
            ),
        });
    }
    Ok(amount_minor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_whole_and_fractional_amounts() {
        assert_eq!(format_minor(5_000), "50.00");
        assert_eq!(format_minor(6_500_000), "65000.00");
        assert_eq!(format_minor(1), "0.01");
        assert_eq!(format_minor(0), "0.00");
        assert_eq!(format_minor(-150), "-1.50");
    }

    #[test]
    fn rejects_non_positive_charge_amounts() {
        assert!(validate_charge_amount(0).is_err());
        assert!(validate_charge_amount(-1).is_err());
        assert_eq!(validate_charge_amount(1).expect("valid"), 1);
    }
}
