//! MSISDN normalization for mobile-money submissions.
//!
//! The mobile-money operator API accepts wallet numbers only in the
//! canonical local format: ten digits with a leading `0` (e.g.
//! `0788123456`). Donors capture numbers in every shape imaginable —
//! `+250 788 123 456`, `250788123456`, `788123456` — so every number is
//! normalized here exactly once, immediately before gateway submission.

use crate::error::GatewayError;

/// Rwanda's international dialing prefix.
const COUNTRY_PREFIX: &str = "250";

/// Canonical local number length, leading zero included.
const LOCAL_LEN: usize = 10;

/// Normalize a phone number to the canonical local format.
///
/// Steps: strip every non-digit character (spaces, dashes, `+`); collapse
/// a leading international `250` prefix to `0`; left-pad a nine-digit
/// subscriber number with the missing leading `0`.
///
/// # Errors
///
/// [`GatewayError::Rejected`] when the result is not a plausible local
/// number (wrong length after normalization, or no digits at all).
pub fn normalize_msisdn(raw: &str) -> Result<String, GatewayError> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return Err(GatewayError::Rejected {
            reason: format!("phone number contains no digits: '{raw}'"),
        });
    }

    let local = if let Some(rest) = digits.strip_prefix(COUNTRY_PREFIX) {
        // 250788123456 → 0788123456. A bare local number can't start with
        // 250 (no Rwandan subscriber number begins with 2).
        format!("0{rest}")
    } else if digits.len() == LOCAL_LEN - 1 {
        // 788123456 → 0788123456.
        format!("0{digits}")
    } else {
        digits
    };

    if local.len() != LOCAL_LEN || !local.starts_with('0') {
        return Err(GatewayError::Rejected {
            reason: format!("invalid phone number '{raw}' (normalized to '{local}')"),
        });
    }
    Ok(local)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn international_prefix_collapses_to_leading_zero() {
        assert_eq!(
            normalize_msisdn("+250788123456").expect("valid"),
            "0788123456"
        );
        assert_eq!(
            normalize_msisdn("250788123456").expect("valid"),
            "0788123456"
        );
    }

    #[test]
    fn nine_digit_number_is_left_padded() {
        assert_eq!(normalize_msisdn("788123456").expect("valid"), "0788123456");
    }

    #[test]
    fn canonical_numbers_pass_through() {
        assert_eq!(normalize_msisdn("0788123456").expect("valid"), "0788123456");
    }

    #[test]
    fn formatting_characters_are_stripped() {
        assert_eq!(
            normalize_msisdn("+250 788-123-456").expect("valid"),
            "0788123456"
        );
        assert_eq!(
            normalize_msisdn("(0788) 123 456").expect("valid"),
            "0788123456"
        );
    }

    #[test]
    fn implausible_numbers_are_rejected() {
        assert!(normalize_msisdn("").is_err());
        assert!(normalize_msisdn("not a phone").is_err());
        assert!(normalize_msisdn("12345").is_err());
        assert!(normalize_msisdn("078812345678").is_err());
    }
}
