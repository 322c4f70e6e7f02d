//! Due-date schedule arithmetic.
//!
//! The next charge date is always computed from the *previous*
//! `next_charge_date`, not from the day the batch happened to run.
//! A subscription due on the 1st stays anchored to the 1st even when
//! the orchestrator runs on the 3rd.

use chrono::{Months, NaiveDate};

use crate::subscription::Frequency;

/// Compute the next charge date one period after `from`.
///
/// Monthly → +1 calendar month, quarterly → +3, yearly → +1 year.
/// Month-end dates clamp (Jan 31 + 1 month = Feb 28/29). The result is
/// strictly later than `from` for any representable date.
pub fn next_charge_date(frequency: Frequency, from: NaiveDate) -> NaiveDate {
    let months = match frequency {
        Frequency::Monthly => 1,
        Frequency::Quarterly => 3,
        Frequency::Yearly => 12,
    };
    // Overflow only at the far edge of chrono's date range; saturate there
    // rather than wrap backwards.
    from.checked_add_months(Months::new(months))
        .unwrap_or(NaiveDate::MAX)
}
