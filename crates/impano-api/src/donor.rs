//! # Donor Records and Aggregates
//!
//! The donor profile plus the running-total aggregates maintained as a
//! side effect of successful charges. Two rules are load-bearing:
//!
//! - `total_donated_minor` is monotonically non-decreasing; it is only
//!   moved by [`Donor::apply_charge`], and only with the amount of a
//!   *completed* charge (refund adjustments are not modeled here).
//! - `is_recurring_donor` flips to `true` the first time any subscription
//!   is created for the donor and is never automatically reset.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use impano_core::{Currency, DonorId};

/// Which outbound channels the donor has consented to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CommunicationPreferences {
    pub email: bool,
    pub sms: bool,
}

impl Default for CommunicationPreferences {
    fn default() -> Self {
        Self {
            email: true,
            sms: false,
        }
    }
}

/// How the donor wants donation receipts delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ReceiptPreference {
    /// A receipt for every completed donation (default).
    PerDonation,
    /// One consolidated receipt per year; per-donation receipts suppressed.
    AnnualSummary,
    /// No receipt content delivered off-platform at all.
    NoReceipts,
}

impl ReceiptPreference {
    /// Stable string form used in storage columns and API payloads.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PerDonation => "per_donation",
            Self::AnnualSummary => "annual_summary",
            Self::NoReceipts => "no_receipts",
        }
    }
}

/// A donor profile with charge aggregates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Donor {
    #[schema(value_type = Uuid)]
    pub id: DonorId,
    pub full_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub country: String,
    #[schema(value_type = String)]
    pub preferred_currency: Currency,
    /// BCP 47-ish language tag for notifications ("en", "rw", "fr").
    pub language: String,

    pub communication_preferences: CommunicationPreferences,
    pub receipt_preference: ReceiptPreference,

    /// Running sum of completed charges, minor units of the charge currency.
    pub total_donated_minor: i64,
    pub last_donation_date: Option<DateTime<Utc>>,
    /// Set when the donor's first subscription is created; never reset.
    pub is_recurring_donor: bool,

    pub anonymity_preference: bool,
    pub receive_newsletter: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Donor {
    /// Create a donor with zeroed aggregates and default preferences.
    pub fn new(
        full_name: String,
        email: Option<String>,
        phone: Option<String>,
        country: String,
        preferred_currency: Currency,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: DonorId::new(),
            full_name,
            email,
            phone,
            country,
            preferred_currency,
            language: "en".to_string(),
            communication_preferences: CommunicationPreferences::default(),
            receipt_preference: ReceiptPreference::PerDonation,
            total_donated_minor: 0,
            last_donation_date: None,
            is_recurring_donor: false,
            anonymity_preference: false,
            receive_newsletter: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply a completed charge to the aggregates.
    pub fn apply_charge(&mut self, amount_minor: i64, now: DateTime<Utc>) {
        self.total_donated_minor += amount_minor;
        self.last_donation_date = Some(now);
        self.updated_at = now;
    }

    /// Flag the donor as a recurring giver. Idempotent, one-way.
    pub fn mark_recurring(&mut self, now: DateTime<Utc>) {
        if !self.is_recurring_donor {
            self.is_recurring_donor = true;
            self.updated_at = now;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn donor() -> Donor {
        Donor::new(
            "Aline Uwase".into(),
            Some("aline@example.org".into()),
            Some("0788123456".into()),
            "RW".into(),
            Currency::Rwf,
            Utc::now(),
        )
    }

    #[test]
    fn new_donor_has_zeroed_aggregates() {
        let d = donor();
        assert_eq!(d.total_donated_minor, 0);
        assert!(d.last_donation_date.is_none());
        assert!(!d.is_recurring_donor);
    }

    #[test]
    fn apply_charge_accumulates_and_stamps_date() {
        let mut d = donor();
        let now = Utc::now();
        d.apply_charge(5_000, now);
        d.apply_charge(2_500, now);
        assert_eq!(d.total_donated_minor, 7_500);
        assert_eq!(d.last_donation_date, Some(now));
    }

    #[test]
    fn mark_recurring_is_one_way() {
        let mut d = donor();
        d.mark_recurring(Utc::now());
        assert!(d.is_recurring_donor);
        // Calling again changes nothing.
        let updated = d.updated_at;
        d.mark_recurring(Utc::now());
        assert!(d.is_recurring_donor);
        assert_eq!(d.updated_at, updated);
    }

    #[test]
    fn receipt_preference_serde_is_snake_case() {
        let json = serde_json::to_value(ReceiptPreference::AnnualSummary).unwrap();
        assert_eq!(json, "annual_summary");
    }
}
