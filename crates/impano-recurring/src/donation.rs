//! # Donation Records (Charge Attempts)
//!
//! A [`Donation`] is one concrete attempt to move money — here, always
//! derived from a recurring subscription via [`Donation::from_claim`].
//! Records are part of the financial audit trail: created once per attempt,
//! updated in place as gateway responses arrive, never deleted. Refunds are
//! a soft status mark, not a removal.
//!
//! The payment status is a forward-only machine:
//!
//! ```text
//!   pending → completed → refunded
//!      \
//!       → failed
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use impano_core::{
    Currency, CurrencyError, DonationId, DonorId, ProgramId, ProjectId, RateTable, SubscriptionId,
    TransactionId,
};

use crate::subscription::{ChargeClaim, Frequency, MobileMoneyProvider, PaymentMethodDetails};

/// Errors from donation record mutation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DonationError {
    /// Payment statuses never move backwards.
    #[error("illegal payment status transition: {from} → {to}")]
    IllegalStatusTransition {
        from: PaymentStatus,
        to: PaymentStatus,
    },
}

/// Where a donation came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DonationType {
    /// A one-off donor-initiated gift.
    OneTime,
    /// Derived from a monthly subscription.
    Monthly,
    /// Derived from a quarterly subscription.
    Quarterly,
    /// Derived from a yearly subscription.
    Yearly,
}

impl From<Frequency> for DonationType {
    fn from(frequency: Frequency) -> Self {
        match frequency {
            Frequency::Monthly => Self::Monthly,
            Frequency::Quarterly => Self::Quarterly,
            Frequency::Yearly => Self::Yearly,
        }
    }
}

/// The concrete instrument a donation was (or will be) charged through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Card,
    MtnMobileMoney,
    AirtelMoney,
    BankTransfer,
}

impl From<&PaymentMethodDetails> for PaymentMethod {
    fn from(details: &PaymentMethodDetails) -> Self {
        match details {
            PaymentMethodDetails::Card { .. } => Self::Card,
            PaymentMethodDetails::MobileMoney {
                provider: MobileMoneyProvider::Mtn,
                ..
            } => Self::MtnMobileMoney,
            PaymentMethodDetails::MobileMoney {
                provider: MobileMoneyProvider::Airtel,
                ..
            } => Self::AirtelMoney,
        }
    }
}

/// Donation payment lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// Created; gateway outcome not yet known (or left for reconciliation
    /// after a transient gateway outage).
    Pending,
    /// Money moved.
    Completed,
    /// Provider declined or the attempt was fatally invalid.
    Failed,
    /// A previously completed donation was reversed.
    Refunded,
}

impl PaymentStatus {
    /// Stable string form used in storage columns and API payloads.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Refunded => "refunded",
        }
    }

    /// Forward-only transition check.
    pub fn can_transition_to(&self, next: PaymentStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, PaymentStatus::Completed)
                | (Self::Pending, PaymentStatus::Failed)
                | (Self::Completed, PaymentStatus::Refunded)
        )
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provider-specific payload captured on the donation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PaymentDetails {
    /// External gateway transaction reference (payment-intent id or
    /// mobile-money transaction id).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    /// Instrument metadata mirrored from the subscription at charge time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instrument: Option<PaymentMethodDetails>,
    /// Raw provider response body, kept verbatim for reconciliation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<serde_json::Value>,
}

/// Request/audit metadata stamped onto a donation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DonationMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    /// Short human-readable gateway outcome (error text on failure).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway_response: Option<String>,
    pub tax_eligible: bool,
    /// Back-reference to the subscription that spawned this donation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recurring_subscription_id: Option<SubscriptionId>,
}

/// One charge attempt. Immutable identity, forward-only status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Donation {
    pub id: DonationId,
    /// Globally unique, assigned before any gateway call.
    pub transaction_id: TransactionId,
    pub donor_id: DonorId,
    pub project_id: Option<ProjectId>,
    pub program_id: Option<ProgramId>,

    /// Charged amount in minor units of `currency`.
    pub amount_minor: i64,
    pub currency: Currency,
    /// Settlement-currency (RWF) amount, minor units.
    pub local_amount_minor: i64,
    /// Applied conversion rate, 4 decimal places.
    pub exchange_rate: f64,

    pub donation_type: DonationType,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    pub payment_details: PaymentDetails,

    pub receipt_sent: bool,
    pub receipt_sent_at: Option<DateTime<Utc>>,
    pub receipt_number: Option<String>,

    pub is_anonymous: bool,
    pub metadata: DonationMetadata,
    pub donor_message: Option<String>,
    pub is_test: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Donation {
    /// Build a pending donation from a claimed subscription charge.
    ///
    /// Copies amount/currency from the claim, converts into the settlement
    /// currency, derives the donation type from the cadence and the payment
    /// method from the instrument tag, and stamps the subscription
    /// back-reference. The transaction id is generated here — before any
    /// gateway call — so even a gateway timeout leaves an identifiable
    /// audit record.
    ///
    /// # Errors
    ///
    /// [`CurrencyError`] when no settlement rate exists for the
    /// subscription's currency; fatal for this single attempt.
    pub fn from_claim(
        claim: &ChargeClaim,
        donor_is_anonymous: bool,
        rates: &RateTable,
        now: DateTime<Utc>,
    ) -> Result<Self, CurrencyError> {
        let conversion = rates.convert(claim.amount_minor, claim.currency)?;
        Ok(Self {
            id: DonationId::new(),
            transaction_id: TransactionId::generate(now),
            donor_id: claim.donor_id,
            project_id: claim.project_id,
            program_id: claim.program_id,
            amount_minor: claim.amount_minor,
            currency: claim.currency,
            local_amount_minor: conversion.local_amount_minor,
            exchange_rate: conversion.exchange_rate,
            donation_type: claim.frequency.into(),
            payment_method: (&claim.payment_method_details).into(),
            payment_status: PaymentStatus::Pending,
            payment_details: PaymentDetails {
                external_id: None,
                instrument: Some(claim.payment_method_details.clone()),
                raw_response: None,
            },
            receipt_sent: false,
            receipt_sent_at: None,
            receipt_number: None,
            is_anonymous: donor_is_anonymous,
            metadata: DonationMetadata {
                tax_eligible: true,
                recurring_subscription_id: Some(claim.subscription_id),
                ..Default::default()
            },
            donor_message: None,
            is_test: false,
            created_at: now,
            updated_at: now,
        })
    }

    /// Apply a forward status transition.
    ///
    /// # Errors
    ///
    /// [`DonationError::IllegalStatusTransition`] for anything the status
    /// machine does not permit (completed → pending, failed → completed,
    /// and so on).
    pub fn transition(
        &mut self,
        next: PaymentStatus,
        now: DateTime<Utc>,
    ) -> Result<(), DonationError> {
        if !self.payment_status.can_transition_to(next) {
            return Err(DonationError::IllegalStatusTransition {
                from: self.payment_status,
                to: next,
            });
        }
        self.payment_status = next;
        self.updated_at = now;
        Ok(())
    }

    /// Record the gateway's external reference and raw response.
    pub fn record_gateway_response(
        &mut self,
        external_id: Option<String>,
        raw_response: Option<serde_json::Value>,
        summary: impl Into<String>,
        now: DateTime<Utc>,
    ) {
        self.payment_details.external_id = external_id;
        self.payment_details.raw_response = raw_response;
        self.metadata.gateway_response = Some(summary.into());
        self.updated_at = now;
    }

    /// Mark the receipt as sent.
    pub fn mark_receipt_sent(&mut self, receipt_number: String, now: DateTime<Utc>) {
        self.receipt_sent = true;
        self.receipt_sent_at = Some(now);
        self.receipt_number = Some(receipt_number);
        self.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use impano_core::{DonorId, SubscriptionId};

    fn usd_claim() -> ChargeClaim {
        ChargeClaim {
            subscription_id: SubscriptionId::new(),
            donor_id: DonorId::new(),
            project_id: None,
            program_id: None,
            amount_minor: 5_000,
            currency: Currency::Usd,
            frequency: Frequency::Monthly,
            payment_method_id: "pm_test_visa".into(),
            payment_method_details: PaymentMethodDetails::Card {
                last4: "4242".into(),
                brand: "visa".into(),
                expiry_month: 12,
                expiry_year: 2030,
            },
            due_date: NaiveDate::from_ymd_opt(2024, 1, 1).expect("valid date"),
        }
    }

    #[test]
    fn builder_copies_and_converts() {
        let claim = usd_claim();
        let donation =
            Donation::from_claim(&claim, false, &RateTable::with_defaults(), Utc::now())
                .expect("usd converts");
        assert_eq!(donation.amount_minor, 5_000);
        assert_eq!(donation.currency, Currency::Usd);
        assert_eq!(donation.local_amount_minor, 6_500_000);
        assert_eq!(donation.exchange_rate, 1300.0);
        assert_eq!(donation.donation_type, DonationType::Monthly);
        assert_eq!(donation.payment_method, PaymentMethod::Card);
        assert_eq!(donation.payment_status, PaymentStatus::Pending);
        assert_eq!(
            donation.metadata.recurring_subscription_id,
            Some(claim.subscription_id)
        );
        assert!(!donation.receipt_sent);
    }

    #[test]
    fn builder_fails_without_a_settlement_rate() {
        let claim = usd_claim();
        let err = Donation::from_claim(&claim, false, &RateTable::empty(), Utc::now());
        assert!(err.is_err());
    }

    #[test]
    fn builder_assigns_distinct_transaction_ids() {
        let claim = usd_claim();
        let rates = RateTable::with_defaults();
        let now = Utc::now();
        let a = Donation::from_claim(&claim, false, &rates, now).expect("build");
        let b = Donation::from_claim(&claim, false, &rates, now).expect("build");
        assert_ne!(a.transaction_id, b.transaction_id);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn mobile_money_provider_maps_to_payment_method() {
        let mut claim = usd_claim();
        claim.currency = Currency::Rwf;
        claim.payment_method_details = PaymentMethodDetails::MobileMoney {
            phone_number: "0788123456".into(),
            provider: MobileMoneyProvider::Airtel,
        };
        let donation =
            Donation::from_claim(&claim, false, &RateTable::with_defaults(), Utc::now())
                .expect("rwf identity");
        assert_eq!(donation.payment_method, PaymentMethod::AirtelMoney);
        assert_eq!(donation.local_amount_minor, donation.amount_minor);
    }

    #[test]
    fn status_machine_is_forward_only() {
        let claim = usd_claim();
        let mut donation =
            Donation::from_claim(&claim, false, &RateTable::with_defaults(), Utc::now())
                .expect("build");

        donation
            .transition(PaymentStatus::Completed, Utc::now())
            .expect("pending → completed");
        assert!(donation
            .transition(PaymentStatus::Pending, Utc::now())
            .is_err());
        assert!(donation
            .transition(PaymentStatus::Failed, Utc::now())
            .is_err());
        donation
            .transition(PaymentStatus::Refunded, Utc::now())
            .expect("completed → refunded");
        assert!(donation
            .transition(PaymentStatus::Completed, Utc::now())
            .is_err());
    }

    #[test]
    fn failed_is_terminal() {
        let claim = usd_claim();
        let mut donation =
            Donation::from_claim(&claim, false, &RateTable::with_defaults(), Utc::now())
                .expect("build");
        donation
            .transition(PaymentStatus::Failed, Utc::now())
            .expect("pending → failed");
        for next in [
            PaymentStatus::Pending,
            PaymentStatus::Completed,
            PaymentStatus::Refunded,
        ] {
            assert!(donation.transition(next, Utc::now()).is_err());
        }
    }

    #[test]
    fn anonymity_is_copied_from_the_donor() {
        let claim = usd_claim();
        let donation =
            Donation::from_claim(&claim, true, &RateTable::with_defaults(), Utc::now())
                .expect("build");
        assert!(donation.is_anonymous);
    }
}
