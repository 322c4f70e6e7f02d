//! # Recurring Subscription Lifecycle
//!
//! A subscription is a donor's standing instruction to be charged a fixed
//! amount on a fixed cadence. Its lifecycle is a three-state machine:
//!
//! ```text
//!   active ⇄ paused
//!      \      /
//!       cancelled   (terminal)
//! ```
//!
//! State-machine constraints are enforced here at the application layer —
//! every transition is a method that validates before mutating, and
//! invalid transitions return [`SubscriptionError::InvalidTransition`]
//! rather than panicking or silently succeeding.
//!
//! The once-per-due-date schedule advance lives in [`RecurringSubscription::claim_charge`]:
//! it is the only operation that moves `next_charge_date`, it only moves it
//! forward, and it happens exactly once per due date regardless of whether
//! the eventual gateway charge succeeds (best-effort recurring billing — no
//! dunning or retry-within-period is modeled). Charge *totals*, by
//! contrast, advance only on completed charges so that
//! `total_amount ≈ total_charges × amount` holds.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use impano_core::money::validate_charge_amount;
use impano_core::{Currency, DonationId, DonorId, GatewayKind, ProgramId, ProjectId, SubscriptionId};

use crate::schedule::next_charge_date;

/// Errors from subscription lifecycle operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SubscriptionError {
    /// The requested transition is not valid from the current state.
    #[error("invalid transition: cannot {action} a {status} subscription")]
    InvalidTransition {
        /// Current status.
        status: SubscriptionStatus,
        /// The attempted action ("cancel", "pause", "resume").
        action: &'static str,
    },

    /// Cancellation requires a non-empty reason.
    #[error("cancellation requires a non-empty reason")]
    MissingCancellationReason,

    /// The subscription is not due for a charge.
    #[error("subscription not due: next charge date is {next_charge_date}")]
    NotDue {
        /// The current (unclaimed) due date.
        next_charge_date: NaiveDate,
    },

    /// A patch attempted to move the next charge date backwards.
    #[error("next charge date may only move forward: {current} → {requested}")]
    BackwardSchedule {
        /// The current next charge date.
        current: NaiveDate,
        /// The rejected override.
        requested: NaiveDate,
    },

    /// The subscription amount failed validation.
    #[error(transparent)]
    InvalidAmount(#[from] impano_core::ValidationError),
}

/// Charge cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    Monthly,
    Quarterly,
    Yearly,
}

impl std::fmt::Display for Frequency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Monthly => f.write_str("monthly"),
            Self::Quarterly => f.write_str("quarterly"),
            Self::Yearly => f.write_str("yearly"),
        }
    }
}

/// Subscription lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    /// Eligible for charging when due.
    Active,
    /// Administratively suspended; never selected by the orchestrator.
    Paused,
    /// Terminal. Never selected again; never physically deleted.
    Cancelled,
}

impl SubscriptionStatus {
    /// Stable string form used in storage columns and API payloads.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mobile-money operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MobileMoneyProvider {
    Mtn,
    Airtel,
}

impl std::fmt::Display for MobileMoneyProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Mtn => f.write_str("mtn"),
            Self::Airtel => f.write_str("airtel"),
        }
    }
}

/// How the donor pays — a proper sum type so gateway dispatch is
/// exhaustive and statically checkable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PaymentMethodDetails {
    /// Card on file with the card-network gateway.
    Card {
        /// Last four digits of the card number.
        last4: String,
        /// Card brand as reported by the gateway (e.g. "visa").
        brand: String,
        expiry_month: u8,
        expiry_year: u16,
    },
    /// Mobile-money wallet.
    MobileMoney {
        /// Wallet phone number as captured from the donor (normalized
        /// to the canonical local format at gateway submission time).
        phone_number: String,
        provider: MobileMoneyProvider,
    },
}

impl PaymentMethodDetails {
    /// Which gateway family this payment method routes through.
    pub fn gateway_kind(&self) -> GatewayKind {
        match self {
            Self::Card { .. } => GatewayKind::Card,
            Self::MobileMoney { .. } => GatewayKind::MobileMoney,
        }
    }
}

/// A donor's standing recurring-giving instruction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecurringSubscription {
    pub id: SubscriptionId,
    pub donor_id: DonorId,
    /// Optional donation target.
    pub project_id: Option<ProjectId>,
    pub program_id: Option<ProgramId>,

    /// Charge amount in minor units of `currency`.
    pub amount_minor: i64,
    pub currency: Currency,
    pub frequency: Frequency,
    pub status: SubscriptionStatus,

    /// The due date: at/after this date the orchestrator may charge.
    pub next_charge_date: NaiveDate,
    pub last_charged_date: Option<NaiveDate>,
    /// Donation record produced by the most recent successful charge.
    pub last_charge_id: Option<DonationId>,

    /// Opaque gateway payment token (card payment-method id or wallet ref).
    pub payment_method_id: String,
    /// External gateway subscription reference, when the card network holds
    /// a mirror subscription object.
    pub external_subscription_id: Option<String>,
    pub payment_method_details: PaymentMethodDetails,

    /// Count of successful charges.
    pub total_charges: u32,
    /// Sum of successfully charged amounts, minor units.
    pub total_amount_minor: i64,

    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub cancellation_reason: Option<String>,
    pub send_reminders: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Immutable snapshot handed to the charge path after a successful claim.
///
/// The claim (schedule advance) happens under the store's subscription
/// entry lock; everything the gateway call needs is copied out so the lock
/// is never held across I/O.
#[derive(Debug, Clone)]
pub struct ChargeClaim {
    pub subscription_id: SubscriptionId,
    pub donor_id: DonorId,
    pub project_id: Option<ProjectId>,
    pub program_id: Option<ProgramId>,
    pub amount_minor: i64,
    pub currency: Currency,
    pub frequency: Frequency,
    pub payment_method_id: String,
    pub payment_method_details: PaymentMethodDetails,
    /// The due date this claim consumed.
    pub due_date: NaiveDate,
}

impl RecurringSubscription {
    /// Create a new active subscription.
    ///
    /// The first charge is scheduled one period after `start_date`;
    /// subscriptions are never created directly into `paused` or
    /// `cancelled`.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        donor_id: DonorId,
        amount_minor: i64,
        currency: Currency,
        frequency: Frequency,
        payment_method_id: String,
        payment_method_details: PaymentMethodDetails,
        start_date: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<Self, SubscriptionError> {
        let amount_minor = validate_charge_amount(amount_minor)?;
        Ok(Self {
            id: SubscriptionId::new(),
            donor_id,
            project_id: None,
            program_id: None,
            amount_minor,
            currency,
            frequency,
            status: SubscriptionStatus::Active,
            next_charge_date: next_charge_date(frequency, start_date),
            last_charged_date: None,
            last_charge_id: None,
            payment_method_id,
            external_subscription_id: None,
            payment_method_details,
            total_charges: 0,
            total_amount_minor: 0,
            start_date,
            end_date: None,
            cancellation_reason: None,
            send_reminders: true,
            created_at: now,
            updated_at: now,
        })
    }

    /// Whether the orchestrator may attempt a charge at `as_of`.
    pub fn is_due(&self, as_of: NaiveDate) -> bool {
        self.status == SubscriptionStatus::Active && self.next_charge_date <= as_of
    }

    /// Consume the current due date: advance `next_charge_date` one period
    /// from its previous value and stamp `last_charged_date`.
    ///
    /// This is the at-most-once point of the charge cycle. Once claimed,
    /// the same due date can never be claimed again — a concurrent
    /// orchestrator run observes the advanced date and skips. The advance
    /// is unconditional with respect to the eventual charge outcome.
    ///
    /// # Errors
    ///
    /// [`SubscriptionError::NotDue`] if the subscription is not active or
    /// its due date is in the future.
    pub fn claim_charge(
        &mut self,
        as_of: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<ChargeClaim, SubscriptionError> {
        if !self.is_due(as_of) {
            return Err(SubscriptionError::NotDue {
                next_charge_date: self.next_charge_date,
            });
        }
        let due_date = self.next_charge_date;
        self.next_charge_date = next_charge_date(self.frequency, due_date);
        self.last_charged_date = Some(as_of);
        self.updated_at = now;
        Ok(ChargeClaim {
            subscription_id: self.id,
            donor_id: self.donor_id,
            project_id: self.project_id,
            program_id: self.program_id,
            amount_minor: self.amount_minor,
            currency: self.currency,
            frequency: self.frequency,
            payment_method_id: self.payment_method_id.clone(),
            payment_method_details: self.payment_method_details.clone(),
            due_date,
        })
    }

    /// Record a completed charge: totals advance together, success-only.
    pub fn record_success(&mut self, amount_minor: i64, donation_id: DonationId, now: DateTime<Utc>) {
        self.total_charges += 1;
        self.total_amount_minor += amount_minor;
        self.last_charge_id = Some(donation_id);
        self.updated_at = now;
    }

    /// Cancel the subscription. Terminal — there is no way back out.
    ///
    /// # Errors
    ///
    /// [`SubscriptionError::MissingCancellationReason`] for an empty reason;
    /// [`SubscriptionError::InvalidTransition`] if already cancelled.
    pub fn cancel(&mut self, reason: &str, now: DateTime<Utc>) -> Result<(), SubscriptionError> {
        if self.status == SubscriptionStatus::Cancelled {
            return Err(SubscriptionError::InvalidTransition {
                status: self.status,
                action: "cancel",
            });
        }
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(SubscriptionError::MissingCancellationReason);
        }
        self.status = SubscriptionStatus::Cancelled;
        self.end_date = Some(now.date_naive());
        self.cancellation_reason = Some(reason.to_string());
        self.updated_at = now;
        Ok(())
    }

    /// Administrative pause. Only an active subscription can be paused.
    pub fn pause(&mut self, now: DateTime<Utc>) -> Result<(), SubscriptionError> {
        if self.status != SubscriptionStatus::Active {
            return Err(SubscriptionError::InvalidTransition {
                status: self.status,
                action: "pause",
            });
        }
        self.status = SubscriptionStatus::Paused;
        self.updated_at = now;
        Ok(())
    }

    /// Administrative resume. Only a paused subscription can be resumed.
    pub fn resume(&mut self, now: DateTime<Utc>) -> Result<(), SubscriptionError> {
        if self.status != SubscriptionStatus::Paused {
            return Err(SubscriptionError::InvalidTransition {
                status: self.status,
                action: "resume",
            });
        }
        self.status = SubscriptionStatus::Active;
        self.updated_at = now;
        Ok(())
    }
}

/// Enumerated partial update for subscription edits.
///
/// Only these four fields are donor/admin mutable. This is deliberately
/// not a blind field-merge of arbitrary input: everything else on the
/// record is owned by the charge cycle and its invariants.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubscriptionPatch {
    pub frequency: Option<Frequency>,
    pub send_reminders: Option<bool>,
    /// Override the due date. Forward-only.
    pub next_charge_date: Option<NaiveDate>,
    pub cancellation_reason: Option<String>,
}

impl SubscriptionPatch {
    /// True when the patch changes nothing.
    pub fn is_empty(&self) -> bool {
        self.frequency.is_none()
            && self.send_reminders.is_none()
            && self.next_charge_date.is_none()
            && self.cancellation_reason.is_none()
    }

    /// Apply the patch, last-write-wins per field.
    ///
    /// # Errors
    ///
    /// [`SubscriptionError::BackwardSchedule`] if the due-date override is
    /// earlier than the current due date.
    pub fn apply(
        &self,
        sub: &mut RecurringSubscription,
        now: DateTime<Utc>,
    ) -> Result<(), SubscriptionError> {
        if let Some(requested) = self.next_charge_date {
            if requested < sub.next_charge_date {
                return Err(SubscriptionError::BackwardSchedule {
                    current: sub.next_charge_date,
                    requested,
                });
            }
            sub.next_charge_date = requested;
        }
        if let Some(frequency) = self.frequency {
            sub.frequency = frequency;
        }
        if let Some(send_reminders) = self.send_reminders {
            sub.send_reminders = send_reminders;
        }
        if let Some(reason) = &self.cancellation_reason {
            sub.cancellation_reason = Some(reason.clone());
        }
        sub.updated_at = now;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).expect("valid test date")
    }

    fn card_details() -> PaymentMethodDetails {
        PaymentMethodDetails::Card {
            last4: "4242".into(),
            brand: "visa".into(),
            expiry_month: 12,
            expiry_year: 2030,
        }
    }

    fn monthly_usd_subscription() -> RecurringSubscription {
        RecurringSubscription::new(
            DonorId::new(),
            5_000,
            Currency::Usd,
            Frequency::Monthly,
            "pm_test_visa".into(),
            card_details(),
            d(2023, 12, 1),
            Utc::now(),
        )
        .expect("valid subscription")
    }

    #[test]
    fn creation_schedules_first_charge_one_period_out() {
        let sub = monthly_usd_subscription();
        assert_eq!(sub.status, SubscriptionStatus::Active);
        assert_eq!(sub.next_charge_date, d(2024, 1, 1));
        assert_eq!(sub.total_charges, 0);
        assert_eq!(sub.total_amount_minor, 0);
    }

    #[test]
    fn creation_rejects_sub_cent_amounts() {
        let err = RecurringSubscription::new(
            DonorId::new(),
            0,
            Currency::Usd,
            Frequency::Monthly,
            "pm".into(),
            card_details(),
            d(2024, 1, 1),
            Utc::now(),
        );
        assert!(matches!(err, Err(SubscriptionError::InvalidAmount(_))));
    }

    #[test]
    fn claim_advances_from_previous_due_date_not_run_date() {
        let mut sub = monthly_usd_subscription();
        // The batch runs three days late.
        let claim = sub.claim_charge(d(2024, 1, 4), Utc::now()).expect("due");
        assert_eq!(claim.due_date, d(2024, 1, 1));
        // No drift: anchored to the 1st, not to Feb 4.
        assert_eq!(sub.next_charge_date, d(2024, 2, 1));
        assert_eq!(sub.last_charged_date, Some(d(2024, 1, 4)));
    }

    #[test]
    fn claim_is_at_most_once_per_due_date() {
        let mut sub = monthly_usd_subscription();
        sub.claim_charge(d(2024, 1, 1), Utc::now()).expect("due");
        let second = sub.claim_charge(d(2024, 1, 1), Utc::now());
        assert!(matches!(second, Err(SubscriptionError::NotDue { .. })));
    }

    #[test]
    fn claim_rejects_future_due_dates_and_non_active_states() {
        let mut sub = monthly_usd_subscription();
        assert!(sub.claim_charge(d(2023, 12, 31), Utc::now()).is_err());
        sub.pause(Utc::now()).expect("active → paused");
        assert!(sub.claim_charge(d(2024, 6, 1), Utc::now()).is_err());
    }

    #[test]
    fn totals_advance_together_on_success_only() {
        let mut sub = monthly_usd_subscription();
        for _ in 0..3 {
            sub.record_success(sub.amount_minor, DonationId::new(), Utc::now());
        }
        assert_eq!(sub.total_charges, 3);
        assert_eq!(sub.total_amount_minor, 15_000);
        assert_eq!(
            sub.total_amount_minor,
            i64::from(sub.total_charges) * sub.amount_minor
        );
    }

    #[test]
    fn cancel_without_reason_is_rejected() {
        let mut sub = monthly_usd_subscription();
        assert_eq!(
            sub.cancel("   ", Utc::now()),
            Err(SubscriptionError::MissingCancellationReason)
        );
        assert_eq!(sub.status, SubscriptionStatus::Active);
    }

    #[test]
    fn cancel_sets_end_date_and_is_terminal() {
        let mut sub = monthly_usd_subscription();
        let now = Utc::now();
        sub.cancel("donor request", now).expect("cancellable");
        assert_eq!(sub.status, SubscriptionStatus::Cancelled);
        assert_eq!(sub.end_date, Some(now.date_naive()));
        assert_eq!(sub.cancellation_reason.as_deref(), Some("donor request"));
        // Never due again.
        assert!(!sub.is_due(d(2099, 1, 1)));
        // No transitions out.
        assert!(sub.resume(Utc::now()).is_err());
        assert!(sub.pause(Utc::now()).is_err());
        assert!(sub.cancel("again", Utc::now()).is_err());
    }

    #[test]
    fn paused_subscription_can_be_cancelled() {
        let mut sub = monthly_usd_subscription();
        sub.pause(Utc::now()).expect("active → paused");
        assert!(!sub.is_due(d(2024, 6, 1)));
        sub.cancel("lapsed", Utc::now()).expect("paused → cancelled");
        assert_eq!(sub.status, SubscriptionStatus::Cancelled);
    }

    #[test]
    fn pause_resume_round_trip() {
        let mut sub = monthly_usd_subscription();
        sub.pause(Utc::now()).expect("pause");
        assert!(sub.resume(Utc::now()).is_ok());
        assert_eq!(sub.status, SubscriptionStatus::Active);
        // Resuming an active subscription is invalid.
        assert!(sub.resume(Utc::now()).is_err());
    }

    #[test]
    fn patch_merges_only_enumerated_fields() {
        let mut sub = monthly_usd_subscription();
        let patch = SubscriptionPatch {
            frequency: Some(Frequency::Quarterly),
            send_reminders: Some(false),
            next_charge_date: Some(d(2024, 3, 1)),
            cancellation_reason: None,
        };
        patch.apply(&mut sub, Utc::now()).expect("valid patch");
        assert_eq!(sub.frequency, Frequency::Quarterly);
        assert!(!sub.send_reminders);
        assert_eq!(sub.next_charge_date, d(2024, 3, 1));
    }

    #[test]
    fn patch_rejects_backward_due_date() {
        let mut sub = monthly_usd_subscription();
        let patch = SubscriptionPatch {
            next_charge_date: Some(d(2023, 1, 1)),
            ..Default::default()
        };
        assert!(matches!(
            patch.apply(&mut sub, Utc::now()),
            Err(SubscriptionError::BackwardSchedule { .. })
        ));
    }

    #[test]
    fn payment_method_details_serde_is_tagged() {
        let mm = PaymentMethodDetails::MobileMoney {
            phone_number: "0788123456".into(),
            provider: MobileMoneyProvider::Mtn,
        };
        let json = serde_json::to_value(&mm).expect("serializes");
        assert_eq!(json["type"], "mobile_money");
        assert_eq!(json["provider"], "mtn");

        let card = card_details();
        let json = serde_json::to_value(&card).expect("serializes");
        assert_eq!(json["type"], "card");
        assert_eq!(json["last4"], "4242");
    }
}
