//! # Receipt and Notification Dispatch
//!
//! The charge orchestrator never talks to the notification subsystem
//! directly: it emits [`ChargeEvent`]s into an `mpsc` channel and moves
//! on. The [`ReceiptDispatcher`] consumes the channel on its own task,
//! generates receipt numbers, marks donations as receipted, and fans out
//! to a [`NotificationSink`].
//!
//! Dispatch is strictly best-effort. Every sink error is logged and
//! dropped — a notification failure can never mark an otherwise-completed
//! donation as failed, and a full or closed channel on the producer side
//! only costs the notification, never the charge.
//!
//! Anonymity: an anonymous donation produces the internal in-app
//! notification only; no receipt content leaves the platform by email or
//! SMS regardless of the donor's channel preferences.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tokio::sync::mpsc;

use impano_core::money::format_minor;
use impano_core::{Currency, DonationId, DonorId};

use crate::donor::{Donor, ReceiptPreference};
use crate::store::LedgerStore;

/// Outcome event emitted by the orchestrator after a charge settles.
#[derive(Debug, Clone)]
pub enum ChargeEvent {
    /// A charge completed; trigger the receipt path.
    Completed {
        donation_id: DonationId,
        donor_id: DonorId,
    },
    /// A charge failed terminally; trigger the failure-notification path.
    Failed {
        donation_id: DonationId,
        donor_id: DonorId,
        reason: String,
    },
}

/// A notification dispatch failure. Logged, never propagated.
#[derive(Debug, thiserror::Error)]
#[error("notification dispatch failed: {0}")]
pub struct NotificationError(pub String);

/// Receipt content handed to the email channel.
#[derive(Debug, Clone)]
pub struct ReceiptData {
    pub receipt_number: String,
    pub donor_name: String,
    pub amount_minor: i64,
    pub currency: Currency,
    pub donation_date: DateTime<Utc>,
}

/// The external notification subsystem, seen from this service.
///
/// All operations are fire-and-forget from the caller's perspective;
/// the dispatcher logs failures and continues.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// In-app/internal notification of a completed donation.
    async fn send_receipt_notification(
        &self,
        donor_id: DonorId,
        donation_id: DonationId,
        amount_minor: i64,
        currency: Currency,
        language: &str,
    ) -> Result<(), NotificationError>;

    /// Full receipt content by email.
    async fn send_receipt_email(
        &self,
        email: &str,
        receipt: &ReceiptData,
    ) -> Result<(), NotificationError>;

    /// Short receipt confirmation by SMS.
    async fn send_receipt_sms(&self, phone: &str, message: &str)
        -> Result<(), NotificationError>;

    /// In-app/internal notification of a failed recurring charge.
    async fn send_failure_notification(
        &self,
        donor_id: DonorId,
        donation_id: DonationId,
        reason: &str,
    ) -> Result<(), NotificationError>;

    /// Failed-charge notice by email (payment method update prompt).
    async fn send_failure_email(
        &self,
        email: &str,
        donation_id: DonationId,
        reason: &str,
    ) -> Result<(), NotificationError>;
}

/// Default sink: structured log lines in place of the external subsystem.
#[derive(Debug, Clone, Default)]
pub struct LoggingNotificationSink;

#[async_trait]
impl NotificationSink for LoggingNotificationSink {
    async fn send_receipt_notification(
        &self,
        donor_id: DonorId,
        donation_id: DonationId,
        amount_minor: i64,
        currency: Currency,
        language: &str,
    ) -> Result<(), NotificationError> {
        tracing::info!(%donor_id, %donation_id, amount = %format_minor(amount_minor),
            currency = currency.code(), language, "donation receipt notification");
        Ok(())
    }

    async fn send_receipt_email(
        &self,
        email: &str,
        receipt: &ReceiptData,
    ) -> Result<(), NotificationError> {
        tracing::info!(email, receipt_number = %receipt.receipt_number, "donation receipt email");
        Ok(())
    }

    async fn send_receipt_sms(
        &self,
        phone: &str,
        message: &str,
    ) -> Result<(), NotificationError> {
        tracing::info!(phone, message, "donation receipt SMS");
        Ok(())
    }

    async fn send_failure_notification(
        &self,
        donor_id: DonorId,
        donation_id: DonationId,
        reason: &str,
    ) -> Result<(), NotificationError> {
        tracing::info!(%donor_id, %donation_id, reason, "recurring charge failure notification");
        Ok(())
    }

    async fn send_failure_email(
        &self,
        email: &str,
        donation_id: DonationId,
        reason: &str,
    ) -> Result<(), NotificationError> {
        tracing::info!(email, %donation_id, reason, "recurring charge failure email");
        Ok(())
    }
}

/// Test sink that records every dispatched call as a tagged string.
#[derive(Debug, Default)]
pub struct RecordingNotificationSink {
    calls: std::sync::Mutex<Vec<String>>,
}

impl RecordingNotificationSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All dispatched calls so far, in order.
    pub fn calls(&self) -> Vec<String> {
        match self.calls.lock() {
            Ok(calls) => calls.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn record(&self, entry: String) {
        match self.calls.lock() {
            Ok(mut calls) => calls.push(entry),
            Err(poisoned) => poisoned.into_inner().push(entry),
        }
    }
}

#[async_trait]
impl NotificationSink for RecordingNotificationSink {
    async fn send_receipt_notification(
        &self,
        donor_id: DonorId,
        _donation_id: DonationId,
        amount_minor: i64,
        currency: Currency,
        _language: &str,
    ) -> Result<(), NotificationError> {
        self.record(format!(
            "receipt_notification:{donor_id}:{amount_minor}:{}",
            currency.code()
        ));
        Ok(())
    }

    async fn send_receipt_email(
        &self,
        email: &str,
        receipt: &ReceiptData,
    ) -> Result<(), NotificationError> {
        self.record(format!("receipt_email:{email}:{}", receipt.receipt_number));
        Ok(())
    }

    async fn send_receipt_sms(
        &self,
        phone: &str,
        _message: &str,
    ) -> Result<(), NotificationError> {
        self.record(format!("receipt_sms:{phone}"));
        Ok(())
    }

    async fn send_failure_notification(
        &self,
        donor_id: DonorId,
        _donation_id: DonationId,
        reason: &str,
    ) -> Result<(), NotificationError> {
        self.record(format!("failure_notification:{donor_id}:{reason}"));
        Ok(())
    }

    async fn send_failure_email(
        &self,
        email: &str,
        _donation_id: DonationId,
        reason: &str,
    ) -> Result<(), NotificationError> {
        self.record(format!("failure_email:{email}:{reason}"));
        Ok(())
    }
}

/// Derive a human-readable receipt number from the donation identity and
/// dispatch time: `RCPT-<YYYYMMDD>-<8 hex chars>`.
pub fn receipt_number(donation_id: DonationId, now: DateTime<Utc>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(donation_id.as_uuid().as_bytes());
    hasher.update(now.timestamp_millis().to_be_bytes());
    let digest = hasher.finalize();
    let suffix: String = digest.iter().take(4).map(|b| format!("{b:02x}")).collect();
    format!("RCPT-{}-{}", now.format("%Y%m%d"), suffix)
}

/// Consumes [`ChargeEvent`]s and drives the notification sink.
pub struct ReceiptDispatcher {
    store: Arc<LedgerStore>,
    sink: Arc<dyn NotificationSink>,
}

impl ReceiptDispatcher {
    pub fn new(store: Arc<LedgerStore>, sink: Arc<dyn NotificationSink>) -> Self {
        Self { store, sink }
    }

    /// Drain the channel until every sender is dropped.
    pub async fn run(self, mut events: mpsc::Receiver<ChargeEvent>) {
        while let Some(event) = events.recv().await {
            self.handle(event).await;
        }
        tracing::debug!("receipt dispatcher channel closed, stopping");
    }

    async fn handle(&self, event: ChargeEvent) {
        match event {
            ChargeEvent::Completed {
                donation_id,
                donor_id,
            } => self.handle_completed(donation_id, donor_id).await,
            ChargeEvent::Failed {
                donation_id,
                donor_id,
                reason,
            } => self.handle_failed(donation_id, donor_id, &reason).await,
        }
    }

    async fn handle_completed(&self, donation_id: DonationId, donor_id: DonorId) {
        let donor = match self.store.donor(donor_id) {
            Ok(donor) => donor,
            Err(e) => {
                tracing::warn!(%donation_id, %donor_id, error = %e,
                    "receipt dispatch: donor lookup failed");
                return;
            }
        };

        let now = Utc::now();
        let number = receipt_number(donation_id, now);
        let donation = match self
            .store
            .mark_receipt_sent(donation_id, number.clone(), now)
            .await
        {
            Ok(donation) => donation,
            Err(e) => {
                tracing::warn!(%donation_id, error = %e,
                    "receipt dispatch: marking receipt failed");
                return;
            }
        };

        // The in-app notification always goes out, anonymous or not.
        if let Err(e) = self
            .sink
            .send_receipt_notification(
                donor_id,
                donation_id,
                donation.amount_minor,
                donation.currency,
                &donor.language,
            )
            .await
        {
            tracing::warn!(%donation_id, error = %e, "receipt notification failed");
        }

        if donation.is_anonymous {
            return;
        }
        if donor.receipt_preference == ReceiptPreference::NoReceipts {
            return;
        }

        self.send_receipt_channels(&donor, &donation.currency, donation.amount_minor, &number, now)
            .await;
    }

    async fn send_receipt_channels(
        &self,
        donor: &Donor,
        currency: &Currency,
        amount_minor: i64,
        number: &str,
        now: DateTime<Utc>,
    ) {
        if donor.communication_preferences.email {
            if let Some(email) = &donor.email {
                let receipt = ReceiptData {
                    receipt_number: number.to_string(),
                    donor_name: donor.full_name.clone(),
                    amount_minor,
                    currency: *currency,
                    donation_date: now,
                };
                if let Err(e) = self.sink.send_receipt_email(email, &receipt).await {
                    tracing::warn!(error = %e, "receipt email failed");
                }
            }
        }
        if donor.communication_preferences.sms {
            if let Some(phone) = &donor.phone {
                let message = format!(
                    "Murakoze! Your donation of {} {} was received. Receipt {number}.",
                    format_minor(amount_minor),
                    currency.code(),
                );
                if let Err(e) = self.sink.send_receipt_sms(phone, &message).await {
                    tracing::warn!(error = %e, "receipt SMS failed");
                }
            }
        }
    }

    async fn handle_failed(&self, donation_id: DonationId, donor_id: DonorId, reason: &str) {
        if let Err(e) = self
            .sink
            .send_failure_notification(donor_id, donation_id, reason)
            .await
        {
            tracing::warn!(%donation_id, error = %e, "failure notification failed");
        }

        let donor = match self.store.donor(donor_id) {
            Ok(donor) => donor,
            Err(e) => {
                tracing::warn!(%donation_id, %donor_id, error = %e,
                    "failure dispatch: donor lookup failed");
                return;
            }
        };
        if donor.communication_preferences.email {
            if let Some(email) = &donor.email {
                if let Err(e) = self.sink.send_failure_email(email, donation_id, reason).await {
                    tracing::warn!(%donation_id, error = %e, "failure email failed");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};
    use impano_core::{RateTable, SubscriptionId};
    use impano_recurring::{ChargeClaim, Donation, Frequency, PaymentMethodDetails};

    use crate::donor::CommunicationPreferences;

    /// Seed a donor and a donation, returning the ids. The donation's
    /// anonymity flag follows the donor's preference.
    async fn seed(store: &LedgerStore, donor: Donor) -> (DonorId, DonationId) {
        let donor = store.insert_donor(donor).await.expect("insert donor");
        let claim = ChargeClaim {
            subscription_id: SubscriptionId::new(),
            donor_id: donor.id,
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
            due_date: NaiveDate::from_ymd_opt(2024, 2, 1).expect("valid date"),
        };
        let donation = Donation::from_claim(
            &claim,
            donor.anonymity_preference,
            &RateTable::with_defaults(),
            Utc::now(),
        )
        .expect("usd converts");
        let donation_id = donation.id;
        store.insert_donation(donation).await.expect("insert donation");
        (donor.id, donation_id)
    }

    fn donor_with_channels() -> Donor {
        let mut donor = Donor::new(
            "Aline Uwase".into(),
            Some("aline@example.org".into()),
            Some("0788123456".into()),
            "RW".into(),
            Currency::Usd,
            Utc::now(),
        );
        donor.communication_preferences = CommunicationPreferences {
            email: true,
            sms: true,
        };
        donor
    }

    /// Run a dispatcher to completion over a single event.
    async fn dispatch(
        store: Arc<LedgerStore>,
        sink: Arc<RecordingNotificationSink>,
        event: ChargeEvent,
    ) {
        let (tx, rx) = mpsc::channel(4);
        tx.send(event).await.expect("queue event");
        drop(tx);
        ReceiptDispatcher::new(store, sink).run(rx).await;
    }

    #[tokio::test]
    async fn completed_event_receipts_and_fans_out_to_consented_channels() {
        let store = Arc::new(LedgerStore::new(None));
        let sink = Arc::new(RecordingNotificationSink::new());
        let (donor_id, donation_id) = seed(&store, donor_with_channels()).await;

        dispatch(
            Arc::clone(&store),
            Arc::clone(&sink),
            ChargeEvent::Completed {
                donation_id,
                donor_id,
            },
        )
        .await;

        let donation = store.donation(donation_id).expect("donation");
        assert!(donation.receipt_sent);
        let number = donation.receipt_number.expect("receipt number");
        assert!(number.starts_with("RCPT-"), "got {number}");

        let calls = sink.calls();
        assert_eq!(calls.len(), 3, "in-app + email + sms: {calls:?}");
        assert!(calls[0].starts_with(&format!("receipt_notification:{donor_id}:5000:USD")));
        assert_eq!(calls[1], format!("receipt_email:aline@example.org:{number}"));
        assert_eq!(calls[2], "receipt_sms:0788123456");
    }

    #[tokio::test]
    async fn anonymous_donation_stays_in_app_only() {
        let store = Arc::new(LedgerStore::new(None));
        let sink = Arc::new(RecordingNotificationSink::new());
        let mut donor = donor_with_channels();
        donor.anonymity_preference = true;
        let (donor_id, donation_id) = seed(&store, donor).await;

        dispatch(
            Arc::clone(&store),
            Arc::clone(&sink),
            ChargeEvent::Completed {
                donation_id,
                donor_id,
            },
        )
        .await;

        // Receipt content never leaves the platform for anonymous gifts,
        // but the donation is still marked receipted.
        let calls = sink.calls();
        assert_eq!(calls.len(), 1, "{calls:?}");
        assert!(calls[0].starts_with("receipt_notification:"));
        assert!(store.donation(donation_id).expect("donation").receipt_sent);
    }

    #[tokio::test]
    async fn no_receipts_preference_suppresses_email_and_sms() {
        let store = Arc::new(LedgerStore::new(None));
        let sink = Arc::new(RecordingNotificationSink::new());
        let mut donor = donor_with_channels();
        donor.receipt_preference = ReceiptPreference::NoReceipts;
        let (donor_id, donation_id) = seed(&store, donor).await;

        dispatch(
            Arc::clone(&store),
            Arc::clone(&sink),
            ChargeEvent::Completed {
                donation_id,
                donor_id,
            },
        )
        .await;

        let calls = sink.calls();
        assert_eq!(calls.len(), 1, "{calls:?}");
        assert!(calls[0].starts_with("receipt_notification:"));
    }

    #[tokio::test]
    async fn failed_event_notifies_and_emails_the_donor() {
        let store = Arc::new(LedgerStore::new(None));
        let sink = Arc::new(RecordingNotificationSink::new());
        let (donor_id, donation_id) = seed(&store, donor_with_channels()).await;

        dispatch(
            Arc::clone(&store),
            Arc::clone(&sink),
            ChargeEvent::Failed {
                donation_id,
                donor_id,
                reason: "card_declined".into(),
            },
        )
        .await;

        let calls = sink.calls();
        assert_eq!(calls.len(), 2, "{calls:?}");
        assert_eq!(calls[0], format!("failure_notification:{donor_id}:card_declined"));
        assert_eq!(
            calls[1],
            "failure_email:aline@example.org:card_declined"
        );

        // A failure never marks anything receipted.
        assert!(!store.donation(donation_id).expect("donation").receipt_sent);
    }

    #[test]
    fn receipt_number_shape() {
        let now = Utc.with_ymd_and_hms(2024, 1, 15, 9, 30, 0).unwrap();
        let number = receipt_number(DonationId::new(), now);
        assert!(number.starts_with("RCPT-20240115-"), "got {number}");
        let suffix = number.rsplit('-').next().unwrap();
        assert_eq!(suffix.len(), 8);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn receipt_number_is_deterministic_per_donation_and_instant() {
        let now = Utc.with_ymd_and_hms(2024, 1, 15, 9, 30, 0).unwrap();
        let id = DonationId::new();
        assert_eq!(receipt_number(id, now), receipt_number(id, now));
        assert_ne!(receipt_number(id, now), receipt_number(DonationId::new(), now));
    }
}
