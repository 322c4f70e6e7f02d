//! # Recurring Charge Orchestration
//!
//! The [`ChargeOrchestrator`] drives one batch run: collect subscriptions
//! due as of a date, claim and charge each one, and settle the outcome
//! onto the donation record, the subscription schedule, and the donor
//! aggregates. Receipt and failure notifications are emitted as
//! [`ChargeEvent`]s; the dispatcher consumes them off-thread.
//!
//! ## At-most-once
//!
//! The claim in [`LedgerStore::claim_due_charge`] is the only gate: it
//! advances the schedule under the entry guard before any gateway call,
//! so a subscription due today is charged at most once no matter how many
//! batch runs overlap. A claim that loses the race comes back `None` and
//! the unit is counted as skipped.
//!
//! ## Outcome mapping
//!
//! | Gateway result                    | Donation      | Subscription |
//! |-----------------------------------|---------------|--------------|
//! | `Completed`                       | completed     | totals + last_charge |
//! | provider `Pending` status         | left pending  | schedule stays advanced |
//! | provider `Failed` status          | failed        | schedule stays advanced |
//! | `Rejected` / `NotConfigured`      | failed        | schedule stays advanced |
//! | `Unavailable` / `Timeout`         | left pending  | schedule stays advanced |
//!
//! A failed charge does not roll the schedule back: the donor is not
//! retried daily for the same decline, and the next period's charge gets
//! a fresh attempt. Pending donations are reconciled out of band.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, Semaphore};

use impano_core::RateTable;
use impano_gateway::{ChargeRequest, GatewayError, PaymentGateway, ProviderStatus};
use impano_recurring::{ChargeClaim, Donation, PaymentMethodDetails, PaymentStatus};

use crate::receipts::ChargeEvent;
use crate::store::LedgerStore;

/// Aggregate result of one batch run, returned to the trigger endpoint
/// and logged.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchSummary {
    /// Subscriptions due when the batch started.
    pub due: usize,
    /// Charges completed by the provider.
    pub charged: usize,
    /// Charges terminally declined.
    pub failed: usize,
    /// Charges left pending after a transient gateway outage.
    pub pending: usize,
    /// Units claimed by a concurrent run (or no longer due).
    pub skipped: usize,
    /// Internal errors, one message per affected unit.
    pub errors: Vec<String>,
}

/// Per-unit settlement outcome, folded into the [`BatchSummary`].
enum UnitOutcome {
    Skipped,
    Charged,
    Failed,
    LeftPending,
    Error(String),
}

/// Batch charge engine over the ledger, the rate table, and the two
/// gateway families.
pub struct ChargeOrchestrator {
    store: Arc<LedgerStore>,
    rates: Arc<RateTable>,
    card: Arc<dyn PaymentGateway>,
    mobile_money: Arc<dyn PaymentGateway>,
    events: mpsc::Sender<ChargeEvent>,
    /// Maximum charge units in flight at once.
    concurrency: usize,
}

impl ChargeOrchestrator {
    pub fn new(
        store: Arc<LedgerStore>,
        rates: Arc<RateTable>,
        card: Arc<dyn PaymentGateway>,
        mobile_money: Arc<dyn PaymentGateway>,
        events: mpsc::Sender<ChargeEvent>,
        concurrency: usize,
    ) -> Self {
        Self {
            store,
            rates,
            card,
            mobile_money,
            events,
            concurrency: concurrency.max(1),
        }
    }

    /// The card gateway, for provider-side subscription cancellation.
    pub fn card_gateway(&self) -> &Arc<dyn PaymentGateway> {
        &self.card
    }

    /// Run one batch: charge every subscription due as of `as_of`.
    pub async fn process_due_charges(self: &Arc<Self>, as_of: NaiveDate) -> BatchSummary {
        let due = self.store.due_subscriptions(as_of);
        let mut summary = BatchSummary {
            due: due.len(),
            ..Default::default()
        };
        if due.is_empty() {
            return summary;
        }
        tracing::info!(%as_of, due = due.len(), "starting recurring charge batch");

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut handles = Vec::with_capacity(due.len());
        for id in due {
            let permit = match semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    // The semaphore is never closed while we hold it.
                    summary
                        .errors
                        .push(format!("subscription {id}: semaphore closed"));
                    continue;
                }
            };
            let orchestrator = Arc::clone(self);
            handles.push(tokio::spawn(async move {
                let outcome = orchestrator.charge_one(id, as_of).await;
                drop(permit);
                outcome
            }));
        }

        for handle in handles {
            match handle.await {
                Ok(UnitOutcome::Skipped) => summary.skipped += 1,
                Ok(UnitOutcome::Charged) => summary.charged += 1,
                Ok(UnitOutcome::Failed) => summary.failed += 1,
                Ok(UnitOutcome::LeftPending) => summary.pending += 1,
                Ok(UnitOutcome::Error(message)) => summary.errors.push(message),
                Err(e) => summary.errors.push(format!("charge task panicked: {e}")),
            }
        }

        tracing::info!(
            %as_of,
            due = summary.due,
            charged = summary.charged,
            failed = summary.failed,
            pending = summary.pending,
            skipped = summary.skipped,
            errors = summary.errors.len(),
            "recurring charge batch finished"
        );
        summary
    }

    /// Claim, charge, and settle a single subscription.
    async fn charge_one(
        &self,
        id: impano_core::SubscriptionId,
        as_of: NaiveDate,
    ) -> UnitOutcome {
        let now = Utc::now();
        let claim = match self.store.claim_due_charge(id, as_of, now).await {
            Ok(Some(claim)) => claim,
            Ok(None) => return UnitOutcome::Skipped,
            Err(e) => return UnitOutcome::Error(format!("subscription {id}: claim failed: {e}")),
        };

        let donor = match self.store.donor(claim.donor_id) {
            Ok(donor) => donor,
            Err(e) => {
                return UnitOutcome::Error(format!(
                    "subscription {id}: donor {} missing: {e}",
                    claim.donor_id
                ))
            }
        };

        // A missing rate pair means no donation record can be built; the
        // schedule stays advanced and the unit is reported as failed.
        let donation =
            match Donation::from_claim(&claim, donor.anonymity_preference, &self.rates, now) {
                Ok(donation) => donation,
                Err(e) => {
                    tracing::error!(subscription_id = %id, currency = claim.currency.code(),
                        error = %e, "conversion failed, charge not attempted");
                    return UnitOutcome::Failed;
                }
            };

        let donation_id = donation.id;
        let transaction_id = donation.transaction_id.to_string();
        if let Err(e) = self.store.insert_donation(donation).await {
            return UnitOutcome::Error(format!(
                "subscription {id}: donation insert failed: {e}"
            ));
        }

        let gateway = self.gateway_for(&claim);
        let request = ChargeRequest {
            amount_minor: claim.amount_minor,
            currency: claim.currency,
            payment_token: Self::payment_token(&claim),
            reference: transaction_id,
        };
        tracing::debug!(subscription_id = %id, %donation_id,
            gateway = gateway.gateway_name(), "submitting charge");

        match gateway.charge(&request).await {
            Ok(outcome) if outcome.status == ProviderStatus::Completed => {
                self.settle_completed(&claim, donation_id, outcome).await
            }
            Ok(outcome) if outcome.status == ProviderStatus::Pending => {
                self.settle_provider_pending(donation_id, outcome).await
            }
            Ok(outcome) => {
                // ProviderStatus::Failed
                let reason = format!("provider status {}", outcome.status);
                self.settle_failed(
                    &claim,
                    donation_id,
                    Some(outcome.external_id),
                    outcome.raw_response,
                    reason,
                )
                .await
            }
            Err(e) if e.is_transient() => {
                self.settle_transient(donation_id, &e).await
            }
            Err(e) => {
                self.settle_failed(&claim, donation_id, None, None, e.to_string())
                    .await
            }
        }
    }

    async fn settle_completed(
        &self,
        claim: &ChargeClaim,
        donation_id: impano_core::DonationId,
        outcome: impano_gateway::ChargeOutcome,
    ) -> UnitOutcome {
        let now = Utc::now();
        if let Err(e) = self
            .store
            .record_donation_gateway_response(
                donation_id,
                Some(outcome.external_id),
                outcome.raw_response,
                "completed".to_string(),
                now,
            )
            .await
        {
            return UnitOutcome::Error(format!("donation {donation_id}: record failed: {e}"));
        }
        if let Err(e) = self
            .store
            .transition_donation(donation_id, PaymentStatus::Completed, now)
            .await
        {
            return UnitOutcome::Error(format!("donation {donation_id}: transition failed: {e}"));
        }
        if let Err(e) = self
            .store
            .record_subscription_success(claim.subscription_id, claim.amount_minor, donation_id, now)
            .await
        {
            return UnitOutcome::Error(format!(
                "subscription {}: success update failed: {e}",
                claim.subscription_id
            ));
        }
        if let Err(e) = self
            .store
            .apply_donor_charge(claim.donor_id, claim.amount_minor, now)
            .await
        {
            return UnitOutcome::Error(format!(
                "donor {}: aggregate update failed: {e}",
                claim.donor_id
            ));
        }

        self.emit(ChargeEvent::Completed {
            donation_id,
            donor_id: claim.donor_id,
        });
        UnitOutcome::Charged
    }

    async fn settle_failed(
        &self,
        claim: &ChargeClaim,
        donation_id: impano_core::DonationId,
        external_id: Option<String>,
        raw_response: Option<serde_json::Value>,
        reason: String,
    ) -> UnitOutcome {
        let now = Utc::now();
        tracing::warn!(subscription_id = %claim.subscription_id, %donation_id,
            reason, "recurring charge failed");
        if let Err(e) = self
            .store
            .record_donation_gateway_response(
                donation_id,
                external_id,
                raw_response,
                reason.clone(),
                now,
            )
            .await
        {
            return UnitOutcome::Error(format!("donation {donation_id}: record failed: {e}"));
        }
        if let Err(e) = self
            .store
            .transition_donation(donation_id, PaymentStatus::Failed, now)
            .await
        {
            return UnitOutcome::Error(format!("donation {donation_id}: transition failed: {e}"));
        }

        self.emit(ChargeEvent::Failed {
            donation_id,
            donor_id: claim.donor_id,
            reason,
        });
        UnitOutcome::Failed
    }

    /// Provider accepted the charge but has not settled it yet (card
    /// `processing`, mobile-money push awaiting donor approval): the
    /// donation stays pending with the external reference recorded, so
    /// the reconciliation pass can verify it against the provider later.
    async fn settle_provider_pending(
        &self,
        donation_id: impano_core::DonationId,
        outcome: impano_gateway::ChargeOutcome,
    ) -> UnitOutcome {
        let now = Utc::now();
        tracing::info!(%donation_id, external_id = %outcome.external_id,
            "charge pending at provider, donation left pending");
        if let Err(e) = self
            .store
            .record_donation_gateway_response(
                donation_id,
                Some(outcome.external_id),
                outcome.raw_response,
                "provider status pending".to_string(),
                now,
            )
            .await
        {
            return UnitOutcome::Error(format!("donation {donation_id}: record failed: {e}"));
        }
        UnitOutcome::LeftPending
    }

    /// Gateway outage or timeout: keep the donation pending for the
    /// out-of-band reconciliation pass rather than guessing an outcome.
    async fn settle_transient(
        &self,
        donation_id: impano_core::DonationId,
        error: &GatewayError,
    ) -> UnitOutcome {
        let now = Utc::now();
        tracing::warn!(%donation_id, error = %error,
            "gateway unavailable, donation left pending for reconciliation");
        if let Err(e) = self
            .store
            .record_donation_gateway_response(donation_id, None, None, error.to_string(), now)
            .await
        {
            return UnitOutcome::Error(format!("donation {donation_id}: record failed: {e}"));
        }
        UnitOutcome::LeftPending
    }

    fn gateway_for(&self, claim: &ChargeClaim) -> &Arc<dyn PaymentGateway> {
        match claim.payment_method_details {
            PaymentMethodDetails::Card { .. } => &self.card,
            PaymentMethodDetails::MobileMoney { .. } => &self.mobile_money,
        }
    }

    fn payment_token(claim: &ChargeClaim) -> String {
        match &claim.payment_method_details {
            PaymentMethodDetails::Card { .. } => claim.payment_method_id.clone(),
            PaymentMethodDetails::MobileMoney { phone_number, .. } => phone_number.clone(),
        }
    }

    /// Queue a notification event. A full or closed channel costs the
    /// notification, never the charge.
    fn emit(&self, event: ChargeEvent) {
        if let Err(e) = self.events.try_send(event) {
            tracing::warn!(error = %e, "charge event dropped, notification not dispatched");
        }
    }
}
