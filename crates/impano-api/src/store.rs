//! # Ledger Store
//!
//! In-memory-authoritative storage for donors, subscriptions, and
//! donations, with optional write-through to Postgres (see [`crate::db`]).
//! When `DATABASE_URL` is unset the store is purely in-memory; when set,
//! every mutation is mirrored to the database and the maps are hydrated
//! from it on startup.
//!
//! ## Concurrency
//!
//! Each map entry is guarded by its DashMap shard lock. Mutations happen
//! under the entry guard and the updated record is cloned out *before* any
//! database await — a DashMap guard must never be held across an await
//! point. The one place this matters for correctness rather than hygiene
//! is [`LedgerStore::claim_due_charge`]: the due-check and the schedule
//! advance execute under a single `get_mut` guard, so two overlapping
//! orchestrator runs can never both claim the same due date.
//!
//! Donation transaction ids are enforced unique through a dedicated index
//! map (and a unique column constraint in Postgres); a duplicate insert is
//! a [`StoreError::Conflict`], aborting that charge unit.

use chrono::{DateTime, NaiveDate, Utc};
use dashmap::DashMap;
use sqlx::PgPool;
use thiserror::Error;

use impano_core::{DonationId, DonorId, SubscriptionId};
use impano_recurring::{
    ChargeClaim, Donation, DonationError, PaymentStatus, RecurringSubscription, SubscriptionError,
    SubscriptionPatch,
};

use crate::db;
use crate::donor::Donor;

/// Errors from ledger operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The referenced record does not exist.
    #[error("{kind} {id} not found")]
    NotFound {
        /// Record kind ("donor", "subscription", "donation").
        kind: &'static str,
        id: String,
    },

    /// Uniqueness or concurrent-modification conflict.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A subscription lifecycle rule rejected the mutation.
    #[error(transparent)]
    Subscription(#[from] SubscriptionError),

    /// A donation status rule rejected the mutation.
    #[error(transparent)]
    Donation(#[from] DonationError),

    /// The write-through to Postgres failed. The in-memory record may be
    /// ahead of the database until the next restart hydration.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// DashMap-backed ledger with optional Postgres write-through.
pub struct LedgerStore {
    donors: DashMap<DonorId, Donor>,
    subscriptions: DashMap<SubscriptionId, RecurringSubscription>,
    donations: DashMap<DonationId, Donation>,
    /// Uniqueness index: transaction id → donation id.
    transaction_index: DashMap<String, DonationId>,
    pool: Option<PgPool>,
}

impl LedgerStore {
    /// Create a store. `pool` enables write-through persistence.
    pub fn new(pool: Option<PgPool>) -> Self {
        Self {
            donors: DashMap::new(),
            subscriptions: DashMap::new(),
            donations: DashMap::new(),
            transaction_index: DashMap::new(),
            pool,
        }
    }

    /// Whether a database is attached.
    pub fn persistent(&self) -> bool {
        self.pool.is_some()
    }

    pub fn pool(&self) -> Option<&PgPool> {
        self.pool.as_ref()
    }

    /// Load all records from Postgres into the in-memory maps.
    ///
    /// Called once on startup, before the server accepts traffic. No-op
    /// without a pool.
    pub async fn hydrate(&self) -> Result<(), StoreError> {
        let Some(pool) = &self.pool else {
            return Ok(());
        };
        let donors = db::donors::load_all(pool).await?;
        let subscriptions = db::subscriptions::load_all(pool).await?;
        let donations = db::donations::load_all(pool).await?;
        tracing::info!(
            donors = donors.len(),
            subscriptions = subscriptions.len(),
            donations = donations.len(),
            "hydrated ledger from database"
        );
        for donor in donors {
            self.donors.insert(donor.id, donor);
        }
        for sub in subscriptions {
            self.subscriptions.insert(sub.id, sub);
        }
        for donation in donations {
            self.transaction_index
                .insert(donation.transaction_id.to_string(), donation.id);
            self.donations.insert(donation.id, donation);
        }
        Ok(())
    }

    // ── Donors ───────────────────────────────────────────────────

    /// Insert a new donor.
    pub async fn insert_donor(&self, donor: Donor) -> Result<Donor, StoreError> {
        if self.donors.contains_key(&donor.id) {
            return Err(StoreError::Conflict(format!(
                "donor {} already exists",
                donor.id
            )));
        }
        self.donors.insert(donor.id, donor.clone());
        if let Some(pool) = &self.pool {
            db::donors::insert(pool, &donor).await?;
        }
        Ok(donor)
    }

    /// Fetch a donor by id.
    pub fn donor(&self, id: DonorId) -> Result<Donor, StoreError> {
        self.donors
            .get(&id)
            .map(|d| d.clone())
            .ok_or(StoreError::NotFound {
                kind: "donor",
                id: id.to_string(),
            })
    }

    /// Apply a completed charge to the donor aggregates.
    ///
    /// The in-memory increment runs under the entry guard; the database
    /// mirror uses an atomic `SET total = total + $1` so concurrent charges
    /// for the same donor never lose updates.
    pub async fn apply_donor_charge(
        &self,
        id: DonorId,
        amount_minor: i64,
        now: DateTime<Utc>,
    ) -> Result<Donor, StoreError> {
        let snapshot = {
            let mut entry = self.donors.get_mut(&id).ok_or(StoreError::NotFound {
                kind: "donor",
                id: id.to_string(),
            })?;
            entry.apply_charge(amount_minor, now);
            entry.clone()
        };
        if let Some(pool) = &self.pool {
            db::donors::apply_charge(pool, id, amount_minor, now).await?;
        }
        Ok(snapshot)
    }

    // ── Subscriptions ────────────────────────────────────────────

    /// Insert a new subscription and flag its donor as recurring.
    pub async fn insert_subscription(
        &self,
        sub: RecurringSubscription,
    ) -> Result<RecurringSubscription, StoreError> {
        let donor_snapshot = {
            let mut donor =
                self.donors
                    .get_mut(&sub.donor_id)
                    .ok_or(StoreError::NotFound {
                        kind: "donor",
                        id: sub.donor_id.to_string(),
                    })?;
            donor.mark_recurring(sub.created_at);
            donor.clone()
        };
        self.subscriptions.insert(sub.id, sub.clone());
        if let Some(pool) = &self.pool {
            db::subscriptions::insert(pool, &sub).await?;
            db::donors::update(pool, &donor_snapshot).await?;
        }
        Ok(sub)
    }

    /// Fetch a subscription by id.
    pub fn subscription(&self, id: SubscriptionId) -> Result<RecurringSubscription, StoreError> {
        self.subscriptions
            .get(&id)
            .map(|s| s.clone())
            .ok_or(StoreError::NotFound {
                kind: "subscription",
                id: id.to_string(),
            })
    }

    /// All subscriptions, newest first.
    pub fn list_subscriptions(&self) -> Vec<RecurringSubscription> {
        let mut all: Vec<_> = self
            .subscriptions
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        all
    }

    /// Ids of subscriptions due for a charge at `as_of`.
    pub fn due_subscriptions(&self, as_of: NaiveDate) -> Vec<SubscriptionId> {
        self.subscriptions
            .iter()
            .filter(|entry| entry.value().is_due(as_of))
            .map(|entry| entry.value().id)
            .collect()
    }

    /// Run a mutation on a subscription under its entry guard, then mirror
    /// the updated record to the database.
    async fn mutate_subscription<F>(
        &self,
        id: SubscriptionId,
        mutate: F,
    ) -> Result<RecurringSubscription, StoreError>
    where
        F: FnOnce(&mut RecurringSubscription) -> Result<(), SubscriptionError>,
    {
        let snapshot = {
            let mut entry = self
                .subscriptions
                .get_mut(&id)
                .ok_or(StoreError::NotFound {
                    kind: "subscription",
                    id: id.to_string(),
                })?;
            mutate(&mut entry)?;
            entry.clone()
        };
        if let Some(pool) = &self.pool {
            db::subscriptions::update(pool, &snapshot).await?;
        }
        Ok(snapshot)
    }

    /// Apply an enumerated patch.
    pub async fn update_subscription(
        &self,
        id: SubscriptionId,
        patch: &SubscriptionPatch,
        now: DateTime<Utc>,
    ) -> Result<RecurringSubscription, StoreError> {
        self.mutate_subscription(id, |sub| patch.apply(sub, now))
            .await
    }

    /// Cancel a subscription (terminal).
    pub async fn cancel_subscription(
        &self,
        id: SubscriptionId,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<RecurringSubscription, StoreError> {
        self.mutate_subscription(id, |sub| sub.cancel(reason, now))
            .await
    }

    /// Pause an active subscription.
    pub async fn pause_subscription(
        &self,
        id: SubscriptionId,
        now: DateTime<Utc>,
    ) -> Result<RecurringSubscription, StoreError> {
        self.mutate_subscription(id, |sub| sub.pause(now)).await
    }

    /// Resume a paused subscription.
    pub async fn resume_subscription(
        &self,
        id: SubscriptionId,
        now: DateTime<Utc>,
    ) -> Result<RecurringSubscription, StoreError> {
        self.mutate_subscription(id, |sub| sub.resume(now)).await
    }

    /// Claim the subscription's current due date for charging.
    ///
    /// Returns `Ok(None)` when the subscription is no longer due — either
    /// another orchestrator run claimed it first, or it was paused or
    /// cancelled between selection and claim. The due-check and the
    /// schedule advance run under one entry guard; this is the store's
    /// at-most-once point.
    pub async fn claim_due_charge(
        &self,
        id: SubscriptionId,
        as_of: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<Option<ChargeClaim>, StoreError> {
        let (claim, snapshot) = {
            let mut entry = self
                .subscriptions
                .get_mut(&id)
                .ok_or(StoreError::NotFound {
                    kind: "subscription",
                    id: id.to_string(),
                })?;
            if !entry.is_due(as_of) {
                return Ok(None);
            }
            let claim = entry.claim_charge(as_of, now)?;
            (claim, entry.clone())
        };
        if let Some(pool) = &self.pool {
            db::subscriptions::update(pool, &snapshot).await?;
        }
        Ok(Some(claim))
    }

    /// Record a completed charge on the subscription totals.
    pub async fn record_subscription_success(
        &self,
        id: SubscriptionId,
        amount_minor: i64,
        donation_id: DonationId,
        now: DateTime<Utc>,
    ) -> Result<RecurringSubscription, StoreError> {
        self.mutate_subscription(id, |sub| {
            sub.record_success(amount_minor, donation_id, now);
            Ok(())
        })
        .await
    }

    // ── Donations ────────────────────────────────────────────────

    /// Insert a new donation, enforcing transaction-id uniqueness.
    pub async fn insert_donation(&self, donation: Donation) -> Result<(), StoreError> {
        use dashmap::mapref::entry::Entry;
        match self
            .transaction_index
            .entry(donation.transaction_id.to_string())
        {
            Entry::Occupied(_) => {
                return Err(StoreError::Conflict(format!(
                    "transaction id {} already recorded",
                    donation.transaction_id
                )));
            }
            Entry::Vacant(slot) => {
                slot.insert(donation.id);
            }
        }
        self.donations.insert(donation.id, donation.clone());
        if let Some(pool) = &self.pool {
            db::donations::insert(pool, &donation).await.map_err(|e| {
                if matches!(&e, sqlx::Error::Database(db) if db.is_unique_violation()) {
                    StoreError::Conflict(format!(
                        "transaction id {} already recorded",
                        donation.transaction_id
                    ))
                } else {
                    StoreError::Database(e)
                }
            })?;
        }
        Ok(())
    }

    /// Fetch a donation by id.
    pub fn donation(&self, id: DonationId) -> Result<Donation, StoreError> {
        self.donations
            .get(&id)
            .map(|d| d.clone())
            .ok_or(StoreError::NotFound {
                kind: "donation",
                id: id.to_string(),
            })
    }

    /// All donations, newest first.
    pub fn list_donations(&self) -> Vec<Donation> {
        let mut all: Vec<_> = self
            .donations
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        all
    }

    /// Run a mutation on a donation under its entry guard, then mirror
    /// the updated record to the database.
    async fn mutate_donation<F>(
        &self,
        id: DonationId,
        mutate: F,
    ) -> Result<Donation, StoreError>
    where
        F: FnOnce(&mut Donation) -> Result<(), DonationError>,
    {
        let snapshot = {
            let mut entry = self.donations.get_mut(&id).ok_or(StoreError::NotFound {
                kind: "donation",
                id: id.to_string(),
            })?;
            mutate(&mut entry)?;
            entry.clone()
        };
        if let Some(pool) = &self.pool {
            db::donations::update(pool, &snapshot).await?;
        }
        Ok(snapshot)
    }

    /// Apply a forward payment-status transition.
    pub async fn transition_donation(
        &self,
        id: DonationId,
        next: PaymentStatus,
        now: DateTime<Utc>,
    ) -> Result<Donation, StoreError> {
        self.mutate_donation(id, |donation| donation.transition(next, now))
            .await
    }

    /// Record the gateway's external reference and raw response.
    pub async fn record_donation_gateway_response(
        &self,
        id: DonationId,
        external_id: Option<String>,
        raw_response: Option<serde_json::Value>,
        summary: String,
        now: DateTime<Utc>,
    ) -> Result<Donation, StoreError> {
        self.mutate_donation(id, |donation| {
            donation.record_gateway_response(external_id, raw_response, summary, now);
            Ok(())
        })
        .await
    }

    /// Mark a donation's receipt as dispatched.
    pub async fn mark_receipt_sent(
        &self,
        id: DonationId,
        receipt_number: String,
        now: DateTime<Utc>,
    ) -> Result<Donation, StoreError> {
        self.mutate_donation(id, |donation| {
            donation.mark_receipt_sent(receipt_number, now);
            Ok(())
        })
        .await
    }

    // ── Counts (for /metrics and readiness) ──────────────────────

    pub fn donor_count(&self) -> usize {
        self.donors.len()
    }

    /// Subscription counts keyed by status string.
    pub fn subscription_status_counts(&self) -> std::collections::HashMap<&'static str, usize> {
        let mut counts = std::collections::HashMap::new();
        for entry in self.subscriptions.iter() {
            *counts.entry(entry.value().status.as_str()).or_default() += 1;
        }
        counts
    }

    /// Donation counts keyed by payment-status string.
    pub fn donation_status_counts(&self) -> std::collections::HashMap<&'static str, usize> {
        let mut counts = std::collections::HashMap::new();
        for entry in self.donations.iter() {
            *counts
                .entry(entry.value().payment_status.as_str())
                .or_default() += 1;
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use impano_core::{Currency, RateTable};
    use impano_recurring::{Frequency, PaymentMethodDetails};

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

    async fn store_with_subscription() -> (LedgerStore, DonorId, SubscriptionId) {
        let store = LedgerStore::new(None);
        let donor = store
            .insert_donor(Donor::new(
                "Aline Uwase".into(),
                Some("aline@example.org".into()),
                None,
                "RW".into(),
                Currency::Rwf,
                Utc::now(),
            ))
            .await
            .expect("insert donor");
        let sub = RecurringSubscription::new(
            donor.id,
            5_000,
            Currency::Usd,
            Frequency::Monthly,
            "pm_test_visa".into(),
            card_details(),
            d(2023, 12, 1),
            Utc::now(),
        )
        .expect("valid subscription");
        let sub = store.insert_subscription(sub).await.expect("insert sub");
        (store, donor.id, sub.id)
    }

    #[tokio::test]
    async fn insert_subscription_marks_donor_recurring() {
        let (store, donor_id, _) = store_with_subscription().await;
        assert!(store.donor(donor_id).expect("donor").is_recurring_donor);
    }

    #[tokio::test]
    async fn insert_subscription_requires_existing_donor() {
        let store = LedgerStore::new(None);
        let sub = RecurringSubscription::new(
            DonorId::new(),
            5_000,
            Currency::Usd,
            Frequency::Monthly,
            "pm".into(),
            card_details(),
            d(2024, 1, 1),
            Utc::now(),
        )
        .expect("valid subscription");
        assert!(matches!(
            store.insert_subscription(sub).await,
            Err(StoreError::NotFound { kind: "donor", .. })
        ));
    }

    #[tokio::test]
    async fn claim_is_exclusive_per_due_date() {
        let (store, _, sub_id) = store_with_subscription().await;
        let first = store
            .claim_due_charge(sub_id, d(2024, 1, 1), Utc::now())
            .await
            .expect("claim");
        assert!(first.is_some());
        // The same due date cannot be claimed twice.
        let second = store
            .claim_due_charge(sub_id, d(2024, 1, 1), Utc::now())
            .await
            .expect("claim");
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn concurrent_claims_yield_exactly_one_winner() {
        let (store, _, sub_id) = store_with_subscription().await;
        let store = std::sync::Arc::new(store);
        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .claim_due_charge(sub_id, d(2024, 1, 1), Utc::now())
                    .await
                    .expect("claim")
                    .is_some()
            }));
        }
        let mut winners = 0;
        for handle in handles {
            if handle.await.expect("join") {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn due_selection_skips_paused_and_cancelled() {
        let (store, _, sub_id) = store_with_subscription().await;
        assert_eq!(store.due_subscriptions(d(2024, 1, 1)).len(), 1);
        store
            .pause_subscription(sub_id, Utc::now())
            .await
            .expect("pause");
        assert!(store.due_subscriptions(d(2024, 1, 1)).is_empty());
        store
            .resume_subscription(sub_id, Utc::now())
            .await
            .expect("resume");
        store
            .cancel_subscription(sub_id, "donor request", Utc::now())
            .await
            .expect("cancel");
        assert!(store.due_subscriptions(d(2099, 1, 1)).is_empty());
    }

    #[tokio::test]
    async fn duplicate_transaction_id_is_a_conflict() {
        let (store, _, sub_id) = store_with_subscription().await;
        let claim = store
            .claim_due_charge(sub_id, d(2024, 1, 1), Utc::now())
            .await
            .expect("claim")
            .expect("due");
        let donation =
            Donation::from_claim(&claim, false, &RateTable::with_defaults(), Utc::now())
                .expect("build");
        let mut duplicate = donation.clone();
        duplicate.id = DonationId::new();
        store
            .insert_donation(donation)
            .await
            .expect("first insert");
        assert!(matches!(
            store.insert_donation(duplicate).await,
            Err(StoreError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn donor_aggregates_accumulate() {
        let (store, donor_id, _) = store_with_subscription().await;
        store
            .apply_donor_charge(donor_id, 5_000, Utc::now())
            .await
            .expect("apply");
        store
            .apply_donor_charge(donor_id, 5_000, Utc::now())
            .await
            .expect("apply");
        let donor = store.donor(donor_id).expect("donor");
        assert_eq!(donor.total_donated_minor, 10_000);
        assert!(donor.last_donation_date.is_some());
    }

    #[tokio::test]
    async fn status_counts_reflect_lifecycle() {
        let (store, _, sub_id) = store_with_subscription().await;
        assert_eq!(store.subscription_status_counts().get("active"), Some(&1));
        store
            .cancel_subscription(sub_id, "test", Utc::now())
            .await
            .expect("cancel");
        assert_eq!(
            store.subscription_status_counts().get("cancelled"),
            Some(&1)
        );
    }
}
