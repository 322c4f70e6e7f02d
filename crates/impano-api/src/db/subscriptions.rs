//! Recurring-subscription persistence operations.
//!
//! All functions take a `&PgPool` and operate on the `subscriptions`
//! table. Lifecycle and schedule constraints are enforced at the
//! application layer (the store's entry-guarded mutations), not in SQL;
//! the database holds the mirror of the in-memory record.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgPool;
use std::str::FromStr;
use uuid::Uuid;

use impano_core::{Currency, DonationId, DonorId, ProgramId, ProjectId, SubscriptionId};
use impano_recurring::{
    Frequency, PaymentMethodDetails, RecurringSubscription, SubscriptionStatus,
};

use super::{enum_to_text, text_to_enum};

/// Insert a new subscription record.
pub async fn insert(pool: &PgPool, sub: &RecurringSubscription) -> Result<(), sqlx::Error> {
    let frequency = enum_to_text(&sub.frequency, "frequency")?;
    let details = serde_json::to_value(&sub.payment_method_details)
        .map_err(|e| sqlx::Error::Protocol(format!("failed to serialize payment_method_details: {e}")))?;

    sqlx::query(
        "INSERT INTO subscriptions (id, donor_id, project_id, program_id, amount_minor, currency,
                                    frequency, status, next_charge_date, last_charged_date,
                                    last_charge_id, payment_method_id, external_subscription_id,
                                    payment_method_details, total_charges, total_amount_minor,
                                    start_date, end_date, cancellation_reason, send_reminders,
                                    created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18,
                 $19, $20, $21, $22)",
    )
    .bind(*sub.id.as_uuid())
    .bind(*sub.donor_id.as_uuid())
    .bind(sub.project_id.map(|id| *id.as_uuid()))
    .bind(sub.program_id.map(|id| *id.as_uuid()))
    .bind(sub.amount_minor)
    .bind(sub.currency.code())
    .bind(&frequency)
    .bind(sub.status.as_str())
    .bind(sub.next_charge_date)
    .bind(sub.last_charged_date)
    .bind(sub.last_charge_id.map(|id| *id.as_uuid()))
    .bind(&sub.payment_method_id)
    .bind(&sub.external_subscription_id)
    .bind(&details)
    .bind(sub.total_charges as i32)
    .bind(sub.total_amount_minor)
    .bind(sub.start_date)
    .bind(sub.end_date)
    .bind(&sub.cancellation_reason)
    .bind(sub.send_reminders)
    .bind(sub.created_at)
    .bind(sub.updated_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Mirror the full mutable state of a subscription record.
pub async fn update(pool: &PgPool, sub: &RecurringSubscription) -> Result<bool, sqlx::Error> {
    let frequency = enum_to_text(&sub.frequency, "frequency")?;

    let result = sqlx::query(
        "UPDATE subscriptions SET frequency = $1, status = $2, next_charge_date = $3,
                                  last_charged_date = $4, last_charge_id = $5,
                                  external_subscription_id = $6, total_charges = $7,
                                  total_amount_minor = $8, end_date = $9,
                                  cancellation_reason = $10, send_reminders = $11, updated_at = $12
         WHERE id = $13",
    )
    .bind(&frequency)
    .bind(sub.status.as_str())
    .bind(sub.next_charge_date)
    .bind(sub.last_charged_date)
    .bind(sub.last_charge_id.map(|id| *id.as_uuid()))
    .bind(&sub.external_subscription_id)
    .bind(sub.total_charges as i32)
    .bind(sub.total_amount_minor)
    .bind(sub.end_date)
    .bind(&sub.cancellation_reason)
    .bind(sub.send_reminders)
    .bind(sub.updated_at)
    .bind(*sub.id.as_uuid())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Load all subscriptions from the database into the ledger on startup.
///
/// Rows whose enum columns no longer parse are skipped with a warning
/// rather than silently defaulted — a wrong currency or status on a
/// financial record is worse than a missing one.
pub async fn load_all(pool: &PgPool) -> Result<Vec<RecurringSubscription>, sqlx::Error> {
    let rows = sqlx::query_as::<_, SubscriptionRow>(
        "SELECT id, donor_id, project_id, program_id, amount_minor, currency, frequency, status,
                next_charge_date, last_charged_date, last_charge_id, payment_method_id,
                external_subscription_id, payment_method_details, total_charges,
                total_amount_minor, start_date, end_date, cancellation_reason, send_reminders,
                created_at, updated_at
         FROM subscriptions ORDER BY created_at",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .filter_map(SubscriptionRow::into_subscription)
        .collect())
}

/// Internal row type for SQLx mapping.
#[derive(sqlx::FromRow)]
struct SubscriptionRow {
    id: Uuid,
    donor_id: Uuid,
    project_id: Option<Uuid>,
    program_id: Option<Uuid>,
    amount_minor: i64,
    currency: String,
    frequency: String,
    status: String,
    next_charge_date: NaiveDate,
    last_charged_date: Option<NaiveDate>,
    last_charge_id: Option<Uuid>,
    payment_method_id: String,
    external_subscription_id: Option<String>,
    payment_method_details: serde_json::Value,
    total_charges: i32,
    total_amount_minor: i64,
    start_date: NaiveDate,
    end_date: Option<NaiveDate>,
    cancellation_reason: Option<String>,
    send_reminders: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl SubscriptionRow {
    fn into_subscription(self) -> Option<RecurringSubscription> {
        let Ok(currency) = Currency::from_str(&self.currency) else {
            tracing::warn!(id = %self.id, currency = %self.currency,
                "unknown currency in subscription row, skipping");
            return None;
        };
        let Some(frequency) = text_to_enum::<Frequency>(&self.frequency) else {
            tracing::warn!(id = %self.id, frequency = %self.frequency,
                "unknown frequency in subscription row, skipping");
            return None;
        };
        let Some(status) = text_to_enum::<SubscriptionStatus>(&self.status) else {
            tracing::warn!(id = %self.id, status = %self.status,
                "unknown status in subscription row, skipping");
            return None;
        };
        let details: PaymentMethodDetails =
            match serde_json::from_value(self.payment_method_details) {
                Ok(details) => details,
                Err(e) => {
                    tracing::warn!(id = %self.id, error = %e,
                        "unreadable payment_method_details in subscription row, skipping");
                    return None;
                }
            };

        Some(RecurringSubscription {
            id: SubscriptionId::from_uuid(self.id),
            donor_id: DonorId::from_uuid(self.donor_id),
            project_id: self.project_id.map(ProjectId::from_uuid),
            program_id: self.program_id.map(ProgramId::from_uuid),
            amount_minor: self.amount_minor,
            currency,
            frequency,
            status,
            next_charge_date: self.next_charge_date,
            last_charged_date: self.last_charged_date,
            last_charge_id: self.last_charge_id.map(DonationId::from_uuid),
            payment_method_id: self.payment_method_id,
            external_subscription_id: self.external_subscription_id,
            payment_method_details: details,
            total_charges: self.total_charges.max(0) as u32,
            total_amount_minor: self.total_amount_minor,
            start_date: self.start_date,
            end_date: self.end_date,
            cancellation_reason: self.cancellation_reason,
            send_reminders: self.send_reminders,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}
