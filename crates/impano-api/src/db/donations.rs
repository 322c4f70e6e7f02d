//! Donation persistence operations.
//!
//! All functions take a `&PgPool` and operate on the `donations` table.
//! The `transaction_id` column carries a unique constraint: the database
//! is the last line of defense against a double-charge writing two
//! donation rows for one transaction id.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::str::FromStr;
use uuid::Uuid;

use impano_core::{Currency, DonationId, DonorId, ProgramId, ProjectId, TransactionId};
use impano_recurring::{
    Donation, DonationMetadata, DonationType, PaymentDetails, PaymentMethod, PaymentStatus,
};

use super::{enum_to_text, text_to_enum};

/// Insert a new donation record.
///
/// A unique violation on `transaction_id` is returned as-is for the store
/// to map onto its conflict error.
pub async fn insert(pool: &PgPool, donation: &Donation) -> Result<(), sqlx::Error> {
    let donation_type = enum_to_text(&donation.donation_type, "donation_type")?;
    let payment_method = enum_to_text(&donation.payment_method, "payment_method")?;
    let payment_details = serde_json::to_value(&donation.payment_details)
        .map_err(|e| sqlx::Error::Protocol(format!("failed to serialize payment_details: {e}")))?;
    let metadata = serde_json::to_value(&donation.metadata)
        .map_err(|e| sqlx::Error::Protocol(format!("failed to serialize donation metadata: {e}")))?;

    sqlx::query(
        "INSERT INTO donations (id, transaction_id, donor_id, project_id, program_id,
                                amount_minor, currency, local_amount_minor, exchange_rate,
                                donation_type, payment_method, payment_status, payment_details,
                                receipt_sent, receipt_sent_at, receipt_number, is_anonymous,
                                metadata, donor_message, is_test, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18,
                 $19, $20, $21, $22)",
    )
    .bind(*donation.id.as_uuid())
    .bind(donation.transaction_id.as_str())
    .bind(*donation.donor_id.as_uuid())
    .bind(donation.project_id.map(|id| *id.as_uuid()))
    .bind(donation.program_id.map(|id| *id.as_uuid()))
    .bind(donation.amount_minor)
    .bind(donation.currency.code())
    .bind(donation.local_amount_minor)
    .bind(donation.exchange_rate)
    .bind(&donation_type)
    .bind(&payment_method)
    .bind(donation.payment_status.as_str())
    .bind(&payment_details)
    .bind(donation.receipt_sent)
    .bind(donation.receipt_sent_at)
    .bind(&donation.receipt_number)
    .bind(donation.is_anonymous)
    .bind(&metadata)
    .bind(&donation.donor_message)
    .bind(donation.is_test)
    .bind(donation.created_at)
    .bind(donation.updated_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Mirror the mutable state of a donation record (status, gateway
/// response, receipt fields).
pub async fn update(pool: &PgPool, donation: &Donation) -> Result<bool, sqlx::Error> {
    let payment_details = serde_json::to_value(&donation.payment_details)
        .map_err(|e| sqlx::Error::Protocol(format!("failed to serialize payment_details: {e}")))?;
    let metadata = serde_json::to_value(&donation.metadata)
        .map_err(|e| sqlx::Error::Protocol(format!("failed to serialize donation metadata: {e}")))?;

    let result = sqlx::query(
        "UPDATE donations SET payment_status = $1, payment_details = $2, metadata = $3,
                              receipt_sent = $4, receipt_sent_at = $5, receipt_number = $6,
                              updated_at = $7
         WHERE id = $8",
    )
    .bind(donation.payment_status.as_str())
    .bind(&payment_details)
    .bind(&metadata)
    .bind(donation.receipt_sent)
    .bind(donation.receipt_sent_at)
    .bind(&donation.receipt_number)
    .bind(donation.updated_at)
    .bind(*donation.id.as_uuid())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Load all donations from the database into the ledger on startup.
///
/// Rows that fail to parse are skipped with a warning; see the note on
/// [`crate::db::subscriptions::load_all`].
pub async fn load_all(pool: &PgPool) -> Result<Vec<Donation>, sqlx::Error> {
    let rows = sqlx::query_as::<_, DonationRow>(
        "SELECT id, transaction_id, donor_id, project_id, program_id, amount_minor, currency,
                local_amount_minor, exchange_rate, donation_type, payment_method, payment_status,
                payment_details, receipt_sent, receipt_sent_at, receipt_number, is_anonymous,
                metadata, donor_message, is_test, created_at, updated_at
         FROM donations ORDER BY created_at",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().filter_map(DonationRow::into_donation).collect())
}

/// Internal row type for SQLx mapping.
#[derive(sqlx::FromRow)]
struct DonationRow {
    id: Uuid,
    transaction_id: String,
    donor_id: Uuid,
    project_id: Option<Uuid>,
    program_id: Option<Uuid>,
    amount_minor: i64,
    currency: String,
    local_amount_minor: i64,
    exchange_rate: f64,
    donation_type: String,
    payment_method: String,
    payment_status: String,
    payment_details: serde_json::Value,
    receipt_sent: bool,
    receipt_sent_at: Option<DateTime<Utc>>,
    receipt_number: Option<String>,
    is_anonymous: bool,
    metadata: serde_json::Value,
    donor_message: Option<String>,
    is_test: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl DonationRow {
    fn into_donation(self) -> Option<Donation> {
        let Ok(transaction_id) = TransactionId::parse(self.transaction_id.clone()) else {
            tracing::warn!(id = %self.id, transaction_id = %self.transaction_id,
                "malformed transaction id in donation row, skipping");
            return None;
        };
        let Ok(currency) = Currency::from_str(&self.currency) else {
            tracing::warn!(id = %self.id, currency = %self.currency,
                "unknown currency in donation row, skipping");
            return None;
        };
        let Some(donation_type) = text_to_enum::<DonationType>(&self.donation_type) else {
            tracing::warn!(id = %self.id, donation_type = %self.donation_type,
                "unknown donation type in donation row, skipping");
            return None;
        };
        let Some(payment_method) = text_to_enum::<PaymentMethod>(&self.payment_method) else {
            tracing::warn!(id = %self.id, payment_method = %self.payment_method,
                "unknown payment method in donation row, skipping");
            return None;
        };
        let Some(payment_status) = text_to_enum::<PaymentStatus>(&self.payment_status) else {
            tracing::warn!(id = %self.id, payment_status = %self.payment_status,
                "unknown payment status in donation row, skipping");
            return None;
        };
        let payment_details: PaymentDetails = serde_json::from_value(self.payment_details)
            .unwrap_or_else(|e| {
                tracing::warn!(id = %self.id, error = %e,
                    "unreadable payment_details in donation row, defaulting to empty");
                PaymentDetails::default()
            });
        let metadata: DonationMetadata =
            serde_json::from_value(self.metadata).unwrap_or_else(|e| {
                tracing::warn!(id = %self.id, error = %e,
                    "unreadable metadata in donation row, defaulting to empty");
                DonationMetadata::default()
            });
        Some(Donation {
            id: DonationId::from_uuid(self.id),
            transaction_id,
            donor_id: DonorId::from_uuid(self.donor_id),
            project_id: self.project_id.map(ProjectId::from_uuid),
            program_id: self.program_id.map(ProgramId::from_uuid),
            amount_minor: self.amount_minor,
            currency,
            local_amount_minor: self.local_amount_minor,
            exchange_rate: self.exchange_rate,
            donation_type,
            payment_method,
            payment_status,
            payment_details,
            receipt_sent: self.receipt_sent,
            receipt_sent_at: self.receipt_sent_at,
            receipt_number: self.receipt_number,
            is_anonymous: self.is_anonymous,
            metadata,
            donor_message: self.donor_message,
            is_test: self.is_test,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}
