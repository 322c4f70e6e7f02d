//! Donor persistence operations.
//!
//! All functions take a `&PgPool` and operate on the `donors` table.
//! The aggregate increment in [`apply_charge`] is atomic in SQL
//! (`SET total_donated_minor = total_donated_minor + $1`), never
//! read-modify-write, so concurrent charges for the same donor cannot
//! lose updates.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::str::FromStr;
use uuid::Uuid;

use impano_core::{Currency, DonorId};

use crate::donor::{CommunicationPreferences, Donor, ReceiptPreference};

use super::{enum_to_text, text_to_enum};

/// Insert a new donor record.
pub async fn insert(pool: &PgPool, donor: &Donor) -> Result<(), sqlx::Error> {
    let receipt_preference = enum_to_text(&donor.receipt_preference, "receipt_preference")?;

    sqlx::query(
        "INSERT INTO donors (id, full_name, email, phone, country, preferred_currency, language,
                             comm_email, comm_sms, receipt_preference, total_donated_minor,
                             last_donation_date, is_recurring_donor, anonymity_preference,
                             receive_newsletter, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)",
    )
    .bind(*donor.id.as_uuid())
    .bind(&donor.full_name)
    .bind(&donor.email)
    .bind(&donor.phone)
    .bind(&donor.country)
    .bind(donor.preferred_currency.code())
    .bind(&donor.language)
    .bind(donor.communication_preferences.email)
    .bind(donor.communication_preferences.sms)
    .bind(&receipt_preference)
    .bind(donor.total_donated_minor)
    .bind(donor.last_donation_date)
    .bind(donor.is_recurring_donor)
    .bind(donor.anonymity_preference)
    .bind(donor.receive_newsletter)
    .bind(donor.created_at)
    .bind(donor.updated_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Update a donor record in place (profile fields and flags).
pub async fn update(pool: &PgPool, donor: &Donor) -> Result<bool, sqlx::Error> {
    let receipt_preference = enum_to_text(&donor.receipt_preference, "receipt_preference")?;

    let result = sqlx::query(
        "UPDATE donors SET full_name = $1, email = $2, phone = $3, country = $4,
                           preferred_currency = $5, language = $6, comm_email = $7, comm_sms = $8,
                           receipt_preference = $9, is_recurring_donor = $10,
                           anonymity_preference = $11, receive_newsletter = $12, updated_at = $13
         WHERE id = $14",
    )
    .bind(&donor.full_name)
    .bind(&donor.email)
    .bind(&donor.phone)
    .bind(&donor.country)
    .bind(donor.preferred_currency.code())
    .bind(&donor.language)
    .bind(donor.communication_preferences.email)
    .bind(donor.communication_preferences.sms)
    .bind(&receipt_preference)
    .bind(donor.is_recurring_donor)
    .bind(donor.anonymity_preference)
    .bind(donor.receive_newsletter)
    .bind(donor.updated_at)
    .bind(*donor.id.as_uuid())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Atomically apply a completed charge to the donor aggregates.
pub async fn apply_charge(
    pool: &PgPool,
    id: DonorId,
    amount_minor: i64,
    now: DateTime<Utc>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE donors SET total_donated_minor = total_donated_minor + $1,
                           last_donation_date = $2, updated_at = $2
         WHERE id = $3",
    )
    .bind(amount_minor)
    .bind(now)
    .bind(*id.as_uuid())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Load all donors from the database into the in-memory ledger on startup.
pub async fn load_all(pool: &PgPool) -> Result<Vec<Donor>, sqlx::Error> {
    let rows = sqlx::query_as::<_, DonorRow>(
        "SELECT id, full_name, email, phone, country, preferred_currency, language,
                comm_email, comm_sms, receipt_preference, total_donated_minor,
                last_donation_date, is_recurring_donor, anonymity_preference,
                receive_newsletter, created_at, updated_at
         FROM donors ORDER BY created_at",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(DonorRow::into_donor).collect())
}

/// Internal row type for SQLx mapping.
#[derive(sqlx::FromRow)]
struct DonorRow {
    id: Uuid,
    full_name: String,
    email: Option<String>,
    phone: Option<String>,
    country: String,
    preferred_currency: String,
    language: String,
    comm_email: bool,
    comm_sms: bool,
    receipt_preference: String,
    total_donated_minor: i64,
    last_donation_date: Option<DateTime<Utc>>,
    is_recurring_donor: bool,
    anonymity_preference: bool,
    receive_newsletter: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl DonorRow {
    fn into_donor(self) -> Donor {
        let preferred_currency =
            Currency::from_str(&self.preferred_currency).unwrap_or_else(|e| {
                tracing::warn!(
                    id = %self.id,
                    currency = %self.preferred_currency,
                    error = %e,
                    "unknown preferred currency in database, defaulting to settlement currency"
                );
                Currency::SETTLEMENT
            });
        let receipt_preference =
            text_to_enum(&self.receipt_preference).unwrap_or_else(|| {
                tracing::warn!(
                    id = %self.id,
                    receipt_preference = %self.receipt_preference,
                    "unknown receipt preference in database, defaulting to per_donation"
                );
                ReceiptPreference::PerDonation
            });

        Donor {
            id: DonorId::from_uuid(self.id),
            full_name: self.full_name,
            email: self.email,
            phone: self.phone,
            country: self.country,
            preferred_currency,
            language: self.language,
            communication_preferences: CommunicationPreferences {
                email: self.comm_email,
                sms: self.comm_sms,
            },
            receipt_preference,
            total_donated_minor: self.total_donated_minor,
            last_donation_date: self.last_donation_date,
            is_recurring_donor: self.is_recurring_donor,
            anonymity_preference: self.anonymity_preference,
            receive_newsletter: self.receive_newsletter,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}
