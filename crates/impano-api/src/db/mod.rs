//! # Database Persistence Layer
//!
//! Postgres persistence for the donation ledger via SQLx.
//!
//! ## Architecture
//!
//! The database layer is **optional**. When `DATABASE_URL` is set, the API
//! persists donors, subscriptions, and donations to PostgreSQL as a
//! write-through mirror of the in-memory ledger, and hydrates the ledger
//! from it on startup. When absent, the API operates in in-memory-only
//! mode (suitable for development and testing).
//!
//! Enum-typed fields are stored as their snake_case text forms; structured
//! payloads (payment method details, gateway responses, metadata) as
//! `jsonb`. Donation transaction ids carry a unique constraint so a
//! concurrent double-insert fails at the database even if both writers
//! raced past the in-memory index.

pub mod donations;
pub mod donors;
pub mod subscriptions;

use sqlx::postgres::{PgPool, PgPoolOptions};

/// Initialize the database connection pool and run migrations.
///
/// Returns `None` if `DATABASE_URL` is not set (in-memory-only mode).
/// Returns `Err` if the URL is set but the connection or migration fails.
pub async fn init_pool() -> Result<Option<PgPool>, sqlx::Error> {
    let url = match std::env::var("DATABASE_URL") {
        Ok(url) => url,
        Err(_) => {
            tracing::warn!(
                "DATABASE_URL not set — running in-memory only mode. \
                 State will not survive restarts."
            );
            return Ok(None);
        }
    };

    let pool = PgPoolOptions::new()
        .max_connections(20)
        .min_connections(2)
        .acquire_timeout(std::time::Duration::from_secs(5))
        .connect(&url)
        .await?;

    tracing::info!("Connected to PostgreSQL");

    // Run embedded migrations.
    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!("Database migrations applied");

    Ok(Some(pool))
}

/// Serialize an enum to its stable text form for a text column.
pub(crate) fn enum_to_text<T: serde::Serialize>(value: &T, what: &str) -> Result<String, sqlx::Error> {
    let json = serde_json::to_value(value)
        .map_err(|e| sqlx::Error::Protocol(format!("failed to serialize {what}: {e}")))?;
    json.as_str()
        .map(String::from)
        .ok_or_else(|| sqlx::Error::Protocol(format!("{what} did not serialize to a string")))
}

/// Parse a text column back into an enum. `None` on unknown values.
pub(crate) fn text_to_enum<T: serde::de::DeserializeOwned>(text: &str) -> Option<T> {
    serde_json::from_value(serde_json::Value::String(text.to_string())).ok()
}
