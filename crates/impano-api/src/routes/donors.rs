//! # Donor API
//!
//! Donor registration and lookup. Aggregates (`total_donated_minor`,
//! `last_donation_date`, `is_recurring_donor`) are owned by the charge
//! pipeline and never writable through this surface.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

use impano_core::{Currency, DonorId};

use crate::donor::Donor;
use crate::error::AppError;
use crate::extractors::{extract_validated_json, Validate};
use crate::state::AppState;

/// Request to register a donor.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateDonorRequest {
    pub full_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    /// ISO 3166-1 alpha-2 country code.
    pub country: String,
    /// Currency code: USD, EUR, or RWF.
    pub preferred_currency: String,
}

impl Validate for CreateDonorRequest {
    fn validate(&self) -> Result<(), String> {
        if self.full_name.trim().is_empty() {
            return Err("full_name must be non-empty".to_string());
        }
        if self.full_name.len() > 255 {
            return Err("full_name must not exceed 255 characters".to_string());
        }
        if self.country.trim().is_empty() {
            return Err("country must be non-empty".to_string());
        }
        Currency::from_str(&self.preferred_currency).map_err(|e| e.to_string())?;
        if let Some(email) = &self.email {
            if !email.contains('@') {
                return Err(format!("'{email}' is not a valid email address"));
            }
        }
        Ok(())
    }
}

/// Build the donors router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/donors", post(create_donor))
        .route("/v1/donors/:id", get(get_donor))
}

/// POST /v1/donors — Register a donor.
#[utoipa::path(
    post,
    path = "/v1/donors",
    request_body = CreateDonorRequest,
    responses(
        (status = 201, description = "Donor created", body = Donor),
        (status = 422, description = "Invalid request", body = crate::error::ErrorBody),
    ),
    tag = "donors"
)]
async fn create_donor(
    State(state): State<AppState>,
    body: Result<Json<CreateDonorRequest>, JsonRejection>,
) -> Result<(axum::http::StatusCode, Json<Donor>), AppError> {
    let req = extract_validated_json(body)?;
    // Already checked by validate(); kept as the typed parse.
    let preferred_currency = Currency::from_str(&req.preferred_currency)?;

    let donor = Donor::new(
        req.full_name,
        req.email,
        req.phone,
        req.country,
        preferred_currency,
        Utc::now(),
    );
    let donor = state.store.insert_donor(donor).await?;
    tracing::info!(donor_id = %donor.id, "donor registered");
    Ok((axum::http::StatusCode::CREATED, Json(donor)))
}

/// GET /v1/donors/:id — Get a donor.
#[utoipa::path(
    get,
    path = "/v1/donors/{id}",
    params(("id" = Uuid, Path, description = "Donor ID")),
    responses(
        (status = 200, description = "Donor found", body = Donor),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "donors"
)]
async fn get_donor(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Donor>, AppError> {
    Ok(Json(state.store.donor(DonorId::from_uuid(id))?))
}
