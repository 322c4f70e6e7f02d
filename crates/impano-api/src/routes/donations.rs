//! # Donation API
//!
//! Donation records (read-only — they are created by the charge
//! pipeline, never by hand) and the recurring batch trigger.

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use impano_core::DonationId;
use impano_recurring::Donation;

use crate::error::AppError;
use crate::routes::PaginationParams;
use crate::state::AppState;

/// Query parameters for the batch trigger.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct ProcessRecurringParams {
    /// The date to evaluate due schedules against. Defaults to today
    /// (UTC). Accepting a date makes catch-up runs and tests explicit.
    pub as_of: Option<NaiveDate>,
}

/// Build the donations router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/donations", get(list_donations))
        .route("/v1/donations/:id", get(get_donation))
        .route("/v1/donations/process-recurring", post(process_recurring))
}

/// POST /v1/donations/process-recurring — Run one recurring charge batch.
///
/// Idempotent per due date: a subscription claimed by this run is skipped
/// by any overlapping run. The batch executes inline and the summary is
/// returned with 202 (charges settle against external providers; receipt
/// dispatch continues after the response).
#[utoipa::path(
    post,
    path = "/v1/donations/process-recurring",
    params(
        ("as_of" = Option<NaiveDate>, Query, description = "Due-date cutoff (default: today, UTC)"),
    ),
    responses(
        (status = 202, description = "Batch executed, summary returned"),
    ),
    tag = "donations"
)]
async fn process_recurring(
    State(state): State<AppState>,
    Query(params): Query<ProcessRecurringParams>,
) -> (
    axum::http::StatusCode,
    Json<crate::orchestration::BatchSummary>,
) {
    let as_of = params.as_of.unwrap_or_else(|| Utc::now().date_naive());
    let summary = state.orchestrator.process_due_charges(as_of).await;
    (axum::http::StatusCode::ACCEPTED, Json(summary))
}

/// GET /v1/donations — List donations with pagination.
#[utoipa::path(
    get,
    path = "/v1/donations",
    params(
        ("limit" = Option<usize>, Query, description = "Max items to return (default 100, max 1000)"),
        ("offset" = Option<usize>, Query, description = "Items to skip (default 0)"),
    ),
    responses(
        (status = 200, description = "List of donations, newest first"),
    ),
    tag = "donations"
)]
async fn list_donations(
    State(state): State<AppState>,
    Query(pagination): Query<PaginationParams>,
) -> Json<Vec<Donation>> {
    let all = state.store.list_donations();
    let offset = pagination.effective_offset().min(all.len());
    let limit = pagination.effective_limit();
    let page = all.into_iter().skip(offset).take(limit).collect();
    Json(page)
}

/// GET /v1/donations/:id — Get a donation.
#[utoipa::path(
    get,
    path = "/v1/donations/{id}",
    params(("id" = Uuid, Path, description = "Donation ID")),
    responses(
        (status = 200, description = "Donation found"),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "donations"
)]
async fn get_donation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Donation>, AppError> {
    Ok(Json(state.store.donation(DonationId::from_uuid(id))?))
}
