//! # Recurring Subscription API
//!
//! Subscription lifecycle: create, inspect, patch, cancel, pause,
//! resume. Charge scheduling fields (`next_charge_date` forward-only,
//! totals) are owned by the state machine in `impano-recurring`; this
//! layer validates the input shape and maps lifecycle errors onto HTTP
//! statuses.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

use impano_core::{gateway_for, Currency, DonorId, GatewayKind, SubscriptionId};
use impano_recurring::{
    Frequency, PaymentMethodDetails, RecurringSubscription, SubscriptionPatch,
};

use crate::error::AppError;
use crate::extractors::{extract_validated_json, Validate};
use crate::routes::PaginationParams;
use crate::state::AppState;

/// Request to create a recurring subscription.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateSubscriptionRequest {
    #[schema(value_type = Uuid)]
    pub donor_id: DonorId,
    /// Charge amount in minor units (cents / centimes).
    pub amount_minor: i64,
    /// Currency code: USD, EUR, or RWF.
    pub currency: String,
    /// Charge cadence: monthly, quarterly, or yearly.
    #[schema(value_type = String)]
    pub frequency: Frequency,
    /// Provider payment token (card payment-method id or wallet alias).
    pub payment_method_id: String,
    /// Instrument details, tagged by `type`: `card` or `mobile_money`.
    #[schema(value_type = Object)]
    pub payment_method_details: PaymentMethodDetails,
    /// Anchor date for the schedule; defaults to today. The first charge
    /// falls one period after this date.
    pub start_date: Option<NaiveDate>,
}

impl Validate for CreateSubscriptionRequest {
    fn validate(&self) -> Result<(), String> {
        if self.amount_minor < 1 {
            return Err("amount_minor must be at least 1".to_string());
        }
        if self.payment_method_id.trim().is_empty() {
            return Err("payment_method_id must be non-empty".to_string());
        }
        let currency = Currency::from_str(&self.currency).map_err(|e| e.to_string())?;
        // The currency decides the gateway; the instrument must match it.
        let expected = gateway_for(currency);
        let actual = self.payment_method_details.gateway_kind();
        if expected != actual {
            return Err(format!(
                "{currency} charges settle through the {expected} gateway, \
                 but the payment method is {actual}"
            ));
        }
        if let PaymentMethodDetails::MobileMoney { phone_number, .. } =
            &self.payment_method_details
        {
            if phone_number.trim().is_empty() {
                return Err("phone_number must be non-empty".to_string());
            }
        }
        Ok(())
    }
}

/// Request to update mutable subscription fields. All fields optional;
/// an empty patch is rejected.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UpdateSubscriptionRequest {
    /// New charge cadence: monthly, quarterly, or yearly.
    #[schema(value_type = Option<String>)]
    pub frequency: Option<Frequency>,
    pub send_reminders: Option<bool>,
    /// Forward-only due-date override.
    pub next_charge_date: Option<NaiveDate>,
}

impl Validate for UpdateSubscriptionRequest {
    fn validate(&self) -> Result<(), String> {
        if self.frequency.is_none()
            && self.send_reminders.is_none()
            && self.next_charge_date.is_none()
        {
            return Err("patch must change at least one field".to_string());
        }
        Ok(())
    }
}

/// Request to cancel a subscription.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CancelSubscriptionRequest {
    /// Why the donor (or an operator) is cancelling. Required.
    pub reason: String,
}

impl Validate for CancelSubscriptionRequest {
    fn validate(&self) -> Result<(), String> {
        if self.reason.trim().is_empty() {
            return Err("cancellation reason must be non-empty".to_string());
        }
        Ok(())
    }
}

/// Build the subscriptions router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/v1/subscriptions",
            get(list_subscriptions).post(create_subscription),
        )
        .route(
            "/v1/subscriptions/:id",
            get(get_subscription).patch(update_subscription),
        )
        .route("/v1/subscriptions/:id/cancel", post(cancel_subscription))
        .route("/v1/subscriptions/:id/pause", post(pause_subscription))
        .route("/v1/subscriptions/:id/resume", post(resume_subscription))
}

/// POST /v1/subscriptions — Create a recurring subscription.
///
/// The donor must exist; creating a subscription marks them as a
/// recurring donor.
#[utoipa::path(
    post,
    path = "/v1/subscriptions",
    request_body = CreateSubscriptionRequest,
    responses(
        (status = 201, description = "Subscription created"),
        (status = 404, description = "Donor not found", body = crate::error::ErrorBody),
        (status = 422, description = "Invalid request", body = crate::error::ErrorBody),
    ),
    tag = "subscriptions"
)]
async fn create_subscription(
    State(state): State<AppState>,
    body: Result<Json<CreateSubscriptionRequest>, JsonRejection>,
) -> Result<(axum::http::StatusCode, Json<RecurringSubscription>), AppError> {
    let req = extract_validated_json(body)?;
    let currency = Currency::from_str(&req.currency)?;
    let now = Utc::now();
    let start_date = req.start_date.unwrap_or_else(|| now.date_naive());

    let sub = RecurringSubscription::new(
        req.donor_id,
        req.amount_minor,
        currency,
        req.frequency,
        req.payment_method_id,
        req.payment_method_details,
        start_date,
        now,
    )?;
    let sub = state.store.insert_subscription(sub).await?;
    tracing::info!(subscription_id = %sub.id, donor_id = %sub.donor_id,
        next_charge_date = %sub.next_charge_date, "subscription created");
    Ok((axum::http::StatusCode::CREATED, Json(sub)))
}

/// GET /v1/subscriptions — List subscriptions with pagination.
#[utoipa::path(
    get,
    path = "/v1/subscriptions",
    params(
        ("limit" = Option<usize>, Query, description = "Max items to return (default 100, max 1000)"),
        ("offset" = Option<usize>, Query, description = "Items to skip (default 0)"),
    ),
    responses(
        (status = 200, description = "List of subscriptions, newest first"),
    ),
    tag = "subscriptions"
)]
async fn list_subscriptions(
    State(state): State<AppState>,
    Query(pagination): Query<PaginationParams>,
) -> Json<Vec<RecurringSubscription>> {
    let all = state.store.list_subscriptions();
    let offset = pagination.effective_offset().min(all.len());
    let limit = pagination.effective_limit();
    let page = all.into_iter().skip(offset).take(limit).collect();
    Json(page)
}

/// GET /v1/subscriptions/:id — Get a subscription.
#[utoipa::path(
    get,
    path = "/v1/subscriptions/{id}",
    params(("id" = Uuid, Path, description = "Subscription ID")),
    responses(
        (status = 200, description = "Subscription found"),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "subscriptions"
)]
async fn get_subscription(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<RecurringSubscription>, AppError> {
    Ok(Json(
        state.store.subscription(SubscriptionId::from_uuid(id))?,
    ))
}

/// PATCH /v1/subscriptions/:id — Update mutable fields.
///
/// The due date can only move forward; a backward override is rejected
/// with 422 because it would re-arm an already consumed charge date.
#[utoipa::path(
    patch,
    path = "/v1/subscriptions/{id}",
    params(("id" = Uuid, Path, description = "Subscription ID")),
    request_body = UpdateSubscriptionRequest,
    responses(
        (status = 200, description = "Subscription updated"),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
        (status = 422, description = "Invalid patch", body = crate::error::ErrorBody),
    ),
    tag = "subscriptions"
)]
async fn update_subscription(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    body: Result<Json<UpdateSubscriptionRequest>, JsonRejection>,
) -> Result<Json<RecurringSubscription>, AppError> {
    let req = extract_validated_json(body)?;
    let patch = SubscriptionPatch {
        frequency: req.frequency,
        send_reminders: req.send_reminders,
        next_charge_date: req.next_charge_date,
        cancellation_reason: None,
    };
    let sub = state
        .store
        .update_subscription(SubscriptionId::from_uuid(id), &patch, Utc::now())
        .await?;
    Ok(Json(sub))
}

/// POST /v1/subscriptions/:id/cancel — Cancel a subscription (terminal).
///
/// When the card network holds a mirror subscription object, its
/// cancellation is best-effort: a provider failure is logged and the
/// local cancellation stands.
#[utoipa::path(
    post,
    path = "/v1/subscriptions/{id}/cancel",
    params(("id" = Uuid, Path, description = "Subscription ID")),
    request_body = CancelSubscriptionRequest,
    responses(
        (status = 200, description = "Subscription cancelled"),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
        (status = 409, description = "Already cancelled", body = crate::error::ErrorBody),
        (status = 422, description = "Missing reason", body = crate::error::ErrorBody),
    ),
    tag = "subscriptions"
)]
async fn cancel_subscription(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    body: Result<Json<CancelSubscriptionRequest>, JsonRejection>,
) -> Result<Json<RecurringSubscription>, AppError> {
    let req = extract_validated_json(body)?;
    let sub = state
        .store
        .cancel_subscription(SubscriptionId::from_uuid(id), &req.reason, Utc::now())
        .await?;

    if let Some(external_ref) = &sub.external_subscription_id {
        if gateway_for(sub.currency) == GatewayKind::Card {
            if let Err(e) = state
                .orchestrator
                .card_gateway()
                .cancel_subscription(external_ref)
                .await
            {
                tracing::warn!(subscription_id = %sub.id, external_ref, error = %e,
                    "provider-side subscription cancel failed, local cancel stands");
            }
        }
    }

    tracing::info!(subscription_id = %sub.id, reason = %req.reason, "subscription cancelled");
    Ok(Json(sub))
}

/// POST /v1/subscriptions/:id/pause — Pause an active subscription.
#[utoipa::path(
    post,
    path = "/v1/subscriptions/{id}/pause",
    params(("id" = Uuid, Path, description = "Subscription ID")),
    responses(
        (status = 200, description = "Subscription paused"),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
        (status = 409, description = "Not active", body = crate::error::ErrorBody),
    ),
    tag = "subscriptions"
)]
async fn pause_subscription(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<RecurringSubscription>, AppError> {
    let sub = state
        .store
        .pause_subscription(SubscriptionId::from_uuid(id), Utc::now())
        .await?;
    Ok(Json(sub))
}

/// POST /v1/subscriptions/:id/resume — Resume a paused subscription.
#[utoipa::path(
    post,
    path = "/v1/subscriptions/{id}/resume",
    params(("id" = Uuid, Path, description = "Subscription ID")),
    responses(
        (status = 200, description = "Subscription resumed"),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
        (status = 409, description = "Not paused", body = crate::error::ErrorBody),
    ),
    tag = "subscriptions"
)]
async fn resume_subscription(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<RecurringSubscription>, AppError> {
    let sub = state
        .store
        .resume_subscription(SubscriptionId::from_uuid(id), Utc::now())
        .await?;
    Ok(Json(sub))
}
