//! # impano-api — Axum API Service for the Impano Donation Platform
//!
//! The charge engine behind recurring giving: donor registry, subscription
//! lifecycle, the due-charge orchestrator over the card-network and
//! mobile-money gateways, and the receipt/notification dispatcher.
//!
//! ## API Surface
//!
//! | Method & path                          | Module                    |
//! |----------------------------------------|---------------------------|
//! | `POST /v1/donors`                      | [`routes::donors`]        |
//! | `GET /v1/donors/:id`                   | [`routes::donors`]        |
//! | `POST /v1/subscriptions`               | [`routes::subscriptions`] |
//! | `GET /v1/subscriptions`                | [`routes::subscriptions`] |
//! | `GET /v1/subscriptions/:id`            | [`routes::subscriptions`] |
//! | `PATCH /v1/subscriptions/:id`          | [`routes::subscriptions`] |
//! | `POST /v1/subscriptions/:id/cancel`    | [`routes::subscriptions`] |
//! | `POST /v1/subscriptions/:id/pause`     | [`routes::subscriptions`] |
//! | `POST /v1/subscriptions/:id/resume`    | [`routes::subscriptions`] |
//! | `POST /v1/donations/process-recurring` | [`routes::donations`]     |
//! | `GET /v1/donations`                    | [`routes::donations`]     |
//! | `GET /v1/donations/:id`                | [`routes::donations`]     |
//!
//! ## Middleware Stack (execution order)
//!
//! ```text
//! TraceLayer → MetricsMiddleware → AuthMiddleware → Handler
//! ```
//!
//! ## OpenAPI
//!
//! Auto-generated spec via utoipa derive macros at `/openapi.json`.

pub mod auth;
pub mod db;
pub mod donor;
pub mod error;
pub mod extractors;
pub mod middleware;
pub mod openapi;
pub mod orchestration;
pub mod receipts;
pub mod routes;
pub mod state;
pub mod store;

use axum::extract::{DefaultBodyLimit, State};
use axum::http::StatusCode;
use axum::middleware::from_fn;
use axum::response::IntoResponse;
use axum::{Extension, Router};
use tower_http::trace::TraceLayer;

use crate::auth::AuthConfig;
use crate::middleware::metrics::ApiMetrics;
use crate::state::AppState;

/// Check if metrics are enabled via the `IMPANO_METRICS_ENABLED` env var.
/// Defaults to `true` when the variable is absent or set to anything other
/// than `"false"`.
fn metrics_enabled() -> bool {
    std::env::var("IMPANO_METRICS_ENABLED")
        .map(|v| v.to_lowercase() != "false")
        .unwrap_or(true)
}

/// Assemble the full application router with all routes and middleware.
///
/// Health probes (`/health/*`) and `/metrics` are mounted outside the auth
/// middleware so they remain accessible without credentials.
pub fn app(state: AppState) -> Router {
    let auth_config = AuthConfig {
        token: state.config.auth_token.clone(),
    };
    let metrics = ApiMetrics::new();
    let metrics_on = metrics_enabled();

    // Authenticated API routes. Body size limit: 2 MiB — no endpoint here
    // accepts large payloads.
    let api = Router::new()
        .merge(routes::donors::router())
        .merge(routes::subscriptions::router())
        .merge(routes::donations::router())
        .merge(openapi::router());

    let mut api = api
        .layer(DefaultBodyLimit::max(2 * 1024 * 1024))
        .layer(from_fn(auth::auth_middleware));

    // Only register the metrics middleware when metrics are enabled.
    if metrics_on {
        api = api
            .layer(from_fn(middleware::metrics::metrics_middleware))
            .layer(axum::Extension(metrics.clone()));
    }

    let api = api
        .layer(TraceLayer::new_for_http())
        .layer(axum::Extension(auth_config))
        .with_state(state.clone());

    // Unauthenticated health probes — readiness checks actual service health.
    let mut unauthenticated = Router::new()
        .route("/health/liveness", axum::routing::get(liveness))
        .route("/health/readiness", axum::routing::get(readiness));

    // Mount /metrics when enabled (unauthenticated, like health probes).
    if metrics_on {
        unauthenticated = unauthenticated
            .route("/metrics", axum::routing::get(prometheus_metrics))
            .layer(axum::Extension(metrics));
    }

    let unauthenticated = unauthenticated.with_state(state);

    Router::new().merge(unauthenticated).merge(api)
}

/// GET /metrics — Prometheus metrics scrape endpoint.
///
/// Updates domain gauges from the current ledger on each scrape (pull
/// model), then gathers and encodes all metrics in Prometheus text
/// exposition format.
async fn prometheus_metrics(
    State(state): State<AppState>,
    Extension(metrics): Extension<ApiMetrics>,
) -> impl IntoResponse {
    metrics.donors_total().set(state.store.donor_count() as f64);

    metrics.subscriptions_total().reset();
    for (status, count) in state.store.subscription_status_counts() {
        metrics
            .subscriptions_total()
            .with_label_values(&[status])
            .set(count as f64);
    }

    metrics.donations_total().reset();
    for (status, count) in state.store.donation_status_counts() {
        metrics
            .donations_total()
            .with_label_values(&[status])
            .set(count as f64);
    }

    match metrics.gather_and_encode() {
        Ok(body) => (
            StatusCode::OK,
            [(
                axum::http::header::CONTENT_TYPE,
                "text/plain; version=0.0.4; charset=utf-8",
            )],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("failed to encode Prometheus metrics: {e}");
            (StatusCode::INTERNAL_SERVER_ERROR, e).into_response()
        }
    }
}

/// Liveness probe — always returns 200 if the process is running.
async fn liveness() -> &'static str {
    "ok"
}

/// Readiness probe — verifies the application is ready to serve traffic.
///
/// Checks that the ledger is accessible and, when a database is
/// configured, that it answers a trivial query. Returns 200 "ready" or
/// 503 with a diagnostic message.
async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
    // Touch the ledger maps.
    let _ = state.store.donor_count();
    let _ = state.store.subscription_status_counts();

    if let Some(pool) = state.store.pool() {
        if let Err(e) = sqlx::query("SELECT 1").execute(pool).await {
            tracing::warn!("database health check failed: {e}");
            return (StatusCode::SERVICE_UNAVAILABLE, "database unreachable").into_response();
        }
    }

    (StatusCode::OK, "ready").into_response()
}
