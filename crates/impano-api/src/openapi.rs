//! # OpenAPI Specification Assembly
//!
//! Assembles all utoipa-documented routes into a single OpenAPI spec,
//! served at `/openapi.json`.

use axum::routing::get;
use axum::{Json, Router};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::state::AppState;

/// Adds the Bearer token security scheme to the OpenAPI spec.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .description(Some(
                            "Bearer token authentication. Set via IMPANO_AUTH_TOKEN env var.",
                        ))
                        .build(),
                ),
            );
        }
    }
}

/// Assembled OpenAPI spec for the entire API surface.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Impano API — Recurring Donation Charge Engine",
        version = "0.1.0",
        description = "Donation platform charge engine.\n\nProvides:\n- **Donor** registration and lookup, with lifetime giving aggregates\n- **Recurring subscription** lifecycle: create, patch, cancel, pause, resume\n- **Recurring charge batch** trigger: claims due subscriptions and charges them through the card-network or mobile-money gateway\n- **Donation records** with settlement-currency conversion, gateway audit trail, and receipt status\n\nAuthentication: Bearer token via `Authorization: Bearer <token>` header.\nAll `/v1/*` endpoints require authentication. Health probes (`/health/*`) and `/metrics` are unauthenticated.",
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development server"),
    ),
    security(
        ("bearer_auth" = [])
    ),
    paths(
        // ── Donors ───────────────────────────────────────────────────────
        crate::routes::donors::create_donor,
        crate::routes::donors::get_donor,
        // ── Subscriptions ────────────────────────────────────────────────
        crate::routes::subscriptions::create_subscription,
        crate::routes::subscriptions::list_subscriptions,
        crate::routes::subscriptions::get_subscription,
        crate::routes::subscriptions::update_subscription,
        crate::routes::subscriptions::cancel_subscription,
        crate::routes::subscriptions::pause_subscription,
        crate::routes::subscriptions::resume_subscription,
        // ── Donations ────────────────────────────────────────────────────
        crate::routes::donations::process_recurring,
        crate::routes::donations::list_donations,
        crate::routes::donations::get_donation,
    ),
    components(
        schemas(
            // ── Donor record types ───────────────────────────────────────
            crate::donor::Donor,
            crate::donor::CommunicationPreferences,
            crate::donor::ReceiptPreference,
            // ── Error types ──────────────────────────────────────────────
            crate::error::ErrorBody,
            crate::error::ErrorDetail,
            // ── Request DTOs ─────────────────────────────────────────────
            crate::routes::PaginationParams,
            crate::routes::donors::CreateDonorRequest,
            crate::routes::subscriptions::CreateSubscriptionRequest,
            crate::routes::subscriptions::UpdateSubscriptionRequest,
            crate::routes::subscriptions::CancelSubscriptionRequest,
            crate::routes::donations::ProcessRecurringParams,
        ),
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "donors", description = "Donor registration, lookup, and giving aggregates"),
        (name = "subscriptions", description = "Recurring subscription lifecycle and schedule management"),
        (name = "donations", description = "Donation records and the recurring charge batch trigger"),
    )
)]
pub struct ApiDoc;

/// Build the OpenAPI router.
pub fn router() -> Router<AppState> {
    Router::new().route("/openapi.json", get(openapi_json))
}

/// GET /openapi.json — Return the generated OpenAPI specification.
async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spec_generates_successfully() {
        let spec = ApiDoc::openapi();
        assert_eq!(
            spec.info.title,
            "Impano API — Recurring Donation Charge Engine"
        );
    }

    #[test]
    fn spec_has_all_route_paths() {
        let spec = ApiDoc::openapi();
        for path in &[
            "/v1/donors",
            "/v1/donors/{id}",
            "/v1/subscriptions",
            "/v1/subscriptions/{id}",
            "/v1/subscriptions/{id}/cancel",
            "/v1/subscriptions/{id}/pause",
            "/v1/subscriptions/{id}/resume",
            "/v1/donations",
            "/v1/donations/{id}",
            "/v1/donations/process-recurring",
        ] {
            assert!(
                spec.paths.paths.contains_key(*path),
                "should contain {path}"
            );
        }
    }

    #[test]
    fn spec_has_security_scheme() {
        let spec = ApiDoc::openapi();
        let components = spec.components.as_ref().unwrap();
        assert!(
            components.security_schemes.contains_key("bearer_auth"),
            "should contain bearer_auth security scheme"
        );
    }

    #[test]
    fn spec_has_schemas() {
        let spec = ApiDoc::openapi();
        let schemas = &spec.components.as_ref().unwrap().schemas;
        for name in &["Donor", "ErrorBody", "CreateSubscriptionRequest"] {
            assert!(schemas.contains_key(*name), "should contain {name} schema");
        }
    }

    #[test]
    fn spec_serializes_to_json() {
        let spec = ApiDoc::openapi();
        let json = serde_json::to_string(&spec).expect("spec serializes");
        assert!(json.contains("bearer_auth"));
    }
}
