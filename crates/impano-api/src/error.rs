//! # API Error Types
//!
//! Structured error type implementing `axum::response::IntoResponse`.
//! Maps domain errors from impano-recurring, impano-core, and the ledger
//! store to HTTP status codes. Returns JSON error response bodies with
//! error code and message. Never exposes internal error details in
//! production responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use impano_recurring::{DonationError, SubscriptionError};

use crate::store::StoreError;

/// Structured JSON error response body.
///
/// All error responses use this format for consistency across the API surface.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

/// Inner error detail.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "NOT_FOUND", "VALIDATION_ERROR").
    pub code: String,
    /// Human-readable error message.
    pub message: String,
    /// Additional details, present only for client errors.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Application-level error type that implements [`IntoResponse`] for Axum.
///
/// Maps domain errors to appropriate HTTP status codes and structured
/// JSON error bodies. Internal error details are never exposed to clients.
#[derive(Error, Debug)]
pub enum AppError {
    /// Resource not found (404).
    #[error("not found: {0}")]
    NotFound(String),

    /// Request validation failed (422).
    #[error("validation error: {0}")]
    Validation(String),

    /// Request body could not be parsed or contains invalid values (422).
    ///
    /// Normalized with `Validation` to 422 Unprocessable Entity: the client
    /// sent syntactically valid HTTP but semantically invalid content. Both
    /// JSON deserialization failures and business-rule violations are 422 —
    /// only malformed HTTP framing is 400.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Authentication failure — missing or invalid token (401).
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Conflict with current resource state (409).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Internal server error (500). Message is logged but not returned to client.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Return the HTTP status code and machine-readable error code for this error.
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            Self::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR"),
            Self::BadRequest(_) => (StatusCode::UNPROCESSABLE_ENTITY, "BAD_REQUEST"),
            Self::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            Self::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        // Never expose internal error messages to clients.
        let message = match &self {
            Self::Internal(_) => "An internal error occurred".to_string(),
            other => other.to_string(),
        };

        // Log server-side errors for operator visibility.
        if let Self::Internal(_) = &self {
            tracing::error!(error = %self, "internal server error");
        }

        let body = ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message,
                details: None,
            },
        };

        (status, Json(body)).into_response()
    }
}

/// Convert core validation errors (amounts, transaction ids) to API errors.
impl From<impano_core::ValidationError> for AppError {
    fn from(err: impano_core::ValidationError) -> Self {
        Self::Validation(err.to_string())
    }
}

/// Convert currency parse/conversion errors to API errors.
impl From<impano_core::CurrencyError> for AppError {
    fn from(err: impano_core::CurrencyError) -> Self {
        Self::Validation(err.to_string())
    }
}

/// Convert subscription lifecycle errors to API errors.
///
/// State-machine violations are 409 (the request was well-formed but the
/// resource is in the wrong state); input problems are 422.
impl From<SubscriptionError> for AppError {
    fn from(err: SubscriptionError) -> Self {
        match &err {
            SubscriptionError::InvalidTransition { .. } | SubscriptionError::NotDue { .. } => {
                Self::Conflict(err.to_string())
            }
            SubscriptionError::MissingCancellationReason
            | SubscriptionError::BackwardSchedule { .. }
            | SubscriptionError::InvalidAmount(_) => Self::Validation(err.to_string()),
        }
    }
}

/// Convert donation status-machine errors to API errors.
impl From<DonationError> for AppError {
    fn from(err: DonationError) -> Self {
        Self::Conflict(err.to_string())
    }
}

/// Convert ledger store errors to API errors.
impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { .. } => Self::NotFound(err.to_string()),
            StoreError::Conflict(_) => Self::Conflict(err.to_string()),
            StoreError::Subscription(e) => e.into(),
            StoreError::Donation(e) => e.into(),
            StoreError::Database(_) => Self::Internal(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use impano_recurring::SubscriptionStatus;

    #[test]
    fn not_found_status_code() {
        let err = AppError::NotFound("missing donor".to_string());
        let (status, code) = err.status_and_code();
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(code, "NOT_FOUND");
    }

    #[test]
    fn validation_status_code() {
        let err = AppError::Validation("bad field".to_string());
        let (status, code) = err.status_and_code();
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(code, "VALIDATION_ERROR");
    }

    #[test]
    fn bad_request_status_code() {
        // BadRequest returns 422 (same as Validation): the client sent
        // syntactically valid HTTP but semantically invalid content.
        let err = AppError::BadRequest("malformed JSON".to_string());
        let (status, code) = err.status_and_code();
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(code, "BAD_REQUEST");
    }

    #[test]
    fn unauthorized_status_code() {
        let err = AppError::Unauthorized("no token".to_string());
        let (status, code) = err.status_and_code();
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(code, "UNAUTHORIZED");
    }

    #[test]
    fn conflict_status_code() {
        let err = AppError::Conflict("already cancelled".to_string());
        let (status, code) = err.status_and_code();
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(code, "CONFLICT");
    }

    #[test]
    fn internal_status_code() {
        let err = AppError::Internal("db connection failed".to_string());
        let (status, code) = err.status_and_code();
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(code, "INTERNAL_ERROR");
    }

    #[test]
    fn invalid_transition_converts_to_conflict() {
        let err = AppError::from(SubscriptionError::InvalidTransition {
            status: SubscriptionStatus::Cancelled,
            action: "pause",
        });
        let (status, _) = err.status_and_code();
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[test]
    fn backward_schedule_converts_to_validation() {
        let d = |y, m, day| NaiveDate::from_ymd_opt(y, m, day).unwrap();
        let err = AppError::from(SubscriptionError::BackwardSchedule {
            current: d(2024, 2, 1),
            requested: d(2024, 1, 1),
        });
        let (status, code) = err.status_and_code();
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(code, "VALIDATION_ERROR");
    }

    #[test]
    fn error_body_serializes() {
        let body = ErrorBody {
            error: ErrorDetail {
                code: "TEST".to_string(),
                message: "test message".to_string(),
                details: None,
            },
        };
        let json = serde_json::to_string(&body).unwrap();
        assert!(json.contains("TEST"));
        assert!(json.contains("test message"));
        assert!(!json.contains("details")); // skipped when None
    }

    // ── into_response tests ──────────────────────────────────────

    use http_body_util::BodyExt;

    /// Helper to extract status and body from a Response.
    async fn response_parts(err: AppError) -> (StatusCode, ErrorBody) {
        let response = err.into_response();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: ErrorBody = serde_json::from_slice(&bytes).unwrap();
        (status, body)
    }

    #[tokio::test]
    async fn into_response_not_found() {
        let (status, body) = response_parts(AppError::NotFound("donor 123".into())).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body.error.code, "NOT_FOUND");
        assert!(body.error.message.contains("donor 123"));
        assert!(body.error.details.is_none());
    }

    #[tokio::test]
    async fn into_response_internal_hides_details() {
        let (status, body) =
            response_parts(AppError::Internal("db connection failed".into())).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.error.code, "INTERNAL_ERROR");
        // The internal error message must NOT appear in the response body.
        assert!(
            !body.error.message.contains("db connection"),
            "internal error details must not leak: {}",
            body.error.message
        );
        assert_eq!(body.error.message, "An internal error occurred");
    }

    #[tokio::test]
    async fn into_response_validation() {
        let (status, body) = response_parts(AppError::Validation("bad amount".into())).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body.error.code, "VALIDATION_ERROR");
        assert!(body.error.message.contains("bad amount"));
    }
}
