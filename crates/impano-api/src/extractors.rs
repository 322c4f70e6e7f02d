//! # Request Extraction Helpers
//!
//! JSON body extraction with uniform error mapping: deserialization
//! failures and business-rule violations both surface as 422 with a
//! structured body, instead of axum's default plain-text rejection.

use axum::extract::rejection::JsonRejection;
use axum::Json;

use crate::error::AppError;

/// Request-body validation, applied after deserialization.
pub trait Validate {
    /// Check business rules; return a human-readable reason on failure.
    fn validate(&self) -> Result<(), String>;
}

/// Unwrap a JSON extractor result and run request validation.
pub fn extract_validated_json<T: Validate>(
    body: Result<Json<T>, JsonRejection>,
) -> Result<T, AppError> {
    let Json(value) = body.map_err(|e| AppError::BadRequest(format!("invalid JSON body: {e}")))?;
    value.validate().map_err(AppError::Validation)?;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Probe {
        value: i64,
    }

    impl Validate for Probe {
        fn validate(&self) -> Result<(), String> {
            if self.value < 0 {
                return Err("value must be non-negative".to_string());
            }
            Ok(())
        }
    }

    #[test]
    fn valid_body_passes() {
        let probe = extract_validated_json(Ok(Json(Probe { value: 3 }))).expect("valid");
        assert_eq!(probe.value, 3);
    }

    #[test]
    fn failed_validation_maps_to_validation_error() {
        let err = extract_validated_json(Ok(Json(Probe { value: -1 }))).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }
}
