//! Construction-time validation errors for domain primitives.

use thiserror::Error;

/// Errors raised when a domain primitive fails validation at construction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Transaction identifier is malformed.
    #[error("invalid transaction id: {0}")]
    InvalidTransactionId(String),

    /// A required free-text field was empty (e.g. a cancellation reason).
    #[error("{field} must not be empty")]
    EmptyField {
        /// Name of the offending field.
        field: &'static str,
    },

    /// A monetary amount was outside its permitted range.
    #[error("invalid amount: {reason}")]
    InvalidAmount {
        /// Description of the violation.
        reason: String,
    },
}
