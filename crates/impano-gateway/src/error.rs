//! Gateway error taxonomy.
//!
//! The split between [`GatewayError::Unavailable`] and
//! [`GatewayError::Rejected`] is load-bearing: unavailable outcomes leave
//! the donation pending for later reconciliation, rejected outcomes mark
//! it failed and trigger the failure-notification path.

use thiserror::Error;

/// Errors from payment gateway operations.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    /// The provider is unreachable or returned a 5xx status.
    /// Transient — the attempt may be reconciled or retried later.
    #[error("gateway unavailable: {reason}")]
    Unavailable {
        /// Human-readable description of the outage.
        reason: String,
    },

    /// The provider explicitly declined the request (4xx): bad token,
    /// insufficient funds, invalid phone number. Terminal for the attempt.
    #[error("gateway rejected the request: {reason}")]
    Rejected {
        /// The provider's stated reason.
        reason: String,
    },

    /// The request timed out. Treated as unavailable by the orchestrator.
    #[error("gateway request timed out after {elapsed_ms}ms")]
    Timeout {
        /// Elapsed time before the timeout triggered.
        elapsed_ms: u64,
    },

    /// The adapter is missing configuration (base URL, credentials).
    #[error("gateway not configured: {reason}")]
    NotConfigured {
        /// Why configuration is missing or incomplete.
        reason: String,
    },
}

impl GatewayError {
    /// Whether the failure may resolve on its own (outage/timeout) as
    /// opposed to an explicit provider decline.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable { .. } | Self::Timeout { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(GatewayError::Unavailable {
            reason: "connection refused".into()
        }
        .is_transient());
        assert!(GatewayError::Timeout { elapsed_ms: 30_000 }.is_transient());
        assert!(!GatewayError::Rejected {
            reason: "insufficient funds".into()
        }
        .is_transient());
        assert!(!GatewayError::NotConfigured {
            reason: "missing secret key".into()
        }
        .is_transient());
    }
}
