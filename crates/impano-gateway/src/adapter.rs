//! # Common Gateway Interface
//!
//! The [`PaymentGateway`] trait abstracts over the two provider families.
//! Production deployments wire [`crate::card::HttpCardGateway`] and
//! [`crate::mobile_money::HttpMobileMoneyGateway`]; tests wire the mocks.
//! This separation lets the charge orchestrator compose charge and
//! verification operations without coupling to a transport or provider
//! API version.
//!
//! Implementations must be `Send + Sync` and object-safe so they can be
//! shared via `Arc<dyn PaymentGateway>` across concurrent charge units.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use impano_core::Currency;

use crate::error::GatewayError;

/// Provider charge status, normalized across both gateway families.
///
/// Card statuses map `succeeded` → `Completed`,
/// `requires_payment_method` → `Failed`, everything else → `Pending`.
/// Mobile-money statuses `successful`/`pending`/`failed` map 1:1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderStatus {
    Completed,
    Pending,
    Failed,
}

impl std::fmt::Display for ProviderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Completed => f.write_str("completed"),
            Self::Pending => f.write_str("pending"),
            Self::Failed => f.write_str("failed"),
        }
    }
}

/// A charge instruction submitted to a gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChargeRequest {
    /// Amount in minor units of `currency`. Must be positive.
    pub amount_minor: i64,
    pub currency: Currency,
    /// Opaque provider payment token: a card payment-method id, or a
    /// mobile-money wallet phone number (normalized by the adapter).
    pub payment_token: String,
    /// Caller reference visible in provider dashboards — the donation's
    /// transaction id.
    pub reference: String,
}

/// Result of a charge initiation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChargeOutcome {
    /// Provider-assigned transaction reference.
    pub external_id: String,
    pub status: ProviderStatus,
    /// Raw provider response, kept verbatim for the donation audit trail.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<serde_json::Value>,
}

/// Result of a status verification for a previously initiated charge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationOutcome {
    pub external_id: String,
    pub status: ProviderStatus,
}

/// Adapter trait over a payment provider.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Initiate a charge. Returns the provider reference and normalized
    /// status; the caller owns mapping the outcome onto the donation.
    async fn charge(&self, request: &ChargeRequest) -> Result<ChargeOutcome, GatewayError>;

    /// Query the current status of a previously initiated charge.
    /// Used by the out-of-band reconciliation of pending donations.
    async fn verify(&self, external_id: &str) -> Result<VerificationOutcome, GatewayError>;

    /// Cancel an external subscription mirror, when the provider holds one.
    ///
    /// Only the card network maintains mirror subscription objects; the
    /// default is a no-op so providers without mirrors accept the call.
    async fn cancel_subscription(&self, _external_ref: &str) -> Result<(), GatewayError> {
        Ok(())
    }

    /// Human-readable adapter name (e.g. "HttpCardGateway") for logs.
    fn gateway_name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockCardGateway;
    use std::sync::Arc;

    #[test]
    fn gateway_trait_is_object_safe() {
        let gw: Arc<dyn PaymentGateway> = Arc::new(MockCardGateway::new());
        assert_eq!(gw.gateway_name(), "MockCardGateway");
    }
}
