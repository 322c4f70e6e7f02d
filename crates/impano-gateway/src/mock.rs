//! Mock gateway adapters for testing and development.
//!
//! Outcomes are deterministic, keyed by conventions on the payment token:
//!
//! **Card** (payment-method id suffix):
//! - `_failed` → charge completes with provider status `failed`
//!   (the `requires_payment_method` path)
//! - `_processing` → provider status `pending`
//! - `_declined` → [`GatewayError::Rejected`]
//! - `_unavailable` → [`GatewayError::Unavailable`]
//! - anything else → `completed`
//!
//! **Mobile money** (normalized wallet number suffix):
//! - ending `0000` → provider status `failed`
//! - ending `9999` → [`GatewayError::Rejected`] (insufficient funds)
//! - ending `8888` → [`GatewayError::Unavailable`]
//! - anything else → `successful`

use async_trait::async_trait;

use crate::adapter::{ChargeOutcome, ChargeRequest, PaymentGateway, ProviderStatus, VerificationOutcome};
use crate::error::GatewayError;
use crate::phone::normalize_msisdn;

/// Mock card-network gateway.
#[derive(Debug, Clone, Default)]
pub struct MockCardGateway;

impl MockCardGateway {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PaymentGateway for MockCardGateway {
    async fn charge(&self, request: &ChargeRequest) -> Result<ChargeOutcome, GatewayError> {
        if request.amount_minor <= 0 {
            return Err(GatewayError::Rejected {
                reason: "amount must be positive".into(),
            });
        }
        let token = request.payment_token.as_str();
        if token.ends_with("_declined") {
            return Err(GatewayError::Rejected {
                reason: "card_declined (mock: token ends in _declined)".into(),
            });
        }
        if token.ends_with("_unavailable") {
            return Err(GatewayError::Unavailable {
                reason: "mock provider outage (token ends in _unavailable)".into(),
            });
        }
        let status = if token.ends_with("_failed") {
            ProviderStatus::Failed
        } else if token.ends_with("_processing") {
            ProviderStatus::Pending
        } else {
            ProviderStatus::Completed
        };
        Ok(ChargeOutcome {
            external_id: format!("pi_mock_{}", request.reference),
            status,
            raw_response: Some(serde_json::json!({
                "id": format!("pi_mock_{}", request.reference),
                "status": match status {
                    ProviderStatus::Completed => "succeeded",
                    ProviderStatus::Failed => "requires_payment_method",
                    ProviderStatus::Pending => "processing",
                },
            })),
        })
    }

    async fn verify(&self, external_id: &str) -> Result<VerificationOutcome, GatewayError> {
        Ok(VerificationOutcome {
            external_id: external_id.to_string(),
            status: ProviderStatus::Completed,
        })
    }

    fn gateway_name(&self) -> &str {
        "MockCardGateway"
    }
}

/// Mock mobile-money gateway.
#[derive(Debug, Clone, Default)]
pub struct MockMobileMoneyGateway;

impl MockMobileMoneyGateway {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PaymentGateway for MockMobileMoneyGateway {
    async fn charge(&self, request: &ChargeRequest) -> Result<ChargeOutcome, GatewayError> {
        if request.amount_minor <= 0 {
            return Err(GatewayError::Rejected {
                reason: "amount must be positive".into(),
            });
        }
        // Same normalization as the real adapter, so tests exercise it.
        let msisdn = normalize_msisdn(&request.payment_token)?;
        if msisdn.ends_with("9999") {
            return Err(GatewayError::Rejected {
                reason: "insufficient wallet balance (mock: number ends in 9999)".into(),
            });
        }
        if msisdn.ends_with("8888") {
            return Err(GatewayError::Unavailable {
                reason: "mock operator outage (number ends in 8888)".into(),
            });
        }
        let status = if msisdn.ends_with("0000") {
            ProviderStatus::Failed
        } else {
            ProviderStatus::Completed
        };
        Ok(ChargeOutcome {
            external_id: format!("mm_mock_{}", request.reference),
            status,
            raw_response: Some(serde_json::json!({
                "transaction_id": format!("mm_mock_{}", request.reference),
                "status": match status {
                    ProviderStatus::Completed => "successful",
                    ProviderStatus::Failed => "failed",
                    ProviderStatus::Pending => "pending",
                },
                "msisdn": msisdn,
            })),
        })
    }

    async fn verify(&self, external_id: &str) -> Result<VerificationOutcome, GatewayError> {
        Ok(VerificationOutcome {
            external_id: external_id.to_string(),
            status: ProviderStatus::Completed,
        })
    }

    fn gateway_name(&self) -> &str {
        "MockMobileMoneyGateway"
    }
}
