//! # Card-Network Gateway Adapter
//!
//! HTTP client for the card gateway's payment-intent API. Authentication
//! is a pre-shared secret key sent as a bearer token on every request.
//!
//! ## Status mapping
//!
//! The provider's intent status domain is wider than ours; it collapses to
//! [`ProviderStatus`] as `succeeded` → completed, `requires_payment_method`
//! → failed, anything else (`processing`, `requires_action`, ...) →
//! pending.
//!
//! ## Error handling
//!
//! Transport failures and 5xx responses map to
//! [`GatewayError::Unavailable`]; request timeouts to
//! [`GatewayError::Timeout`]; 4xx provider declines to
//! [`GatewayError::Rejected`] with the response body as the reason.

use std::time::Duration;

use async_trait::async_trait;

use crate::adapter::{ChargeOutcome, ChargeRequest, PaymentGateway, ProviderStatus, VerificationOutcome};
use crate::error::GatewayError;

/// Configuration for the card gateway HTTP adapter.
#[derive(Debug, Clone)]
pub struct CardGatewayConfig {
    /// Base URL of the card gateway API (e.g. `https://api.cardgw.example/v1`).
    pub base_url: String,
    /// Pre-shared secret API key.
    pub secret_key: String,
    /// Request timeout in seconds (default: 30).
    pub timeout_secs: u64,
}

impl CardGatewayConfig {
    /// Create a new configuration with the default 30s timeout.
    pub fn new(base_url: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            secret_key: secret_key.into(),
            timeout_secs: 30,
        }
    }
}

/// HTTP client for the card-network gateway.
#[derive(Debug)]
pub struct HttpCardGateway {
    client: reqwest::Client,
    base_url: String,
    timeout_ms: u64,
}

impl HttpCardGateway {
    /// Build the adapter from configuration.
    ///
    /// # Errors
    ///
    /// [`GatewayError::NotConfigured`] when the secret key contains
    /// non-header characters or the HTTP client cannot be constructed.
    pub fn new(config: CardGatewayConfig) -> Result<Self, GatewayError> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::AUTHORIZATION,
            reqwest::header::HeaderValue::from_str(&format!("Bearer {}", config.secret_key))
                .map_err(|_| GatewayError::NotConfigured {
                    reason: "secret key contains invalid header characters".into(),
                })?,
        );
        headers.insert(
            reqwest::header::CONTENT_TYPE,
            reqwest::header::HeaderValue::from_static("application/json"),
        );

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers)
            .build()
            .map_err(|e| GatewayError::NotConfigured {
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            timeout_ms: config.timeout_secs * 1_000,
        })
    }

    /// Map a provider intent status string onto the normalized domain.
    fn map_intent_status(status: &str) -> ProviderStatus {
        match status {
            "succeeded" => ProviderStatus::Completed,
            "requires_payment_method" => ProviderStatus::Failed,
            _ => ProviderStatus::Pending,
        }
    }

    /// Send a request and classify transport/5xx failures consistently.
    async fn send_request(
        &self,
        request: reqwest::RequestBuilder,
        operation: &str,
    ) -> Result<reqwest::Response, GatewayError> {
        let resp = request.send().await.map_err(|e| {
            if e.is_timeout() {
                GatewayError::Timeout {
                    elapsed_ms: self.timeout_ms,
                }
            } else {
                GatewayError::Unavailable {
                    reason: format!("{operation}: {e}"),
                }
            }
        })?;

        if resp.status().is_server_error() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(GatewayError::Unavailable {
                reason: format!("{operation}: HTTP {status} — {body}"),
            });
        }
        Ok(resp)
    }

    /// Parse a payment-intent body into a charge outcome, keeping the raw
    /// response for the donation audit trail.
    fn parse_intent(body: serde_json::Value, operation: &str) -> Result<ChargeOutcome, GatewayError> {
        let external_id = body
            .get("id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| GatewayError::Unavailable {
                reason: format!("{operation}: response missing intent id"),
            })?
            .to_string();
        let status = body
            .get("status")
            .and_then(|v| v.as_str())
            .map(Self::map_intent_status)
            .unwrap_or(ProviderStatus::Pending);
        Ok(ChargeOutcome {
            external_id,
            status,
            raw_response: Some(body),
        })
    }

}

#[async_trait]
impl PaymentGateway for HttpCardGateway {
    async fn charge(&self, request: &ChargeRequest) -> Result<ChargeOutcome, GatewayError> {
        if request.amount_minor <= 0 {
            return Err(GatewayError::Rejected {
                reason: "amount must be positive".into(),
            });
        }

        let url = format!("{}/payment_intents", self.base_url);
        let body = serde_json::json!({
            "amount": request.amount_minor,
            "currency": request.currency.code().to_lowercase(),
            "payment_method": request.payment_token,
            "confirm": true,
            "description": request.reference,
        });

        let resp = self
            .send_request(self.client.post(&url).json(&body), "charge")
            .await?;

        if resp.status().is_client_error() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(GatewayError::Rejected {
                reason: format!("HTTP {status} — {body}"),
            });
        }

        let body: serde_json::Value =
            resp.json().await.map_err(|e| GatewayError::Unavailable {
                reason: format!("charge: response deserialization failed: {e}"),
            })?;
        Self::parse_intent(body, "charge")
    }

    async fn verify(&self, external_id: &str) -> Result<VerificationOutcome, GatewayError> {
        let url = format!("{}/payment_intents/{external_id}", self.base_url);
        let resp = self.send_request(self.client.get(&url), "verify").await?;

        if resp.status().is_client_error() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(GatewayError::Rejected {
                reason: format!("HTTP {status} — {body}"),
            });
        }

        let body: serde_json::Value =
            resp.json().await.map_err(|e| GatewayError::Unavailable {
                reason: format!("verify: response deserialization failed: {e}"),
            })?;
        let outcome = Self::parse_intent(body, "verify")?;
        Ok(VerificationOutcome {
            external_id: outcome.external_id,
            status: outcome.status,
        })
    }

    /// Cancel an external gateway subscription mirror.
    ///
    /// Called best-effort when a recurring subscription with a card
    /// payment method is cancelled locally; failures are surfaced to the
    /// caller who logs and proceeds.
    async fn cancel_subscription(&self, external_ref: &str) -> Result<(), GatewayError> {
        let url = format!("{}/subscriptions/{external_ref}", self.base_url);
        let resp = self
            .send_request(self.client.delete(&url), "cancel_subscription")
            .await?;
        if resp.status().is_client_error() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(GatewayError::Rejected {
                reason: format!("HTTP {status} — {body}"),
            });
        }
        Ok(())
    }

    fn gateway_name(&self) -> &str {
        "HttpCardGateway"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use impano_core::Currency;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> ChargeRequest {
        ChargeRequest {
            amount_minor: 5_000,
            currency: Currency::Usd,
            payment_token: "pm_test_visa".into(),
            reference: "TXN-1700000000000-0123456789ab".into(),
        }
    }

    async fn gateway(server: &MockServer) -> HttpCardGateway {
        HttpCardGateway::new(CardGatewayConfig::new(server.uri(), "sk_test_secret"))
            .expect("valid config")
    }

    #[tokio::test]
    async fn succeeded_intent_maps_to_completed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/payment_intents"))
            .and(header("authorization", "Bearer sk_test_secret"))
            .and(body_partial_json(serde_json::json!({
                "amount": 5_000,
                "currency": "usd",
                "payment_method": "pm_test_visa",
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "pi_123",
                "status": "succeeded",
            })))
            .mount(&server)
            .await;

        let outcome = gateway(&server).await.charge(&request()).await.expect("charge");
        assert_eq!(outcome.external_id, "pi_123");
        assert_eq!(outcome.status, ProviderStatus::Completed);
        assert!(outcome.raw_response.is_some());
    }

    #[tokio::test]
    async fn requires_payment_method_maps_to_failed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/payment_intents"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "pi_456",
                "status": "requires_payment_method",
            })))
            .mount(&server)
            .await;

        let outcome = gateway(&server).await.charge(&request()).await.expect("charge");
        assert_eq!(outcome.status, ProviderStatus::Failed);
    }

    #[tokio::test]
    async fn processing_maps_to_pending() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/payment_intents"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "pi_789",
                "status": "processing",
            })))
            .mount(&server)
            .await;

        let outcome = gateway(&server).await.charge(&request()).await.expect("charge");
        assert_eq!(outcome.status, ProviderStatus::Pending);
    }

    #[tokio::test]
    async fn client_error_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/payment_intents"))
            .respond_with(
                ResponseTemplate::new(402).set_body_string("card_declined: insufficient funds"),
            )
            .mount(&server)
            .await;

        let err = gateway(&server).await.charge(&request()).await.unwrap_err();
        assert!(matches!(err, GatewayError::Rejected { .. }));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn server_error_is_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/payment_intents"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = gateway(&server).await.charge(&request()).await.unwrap_err();
        assert!(matches!(err, GatewayError::Unavailable { .. }));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn verify_retrieves_intent_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/payment_intents/pi_123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "pi_123",
                "status": "succeeded",
            })))
            .mount(&server)
            .await;

        let v = gateway(&server).await.verify("pi_123").await.expect("verify");
        assert_eq!(v.status, ProviderStatus::Completed);
    }

    #[tokio::test]
    async fn cancel_subscription_reports_provider_decline() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/subscriptions/sub_ext_1"))
            .respond_with(ResponseTemplate::new(404).set_body_string("no such subscription"))
            .mount(&server)
            .await;

        let err = gateway(&server)
            .await
            .cancel_subscription("sub_ext_1")
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Rejected { .. }));
    }
}
