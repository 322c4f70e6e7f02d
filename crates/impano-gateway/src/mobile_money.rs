//! # Mobile-Money Gateway Adapter
//!
//! HTTP client for the mobile-money operator API: agent authorization,
//! cash-in transaction creation, transaction status retrieval, and
//! cash-out (the refund interface; no refund orchestration calls it in
//! this core).
//!
//! ## Token lifecycle
//!
//! Every call needs a bearer token from the agent-authorization endpoint.
//! The token is cached process-wide with a 55-minute expiry (the provider
//! invalidates at 60) and refreshed transparently when absent or expired.
//! The cache sits behind a `tokio::sync::Mutex`, so refresh is
//! single-flight: one task performs the authorization round-trip while
//! concurrent charge units wait on the lock and then reuse the fresh
//! token.
//!
//! ## Phone normalization
//!
//! Wallet numbers are normalized to the canonical local format
//! ([`crate::phone::normalize_msisdn`]) immediately before submission;
//! un-normalizable numbers are a [`GatewayError::Rejected`], not a
//! transport error.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::adapter::{ChargeOutcome, ChargeRequest, PaymentGateway, ProviderStatus, VerificationOutcome};
use crate::error::GatewayError;
use crate::phone::normalize_msisdn;

/// Cached token validity. The provider expires tokens at 60 minutes;
/// refreshing at 55 keeps a margin for in-flight requests.
const TOKEN_TTL_SECS: i64 = 55 * 60;

/// Configuration for the mobile-money HTTP adapter.
#[derive(Debug, Clone)]
pub struct MobileMoneyConfig {
    /// Base URL of the operator API.
    pub base_url: String,
    /// Agent client id.
    pub client_id: String,
    /// Agent client secret.
    pub client_secret: String,
    /// Request timeout in seconds (default: 30).
    pub timeout_secs: u64,
}

impl MobileMoneyConfig {
    /// Create a new configuration with the default 30s timeout.
    pub fn new(
        base_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    expires_at: DateTime<Utc>,
}

/// HTTP client for the mobile-money gateway.
#[derive(Debug)]
pub struct HttpMobileMoneyGateway {
    client: reqwest::Client,
    base_url: String,
    client_id: String,
    client_secret: String,
    token: Mutex<Option<CachedToken>>,
    timeout_ms: u64,
}

impl HttpMobileMoneyGateway {
    /// Build the adapter from configuration.
    ///
    /// # Errors
    ///
    /// [`GatewayError::NotConfigured`] when the HTTP client cannot be
    /// constructed or credentials are blank.
    pub fn new(config: MobileMoneyConfig) -> Result<Self, GatewayError> {
        if config.client_id.is_empty() || config.client_secret.is_empty() {
            return Err(GatewayError::NotConfigured {
                reason: "agent client id and secret are required".into(),
            });
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| GatewayError::NotConfigured {
                reason: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client_id: config.client_id,
            client_secret: config.client_secret,
            token: Mutex::new(None),
            timeout_ms: config.timeout_secs * 1_000,
        })
    }

    fn map_transaction_status(status: &str) -> ProviderStatus {
        match status {
            "successful" => ProviderStatus::Completed,
            "failed" => ProviderStatus::Failed,
            "pending" => ProviderStatus::Pending,
            other => {
                tracing::warn!(status = other, "unknown mobile-money status, treating as pending");
                ProviderStatus::Pending
            }
        }
    }

    fn classify_transport(&self, e: reqwest::Error, operation: &str) -> GatewayError {
        if e.is_timeout() {
            GatewayError::Timeout {
                elapsed_ms: self.timeout_ms,
            }
        } else {
            GatewayError::Unavailable {
                reason: format!("{operation}: {e}"),
            }
        }
    }

    /// Obtain a valid bearer token, refreshing through the
    /// agent-authorization endpoint when the cache is empty or expired.
    async fn bearer_token(&self) -> Result<String, GatewayError> {
        let mut guard = self.token.lock().await;
        if let Some(cached) = guard.as_ref() {
            if cached.expires_at > Utc::now() {
                return Ok(cached.token.clone());
            }
        }

        // Refresh while holding the lock: concurrent charge units wait here
        // instead of stampeding the authorization endpoint.
        let url = format!("{}/agent/authorize", self.base_url);
        let body = serde_json::json!({
            "client_id": self.client_id,
            "client_secret": self.client_secret,
        });
        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.classify_transport(e, "authenticate"))?;

        if resp.status().is_server_error() {
            let status = resp.status();
            return Err(GatewayError::Unavailable {
                reason: format!("authenticate: HTTP {status}"),
            });
        }
        if resp.status().is_client_error() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(GatewayError::Rejected {
                reason: format!("authenticate: HTTP {status} — {body}"),
            });
        }

        let body: serde_json::Value =
            resp.json().await.map_err(|e| GatewayError::Unavailable {
                reason: format!("authenticate: response deserialization failed: {e}"),
            })?;
        let token = body
            .get("token")
            .and_then(|v| v.as_str())
            .ok_or_else(|| GatewayError::Unavailable {
                reason: "authenticate: response missing token".into(),
            })?
            .to_string();

        tracing::debug!("mobile-money agent token refreshed");
        *guard = Some(CachedToken {
            token: token.clone(),
            expires_at: Utc::now() + chrono::Duration::seconds(TOKEN_TTL_SECS),
        });
        Ok(token)
    }

    /// Drop the cached token so the next call re-authenticates.
    async fn invalidate_token(&self) {
        *self.token.lock().await = None;
    }

    /// Send an authenticated request; on a 401 the cached token is dropped
    /// and the request retried once with a fresh token.
    async fn send_authenticated(
        &self,
        build: impl Fn(&str) -> reqwest::RequestBuilder,
        operation: &str,
    ) -> Result<reqwest::Response, GatewayError> {
        let mut token = self.bearer_token().await?;
        for attempt in 0..2 {
            let resp = build(&token)
                .send()
                .await
                .map_err(|e| self.classify_transport(e, operation))?;

            if resp.status() == reqwest::StatusCode::UNAUTHORIZED && attempt == 0 {
                tracing::debug!(operation, "mobile-money token rejected, re-authenticating");
                self.invalidate_token().await;
                token = self.bearer_token().await?;
                continue;
            }
            if resp.status().is_server_error() {
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                return Err(GatewayError::Unavailable {
                    reason: format!("{operation}: HTTP {status} — {body}"),
                });
            }
            return Ok(resp);
        }
        unreachable!("authenticated send retries exactly once")
    }

    fn parse_transaction(
        body: serde_json::Value,
        operation: &str,
    ) -> Result<ChargeOutcome, GatewayError> {
        let external_id = body
            .get("transaction_id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| GatewayError::Unavailable {
                reason: format!("{operation}: response missing transaction_id"),
            })?
            .to_string();
        let status = body
            .get("status")
            .and_then(|v| v.as_str())
            .map(Self::map_transaction_status)
            .unwrap_or(ProviderStatus::Pending);
        Ok(ChargeOutcome {
            external_id,
            status,
            raw_response: Some(body),
        })
    }

    /// Cash-out (refund) interface. Part of the provider surface; no
    /// refund orchestration in this core calls it.
    pub async fn cash_out(
        &self,
        amount_minor: i64,
        phone_number: &str,
        reference: &str,
    ) -> Result<ChargeOutcome, GatewayError> {
        let msisdn = normalize_msisdn(phone_number)?;
        let url = format!("{}/transactions/cashout", self.base_url);
        let body = serde_json::json!({
            "amount": amount_minor,
            "msisdn": msisdn,
            "reference": reference,
        });
        let resp = self
            .send_authenticated(
                |token| self.client.post(&url).bearer_auth(token).json(&body),
                "cash_out",
            )
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
                reason: format!("cash_out: response deserialization failed: {e}"),
            })?;
        Self::parse_transaction(body, "cash_out")
    }
}

#[async_trait]
impl PaymentGateway for HttpMobileMoneyGateway {
    async fn charge(&self, request: &ChargeRequest) -> Result<ChargeOutcome, GatewayError> {
        if request.amount_minor <= 0 {
            return Err(GatewayError::Rejected {
                reason: "amount must be positive".into(),
            });
        }
        let msisdn = normalize_msisdn(&request.payment_token)?;

        let url = format!("{}/transactions/cashin", self.base_url);
        let body = serde_json::json!({
            "amount": request.amount_minor,
            "currency": request.currency.code(),
            "msisdn": msisdn,
            "reference": request.reference,
        });

        let resp = self
            .send_authenticated(
                |token| self.client.post(&url).bearer_auth(token).json(&body),
                "charge",
            )
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
        Self::parse_transaction(body, "charge")
    }

    async fn verify(&self, external_id: &str) -> Result<VerificationOutcome, GatewayError> {
        let url = format!("{}/transactions/{external_id}", self.base_url);
        let resp = self
            .send_authenticated(|token| self.client.get(&url).bearer_auth(token), "verify")
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
                reason: format!("verify: response deserialization failed: {e}"),
            })?;
        let outcome = Self::parse_transaction(body, "verify")?;
        Ok(VerificationOutcome {
            external_id: outcome.external_id,
            status: outcome.status,
        })
    }

    fn gateway_name(&self) -> &str {
        "HttpMobileMoneyGateway"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use impano_core::Currency;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request(phone: &str) -> ChargeRequest {
        ChargeRequest {
            amount_minor: 1_000_000, // RWF 10,000.00
            currency: Currency::Rwf,
            payment_token: phone.into(),
            reference: "TXN-1700000000000-0123456789ab".into(),
        }
    }

    fn gateway(server: &MockServer) -> HttpMobileMoneyGateway {
        HttpMobileMoneyGateway::new(MobileMoneyConfig::new(
            server.uri(),
            "agent_id",
            "agent_secret",
        ))
        .expect("valid config")
    }

    fn mount_auth(server: &MockServer) -> impl std::future::Future<Output = ()> + '_ {
        Mock::given(method("POST"))
            .and(path("/agent/authorize"))
            .and(body_partial_json(serde_json::json!({
                "client_id": "agent_id",
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "token": "bearer_token_1",
            })))
            .mount(server)
    }

    #[tokio::test]
    async fn charge_normalizes_phone_and_maps_status() {
        let server = MockServer::start().await;
        mount_auth(&server).await;
        Mock::given(method("POST"))
            .and(path("/transactions/cashin"))
            .and(header("authorization", "Bearer bearer_token_1"))
            .and(body_partial_json(serde_json::json!({
                "msisdn": "0788123456",
                "amount": 1_000_000,
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "transaction_id": "mm_tx_1",
                "status": "successful",
            })))
            .mount(&server)
            .await;

        let outcome = gateway(&server)
            .charge(&request("+250788123456"))
            .await
            .expect("charge");
        assert_eq!(outcome.external_id, "mm_tx_1");
        assert_eq!(outcome.status, ProviderStatus::Completed);
    }

    #[tokio::test]
    async fn token_is_cached_across_calls() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/agent/authorize"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "token": "bearer_token_1",
            })))
            .expect(1) // exactly one authorization round-trip
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/transactions/cashin"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "transaction_id": "mm_tx",
                "status": "pending",
            })))
            .mount(&server)
            .await;

        let gw = gateway(&server);
        gw.charge(&request("0788123456")).await.expect("first");
        gw.charge(&request("0788123456")).await.expect("second");
    }

    #[tokio::test]
    async fn unauthorized_response_triggers_one_reauth() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/agent/authorize"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "token": "bearer_token_1",
            })))
            .expect(2)
            .mount(&server)
            .await;
        // First cash-in attempt is rejected as unauthorized, second accepted.
        Mock::given(method("POST"))
            .and(path("/transactions/cashin"))
            .respond_with(ResponseTemplate::new(401))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/transactions/cashin"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "transaction_id": "mm_tx_2",
                "status": "successful",
            })))
            .mount(&server)
            .await;

        let outcome = gateway(&server)
            .charge(&request("0788123456"))
            .await
            .expect("charge after reauth");
        assert_eq!(outcome.external_id, "mm_tx_2");
    }

    #[tokio::test]
    async fn provider_decline_is_rejected() {
        let server = MockServer::start().await;
        mount_auth(&server).await;
        Mock::given(method("POST"))
            .and(path("/transactions/cashin"))
            .respond_with(ResponseTemplate::new(400).set_body_string("wallet not found"))
            .mount(&server)
            .await;

        let err = gateway(&server)
            .charge(&request("0788123456"))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Rejected { .. }));
    }

    #[tokio::test]
    async fn provider_outage_is_unavailable() {
        let server = MockServer::start().await;
        mount_auth(&server).await;
        Mock::given(method("POST"))
            .and(path("/transactions/cashin"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let err = gateway(&server)
            .charge(&request("0788123456"))
            .await
            .unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn invalid_phone_is_rejected_before_any_submission() {
        let server = MockServer::start().await;
        mount_auth(&server).await;

        let err = gateway(&server)
            .charge(&request("12345"))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Rejected { .. }));
    }

    #[tokio::test]
    async fn verify_maps_status_one_to_one() {
        let server = MockServer::start().await;
        mount_auth(&server).await;
        Mock::given(method("GET"))
            .and(path("/transactions/mm_tx_1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "transaction_id": "mm_tx_1",
                "status": "failed",
            })))
            .mount(&server)
            .await;

        let v = gateway(&server).verify("mm_tx_1").await.expect("verify");
        assert_eq!(v.status, ProviderStatus::Failed);
    }
}
