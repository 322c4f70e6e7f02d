//! # impano-gateway — Payment Gateway Adapters
//!
//! Two capability-equivalent adapters behind one interface:
//!
//! - **Card network** ([`card`]): payment intents against the card
//!   gateway's REST API, authenticated with a pre-shared secret key.
//! - **Mobile money** ([`mobile_money`]): cash-in transactions against the
//!   mobile-money operator API, authenticated with a cached bearer token
//!   obtained from an agent-authorization step (≈55-minute expiry,
//!   single-flight refresh).
//!
//! Both normalize charge initiation and status verification into the
//! common shapes in [`adapter`], and both classify provider errors the
//! same way: network failures / 5xx → [`GatewayError::Unavailable`]
//! (transient, reconcile later), 4xx → [`GatewayError::Rejected`]
//! (terminal for the attempt). The orchestrator must never conflate the
//! two — see [`GatewayError::is_transient`].
//!
//! [`mock`] provides deterministic in-memory adapters keyed by
//! payment-token conventions, used by orchestrator and API tests.

pub mod adapter;
pub mod card;
pub mod error;
pub mod mobile_money;
pub mod mock;
pub mod phone;

pub use adapter::{ChargeOutcome, ChargeRequest, PaymentGateway, ProviderStatus, VerificationOutcome};
pub use card::{CardGatewayConfig, HttpCardGateway};
pub use error::GatewayError;
pub use mobile_money::{HttpMobileMoneyGateway, MobileMoneyConfig};
pub use mock::{MockCardGateway, MockMobileMoneyGateway};
pub use phone::normalize_msisdn;
