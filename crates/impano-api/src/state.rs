//! Application configuration and shared state.

use std::sync::Arc;

use sqlx::PgPool;
use tokio::sync::mpsc;

use impano_core::RateTable;
use impano_gateway::{MockCardGateway, MockMobileMoneyGateway, PaymentGateway};

use crate::auth::SecretString;
use crate::orchestration::ChargeOrchestrator;
use crate::receipts::{ChargeEvent, LoggingNotificationSink, NotificationSink, ReceiptDispatcher};
use crate::store::LedgerStore;

/// Queue depth for charge events between the orchestrator and the
/// receipt dispatcher. Overflow drops the notification, never the charge.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Service configuration, read from the environment once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Listen port (`IMPANO_PORT`).
    pub port: u16,
    /// Bearer token for the mutating API surface (`IMPANO_AUTH_TOKEN`).
    /// Unset disables authentication (development only).
    pub auth_token: Option<SecretString>,
    /// Maximum charge units in flight during a batch run
    /// (`IMPANO_CHARGE_CONCURRENCY`).
    pub charge_concurrency: usize,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let port = std::env::var("IMPANO_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(8080);
        let auth_token = std::env::var("IMPANO_AUTH_TOKEN")
            .ok()
            .filter(|t| !t.is_empty())
            .map(|t| SecretString::new(&t));
        let charge_concurrency = std::env::var("IMPANO_CHARGE_CONCURRENCY")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(4);
        Self {
            port,
            auth_token,
            charge_concurrency,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            auth_token: None,
            charge_concurrency: 4,
        }
    }
}

/// Shared application state, cheap to clone into every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<LedgerStore>,
    pub rates: Arc<RateTable>,
    pub orchestrator: Arc<ChargeOrchestrator>,
}

impl AppState {
    /// Wire the full state graph and spawn the receipt dispatcher.
    pub fn with_parts(
        config: AppConfig,
        pool: Option<PgPool>,
        card: Arc<dyn PaymentGateway>,
        mobile_money: Arc<dyn PaymentGateway>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        let store = Arc::new(LedgerStore::new(pool));
        let rates = Arc::new(RateTable::default());
        let (events, receiver) = mpsc::channel::<ChargeEvent>(EVENT_CHANNEL_CAPACITY);
        let orchestrator = Arc::new(ChargeOrchestrator::new(
            Arc::clone(&store),
            Arc::clone(&rates),
            card,
            mobile_money,
            events,
            config.charge_concurrency,
        ));
        tokio::spawn(ReceiptDispatcher::new(Arc::clone(&store), sink).run(receiver));
        Self {
            config: Arc::new(config),
            store,
            rates,
            orchestrator,
        }
    }

    /// Default state: mock gateways, logging notification sink, no
    /// database. What tests and local development use.
    pub fn new() -> Self {
        Self::with_config(AppConfig::default(), None)
    }

    /// State with explicit config, mock gateways, and an optional pool.
    pub fn with_config(config: AppConfig, pool: Option<PgPool>) -> Self {
        Self::with_parts(
            config,
            pool,
            Arc::new(MockCardGateway::new()),
            Arc::new(MockMobileMoneyGateway::new()),
            Arc::new(LoggingNotificationSink),
        )
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
