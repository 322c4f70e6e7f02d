//! Service entrypoint: configuration, gateway wiring, ledger hydration,
//! and the axum server loop.

use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use impano_api::state::{AppConfig, AppState};
use impano_api::{app, db};
use impano_gateway::{
    CardGatewayConfig, HttpCardGateway, HttpMobileMoneyGateway, MobileMoneyConfig,
    MockCardGateway, MockMobileMoneyGateway, PaymentGateway,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn")),
        )
        .init();

    let config = AppConfig::from_env();
    let pool = db::init_pool().await?;

    let state = AppState::with_parts(
        config.clone(),
        pool,
        card_gateway()?,
        mobile_money_gateway()?,
        Arc::new(impano_api::receipts::LoggingNotificationSink),
    );
    state.store.hydrate().await.context("ledger hydration")?;

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!(%addr, persistent = state.store.persistent(), "impano-api listening");

    axum::serve(listener, app(state)).await?;
    Ok(())
}

/// Card gateway from `IMPANO_CARD_GATEWAY_URL` / `IMPANO_CARD_GATEWAY_SECRET`,
/// falling back to the mock when either is unset.
fn card_gateway() -> anyhow::Result<Arc<dyn PaymentGateway>> {
    match (
        std::env::var("IMPANO_CARD_GATEWAY_URL"),
        std::env::var("IMPANO_CARD_GATEWAY_SECRET"),
    ) {
        (Ok(url), Ok(secret)) => {
            let gateway = HttpCardGateway::new(CardGatewayConfig::new(url, secret))
                .context("card gateway configuration")?;
            Ok(Arc::new(gateway))
        }
        _ => {
            tracing::warn!("card gateway not configured, using mock adapter");
            Ok(Arc::new(MockCardGateway::new()))
        }
    }
}

/// Mobile-money gateway from `IMPANO_MOMO_GATEWAY_URL` /
/// `IMPANO_MOMO_CLIENT_ID` / `IMPANO_MOMO_CLIENT_SECRET`, falling back to
/// the mock when any is unset.
fn mobile_money_gateway() -> anyhow::Result<Arc<dyn PaymentGateway>> {
    match (
        std::env::var("IMPANO_MOMO_GATEWAY_URL"),
        std::env::var("IMPANO_MOMO_CLIENT_ID"),
        std::env::var("IMPANO_MOMO_CLIENT_SECRET"),
    ) {
        (Ok(url), Ok(client_id), Ok(client_secret)) => {
            let gateway =
                HttpMobileMoneyGateway::new(MobileMoneyConfig::new(url, client_id, client_secret))
                    .context("mobile-money gateway configuration")?;
            Ok(Arc::new(gateway))
        }
        _ => {
            tracing::warn!("mobile-money gateway not configured, using mock adapter");
            Ok(Arc::new(MockMobileMoneyGateway::new()))
        }
    }
}
