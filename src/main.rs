//! Tilestore - storefront and back-office API for a tile shop

use anyhow::Result;
use chrono::Utc;
use sqlx::postgres::PgPoolOptions;
use std::time::Duration;
use tilestore::api::{self, AppState, EventBus};
use tilestore::config::AppConfig;
use tilestore::store::Store;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const PURGE_INTERVAL: Duration = Duration::from_secs(600);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    let config = AppConfig::from_env()?;

    let store = match &config.database_url {
        Some(url) => {
            let db = PgPoolOptions::new().max_connections(10).connect(url).await?;
            sqlx::migrate!("./migrations").run(&db).await?;
            Store::postgres(db, config.cart_ttl)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, keeping data in memory");
            Store::in_memory(config.cart_ttl)
        }
    };
    let nats = match &config.nats_url {
        Some(url) => match async_nats::connect(url.as_str()).await {
            Ok(client) => Some(client),
            Err(e) => {
                tracing::warn!(error = %e, "NATS unavailable, events will only be logged");
                None
            }
        },
        None => None,
    };
    if config.admin_token.is_none() {
        tracing::warn!("ADMIN_TOKEN not set, admin routes are open");
    }

    tokio::spawn(purge_expired_carts(store.clone()));
    let state = AppState::new(store, config.pricing)
        .with_events(EventBus::new(nats))
        .with_admin_token(config.admin_token.clone());

    let addr = config.bind_addr();
    tracing::info!("Tilestore listening on {}", addr);
    axum::serve(tokio::net::TcpListener::bind(&addr).await?, api::router(state))
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("shutting down");
        })
        .await?;
    Ok(())
}

async fn purge_expired_carts(store: Store) {
    let mut ticker = tokio::time::interval(PURGE_INTERVAL);
    loop {
        ticker.tick().await;
        match store.carts.purge_expired(Utc::now()).await {
            Ok(0) => {}
            Ok(purged) => tracing::info!(purged, "expired cart lines removed"),
            Err(e) => tracing::error!(error = %e, "cart purge failed"),
        }
    }
}
