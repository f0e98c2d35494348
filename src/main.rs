//! Storefront Commerce - order lifecycle, inventory and analytics service

use std::sync::Arc;

use anyhow::Result;
use storefront_commerce::api::{self, AppState};
use storefront_commerce::domain::events::{EventSink, NatsSink, NoopSink};
use storefront_commerce::services::Deps;
use storefront_commerce::store::{MemoryStore, PgStore, Store};
use storefront_commerce::{Commerce, Config};
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry().with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into())).with(tracing_subscriber::fmt::layer()).init();
    let config = Config::from_env();

    let store: Arc<dyn Store> = match &config.database_url {
        Some(url) => {
            let pg = PgStore::connect(url, config.database_max_connections).await?;
            pg.migrate().await?;
            tracing::info!("using postgres store");
            Arc::new(pg)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory store");
            Arc::new(MemoryStore::new())
        }
    };

    let events: Arc<dyn EventSink> = match &config.nats_url {
        Some(url) => match async_nats::connect(url.as_str()).await {
            Ok(client) => Arc::new(NatsSink::new(client)),
            Err(e) => {
                tracing::warn!(error = %e, "NATS unavailable, domain events will not be published");
                Arc::new(NoopSink)
            }
        },
        None => Arc::new(NoopSink),
    };

    let deps = Deps::new(store).with_events(events).with_timeout(config.store_timeout);
    let commerce = Commerce::new(deps, config.stock_policy);

    let shutdown = CancellationToken::new();
    let reaper = tokio::spawn(commerce.reaper(config.reaper_settings()).run(shutdown.clone()));

    let app = api::router(AppState { commerce }).layer(TraceLayer::new_for_http()).layer(CorsLayer::permissive());

    tracing::info!(port = config.port, stock_policy = ?config.stock_policy, "storefront commerce listening");
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;
    let signal = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for shutdown signal");
            }
            signal.cancel();
        })
        .await?;

    shutdown.cancel();
    reaper.await?;
    tracing::info!("shutdown complete");
    Ok(())
}
