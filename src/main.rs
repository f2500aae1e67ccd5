use std::sync::Arc;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;
use whiteboard_sync::{
    cache::{DurableStore, RoomCache},
    config::Config,
    registry::RoomRegistry,
    relay::Relay,
    utils::clean,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cfg = Config::from_env().context("reading configuration")?;
    let store = DurableStore::connect(&cfg.database_url)
        .await
        .with_context(|| format!("opening {}", cfg.database_url))?;
    let cache = RoomCache::new(store, cfg.ttls);
    let registry = RoomRegistry::new();
    let relay = Relay::new(registry.clone(), cache.clone(), cfg.rate_limit, cfg.outbound_capacity);

    tokio::spawn(clean::task(registry, cache, cfg.sweep_interval, cfg.room_grace));  // sweeper

    let addr = cfg.bind_addr.clone();
    let app = whiteboard_sync::app(relay, Arc::new(cfg));

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, "listening");
    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}
