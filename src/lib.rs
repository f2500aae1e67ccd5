//! Real-time room synchronization for a shared whiteboard.

pub mod cache;
pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod protocol;
pub mod registry;
pub mod relay;
pub mod routes;
pub mod utils {
    pub mod clean;
}

use std::sync::Arc;

use axum::{extract::DefaultBodyLimit, Extension, Router};
use tower_http::limit::RequestBodyLimitLayer;

use crate::{config::Config, relay::Relay};

/// The full HTTP + WebSocket surface around a relay.
pub fn app(relay: Relay, cfg: Arc<Config>) -> Router {
    let limit = cfg.body_limit;
    routes::router()
        .layer(Extension(relay.cache().clone()))
        .layer(Extension(relay.registry().clone()))
        .layer(Extension(relay))
        .layer(Extension(cfg))
        .layer(DefaultBodyLimit::max(limit))
        .layer(RequestBodyLimitLayer::new(limit))
}
