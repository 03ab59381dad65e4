// Module: http
// axum routes for the stream gateway

pub mod error;
pub mod health;
pub mod relay;

use std::sync::Arc;

use axum::Router;
use relaytv_core::Config;
use relaytv_proxy::Gateway;
use tower_http::trace::TraceLayer;

pub use error::{AppError, AppResult};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<Gateway>,
    pub config: Arc<Config>,
}

impl AppState {
    /// Build the state, creating the pooled upstream client
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let gateway = Gateway::new(config.gateway.clone())?;
        Ok(Self {
            gateway: Arc::new(gateway),
            config: Arc::new(config),
        })
    }
}

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    let relay_path = state.config.gateway.public_path.clone();

    Router::new()
        .merge(relay::create_relay_router(&relay_path))
        .merge(health::create_health_router())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
