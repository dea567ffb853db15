//! API Module
//!
//! HTTP API layer for the redeployer.
//! Each submodule handles one endpoint or cross-cutting concern.

pub mod error;
pub mod health;
pub mod middleware;
pub mod redeploy;

use std::sync::Arc;

use axum::{
    Router,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
};
use tokio::sync::Semaphore;
use tower_http::trace::TraceLayer;

use crate::config::ServiceConfig;
use crate::service::Redeployer;

/// Token derivations allowed to run at the same time
///
/// Each scrypt derivation holds `128 * r * N` bytes (16 MiB at the default
/// cost) on a blocking thread.
pub const DEFAULT_AUTH_CONCURRENCY: usize = 4;

/// Shared, read-only state handed to every request
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServiceConfig>,
    pub redeployer: Arc<Redeployer>,
    /// Bounds concurrent token derivations
    pub auth_permits: Arc<Semaphore>,
}

impl AppState {
    pub fn new(config: ServiceConfig, redeployer: Redeployer) -> Self {
        Self {
            config: Arc::new(config),
            redeployer: Arc::new(redeployer),
            auth_permits: Arc::new(Semaphore::new(DEFAULT_AUTH_CONCURRENCY)),
        }
    }

    /// Replaces the derivation limit
    pub fn with_auth_concurrency(mut self, permits: usize) -> Self {
        self.auth_permits = Arc::new(Semaphore::new(permits.max(1)));
        self
    }
}

/// Create the main API router with all endpoints
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check, unauthenticated
        .route("/health", get(health::health_check))
        // Redeploy, requires a deploy token
        .route(
            "/redeploy",
            post(redeploy::trigger_redeployment).route_layer(from_fn_with_state(
                state.clone(),
                middleware::require_deploy_token,
            )),
        )
        .with_state(state)
        .layer(from_fn(middleware::request_context))
        .layer(TraceLayer::new_for_http())
}
