//! HTTP endpoints for sync-server.
//!
//! JSON API under `/v1`, the websocket session endpoint, health and
//! Prometheus metrics.

mod api;
pub mod auth;
pub mod health;
mod metrics;
mod ws;

use crate::server::SyncServer;
use axum::routing::{delete, get, post};
use axum::{Extension, Router};
use std::sync::Arc;

pub use health::HealthStatus;

/// Build the HTTP router with all endpoints.
pub fn build_router(server: Arc<SyncServer>) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        .route("/metrics", get(metrics::metrics_handler))
        .route("/v1/devices", post(api::register_device))
        .route("/v1/devices/:id", delete(api::deactivate_device))
        .route("/v1/users/:id/devices", get(api::list_devices))
        .route("/v1/users/:id/conflicts", get(api::list_conflicts))
        .route("/v1/sync/push", post(api::push))
        .route("/v1/sync/pull", get(api::pull))
        .route("/v1/sync/cursor", post(api::commit_cursor))
        .route("/v1/sync/state", get(api::sync_state))
        .route("/v1/conflicts", post(api::register_conflict))
        .route("/v1/conflicts/:id", get(api::get_conflict))
        .route("/v1/conflicts/:id/resolve", post(api::resolve_conflict))
        .route("/v1/events/:topic", post(api::ingest_event))
        .route("/ws/sync", get(ws::ws_handler))
        .layer(Extension(server))
}
