//! `GET /health`: liveness of the store, the event bridge and the hub.
//!
//! Answers 200 when every component is up and 503 with the same body when
//! any of them is not, so load balancers can drain a node whose store or
//! background loops died.

use crate::server::SyncServer;
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::Serialize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

static START_TIME: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();

/// Record the process start for `uptime_seconds`.
pub fn init_start_time() {
    START_TIME.get_or_init(Instant::now);
}

/// Health response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    /// `ok` or `degraded`.
    pub status: &'static str,
    /// Server version.
    pub version: &'static str,
    /// Seconds since startup.
    pub uptime_seconds: u64,
    /// SQLite answered `SELECT 1`.
    pub storage: bool,
    /// Bridge still draining the inbound queue.
    pub event_bridge: bool,
    /// Notification hub.
    pub hub: HubHealth,
    /// Upstream events dropped as malformed or unstorable.
    pub events_dropped: u64,
}

/// Hub section of [`HealthStatus`].
#[derive(Debug, Clone, Serialize)]
pub struct HubHealth {
    /// Hub task still accepting sessions.
    pub running: bool,
    /// Connected websocket sessions.
    pub sessions: u64,
    /// Identities with at least one session.
    pub identities: u64,
    /// Payloads dropped on full buffers.
    pub dropped: u64,
}

impl HealthStatus {
    fn healthy(&self) -> bool {
        self.storage && self.event_bridge && self.hub.running
    }
}

/// Health check handler.
pub async fn health_handler(
    Extension(server): Extension<Arc<SyncServer>>,
) -> (StatusCode, Json<HealthStatus>) {
    let hub = server.hub().stats();
    let mut health = HealthStatus {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: START_TIME.get().map_or(0, |start| start.elapsed().as_secs()),
        storage: server.storage_reachable().await,
        event_bridge: server.bridge_running(),
        hub: HubHealth {
            running: server.hub().is_running(),
            sessions: hub.sessions,
            identities: hub.identities,
            dropped: hub.dropped,
        },
        events_dropped: server.metrics().events_dropped.load(Ordering::Relaxed),
    };

    if health.healthy() {
        return (StatusCode::OK, Json(health));
    }
    health.status = "degraded";
    tracing::warn!(
        storage = health.storage,
        event_bridge = health.event_bridge,
        hub = health.hub.running,
        "health check degraded"
    );
    (StatusCode::SERVICE_UNAVAILABLE, Json(health))
}
