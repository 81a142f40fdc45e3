//! Prometheus metrics endpoint.

use crate::server::SyncServer;
use axum::{http::header::CONTENT_TYPE, response::IntoResponse, Extension};
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Prometheus metrics handler.
///
/// Gauges reflect the hub right now; counters are monotonic since startup.
pub async fn metrics_handler(Extension(server): Extension<Arc<SyncServer>>) -> impl IntoResponse {
    let m = server.metrics();
    let hub = server.hub().stats();

    let sessions = hub.sessions;
    let identities = hub.identities;
    let limiter_keys = server.rate_limits().tracked_keys();

    let pushes = m.pushes_total.load(Ordering::Relaxed);
    let pulls = m.pulls_total.load(Ordering::Relaxed);
    let commits = m.commits_total.load(Ordering::Relaxed);
    let appended = m.changes_appended.load(Ordering::Relaxed);
    let entry_failures = m.push_entry_failures.load(Ordering::Relaxed);
    let conflicts = m.conflicts_detected.load(Ordering::Relaxed);
    let ingested = m.events_ingested.load(Ordering::Relaxed);
    let dropped_events = m.events_dropped.load(Ordering::Relaxed);
    let publish_failures = m.publish_failures.load(Ordering::Relaxed);
    let rate_limits = m.rate_limit_hits.load(Ordering::Relaxed);
    let delivered = hub.delivered;
    let dropped_payloads = hub.dropped;

    let body = format!(
        r#"# HELP filesync_hub_sessions Connected websocket sessions
# TYPE filesync_hub_sessions gauge
filesync_hub_sessions {sessions}

# HELP filesync_hub_identities Identities with at least one session
# TYPE filesync_hub_identities gauge
filesync_hub_identities {identities}

# HELP filesync_rate_limiter_keys Keys tracked by the rate limiters
# TYPE filesync_rate_limiter_keys gauge
filesync_rate_limiter_keys {limiter_keys}

# HELP filesync_info Server information
# TYPE filesync_info gauge
filesync_info{{version="{version}"}} 1

# HELP filesync_pushes_total Push requests accepted
# TYPE filesync_pushes_total counter
filesync_pushes_total {pushes}

# HELP filesync_pulls_total Pull requests served
# TYPE filesync_pulls_total counter
filesync_pulls_total {pulls}

# HELP filesync_cursor_commits_total Sync cursors committed
# TYPE filesync_cursor_commits_total counter
filesync_cursor_commits_total {commits}

# HELP filesync_changes_appended_total Entries appended to the change log
# TYPE filesync_changes_appended_total counter
filesync_changes_appended_total {appended}

# HELP filesync_push_entry_failures_total Pushed entries rejected or not persisted
# TYPE filesync_push_entry_failures_total counter
filesync_push_entry_failures_total {entry_failures}

# HELP filesync_conflicts_detected_total Conflicts registered
# TYPE filesync_conflicts_detected_total counter
filesync_conflicts_detected_total {conflicts}

# HELP filesync_events_ingested_total Upstream events handled
# TYPE filesync_events_ingested_total counter
filesync_events_ingested_total {ingested}

# HELP filesync_events_dropped_total Upstream events dropped
# TYPE filesync_events_dropped_total counter
filesync_events_dropped_total {dropped_events}

# HELP filesync_publish_failures_total Outbound events not queued
# TYPE filesync_publish_failures_total counter
filesync_publish_failures_total {publish_failures}

# HELP filesync_rate_limit_hits_total Requests rejected by a rate limiter
# TYPE filesync_rate_limit_hits_total counter
filesync_rate_limit_hits_total {rate_limits}

# HELP filesync_hub_delivered_total Payloads enqueued onto session buffers
# TYPE filesync_hub_delivered_total counter
filesync_hub_delivered_total {delivered}

# HELP filesync_hub_dropped_total Payloads dropped by the hub
# TYPE filesync_hub_dropped_total counter
filesync_hub_dropped_total {dropped_payloads}
"#,
        version = env!("CARGO_PKG_VERSION"),
    );

    (
        [(CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}
