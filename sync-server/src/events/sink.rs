//! Outbound event sinks.

use super::EventMessage;
use crate::server::ServerMetrics;
use async_trait::async_trait;
use filesync_sync_types::{SyncError, SyncEvent};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};

/// Publish to a topic without a delivery acknowledgment.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Hand a message to the transport.
    async fn publish(&self, message: EventMessage) -> Result<(), SyncError>;
}

/// Sending half of an in-process queue. Never waits for capacity.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<EventMessage>,
}

impl ChannelSink {
    pub(crate) fn new(tx: mpsc::Sender<EventMessage>) -> Self {
        Self { tx }
    }

    /// True once the consuming side is gone.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[async_trait]
impl EventSink for ChannelSink {
    async fn publish(&self, message: EventMessage) -> Result<(), SyncError> {
        self.tx.try_send(message).map_err(|e| match e {
            TrySendError::Full(m) => {
                SyncError::PublishFailure(format!("queue full, dropped {} message", m.topic))
            }
            TrySendError::Closed(m) => {
                SyncError::PublishFailure(format!("queue closed, dropped {} message", m.topic))
            }
        })
    }
}

/// Fire-and-forget publisher for sync lifecycle events.
///
/// Failures are logged and counted, never returned.
#[derive(Clone)]
pub struct SyncEventPublisher {
    sink: Arc<dyn EventSink>,
    topic: String,
    metrics: Arc<ServerMetrics>,
}

impl std::fmt::Debug for SyncEventPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEventPublisher")
            .field("topic", &self.topic)
            .finish_non_exhaustive()
    }
}

impl SyncEventPublisher {
    /// Publish lifecycle events to `topic` through `sink`.
    pub fn new(sink: Arc<dyn EventSink>, topic: String, metrics: Arc<ServerMetrics>) -> Self {
        Self {
            sink,
            topic,
            metrics,
        }
    }

    /// Publish a lifecycle event keyed by its sync id.
    pub async fn publish(&self, event: &SyncEvent) {
        let payload = match serde_json::to_vec(event) {
            Ok(p) => p,
            Err(e) => {
                tracing::error!(error = %e, "failed to serialize sync event");
                self.metrics.publish_failures.fetch_add(1, Ordering::Relaxed);
                return;
            }
        };
        let message = EventMessage::new(self.topic.as_str(), payload).with_key(&event.sync_id);

        match self.sink.publish(message).await {
            Ok(()) => tracing::debug!(
                event_type = event.event_type.as_str(),
                sync_id = %event.sync_id,
                user_id = %event.user_id,
                "published sync event"
            ),
            Err(e) => {
                tracing::warn!(
                    event_type = event.event_type.as_str(),
                    error = %e,
                    "sync event not published"
                );
                self.metrics.publish_failures.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Pass a message through to the outbound transport unchanged.
    pub async fn relay(&self, message: EventMessage) {
        let topic = message.topic.clone();
        if let Err(e) = self.sink.publish(message).await {
            tracing::warn!(topic = %topic, error = %e, "relay not published");
            self.metrics.publish_failures.fetch_add(1, Ordering::Relaxed);
        }
    }
}
