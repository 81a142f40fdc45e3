//! Event pipeline.
//!
//! ```text
//! upstream ──► inbound queue ──► EventBridge ──► ChangeLog (append)
//!                                     │
//!                                     ▼
//!                    outbound queue (sync.events, sync-notifications)
//!                                     │
//!                                     ▼
//!                               Forwarder ──► Hub ──► websocket sessions
//! ```
//!
//! Both queues are bounded in-process channels behind the [`EventSource`]
//! and [`EventSink`] traits, so a broker-backed transport can replace them
//! without touching the bridge or the forwarder.

pub mod bridge;
pub mod forwarder;
mod sink;
mod source;

pub use bridge::{BridgeOutcome, EventBridge};
pub use forwarder::Forwarder;
pub use sink::{ChannelSink, EventSink, SyncEventPublisher};
pub use source::{ChannelSource, EventSource};

use tokio::sync::mpsc;

/// One message on a named topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventMessage {
    /// Topic name.
    pub topic: String,
    /// Partition key, if the producer set one.
    pub key: Option<String>,
    /// Raw payload (JSON).
    pub payload: Vec<u8>,
}

impl EventMessage {
    /// Create a message without a key.
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            key: None,
            payload: payload.into(),
        }
    }

    /// Set the partition key.
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }
}

/// Create a bounded in-process queue.
pub fn channel(capacity: usize) -> (ChannelSink, ChannelSource) {
    let (tx, rx) = mpsc::channel(capacity);
    (ChannelSink::new(tx), ChannelSource::new(rx))
}
