//! Inbound event sources.

use super::EventMessage;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Blocking receive of topic messages.
#[async_trait]
pub trait EventSource: Send {
    /// Wait for the next message. `None` once the source is exhausted.
    async fn recv(&mut self) -> Option<EventMessage>;
}

/// Receiving half of an in-process queue.
#[derive(Debug)]
pub struct ChannelSource {
    rx: mpsc::Receiver<EventMessage>,
}

impl ChannelSource {
    pub(crate) fn new(rx: mpsc::Receiver<EventMessage>) -> Self {
        Self { rx }
    }
}

#[async_trait]
impl EventSource for ChannelSource {
    async fn recv(&mut self) -> Option<EventMessage> {
        self.rx.recv().await
    }
}
