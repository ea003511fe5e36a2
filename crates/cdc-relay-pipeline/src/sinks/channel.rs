//! In-process broadcast sink.

use std::sync::Arc;

use async_trait::async_trait;
use cdc_relay_core::error::SinkError;
use cdc_relay_core::event::DomainEvent;
use cdc_relay_core::sink::SinkAdapter;
use tokio::sync::broadcast;
use tracing::debug;

/// Fans events out to in-process subscribers over a tokio broadcast channel.
///
/// With no live subscriber the event has nowhere to go, so `apply` reports a
/// transient failure and the record is redelivered later.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl ChannelSink {
    /// Creates a sink buffering up to `capacity` events per slow subscriber.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribes to every event applied from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }

    /// Number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[async_trait]
impl SinkAdapter for ChannelSink {
    fn name(&self) -> &'static str {
        "channel"
    }

    async fn apply(&self, event: &DomainEvent) -> Result<(), SinkError> {
        let delivered = self
            .sender
            .send(Arc::new(event.clone()))
            .map_err(|_| SinkError::Transient("no channel subscribers".to_owned()))?;
        debug!(event_id = %event.event_id, subscribers = delivered, "event broadcast");
        Ok(())
    }
}
