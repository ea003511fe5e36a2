//! Sink adapter port.

use async_trait::async_trait;

use crate::error::SinkError;
use crate::event::DomainEvent;

/// Destination that decoded events are forwarded to (key-value store,
/// message bus, search index).
///
/// The orchestrator calls `apply` at most once per successfully reserved
/// dedup key. Each adapter owns its client or pool; `shutdown` releases it.
#[async_trait]
pub trait SinkAdapter: Send + Sync {
    /// Short adapter name for logs.
    fn name(&self) -> &'static str;

    /// Writes one event to the destination.
    ///
    /// # Errors
    ///
    /// Returns `SinkError::Transient` when a retry may succeed and
    /// `SinkError::Permanent` when the event can never be applied.
    async fn apply(&self, event: &DomainEvent) -> Result<(), SinkError>;

    /// Releases connections held by the adapter.
    async fn shutdown(&self) {}
}
