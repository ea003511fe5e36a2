//! Decoded, application-meaningful domain events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What happened to the entity, as seen by downstream consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityAction {
    /// The entity was created.
    Created,
    /// The entity was updated.
    Updated,
    /// The entity was deleted.
    Deleted,
}

impl EntityAction {
    /// Returns `true` when sinks should remove the entity.
    #[must_use]
    pub fn is_deletion(self) -> bool {
        matches!(self, Self::Deleted)
    }
}

/// A domain event decoded from one change record.
///
/// Decoding is deterministic, so redelivery of the same record produces an
/// identical event, including `event_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainEvent {
    /// Stable identifier derived from the record's dedup key.
    pub event_id: Uuid,
    /// Event type name, e.g. `order.created`.
    pub event_type: String,
    /// Logical entity name, e.g. `order`.
    pub entity: String,
    /// Identifier of the entity that changed.
    pub entity_id: String,
    /// What happened to the entity.
    pub action: EntityAction,
    /// Table or collection the change came from.
    pub source: String,
    /// Partition key of the originating record.
    pub partition_key: String,
    /// Sequence token of the originating record.
    pub sequence_token: String,
    /// Typed fields extracted from the record images.
    pub payload: serde_json::Value,
    /// When the change happened at the source.
    pub occurred_at: DateTime<Utc>,
}
