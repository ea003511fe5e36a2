//! Idempotency store port.

use async_trait::async_trait;

use crate::dedup::DedupKey;
use crate::error::GuardError;

/// Result of trying to reserve a dedup key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reservation {
    /// This attempt owns the key and may apply the event.
    Reserved,
    /// Another attempt already reserved or processed the key.
    AlreadyProcessed,
    /// The store could not answer; the record must be retried later.
    GuardUnavailable(GuardError),
}

/// Durable key-value store with insert-if-absent semantics.
///
/// The conditional write is the only synchronization point between
/// overlapping relay invocations, so it must be atomic in the store itself.
/// Retention is a store-side concern.
#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    /// Inserts `key` if absent. Returns `true` if this call inserted it.
    ///
    /// # Errors
    ///
    /// Returns `GuardError` if the store cannot be reached.
    async fn put_if_absent(&self, key: &DedupKey) -> Result<bool, GuardError>;

    /// Removes `key` so a later attempt can reserve it again.
    ///
    /// # Errors
    ///
    /// Returns `GuardError` if the store cannot be reached.
    async fn delete(&self, key: &DedupKey) -> Result<(), GuardError>;
}
