//! Idempotency guard over an `IdempotencyStore`.

use std::sync::Arc;
use std::time::Duration;

use cdc_relay_core::dedup::DedupKey;
use cdc_relay_core::error::GuardError;
use cdc_relay_core::idempotency::{IdempotencyStore, Reservation};
use tracing::debug;

/// Reserves dedup keys before a sink write and releases them when the write
/// fails. Every store call is bounded by `timeout`; a timeout counts as the
/// store being unavailable.
#[derive(Clone)]
pub struct IdempotencyGuard {
    store: Arc<dyn IdempotencyStore>,
    timeout: Duration,
}

impl std::fmt::Debug for IdempotencyGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdempotencyGuard")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl IdempotencyGuard {
    /// Creates a guard over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn IdempotencyStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    /// Atomically reserves `key`.
    ///
    /// Concurrent callers for the same key cannot both see `Reserved`; the
    /// store's conditional write decides.
    pub async fn check_and_reserve(&self, key: &DedupKey) -> Reservation {
        match tokio::time::timeout(self.timeout, self.store.put_if_absent(key)).await {
            Ok(Ok(true)) => Reservation::Reserved,
            Ok(Ok(false)) => {
                debug!(dedup_key = %key, "dedup key already reserved");
                Reservation::AlreadyProcessed
            }
            Ok(Err(err)) => Reservation::GuardUnavailable(err),
            Err(_) => Reservation::GuardUnavailable(GuardError::Timeout(self.timeout)),
        }
    }

    /// Releases a reservation so a retry can reserve `key` again.
    ///
    /// # Errors
    ///
    /// Returns `GuardError` if the store fails or does not answer in time.
    pub async fn release(&self, key: &DedupKey) -> Result<(), GuardError> {
        tokio::time::timeout(self.timeout, self.store.delete(key))
            .await
            .map_err(|_| GuardError::Timeout(self.timeout))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cdc_relay_test_support::{
        HangingIdempotencyStore, InMemoryIdempotencyStore, UnavailableIdempotencyStore,
    };

    const TIMEOUT: Duration = Duration::from_millis(50);

    #[tokio::test]
    async fn test_second_reservation_is_already_processed() {
        // Arrange
        let guard = IdempotencyGuard::new(Arc::new(InMemoryIdempotencyStore::new()), TIMEOUT);
        let key = DedupKey::derive("id=1", "100");

        // Act
        let first = guard.check_and_reserve(&key).await;
        let second = guard.check_and_reserve(&key).await;

        // Assert
        assert_eq!(first, Reservation::Reserved);
        assert_eq!(second, Reservation::AlreadyProcessed);
    }

    #[tokio::test]
    async fn test_release_makes_key_reservable_again() {
        let guard = IdempotencyGuard::new(Arc::new(InMemoryIdempotencyStore::new()), TIMEOUT);
        let key = DedupKey::derive("id=1", "100");

        assert_eq!(guard.check_and_reserve(&key).await, Reservation::Reserved);
        guard.release(&key).await.unwrap();

        assert_eq!(guard.check_and_reserve(&key).await, Reservation::Reserved);
    }

    #[tokio::test]
    async fn test_concurrent_reservations_have_one_winner() {
        // Arrange
        let guard = IdempotencyGuard::new(Arc::new(InMemoryIdempotencyStore::new()), TIMEOUT);
        let key = DedupKey::derive("id=1", "100");

        // Act
        let attempts = (0..8).map(|_| {
            let guard = guard.clone();
            let key = key.clone();
            tokio::spawn(async move { guard.check_and_reserve(&key).await })
        });
        let results = futures::future::join_all(attempts).await;

        // Assert
        let winners = results
            .into_iter()
            .map(Result::unwrap)
            .filter(|r| *r == Reservation::Reserved)
            .count();
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_store_error_is_guard_unavailable() {
        let guard = IdempotencyGuard::new(Arc::new(UnavailableIdempotencyStore), TIMEOUT);
        let key = DedupKey::derive("id=1", "100");

        let reservation = guard.check_and_reserve(&key).await;

        assert!(matches!(
            reservation,
            Reservation::GuardUnavailable(GuardError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_timeout_is_guard_unavailable() {
        let guard = IdempotencyGuard::new(Arc::new(HangingIdempotencyStore), TIMEOUT);
        let key = DedupKey::derive("id=1", "100");

        let reservation = guard.check_and_reserve(&key).await;
        let release = guard.release(&key).await;

        assert_eq!(
            reservation,
            Reservation::GuardUnavailable(GuardError::Timeout(TIMEOUT))
        );
        assert_eq!(release, Err(GuardError::Timeout(TIMEOUT)));
    }
}
