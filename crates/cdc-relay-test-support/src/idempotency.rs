//! Test idempotency stores: mock `IdempotencyStore` implementations.

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use cdc_relay_core::dedup::DedupKey;
use cdc_relay_core::error::GuardError;
use cdc_relay_core::idempotency::IdempotencyStore;

/// An in-memory store with real insert-if-absent semantics.
#[derive(Debug, Default)]
pub struct InMemoryIdempotencyStore {
    keys: Mutex<HashSet<DedupKey>>,
}

impl InMemoryIdempotencyStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if `key` is currently reserved.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn contains(&self, key: &DedupKey) -> bool {
        self.keys.lock().unwrap().contains(key)
    }

    /// Number of reserved keys.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn len(&self) -> usize {
        self.keys.lock().unwrap().len()
    }

    /// Returns `true` if nothing is reserved.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn is_empty(&self) -> bool {
        self.keys.lock().unwrap().is_empty()
    }
}

#[async_trait]
impl IdempotencyStore for InMemoryIdempotencyStore {
    async fn put_if_absent(&self, key: &DedupKey) -> Result<bool, GuardError> {
        Ok(self.keys.lock().unwrap().insert(key.clone()))
    }

    async fn delete(&self, key: &DedupKey) -> Result<(), GuardError> {
        self.keys.lock().unwrap().remove(key);
        Ok(())
    }
}

/// A store that always reports itself unreachable.
#[derive(Debug)]
pub struct UnavailableIdempotencyStore;

#[async_trait]
impl IdempotencyStore for UnavailableIdempotencyStore {
    async fn put_if_absent(&self, _key: &DedupKey) -> Result<bool, GuardError> {
        Err(GuardError::Unavailable("connection refused".into()))
    }

    async fn delete(&self, _key: &DedupKey) -> Result<(), GuardError> {
        Err(GuardError::Unavailable("connection refused".into()))
    }
}

/// A store whose calls never complete. Exercises caller timeouts.
#[derive(Debug)]
pub struct HangingIdempotencyStore;

#[async_trait]
impl IdempotencyStore for HangingIdempotencyStore {
    async fn put_if_absent(&self, _key: &DedupKey) -> Result<bool, GuardError> {
        std::future::pending().await
    }

    async fn delete(&self, _key: &DedupKey) -> Result<(), GuardError> {
        std::future::pending().await
    }
}

/// An in-memory store that hangs for selected keys until `recover` is called.
#[derive(Debug, Default)]
pub struct FlakyIdempotencyStore {
    inner: InMemoryIdempotencyStore,
    hanging: Mutex<HashSet<DedupKey>>,
}

impl FlakyIdempotencyStore {
    /// Creates a healthy store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes calls for `key` hang until `recover` is called.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn hang_on(&self, key: DedupKey) {
        self.hanging.lock().unwrap().insert(key);
    }

    /// Makes every key answer normally again.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn recover(&self) {
        self.hanging.lock().unwrap().clear();
    }

    /// Returns `true` if `key` is currently reserved.
    pub fn contains(&self, key: &DedupKey) -> bool {
        self.inner.contains(key)
    }

    fn is_hanging(&self, key: &DedupKey) -> bool {
        self.hanging.lock().unwrap().contains(key)
    }
}

#[async_trait]
impl IdempotencyStore for FlakyIdempotencyStore {
    async fn put_if_absent(&self, key: &DedupKey) -> Result<bool, GuardError> {
        if self.is_hanging(key) {
            return std::future::pending().await;
        }
        self.inner.put_if_absent(key).await
    }

    async fn delete(&self, key: &DedupKey) -> Result<(), GuardError> {
        if self.is_hanging(key) {
            return std::future::pending().await;
        }
        self.inner.delete(key).await
    }
}
