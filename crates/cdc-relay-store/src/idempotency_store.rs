//! `PostgreSQL` implementation of the `IdempotencyStore` trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::{debug, instrument};

use cdc_relay_core::dedup::DedupKey;
use cdc_relay_core::error::GuardError;
use cdc_relay_core::idempotency::IdempotencyStore;

use crate::error::guard_unavailable;

/// Reservations backed by the `relay_dedup_keys` primary key.
#[derive(Debug, Clone)]
pub struct PgIdempotencyStore {
    pool: PgPool,
}

impl PgIdempotencyStore {
    /// Creates a new `PgIdempotencyStore`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Deletes reservations taken before `cutoff` and returns how many were
    /// removed. Intended for a periodic maintenance job, never the hot path.
    ///
    /// # Errors
    ///
    /// Returns `GuardError::Unavailable` if the delete fails.
    #[instrument(skip(self))]
    pub async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, GuardError> {
        let result = sqlx::query("DELETE FROM relay_dedup_keys WHERE reserved_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .map_err(|e| guard_unavailable(&e))?;
        debug!(purged = result.rows_affected(), "purged dedup keys");
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl IdempotencyStore for PgIdempotencyStore {
    async fn put_if_absent(&self, key: &DedupKey) -> Result<bool, GuardError> {
        let result = sqlx::query(
            "INSERT INTO relay_dedup_keys (dedup_key) VALUES ($1) \
             ON CONFLICT (dedup_key) DO NOTHING",
        )
        .bind(key.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| guard_unavailable(&e))?;
        Ok(result.rows_affected() == 1)
    }

    async fn delete(&self, key: &DedupKey) -> Result<(), GuardError> {
        sqlx::query("DELETE FROM relay_dedup_keys WHERE dedup_key = $1")
            .bind(key.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| guard_unavailable(&e))?;
        Ok(())
    }
}
