//! Dead-letter queue persisted in `relay_dead_letters`.

use async_trait::async_trait;
use sqlx::PgPool;

use cdc_relay_core::dead_letter::{DeadLetter, DeadLetterHandler};
use cdc_relay_core::error::DeadLetterError;

use crate::error::dead_letter_unavailable;

/// Stores dead letters for manual inspection, one row per dedup key.
#[derive(Debug, Clone)]
pub struct PgDeadLetterQueue {
    pool: PgPool,
}

impl PgDeadLetterQueue {
    /// Creates a new `PgDeadLetterQueue`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DeadLetterHandler for PgDeadLetterQueue {
    async fn route(&self, letter: &DeadLetter) -> Result<(), DeadLetterError> {
        sqlx::query(
            r"
            INSERT INTO relay_dead_letters
                (dedup_key, source, partition_key, sequence_token, failure_code, message, record,
                 first_failed_at, last_failed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8)
            ON CONFLICT (dedup_key) DO UPDATE SET
                failure_code   = EXCLUDED.failure_code,
                message        = EXCLUDED.message,
                record         = EXCLUDED.record,
                last_failed_at = EXCLUDED.last_failed_at,
                attempts       = relay_dead_letters.attempts + 1
            ",
        )
        .bind(letter.dedup_key.as_str())
        .bind(&letter.source)
        .bind(&letter.partition_key)
        .bind(&letter.sequence_token)
        .bind(letter.failure_code)
        .bind(&letter.message)
        .bind(&letter.record)
        .bind(letter.failed_at)
        .execute(&self.pool)
        .await
        .map_err(|e| dead_letter_unavailable(&e))?;
        Ok(())
    }
}
