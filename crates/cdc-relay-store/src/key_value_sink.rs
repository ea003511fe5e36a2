//! Key-value sink writing the latest state of each entity.

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::{debug, info};

use cdc_relay_core::error::SinkError;
use cdc_relay_core::event::DomainEvent;
use cdc_relay_core::sink::SinkAdapter;

use crate::error::classify;

/// Projects events onto `replicated_entities`, one row per entity.
///
/// Created and updated events upsert the row; deleted events remove it.
/// Applying the same event twice leaves the same row behind.
#[derive(Debug, Clone)]
pub struct PgKeyValueSink {
    pool: PgPool,
}

impl PgKeyValueSink {
    /// Creates a new `PgKeyValueSink`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SinkAdapter for PgKeyValueSink {
    fn name(&self) -> &'static str {
        "key-value"
    }

    async fn apply(&self, event: &DomainEvent) -> Result<(), SinkError> {
        let result = if event.action.is_deletion() {
            sqlx::query("DELETE FROM replicated_entities WHERE entity = $1 AND entity_id = $2")
                .bind(&event.entity)
                .bind(&event.entity_id)
                .execute(&self.pool)
                .await
        } else {
            sqlx::query(
                r"
                INSERT INTO replicated_entities
                    (entity, entity_id, payload, event_type, last_event_id, sequence_token, occurred_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                ON CONFLICT (entity, entity_id) DO UPDATE SET
                    payload = EXCLUDED.payload,
                    event_type = EXCLUDED.event_type,
                    last_event_id = EXCLUDED.last_event_id,
                    sequence_token = EXCLUDED.sequence_token,
                    occurred_at = EXCLUDED.occurred_at
                ",
            )
            .bind(&event.entity)
            .bind(&event.entity_id)
            .bind(&event.payload)
            .bind(&event.event_type)
            .bind(event.event_id)
            .bind(&event.sequence_token)
            .bind(event.occurred_at)
            .execute(&self.pool)
            .await
        };

        let result = result.map_err(|e| classify(&e))?;
        debug!(
            entity = %event.entity,
            entity_id = %event.entity_id,
            rows = result.rows_affected(),
            "key-value row written"
        );
        Ok(())
    }

    async fn shutdown(&self) {
        info!("closing key-value sink pool");
        self.pool.close().await;
    }
}
