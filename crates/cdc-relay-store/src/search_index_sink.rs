//! Search-index sink maintaining full-text documents.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::PgPool;
use tracing::info;

use cdc_relay_core::error::SinkError;
use cdc_relay_core::event::DomainEvent;
use cdc_relay_core::sink::SinkAdapter;

use crate::error::classify;

/// Indexes event payloads into `search_documents`.
#[derive(Debug, Clone)]
pub struct PgSearchIndexSink {
    pool: PgPool,
}

impl PgSearchIndexSink {
    /// Creates a new `PgSearchIndexSink`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Concatenates every string in `value`, depth first, in key order.
#[must_use]
pub fn document_text(value: &Value) -> String {
    fn collect<'a>(value: &'a Value, out: &mut Vec<&'a str>) {
        match value {
            Value::String(s) => out.push(s),
            Value::Array(items) => items.iter().for_each(|item| collect(item, out)),
            Value::Object(map) => map.values().for_each(|item| collect(item, out)),
            Value::Null | Value::Bool(_) | Value::Number(_) => {}
        }
    }

    let mut parts = Vec::new();
    collect(value, &mut parts);
    parts.join(" ")
}

#[async_trait]
impl SinkAdapter for PgSearchIndexSink {
    fn name(&self) -> &'static str {
        "search-index"
    }

    async fn apply(&self, event: &DomainEvent) -> Result<(), SinkError> {
        if event.action.is_deletion() {
            sqlx::query("DELETE FROM search_documents WHERE entity = $1 AND entity_id = $2")
                .bind(&event.entity)
                .bind(&event.entity_id)
                .execute(&self.pool)
                .await
                .map_err(|e| classify(&e))?;
            return Ok(());
        }

        sqlx::query(
            r"
            INSERT INTO search_documents
                (entity, entity_id, body, document, last_event_id, occurred_at)
            VALUES ($1, $2, $3, to_tsvector('simple', $4), $5, $6)
            ON CONFLICT (entity, entity_id) DO UPDATE SET
                body = EXCLUDED.body,
                document = EXCLUDED.document,
                last_event_id = EXCLUDED.last_event_id,
                occurred_at = EXCLUDED.occurred_at
            ",
        )
        .bind(&event.entity)
        .bind(&event.entity_id)
        .bind(&event.payload)
        .bind(document_text(&event.payload))
        .bind(event.event_id)
        .bind(event.occurred_at)
        .execute(&self.pool)
        .await
        .map_err(|e| classify(&e))?;
        Ok(())
    }

    async fn shutdown(&self) {
        info!("closing search-index sink pool");
        self.pool.close().await;
    }
}
