//! DynamoDB implementation of the `IdempotencyStore` trait.
//!
//! Table schema:
//! - PK: `dedup_key` (String)
//! - `reserved_at`: RFC 3339 reservation time (String)
//! - `expires_at`: epoch seconds, configure it as the table's TTL attribute (Number)

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_dynamodb::Client;
use aws_sdk_dynamodb::error::DisplayErrorContext;
use aws_sdk_dynamodb::operation::put_item::PutItemError;
use aws_sdk_dynamodb::types::AttributeValue;
use chrono::{DateTime, Utc};
use tracing::{debug, info};

use cdc_relay_core::clock::Clock;
use cdc_relay_core::dedup::DedupKey;
use cdc_relay_core::error::GuardError;
use cdc_relay_core::idempotency::IdempotencyStore;

const KEY_ATTR: &str = "dedup_key";
const RESERVED_AT_ATTR: &str = "reserved_at";
const EXPIRES_AT_ATTR: &str = "expires_at";

/// Reservations taken with a conditional `PutItem`.
pub struct DynamoIdempotencyStore {
    client: Client,
    table_name: String,
    retention: Duration,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for DynamoIdempotencyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamoIdempotencyStore")
            .field("table_name", &self.table_name)
            .field("retention", &self.retention)
            .finish_non_exhaustive()
    }
}

impl DynamoIdempotencyStore {
    /// Creates a store on `table_name` using the shared AWS configuration.
    ///
    /// Entries expire `retention` after they are reserved.
    #[must_use]
    pub fn new(
        config: &aws_config::SdkConfig,
        table_name: impl Into<String>,
        retention: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let table_name = table_name.into();
        info!(table = %table_name, "using DynamoDB idempotency store");
        Self {
            client: Client::new(config),
            table_name,
            retention,
            clock,
        }
    }
}

/// Epoch second at which a reservation taken at `now` may be evicted.
#[must_use]
pub fn expiry_epoch(now: DateTime<Utc>, retention: Duration) -> i64 {
    let retention = i64::try_from(retention.as_secs()).unwrap_or(i64::MAX);
    now.timestamp().saturating_add(retention)
}

fn reservation_item(
    key: &DedupKey,
    now: DateTime<Utc>,
    retention: Duration,
) -> HashMap<String, AttributeValue> {
    HashMap::from([
        (KEY_ATTR.to_owned(), AttributeValue::S(key.as_str().to_owned())),
        (RESERVED_AT_ATTR.to_owned(), AttributeValue::S(now.to_rfc3339())),
        (
            EXPIRES_AT_ATTR.to_owned(),
            AttributeValue::N(expiry_epoch(now, retention).to_string()),
        ),
    ])
}

#[async_trait]
impl IdempotencyStore for DynamoIdempotencyStore {
    async fn put_if_absent(&self, key: &DedupKey) -> Result<bool, GuardError> {
        let item = reservation_item(key, self.clock.now(), self.retention);
        let result = self
            .client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(item))
            .condition_expression(format!("attribute_not_exists({KEY_ATTR})"))
            .send()
            .await;

        match result {
            Ok(_) => Ok(true),
            Err(err)
                if err
                    .as_service_error()
                    .is_some_and(PutItemError::is_conditional_check_failed_exception) =>
            {
                debug!(dedup_key = %key, "conditional put rejected, key already reserved");
                Ok(false)
            }
            Err(err) => Err(GuardError::Unavailable(format!(
                "DynamoDB put_item failed: {}",
                DisplayErrorContext(&err)
            ))),
        }
    }

    async fn delete(&self, key: &DedupKey) -> Result<(), GuardError> {
        self.client
            .delete_item()
            .table_name(&self.table_name)
            .key(KEY_ATTR, AttributeValue::S(key.as_str().to_owned()))
            .send()
            .await
            .map_err(|e| {
                GuardError::Unavailable(format!(
                    "DynamoDB delete_item failed: {}",
                    DisplayErrorContext(&e)
                ))
            })?;
        Ok(())
    }
}
