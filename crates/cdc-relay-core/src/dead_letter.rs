//! Dead-letter hook for records that will never succeed on retry.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::dedup::DedupKey;
use crate::error::DeadLetterError;
use crate::outcome::FailureReason;
use crate::record::ChangeRecord;

/// A record parked for manual inspection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeadLetter {
    /// Dedup key of the failed record.
    pub dedup_key: DedupKey,
    /// Source table of the record.
    pub source: String,
    /// Partition key of the record.
    pub partition_key: String,
    /// Sequence token of the record.
    pub sequence_token: String,
    /// Failure code, see [`FailureReason::code`].
    pub failure_code: &'static str,
    /// Human-readable failure message.
    pub message: String,
    /// The raw record as JSON.
    pub record: serde_json::Value,
    /// When the failure was observed.
    pub failed_at: DateTime<Utc>,
}

impl DeadLetter {
    /// Builds a dead letter for `record` failing with `reason`.
    #[must_use]
    pub fn new(
        record: &ChangeRecord,
        dedup_key: DedupKey,
        reason: &FailureReason,
        failed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            dedup_key,
            source: record.source.clone(),
            partition_key: record.partition_key.clone(),
            sequence_token: record.sequence_token.clone(),
            failure_code: reason.code(),
            message: reason.to_string(),
            record: serde_json::to_value(record).unwrap_or(serde_json::Value::Null),
            failed_at,
        }
    }
}

/// Destination for records that need manual inspection.
///
/// Failed records are redelivered, so the same dedup key can be routed many
/// times. Implementations keep one letter per key and count the attempts.
#[async_trait]
pub trait DeadLetterHandler: Send + Sync {
    /// Parks one dead letter, replacing any earlier letter for the same key.
    ///
    /// # Errors
    ///
    /// Returns `DeadLetterError` if the destination cannot accept it.
    async fn route(&self, letter: &DeadLetter) -> Result<(), DeadLetterError>;
}
