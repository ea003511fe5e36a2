//! Inbound and outbound JSON formats.
//!
//! Two inbound shapes are accepted: native change records, and the DynamoDB
//! Streams event delivered to stream consumers. Both produce the same
//! response: the batch report plus the partial-batch failure list, whose item
//! identifiers are the sequence tokens of failed records.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

use cdc_relay_core::outcome::{BatchReport, RelayOutcome};
use cdc_relay_core::record::{ChangeKind, ChangeRecord, Image};

/// Body of `POST /api/v1/relay/batches`.
#[derive(Debug, Deserialize)]
pub struct BatchRequest {
    /// Records in delivery order.
    pub records: Vec<ChangeRecord>,
}

/// A DynamoDB typed attribute value.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub enum AttributeValue {
    /// String.
    S(String),
    /// Number, as its decimal text.
    N(String),
    /// Base64 binary.
    B(String),
    /// String set.
    SS(Vec<String>),
    /// Number set.
    NS(Vec<String>),
    /// Binary set.
    BS(Vec<String>),
    /// Map.
    M(HashMap<String, AttributeValue>),
    /// List.
    L(Vec<AttributeValue>),
    /// Null marker.
    #[serde(rename = "NULL")]
    Null(bool),
    /// Boolean.
    #[serde(rename = "BOOL")]
    Bool(bool),
}

impl AttributeValue {
    /// Converts to a plain JSON value. Numbers that do not fit a JSON number
    /// are kept as strings; binary stays base64 text.
    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            Self::S(s) | Self::B(s) => Value::String(s.clone()),
            Self::N(n) => number(n),
            Self::SS(items) | Self::BS(items) => {
                Value::Array(items.iter().cloned().map(Value::String).collect())
            }
            Self::NS(items) => Value::Array(items.iter().map(|n| number(n)).collect()),
            Self::M(map) => Value::Object(
                map.iter()
                    .map(|(name, value)| (name.clone(), value.to_json()))
                    .collect(),
            ),
            Self::L(items) => Value::Array(items.iter().map(Self::to_json).collect()),
            Self::Null(_) => Value::Null,
            Self::Bool(b) => Value::Bool(*b),
        }
    }

    fn key_text(&self) -> String {
        match self {
            Self::S(s) | Self::N(s) | Self::B(s) => s.clone(),
            other => other.to_json().to_string(),
        }
    }
}

fn number(text: &str) -> Value {
    if let Ok(n) = text.parse::<i64>() {
        return Value::Number(n.into());
    }
    if let Ok(n) = text.parse::<u64>() {
        return Value::Number(n.into());
    }
    text.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map_or_else(|| Value::String(text.to_owned()), Value::Number)
}

fn to_image(attributes: &HashMap<String, AttributeValue>) -> Image {
    attributes
        .iter()
        .map(|(name, value)| (name.clone(), value.to_json()))
        .collect()
}

/// The DynamoDB Streams event envelope.
#[derive(Debug, Deserialize)]
pub struct DynamoDbStreamEvent {
    /// Stream records in shard order.
    #[serde(rename = "Records", default)]
    pub records: Vec<StreamRecord>,
}

/// One DynamoDB Streams record.
#[derive(Debug, Deserialize)]
pub struct StreamRecord {
    /// `INSERT`, `MODIFY`, or `REMOVE`.
    #[serde(rename = "eventName")]
    pub event_name: String,
    /// ARN of the stream, which names the table.
    #[serde(rename = "eventSourceARN", default)]
    pub event_source_arn: Option<String>,
    /// Change payload.
    pub dynamodb: StreamChange,
}

/// The `dynamodb` section of a stream record.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StreamChange {
    /// Primary key attributes.
    #[serde(default)]
    pub keys: HashMap<String, AttributeValue>,
    /// Item after the change.
    #[serde(default)]
    pub new_image: Option<HashMap<String, AttributeValue>>,
    /// Item before the change.
    #[serde(default)]
    pub old_image: Option<HashMap<String, AttributeValue>>,
    /// Position of the record in its shard.
    pub sequence_number: String,
    /// Epoch seconds at which the change was captured.
    #[serde(default)]
    pub approximate_creation_date_time: Option<f64>,
}

/// Table name from a stream ARN such as
/// `arn:aws:dynamodb:us-east-1:123456789012:table/Orders/stream/2024-01-01T00:00:00.000`.
#[must_use]
pub fn table_name(stream_arn: &str) -> Option<&str> {
    let (_, resource) = stream_arn.split_once(":table/")?;
    resource.split('/').next().filter(|name| !name.is_empty())
}

/// Partition key built from sorted key attributes, e.g. `orderId=o-1`.
#[must_use]
pub fn partition_key(keys: &HashMap<String, AttributeValue>) -> String {
    let sorted: BTreeMap<&String, &AttributeValue> = keys.iter().collect();
    sorted
        .into_iter()
        .map(|(name, value)| format!("{name}={}", value.key_text()))
        .collect::<Vec<_>>()
        .join("&")
}

#[allow(clippy::cast_possible_truncation)]
fn capture_time(epoch_seconds: f64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis((epoch_seconds * 1000.0).round() as i64)
}

impl StreamRecord {
    /// Converts to a change record. `received_at` stands in for a missing
    /// capture time; a missing or foreign ARN yields source `unknown`.
    #[must_use]
    pub fn into_change_record(self, received_at: DateTime<Utc>) -> ChangeRecord {
        let change = self.dynamodb;
        ChangeRecord {
            source: self
                .event_source_arn
                .as_deref()
                .and_then(table_name)
                .unwrap_or("unknown")
                .to_owned(),
            partition_key: partition_key(&change.keys),
            sequence_token: change.sequence_number,
            kind: ChangeKind::from(self.event_name),
            before_image: change.old_image.as_ref().map(to_image),
            after_image: change.new_image.as_ref().map(to_image),
            created_at: change
                .approximate_creation_date_time
                .and_then(capture_time)
                .unwrap_or(received_at),
        }
    }
}

/// Outcome of one record, as returned to the caller.
#[derive(Debug, Serialize)]
pub struct OutcomeBody {
    /// Position in the submitted batch.
    pub index: usize,
    /// Sequence token of the record.
    pub sequence_token: String,
    /// `forwarded`, `skipped_duplicate`, or `failed`.
    pub status: &'static str,
    /// Failure code, for failed records.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'static str>,
    /// Failure message, for failed records.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Whether redelivery may succeed, for failed records.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retryable: Option<bool>,
}

/// Outcome counts.
#[derive(Debug, Serialize)]
pub struct SummaryBody {
    /// Records applied at the sink.
    pub forwarded: usize,
    /// Records skipped as duplicates.
    pub skipped: usize,
    /// Records that failed.
    pub failed: usize,
}

/// One entry of the partial-batch failure list.
#[derive(Debug, Serialize)]
pub struct BatchItemFailure {
    /// Sequence token of the failed record.
    #[serde(rename = "itemIdentifier")]
    pub item_identifier: String,
}

/// Response for every relay endpoint.
#[derive(Debug, Serialize)]
pub struct BatchResponse {
    /// Outcome counts.
    pub summary: SummaryBody,
    /// One entry per submitted record, in input order.
    pub outcomes: Vec<OutcomeBody>,
    /// Records the source should redeliver.
    #[serde(rename = "batchItemFailures")]
    pub batch_item_failures: Vec<BatchItemFailure>,
}

impl BatchResponse {
    /// Builds the response for `report`, which must describe `records`.
    #[must_use]
    pub fn new(records: &[ChangeRecord], report: &BatchReport) -> Self {
        let summary = report.summary();
        let outcomes: Vec<OutcomeBody> = report
            .outcomes()
            .iter()
            .zip(records)
            .enumerate()
            .map(|(index, (outcome, record))| {
                let (status, failure) = match outcome {
                    RelayOutcome::Forwarded => ("forwarded", None),
                    RelayOutcome::SkippedDuplicate => ("skipped_duplicate", None),
                    RelayOutcome::Failed(reason) => ("failed", Some(reason)),
                };
                OutcomeBody {
                    index,
                    sequence_token: record.sequence_token.clone(),
                    status,
                    reason: failure.map(|r| r.code()),
                    message: failure.map(ToString::to_string),
                    retryable: failure.map(|r| r.is_retryable()),
                }
            })
            .collect();
        let batch_item_failures = report
            .failed_indices()
            .into_iter()
            .filter_map(|index| records.get(index))
            .map(|record| BatchItemFailure {
                item_identifier: record.sequence_token.clone(),
            })
            .collect();

        Self {
            summary: SummaryBody {
                forwarded: summary.forwarded,
                skipped: summary.skipped,
                failed: summary.failed,
            },
            outcomes,
            batch_item_failures,
        }
    }
}
