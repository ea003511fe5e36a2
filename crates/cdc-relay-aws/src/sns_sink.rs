//! SNS message-bus sink.

use std::collections::HashMap;

use async_trait::async_trait;
use aws_sdk_sns::Client;
use aws_sdk_sns::error::{DisplayErrorContext, SdkError};
use aws_sdk_sns::operation::publish::PublishError;
use aws_sdk_sns::types::MessageAttributeValue;
use tracing::{debug, info};

use cdc_relay_core::error::SinkError;
use cdc_relay_core::event::DomainEvent;
use cdc_relay_core::sink::SinkAdapter;

/// Message attribute carrying the event type, for subscription filters.
pub const EVENT_TYPE_ATTR: &str = "event_type";
/// Message attribute carrying the entity name.
pub const ENTITY_ATTR: &str = "entity";

/// Publishes each event as JSON to one SNS topic.
///
/// On FIFO topics the partition key is the message group, so events for one
/// entity stay ordered, and the event id is the deduplication id, so a
/// republished event is dropped by SNS itself.
#[derive(Debug, Clone)]
pub struct SnsSink {
    client: Client,
    topic_arn: String,
    fifo: bool,
}

impl SnsSink {
    /// Creates a sink publishing to `topic_arn`.
    #[must_use]
    pub fn new(config: &aws_config::SdkConfig, topic_arn: impl Into<String>) -> Self {
        let topic_arn = topic_arn.into();
        let fifo = is_fifo_topic(&topic_arn);
        info!(topic_arn = %topic_arn, fifo, "using SNS sink");
        Self {
            client: Client::new(config),
            topic_arn,
            fifo,
        }
    }
}

/// FIFO topic names end in `.fifo`.
#[must_use]
pub fn is_fifo_topic(topic_arn: &str) -> bool {
    topic_arn.ends_with(".fifo")
}

fn string_attribute(value: &str) -> Result<MessageAttributeValue, SinkError> {
    MessageAttributeValue::builder()
        .data_type("String")
        .string_value(value)
        .build()
        .map_err(|e| SinkError::Permanent(format!("failed to build message attribute: {e}")))
}

fn classify(err: &SdkError<PublishError>) -> SinkError {
    let message = format!("SNS publish failed: {}", DisplayErrorContext(err));
    let permanent = err.as_service_error().is_some_and(|e| {
        e.is_invalid_parameter_exception()
            || e.is_invalid_parameter_value_exception()
            || e.is_not_found_exception()
            || e.is_authorization_error_exception()
    });
    if permanent {
        SinkError::Permanent(message)
    } else {
        SinkError::Transient(message)
    }
}

#[async_trait]
impl SinkAdapter for SnsSink {
    fn name(&self) -> &'static str {
        "sns"
    }

    async fn apply(&self, event: &DomainEvent) -> Result<(), SinkError> {
        let message = serde_json::to_string(event)
            .map_err(|e| SinkError::Permanent(format!("failed to encode event: {e}")))?;

        let attrs = HashMap::from([
            (EVENT_TYPE_ATTR.to_owned(), string_attribute(&event.event_type)?),
            (ENTITY_ATTR.to_owned(), string_attribute(&event.entity)?),
        ]);

        let mut request = self
            .client
            .publish()
            .topic_arn(&self.topic_arn)
            .message(message)
            .set_message_attributes(Some(attrs));
        if self.fifo {
            request = request
                .message_group_id(&event.partition_key)
                .message_deduplication_id(event.event_id.to_string());
        }

        let output = request.send().await.map_err(|e| classify(&e))?;

        debug!(
            event_id = %event.event_id,
            message_id = output.message_id().unwrap_or_default(),
            "published event to SNS"
        );
        Ok(())
    }

    async fn shutdown(&self) {
        info!(topic_arn = %self.topic_arn, "SNS sink released");
    }
}
