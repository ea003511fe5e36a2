//! Shared application state.

use std::sync::Arc;
use std::time::Duration;

use cdc_relay_core::clock::Clock;
use cdc_relay_core::outcome::BatchReport;
use cdc_relay_core::record::ChangeRecord;
use cdc_relay_pipeline::application::relay::BatchRelay;
use cdc_relay_pipeline::sinks::channel::ChannelSink;
use tokio_util::sync::CancellationToken;

use crate::error::ApiError;

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// The relay every batch runs through.
    pub relay: Arc<BatchRelay>,
    /// Clock for receive timestamps.
    pub clock: Arc<dyn Clock>,
    /// Cancelled when the process starts shutting down.
    pub shutdown: CancellationToken,
    /// Deadline for starting the records of one batch.
    pub invocation_timeout: Duration,
    /// Present when the channel sink is active, for event streaming.
    pub channel: Option<ChannelSink>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("relay", &self.relay)
            .field("invocation_timeout", &self.invocation_timeout)
            .field("channel", &self.channel.is_some())
            .finish_non_exhaustive()
    }
}

impl AppState {
    /// Create new application state.
    #[must_use]
    pub fn new(
        relay: Arc<BatchRelay>,
        clock: Arc<dyn Clock>,
        shutdown: CancellationToken,
        invocation_timeout: Duration,
    ) -> Self {
        Self {
            relay,
            clock,
            shutdown,
            invocation_timeout,
            channel: None,
        }
    }

    /// Exposes `channel` for event streaming.
    #[must_use]
    pub fn with_channel(mut self, channel: Option<ChannelSink>) -> Self {
        self.channel = channel;
        self
    }

    /// Relays one batch under the invocation deadline.
    ///
    /// The batch runs on its own task, so records already started reach a
    /// terminal state, and release their reservation on failure, even if the
    /// caller drops this future. It is cancelled when the deadline passes or
    /// the process shuts down, whichever comes first.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Relay` if the relay cannot build an aligned report,
    /// or `ApiError::RelayTask` if the relay task panicked.
    pub async fn relay_batch(
        &self,
        records: Arc<[ChangeRecord]>,
    ) -> Result<BatchReport, ApiError> {
        let relay = Arc::clone(&self.relay);
        let cancel = self.shutdown.child_token();
        let timeout = self.invocation_timeout;

        let task = tokio::spawn(async move {
            let deadline = tokio::spawn({
                let cancel = cancel.clone();
                async move {
                    tokio::time::sleep(timeout).await;
                    cancel.cancel();
                }
            });
            let report = relay.relay_batch(&records, &cancel).await;
            deadline.abort();
            report
        });

        Ok(task.await??)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cdc_relay_core::outcome::RelayOutcome;
    use cdc_relay_pipeline::domain::decoder::RecordDecoder;
    use cdc_relay_pipeline::domain::guard::IdempotencyGuard;
    use cdc_relay_pipeline::domain::mapping::EntityMapping;
    use cdc_relay_test_support::{
        FixedClock, InMemoryIdempotencyStore, RecordingSink, fixed_now, insert_record,
    };
    use serde_json::json;

    #[tokio::test]
    async fn test_dropped_request_still_finishes_started_records() {
        // Arrange
        let sink = Arc::new(RecordingSink::new());
        sink.delay_for("c-1", Duration::from_millis(100));
        let decoder = RecordDecoder::new(vec![EntityMapping::new("*", "record", "id")]).unwrap();
        let guard = IdempotencyGuard::new(
            Arc::new(InMemoryIdempotencyStore::new()),
            Duration::from_millis(100),
        );
        let clock = Arc::new(FixedClock(fixed_now()));
        let relay = BatchRelay::new(decoder, guard, sink.clone(), clock.clone());
        let state = AppState::new(
            Arc::new(relay),
            clock,
            CancellationToken::new(),
            Duration::from_secs(5),
        );
        let records: Arc<[ChangeRecord]> =
            vec![insert_record("customers", "c-1", "1", json!({ "id": "c-1" }))].into();

        // Act
        let dropped =
            tokio::time::timeout(Duration::from_millis(20), state.relay_batch(records.clone()))
                .await;
        tokio::time::sleep(Duration::from_millis(250)).await;
        let redelivered = state.relay_batch(records).await.unwrap();

        // Assert
        assert!(dropped.is_err());
        assert_eq!(sink.applied_events().len(), 1);
        assert_eq!(redelivered.outcomes(), &[RelayOutcome::SkippedDuplicate]);
    }
}
