//! Batch relay orchestrator.
//!
//! Each record moves through decode, reserve, and apply independently. A
//! failing record never aborts the batch; its outcome is reported so the
//! upstream source redelivers only that record. Records may run with bounded
//! parallelism, but the report always follows input order.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use cdc_relay_core::clock::Clock;
use cdc_relay_core::dead_letter::{DeadLetter, DeadLetterHandler};
use cdc_relay_core::dedup::DedupKey;
use cdc_relay_core::error::{RelayError, SinkError};
use cdc_relay_core::idempotency::Reservation;
use cdc_relay_core::outcome::{BatchReport, FailureReason, RelayOutcome};
use cdc_relay_core::record::ChangeRecord;
use cdc_relay_core::sink::SinkAdapter;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::domain::decoder::RecordDecoder;
use crate::domain::guard::IdempotencyGuard;

/// Tuning for one relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayOptions {
    /// Partition keys relayed at once within a batch. Values below 1 act as
    /// 1. Records of one partition key are always applied in order.
    pub max_concurrency: usize,
    /// Budget for one sink `apply` (and one dead-letter route).
    pub sink_timeout: Duration,
}

impl Default for RelayOptions {
    fn default() -> Self {
        Self {
            max_concurrency: 1,
            sink_timeout: Duration::from_secs(5),
        }
    }
}

/// Relays batches of change records to a sink.
pub struct BatchRelay {
    decoder: RecordDecoder,
    guard: IdempotencyGuard,
    sink: Arc<dyn SinkAdapter>,
    dead_letters: Option<Arc<dyn DeadLetterHandler>>,
    clock: Arc<dyn Clock>,
    options: RelayOptions,
}

impl std::fmt::Debug for BatchRelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchRelay")
            .field("sink", &self.sink.name())
            .field("dead_letters", &self.dead_letters.is_some())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl BatchRelay {
    /// Creates a relay with default options and no dead-letter handler.
    #[must_use]
    pub fn new(
        decoder: RecordDecoder,
        guard: IdempotencyGuard,
        sink: Arc<dyn SinkAdapter>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            decoder,
            guard,
            sink,
            dead_letters: None,
            clock,
            options: RelayOptions::default(),
        }
    }

    /// Routes decode failures and permanent sink failures to `handler`.
    #[must_use]
    pub fn with_dead_letters(mut self, handler: Arc<dyn DeadLetterHandler>) -> Self {
        self.dead_letters = Some(handler);
        self
    }

    /// Replaces the relay options.
    #[must_use]
    pub fn with_options(mut self, options: RelayOptions) -> Self {
        self.options = options;
        self
    }

    /// The sink this relay forwards to.
    #[must_use]
    pub fn sink(&self) -> &Arc<dyn SinkAdapter> {
        &self.sink
    }

    /// Relays `records` and reports one outcome per record, in input order.
    ///
    /// Records that share a partition key are applied one after another, in
    /// input order, so a sink never sees an older image after a newer one.
    /// Records of different partition keys run with up to
    /// `max_concurrency` in flight.
    ///
    /// Records that have not started when `cancel` fires are reported as
    /// `Failed(NotAttempted)`; records already in flight finish normally.
    /// Dropping the returned future instead can leave a record reserved but
    /// never applied, so callers that may be dropped should run it on its
    /// own task.
    ///
    /// # Errors
    ///
    /// Returns `RelayError` only if the report cannot be aligned with the
    /// batch. Per-record failures are outcomes, not errors.
    #[instrument(skip_all, fields(batch_size = records.len(), sink = self.sink.name()))]
    pub async fn relay_batch(
        &self,
        records: &[ChangeRecord],
        cancel: &CancellationToken,
    ) -> Result<BatchReport, RelayError> {
        let pending: Vec<_> = partition_chains(records, self.options.max_concurrency)
            .into_iter()
            .map(|chain| self.relay_chain(chain, cancel))
            .collect();

        let mut indexed: Vec<(usize, RelayOutcome)> = futures::stream::iter(pending)
            .buffer_unordered(self.options.max_concurrency.max(1))
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .flatten()
            .collect();
        indexed.sort_unstable_by_key(|(index, _)| *index);
        let outcomes = indexed.into_iter().map(|(_, outcome)| outcome).collect();

        let report = BatchReport::from_outcomes(records.len(), outcomes)?;
        let summary = report.summary();
        info!(
            forwarded = summary.forwarded,
            skipped = summary.skipped,
            failed = summary.failed,
            "relayed batch"
        );
        Ok(report)
    }

    async fn relay_chain(
        &self,
        chain: Vec<(usize, &ChangeRecord)>,
        cancel: &CancellationToken,
    ) -> Vec<(usize, RelayOutcome)> {
        let mut outcomes = Vec::with_capacity(chain.len());
        for (index, record) in chain {
            outcomes.push((index, self.relay_record(index, record, cancel).await));
        }
        outcomes
    }

    async fn relay_record(
        &self,
        index: usize,
        record: &ChangeRecord,
        cancel: &CancellationToken,
    ) -> RelayOutcome {
        if cancel.is_cancelled() {
            debug!(index, "invocation cancelled before record started");
            return RelayOutcome::Failed(FailureReason::NotAttempted);
        }

        let key = DedupKey::for_record(record);
        let outcome = self.attempt(record, &key).await;

        match &outcome {
            RelayOutcome::Forwarded => {
                debug!(index, dedup_key = %key, "record forwarded");
            }
            RelayOutcome::SkippedDuplicate => {
                debug!(index, dedup_key = %key, "record skipped as duplicate");
            }
            RelayOutcome::Failed(reason) => {
                warn!(
                    index,
                    dedup_key = %key,
                    sequence_token = %record.sequence_token,
                    code = reason.code(),
                    error = %reason,
                    "record failed"
                );
                if reason.needs_inspection() {
                    self.dead_letter(record, key, reason).await;
                }
            }
        }
        outcome
    }

    async fn attempt(&self, record: &ChangeRecord, key: &DedupKey) -> RelayOutcome {
        let event = match self.decoder.decode(record) {
            Ok(event) => event,
            Err(err) => return RelayOutcome::Failed(FailureReason::Decode(err)),
        };

        match self.guard.check_and_reserve(key).await {
            Reservation::Reserved => {}
            Reservation::AlreadyProcessed => return RelayOutcome::SkippedDuplicate,
            Reservation::GuardUnavailable(err) => {
                return RelayOutcome::Failed(FailureReason::GuardUnavailable(err.to_string()));
            }
        }

        let timeout = self.options.sink_timeout;
        let applied = tokio::time::timeout(timeout, self.sink.apply(&event))
            .await
            .unwrap_or_else(|_| Err(SinkError::timed_out(timeout)));

        match applied {
            Ok(()) => RelayOutcome::Forwarded,
            Err(err) => {
                if let Err(release_err) = self.guard.release(key).await {
                    error!(
                        dedup_key = %key,
                        error = %release_err,
                        "failed to release reservation after sink failure"
                    );
                }
                RelayOutcome::Failed(FailureReason::Sink(err))
            }
        }
    }

    async fn dead_letter(&self, record: &ChangeRecord, key: DedupKey, reason: &FailureReason) {
        let Some(handler) = &self.dead_letters else {
            return;
        };
        let letter = DeadLetter::new(record, key, reason, self.clock.now());
        match tokio::time::timeout(self.options.sink_timeout, handler.route(&letter)).await {
            Ok(Ok(())) => {
                info!(dedup_key = %letter.dedup_key, code = letter.failure_code, "record dead-lettered");
            }
            Ok(Err(err)) => {
                error!(dedup_key = %letter.dedup_key, error = %err, "dead-letter routing failed");
            }
            Err(_) => {
                error!(dedup_key = %letter.dedup_key, "dead-letter routing timed out");
            }
        }
    }
}

/// Splits `records` into chains that may run concurrently. Each chain holds
/// one partition key's records in input order. Sequential relays get a
/// single chain so the whole batch runs in input order.
fn partition_chains(
    records: &[ChangeRecord],
    max_concurrency: usize,
) -> Vec<Vec<(usize, &ChangeRecord)>> {
    if max_concurrency <= 1 {
        return vec![records.iter().enumerate().collect()];
    }

    let mut chains: Vec<Vec<(usize, &ChangeRecord)>> = Vec::new();
    let mut chain_of: HashMap<&str, usize> = HashMap::new();
    for (index, record) in records.iter().enumerate() {
        let chain = *chain_of
            .entry(record.partition_key.as_str())
            .or_insert_with(|| {
                chains.push(Vec::new());
                chains.len() - 1
            });
        chains[chain].push((index, record));
    }
    chains
}
