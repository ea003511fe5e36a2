//! Per-record relay outcomes and the batch report.

use thiserror::Error;

use crate::error::{DecodeError, RelayError, SinkError};

/// Why a record was reported as failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FailureReason {
    /// The record could not be decoded.
    #[error("decode failed: {0}")]
    Decode(DecodeError),

    /// The idempotency store could not confirm a reservation.
    #[error("guard unavailable: {0}")]
    GuardUnavailable(String),

    /// The sink rejected or could not complete the write.
    #[error("sink failed: {0}")]
    Sink(SinkError),

    /// The invocation was cancelled before this record started.
    #[error("not attempted")]
    NotAttempted,
}

impl FailureReason {
    /// Machine-readable failure code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Decode(DecodeError::UnsupportedKind(_)) => "unsupported_kind",
            Self::Decode(DecodeError::MissingField(_)) => "missing_field",
            Self::Decode(DecodeError::MissingImage { .. }) => "missing_image",
            Self::Decode(DecodeError::InvalidField { .. }) => "invalid_field",
            Self::Decode(DecodeError::UnmappedSource(_)) => "unmapped_source",
            Self::GuardUnavailable(_) => "guard_unavailable",
            Self::Sink(SinkError::Transient(_)) => "sink_transient",
            Self::Sink(SinkError::Permanent(_)) => "sink_permanent",
            Self::NotAttempted => "not_attempted",
        }
    }

    /// Returns `true` if redelivering the record may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Decode(_) | Self::Sink(SinkError::Permanent(_)) => false,
            Self::GuardUnavailable(_) | Self::Sink(SinkError::Transient(_)) | Self::NotAttempted => {
                true
            }
        }
    }

    /// Returns `true` if the record belongs on the dead-letter path.
    #[must_use]
    pub fn needs_inspection(&self) -> bool {
        !self.is_retryable()
    }
}

/// Result of relaying one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayOutcome {
    /// The event was applied at the sink.
    Forwarded,
    /// The record was already processed; nothing was applied.
    SkippedDuplicate,
    /// The record failed and should be redelivered.
    Failed(FailureReason),
}

impl RelayOutcome {
    /// Returns `true` for `Failed`.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    /// Returns the failure reason, if any.
    #[must_use]
    pub fn failure(&self) -> Option<&FailureReason> {
        match self {
            Self::Failed(reason) => Some(reason),
            Self::Forwarded | Self::SkippedDuplicate => None,
        }
    }
}

/// Counts of outcomes in a report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    /// Records applied at the sink.
    pub forwarded: usize,
    /// Records skipped as duplicates.
    pub skipped: usize,
    /// Records reported as failed.
    pub failed: usize,
}

/// Outcomes aligned with the input batch: `outcomes()[i]` describes record `i`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReport {
    outcomes: Vec<RelayOutcome>,
}

impl BatchReport {
    /// Builds a report for a batch of `batch_len` records.
    ///
    /// # Errors
    ///
    /// Returns `RelayError::ReportMismatch` if the outcome count differs from
    /// the batch length.
    pub fn from_outcomes(
        batch_len: usize,
        outcomes: Vec<RelayOutcome>,
    ) -> Result<Self, RelayError> {
        if outcomes.len() != batch_len {
            return Err(RelayError::ReportMismatch {
                expected: batch_len,
                actual: outcomes.len(),
            });
        }
        Ok(Self { outcomes })
    }

    /// Outcomes in input order.
    #[must_use]
    pub fn outcomes(&self) -> &[RelayOutcome] {
        &self.outcomes
    }

    /// Number of records covered.
    #[must_use]
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    /// Returns `true` for an empty batch.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// Indices of records the upstream source should redeliver.
    #[must_use]
    pub fn failed_indices(&self) -> Vec<usize> {
        self.outcomes
            .iter()
            .enumerate()
            .filter(|(_, outcome)| outcome.is_failed())
            .map(|(index, _)| index)
            .collect()
    }

    /// Returns `true` if any record failed.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.outcomes.iter().any(RelayOutcome::is_failed)
    }

    /// Tallies outcomes by kind.
    #[must_use]
    pub fn summary(&self) -> BatchSummary {
        self.outcomes
            .iter()
            .fold(BatchSummary::default(), |mut summary, outcome| {
                match outcome {
                    RelayOutcome::Forwarded => summary.forwarded += 1,
                    RelayOutcome::SkippedDuplicate => summary.skipped += 1,
                    RelayOutcome::Failed(_) => summary.failed += 1,
                }
                summary
            })
    }
}
