//! Error types for decoding, forwarding, and reservation.

use std::time::Duration;

use thiserror::Error;

/// A record could not be turned into a domain event.
///
/// Decode errors are permanent: retrying the identical record payload can
/// never succeed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The change kind is not one of Insert, Modify, Remove.
    #[error("unsupported change kind: {0}")]
    UnsupportedKind(String),

    /// A required field is absent from the image it must be read from.
    #[error("missing required field: {0}")]
    MissingField(String),

    /// The image a change kind depends on is absent.
    #[error("{kind} record has no {side} image")]
    MissingImage {
        /// The change kind of the record.
        kind: String,
        /// Which image was expected (`before` or `after`).
        side: &'static str,
    },

    /// A field is present but has an unusable value.
    #[error("invalid field {name}: {reason}")]
    InvalidField {
        /// The offending field.
        name: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// No entity mapping covers the record's source.
    #[error("no entity mapping for source {0}")]
    UnmappedSource(String),
}

/// A sink could not apply a domain event.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SinkError {
    /// Safe to retry; the record is redelivered upstream.
    #[error("transient sink failure: {0}")]
    Transient(String),

    /// The event can never be applied; routed for manual inspection.
    #[error("permanent sink failure: {0}")]
    Permanent(String),
}

impl SinkError {
    /// Returns `true` if a retry may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    /// Builds the error reported when `apply` exceeds its time budget.
    #[must_use]
    pub fn timed_out(after: Duration) -> Self {
        Self::Transient(format!("apply timed out after {}ms", after.as_millis()))
    }
}

/// The idempotency store could not be reached or did not answer in time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GuardError {
    /// The backing store failed the request.
    #[error("idempotency store unavailable: {0}")]
    Unavailable(String),

    /// The backing store did not answer within the caller's budget.
    #[error("idempotency store timed out after {}ms", .0.as_millis())]
    Timeout(Duration),
}

/// A dead letter could not be routed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeadLetterError {
    /// The dead-letter destination failed the request.
    #[error("dead-letter destination unavailable: {0}")]
    Unavailable(String),
}

/// Programming errors that abort a whole relay attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RelayError {
    /// The report does not line up with the batch it describes.
    #[error("batch report has {actual} outcomes for a batch of {expected} records")]
    ReportMismatch {
        /// Number of records in the batch.
        expected: usize,
        /// Number of outcomes produced.
        actual: usize,
    },
}
