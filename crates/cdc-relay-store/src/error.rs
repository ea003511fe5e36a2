//! Mapping of sqlx errors onto relay error types.

use cdc_relay_core::error::{DeadLetterError, GuardError, SinkError};

/// SQLSTATE classes that no retry can fix: data exceptions (22), integrity
/// constraint violations (23), and syntax or access rule violations (42).
const PERMANENT_SQLSTATE_CLASSES: [&str; 3] = ["22", "23", "42"];

/// Classifies a failed sink write.
#[must_use]
pub fn classify(err: &sqlx::Error) -> SinkError {
    let permanent = match err {
        sqlx::Error::Database(db) => db.code().is_some_and(|code| {
            PERMANENT_SQLSTATE_CLASSES
                .iter()
                .any(|class| code.starts_with(class))
        }),
        sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::Decode(_)
        | sqlx::Error::Encode(_)
        | sqlx::Error::TypeNotFound { .. } => true,
        _ => false,
    };

    if permanent {
        SinkError::Permanent(err.to_string())
    } else {
        SinkError::Transient(err.to_string())
    }
}

pub(crate) fn guard_unavailable(err: &sqlx::Error) -> GuardError {
    GuardError::Unavailable(err.to_string())
}

pub(crate) fn dead_letter_unavailable(err: &sqlx::Error) -> DeadLetterError {
    DeadLetterError::Unavailable(err.to_string())
}
