//! PostgreSQL adapters for the CDC fan-out relay.

pub mod dead_letter_queue;
pub mod error;
pub mod idempotency_store;
pub mod key_value_sink;
pub mod search_index_sink;

use sqlx::PgPool;
use sqlx::migrate::{MigrateError, Migrator};

/// Embedded schema migrations for every table the adapters use.
pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

/// Applies pending migrations.
///
/// # Errors
///
/// Returns `MigrateError` if a migration fails or the applied history
/// diverges from the embedded set.
pub async fn run_migrations(pool: &PgPool) -> Result<(), MigrateError> {
    MIGRATOR.run(pool).await
}
