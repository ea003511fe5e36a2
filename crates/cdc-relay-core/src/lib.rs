//! CDC Relay Core: shared data model and ports.
//!
//! This crate defines the change-record and domain-event types, the per-record
//! outcome model, and the traits that infrastructure adapters implement
//! (idempotency store, sink, dead-letter handler). It contains no
//! infrastructure code.

pub mod clock;
pub mod dead_letter;
pub mod dedup;
pub mod error;
pub mod event;
pub mod idempotency;
pub mod outcome;
pub mod record;
pub mod sink;
