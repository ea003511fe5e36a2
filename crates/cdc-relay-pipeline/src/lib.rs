//! CDC fan-out relay pipeline.
//!
//! Decodes change records into domain events, guards against redelivery with
//! an idempotency store, forwards events to a sink, and reports per-record
//! outcomes so the upstream source redelivers only failed records.

pub mod application;
pub mod domain;
pub mod sinks;
