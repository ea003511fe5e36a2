//! Sink adapters that need nothing beyond the async runtime.

pub mod channel;
