//! Batch orchestration.

pub mod relay;
