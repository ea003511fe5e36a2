//! Decoding and deduplication.

pub mod decoder;
pub mod guard;
pub mod mapping;
