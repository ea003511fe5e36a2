//! Test dead-letter handlers.

use std::sync::Mutex;

use async_trait::async_trait;
use cdc_relay_core::dead_letter::{DeadLetter, DeadLetterHandler};
use cdc_relay_core::dedup::DedupKey;
use cdc_relay_core::error::DeadLetterError;

/// A handler that keeps one dead letter per dedup key, like the Postgres
/// queue: routing the same key again replaces the letter and counts the
/// attempt.
#[derive(Debug, Default)]
pub struct RecordingDeadLetterHandler {
    letters: Mutex<Vec<(DeadLetter, u32)>>,
}

impl RecordingDeadLetterHandler {
    /// Creates an empty handler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of routed dead letters.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn letters(&self) -> Vec<DeadLetter> {
        self.letters
            .lock()
            .unwrap()
            .iter()
            .map(|(letter, _)| letter.clone())
            .collect()
    }

    /// Number of times `key` was routed, or 0 if it never was.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn attempts(&self, key: &DedupKey) -> u32 {
        self.letters
            .lock()
            .unwrap()
            .iter()
            .find(|(letter, _)| letter.dedup_key == *key)
            .map_or(0, |(_, attempts)| *attempts)
    }
}

#[async_trait]
impl DeadLetterHandler for RecordingDeadLetterHandler {
    async fn route(&self, letter: &DeadLetter) -> Result<(), DeadLetterError> {
        let mut letters = self.letters.lock().unwrap();
        match letters
            .iter_mut()
            .find(|(existing, _)| existing.dedup_key == letter.dedup_key)
        {
            Some((existing, attempts)) => {
                *existing = letter.clone();
                *attempts += 1;
            }
            None => letters.push((letter.clone(), 1)),
        }
        Ok(())
    }
}

/// A handler that always fails.
#[derive(Debug)]
pub struct FailingDeadLetterHandler;

#[async_trait]
impl DeadLetterHandler for FailingDeadLetterHandler {
    async fn route(&self, _letter: &DeadLetter) -> Result<(), DeadLetterError> {
        Err(DeadLetterError::Unavailable("queue offline".into()))
    }
}
