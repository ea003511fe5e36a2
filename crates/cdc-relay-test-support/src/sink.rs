//! Test sinks: mock `SinkAdapter` implementations.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use cdc_relay_core::error::SinkError;
use cdc_relay_core::event::DomainEvent;
use cdc_relay_core::sink::SinkAdapter;

/// A sink that records every applied event. Failures can be scripted per
/// entity id; each scripted failure is returned once, in order. Applies can
/// also be slowed down per entity id.
#[derive(Debug, Default)]
pub struct RecordingSink {
    applied: Mutex<Vec<DomainEvent>>,
    attempts: Mutex<usize>,
    scripted: Mutex<HashMap<String, VecDeque<SinkError>>>,
    delays: Mutex<HashMap<String, Duration>>,
    shut_down: Mutex<bool>,
}

impl RecordingSink {
    /// Creates a sink that accepts everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `error` for the next apply of `entity_id`.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn fail_next_for(&self, entity_id: &str, error: SinkError) {
        self.scripted
            .lock()
            .unwrap()
            .entry(entity_id.to_owned())
            .or_default()
            .push_back(error);
    }

    /// Makes every apply of `entity_id` take at least `delay`.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn delay_for(&self, entity_id: &str, delay: Duration) {
        self.delays
            .lock()
            .unwrap()
            .insert(entity_id.to_owned(), delay);
    }

    /// Returns a snapshot of successfully applied events.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn applied_events(&self) -> Vec<DomainEvent> {
        self.applied.lock().unwrap().clone()
    }

    /// Number of `apply` calls, successful or not.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn apply_calls(&self) -> usize {
        *self.attempts.lock().unwrap()
    }

    /// Returns `true` once `shutdown` has been called.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn is_shut_down(&self) -> bool {
        *self.shut_down.lock().unwrap()
    }
}

#[async_trait]
impl SinkAdapter for RecordingSink {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn apply(&self, event: &DomainEvent) -> Result<(), SinkError> {
        *self.attempts.lock().unwrap() += 1;

        let delay = self.delays.lock().unwrap().get(&event.entity_id).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let scripted = self
            .scripted
            .lock()
            .unwrap()
            .get_mut(&event.entity_id)
            .and_then(VecDeque::pop_front);
        if let Some(error) = scripted {
            return Err(error);
        }

        self.applied.lock().unwrap().push(event.clone());
        Ok(())
    }

    async fn shutdown(&self) {
        *self.shut_down.lock().unwrap() = true;
    }
}

/// A sink whose `apply` never completes. Exercises caller timeouts.
#[derive(Debug)]
pub struct HangingSink;

#[async_trait]
impl SinkAdapter for HangingSink {
    fn name(&self) -> &'static str {
        "hanging"
    }

    async fn apply(&self, _event: &DomainEvent) -> Result<(), SinkError> {
        std::future::pending().await
    }
}
