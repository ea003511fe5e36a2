//! Shared test mocks and record builders for the CDC fan-out relay.

mod clock;
mod dead_letter;
mod idempotency;
mod records;
mod sink;

pub use clock::{FixedClock, fixed_now};
pub use dead_letter::{FailingDeadLetterHandler, RecordingDeadLetterHandler};
pub use idempotency::{
    FlakyIdempotencyStore, HangingIdempotencyStore, InMemoryIdempotencyStore,
    UnavailableIdempotencyStore,
};
pub use records::{image, insert_record, modify_record, remove_record};
pub use sink::{HangingSink, RecordingSink};
