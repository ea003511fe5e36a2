//! End-to-end batch scenarios against in-memory stores and sinks.

use std::sync::Arc;
use std::time::Duration;

use cdc_relay_core::dedup::DedupKey;
use cdc_relay_core::error::{DecodeError, SinkError};
use cdc_relay_core::idempotency::IdempotencyStore;
use cdc_relay_core::outcome::{FailureReason, RelayOutcome};
use cdc_relay_core::record::ChangeRecord;
use cdc_relay_core::sink::SinkAdapter;
use cdc_relay_pipeline::application::relay::{BatchRelay, RelayOptions};
use cdc_relay_pipeline::domain::decoder::RecordDecoder;
use cdc_relay_pipeline::domain::guard::IdempotencyGuard;
use cdc_relay_pipeline::domain::mapping::EntityMapping;
use cdc_relay_test_support::{
    FixedClock, FlakyIdempotencyStore, HangingSink, InMemoryIdempotencyStore,
    RecordingDeadLetterHandler, RecordingSink, fixed_now, insert_record, modify_record,
    remove_record,
};
use serde_json::json;
use tokio_util::sync::CancellationToken;

const GUARD_TIMEOUT: Duration = Duration::from_millis(50);

fn decoder() -> RecordDecoder {
    RecordDecoder::new(vec![
        EntityMapping::new("orders", "order", "orderId").with_required_fields(["status"]),
    ])
    .unwrap()
}

fn relay(store: Arc<dyn IdempotencyStore>, sink: Arc<dyn SinkAdapter>) -> BatchRelay {
    BatchRelay::new(
        decoder(),
        IdempotencyGuard::new(store, GUARD_TIMEOUT),
        sink,
        Arc::new(FixedClock(fixed_now())),
    )
}

fn order(id: &str, seq: &str, status: &str) -> ChangeRecord {
    insert_record("orders", id, seq, json!({ "orderId": id, "status": status }))
}

/// Insert (valid), Modify missing a required field, Remove (valid).
fn three_record_batch() -> Vec<ChangeRecord> {
    vec![
        order("o-1", "100", "NEW"),
        modify_record(
            "orders",
            "o-2",
            "101",
            json!({ "orderId": "o-2", "status": "NEW" }),
            json!({ "orderId": "o-2" }),
        ),
        remove_record(
            "orders",
            "o-3",
            "102",
            json!({ "orderId": "o-3", "status": "NEW" }),
        ),
    ]
}

#[tokio::test]
async fn test_partial_failure_reports_each_record_in_order() {
    // Arrange
    let sink = Arc::new(RecordingSink::new());
    let relay = relay(Arc::new(InMemoryIdempotencyStore::new()), sink.clone());

    // Act
    let report = relay
        .relay_batch(&three_record_batch(), &CancellationToken::new())
        .await
        .unwrap();

    // Assert
    assert_eq!(
        report.outcomes(),
        &[
            RelayOutcome::Forwarded,
            RelayOutcome::Failed(FailureReason::Decode(DecodeError::MissingField(
                "status".to_owned()
            ))),
            RelayOutcome::Forwarded,
        ]
    );
    assert_eq!(report.failed_indices(), vec![1]);
    assert_eq!(sink.apply_calls(), 2);
    let types: Vec<String> = sink
        .applied_events()
        .into_iter()
        .map(|e| e.event_type)
        .collect();
    assert_eq!(types, vec!["order.created", "order.deleted"]);
}

#[tokio::test]
async fn test_redelivered_batch_is_skipped_without_sink_calls() {
    // Arrange
    let sink = Arc::new(RecordingSink::new());
    let relay = relay(Arc::new(InMemoryIdempotencyStore::new()), sink.clone());
    let batch = vec![order("o-1", "100", "NEW"), order("o-2", "101", "NEW")];
    relay
        .relay_batch(&batch, &CancellationToken::new())
        .await
        .unwrap();

    // Act
    let report = relay
        .relay_batch(&batch, &CancellationToken::new())
        .await
        .unwrap();

    // Assert
    assert_eq!(
        report.outcomes(),
        &[RelayOutcome::SkippedDuplicate, RelayOutcome::SkippedDuplicate]
    );
    assert_eq!(sink.apply_calls(), 2);
    assert_eq!(report.summary().skipped, 2);
}

#[tokio::test]
async fn test_guard_outage_fails_only_affected_record() {
    // Arrange
    let store = Arc::new(FlakyIdempotencyStore::new());
    let sink = Arc::new(RecordingSink::new());
    let relay = relay(store.clone(), sink.clone());
    let batch = vec![
        order("o-1", "100", "NEW"),
        order("o-2", "101", "NEW"),
        order("o-3", "102", "NEW"),
    ];
    store.hang_on(DedupKey::for_record(&batch[1]));

    // Act
    let report = relay
        .relay_batch(&batch, &CancellationToken::new())
        .await
        .unwrap();

    // Assert
    assert_eq!(report.outcomes()[0], RelayOutcome::Forwarded);
    assert_eq!(
        report.outcomes()[1].failure().map(FailureReason::code),
        Some("guard_unavailable")
    );
    assert_eq!(report.outcomes()[2], RelayOutcome::Forwarded);
    assert_eq!(sink.apply_calls(), 2);

    // Redelivery after the store recovers forwards the missed record once.
    store.recover();
    let retry = relay
        .relay_batch(&batch[1..2], &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(retry.outcomes(), &[RelayOutcome::Forwarded]);
    assert_eq!(sink.apply_calls(), 3);
}

#[tokio::test]
async fn test_transient_sink_failure_releases_reservation_for_retry() {
    // Arrange
    let store = Arc::new(InMemoryIdempotencyStore::new());
    let sink = Arc::new(RecordingSink::new());
    sink.fail_next_for("o-1", SinkError::Transient("throttled".to_owned()));
    let relay = relay(store.clone(), sink.clone());
    let batch = vec![order("o-1", "100", "NEW")];

    // Act
    let first = relay
        .relay_batch(&batch, &CancellationToken::new())
        .await
        .unwrap();
    let released = !store.contains(&DedupKey::for_record(&batch[0]));
    let second = relay
        .relay_batch(&batch, &CancellationToken::new())
        .await
        .unwrap();

    // Assert
    assert_eq!(
        first.outcomes(),
        &[RelayOutcome::Failed(FailureReason::Sink(SinkError::Transient(
            "throttled".to_owned()
        )))]
    );
    assert!(released);
    assert_eq!(second.outcomes(), &[RelayOutcome::Forwarded]);
    assert_eq!(sink.applied_events().len(), 1);
}

#[tokio::test]
async fn test_permanent_sink_failure_is_dead_lettered_and_released() {
    // Arrange
    let store = Arc::new(InMemoryIdempotencyStore::new());
    let sink = Arc::new(RecordingSink::new());
    sink.fail_next_for("o-1", SinkError::Permanent("value too long".to_owned()));
    let dead_letters = Arc::new(RecordingDeadLetterHandler::new());
    let relay = relay(store.clone(), sink).with_dead_letters(dead_letters.clone());
    let batch = vec![order("o-1", "100", "NEW")];

    // Act
    let report = relay
        .relay_batch(&batch, &CancellationToken::new())
        .await
        .unwrap();

    // Assert
    assert!(report.has_failures());
    assert!(store.is_empty());
    let letters = dead_letters.letters();
    assert_eq!(letters.len(), 1);
    assert_eq!(letters[0].failure_code, "sink_permanent");
    assert_eq!(letters[0].sequence_token, "100");
}

#[tokio::test]
async fn test_cancelled_invocation_attempts_nothing() {
    // Arrange
    let store = Arc::new(InMemoryIdempotencyStore::new());
    let sink = Arc::new(RecordingSink::new());
    let relay = relay(store.clone(), sink.clone());
    let cancel = CancellationToken::new();
    cancel.cancel();

    // Act
    let report = relay
        .relay_batch(&three_record_batch(), &cancel)
        .await
        .unwrap();

    // Assert
    assert!(
        report
            .outcomes()
            .iter()
            .all(|o| *o == RelayOutcome::Failed(FailureReason::NotAttempted))
    );
    assert!(store.is_empty());
    assert_eq!(sink.apply_calls(), 0);
}

#[tokio::test]
async fn test_concurrent_relay_preserves_input_order() {
    // Arrange
    let sink = Arc::new(RecordingSink::new());
    let relay = relay(Arc::new(InMemoryIdempotencyStore::new()), sink.clone()).with_options(
        RelayOptions {
            max_concurrency: 4,
            ..RelayOptions::default()
        },
    );
    let batch: Vec<ChangeRecord> = (0..10)
        .map(|i| {
            if i % 3 == 0 {
                let id = format!("o-{i}");
                insert_record("orders", &id, &i.to_string(), json!({ "orderId": id }))
            } else {
                order(&format!("o-{i}"), &i.to_string(), "NEW")
            }
        })
        .collect();

    // Act
    let report = relay
        .relay_batch(&batch, &CancellationToken::new())
        .await
        .unwrap();

    // Assert
    assert_eq!(report.len(), 10);
    assert_eq!(report.failed_indices(), vec![0, 3, 6, 9]);
    assert_eq!(report.summary().forwarded, 6);
}

#[tokio::test]
async fn test_hanging_sink_times_out_as_transient() {
    // Arrange
    let store = Arc::new(InMemoryIdempotencyStore::new());
    let relay = relay(store.clone(), Arc::new(HangingSink)).with_options(RelayOptions {
        max_concurrency: 1,
        sink_timeout: Duration::from_millis(50),
    });
    let batch = vec![order("o-1", "100", "NEW")];

    // Act
    let report = relay
        .relay_batch(&batch, &CancellationToken::new())
        .await
        .unwrap();

    // Assert
    assert_eq!(
        report.outcomes(),
        &[RelayOutcome::Failed(FailureReason::Sink(SinkError::timed_out(
            Duration::from_millis(50)
        )))]
    );
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_modify_then_remove_forward_in_order() {
    // Arrange
    let sink = Arc::new(RecordingSink::new());
    let relay = relay(Arc::new(InMemoryIdempotencyStore::new()), sink.clone());
    let batch = vec![
        modify_record(
            "orders",
            "o-1",
            "200",
            json!({ "orderId": "o-1", "status": "NEW" }),
            json!({ "orderId": "o-1", "status": "SHIPPED" }),
        ),
        remove_record(
            "orders",
            "o-1",
            "201",
            json!({ "orderId": "o-1", "status": "SHIPPED" }),
        ),
    ];

    // Act
    relay
        .relay_batch(&batch, &CancellationToken::new())
        .await
        .unwrap();

    // Assert
    let types: Vec<String> = sink
        .applied_events()
        .into_iter()
        .map(|e| e.event_type)
        .collect();
    assert_eq!(types, vec!["order.updated", "order.deleted"]);
}

#[tokio::test]
async fn test_redelivered_poison_record_keeps_one_dead_letter() {
    // Arrange
    let dead_letters = Arc::new(RecordingDeadLetterHandler::new());
    let relay = relay(
        Arc::new(InMemoryIdempotencyStore::new()),
        Arc::new(RecordingSink::new()),
    )
    .with_dead_letters(dead_letters.clone());
    let poison = vec![insert_record(
        "orders",
        "o-1",
        "100",
        json!({ "orderId": "o-1" }),
    )];

    // Act
    for _ in 0..2 {
        relay
            .relay_batch(&poison, &CancellationToken::new())
            .await
            .unwrap();
    }

    // Assert
    assert_eq!(dead_letters.letters().len(), 1);
    assert_eq!(dead_letters.attempts(&DedupKey::for_record(&poison[0])), 2);
}

#[tokio::test]
async fn test_concurrent_relay_applies_one_partition_in_order() {
    // Arrange
    let sink = Arc::new(RecordingSink::new());
    sink.delay_for("o-1", Duration::from_millis(30));
    let relay = relay(Arc::new(InMemoryIdempotencyStore::new()), sink.clone()).with_options(
        RelayOptions {
            max_concurrency: 4,
            ..RelayOptions::default()
        },
    );
    let batch = vec![
        modify_record(
            "orders",
            "o-1",
            "300",
            json!({ "orderId": "o-1", "status": "NEW" }),
            json!({ "orderId": "o-1", "status": "PAID" }),
        ),
        order("o-2", "301", "NEW"),
        modify_record(
            "orders",
            "o-1",
            "302",
            json!({ "orderId": "o-1", "status": "PAID" }),
            json!({ "orderId": "o-1", "status": "SHIPPED" }),
        ),
    ];

    // Act
    let report = relay
        .relay_batch(&batch, &CancellationToken::new())
        .await
        .unwrap();

    // Assert
    assert_eq!(report.summary().forwarded, 3);
    let o1_tokens: Vec<String> = sink
        .applied_events()
        .into_iter()
        .filter(|e| e.entity_id == "o-1")
        .map(|e| e.sequence_token)
        .collect();
    assert_eq!(o1_tokens, vec!["300", "302"]);
    assert_eq!(sink.applied_events()[0].entity_id, "o-2");
}
