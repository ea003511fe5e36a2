//! Shared test helpers for API integration tests.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use cdc_relay_core::sink::SinkAdapter;
use cdc_relay_pipeline::application::relay::BatchRelay;
use cdc_relay_pipeline::domain::decoder::RecordDecoder;
use cdc_relay_pipeline::domain::guard::IdempotencyGuard;
use cdc_relay_pipeline::domain::mapping::EntityMapping;
use cdc_relay_pipeline::sinks::channel::ChannelSink;
use cdc_relay_test_support::{
    FixedClock, InMemoryIdempotencyStore, RecordingDeadLetterHandler, fixed_now,
};
use http_body_util::BodyExt;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use cdc_relay_api::routes;
use cdc_relay_api::state::AppState;

/// Handles a test keeps after building the app.
pub struct TestApp {
    /// The full router, as served by `main.rs`.
    pub router: Router,
    /// Reservations taken by the guard.
    pub store: Arc<InMemoryIdempotencyStore>,
    /// Dead letters routed by the relay.
    pub dead_letters: Arc<RecordingDeadLetterHandler>,
    /// Process shutdown token.
    pub shutdown: CancellationToken,
}

/// Mappings for the `Orders` table plus a wildcard fallback.
pub fn mappings() -> Vec<EntityMapping> {
    vec![
        EntityMapping::new("Orders", "order", "pk").with_required_fields(["status"]),
        EntityMapping::new("*", "record", "id"),
    ]
}

/// Builds the app around `sink`, an in-memory guard, and a fixed clock.
pub fn build_test_app(sink: Arc<dyn SinkAdapter>) -> TestApp {
    build_test_app_with_channel(sink, None)
}

/// Builds the app with the channel sink active and exposed for streaming.
pub fn build_channel_app(channel: ChannelSink) -> TestApp {
    build_test_app_with_channel(Arc::new(channel.clone()), Some(channel))
}

fn build_test_app_with_channel(
    sink: Arc<dyn SinkAdapter>,
    channel: Option<ChannelSink>,
) -> TestApp {
    let store = Arc::new(InMemoryIdempotencyStore::new());
    let dead_letters = Arc::new(RecordingDeadLetterHandler::new());
    let clock = Arc::new(FixedClock(fixed_now()));
    let relay = BatchRelay::new(
        RecordDecoder::new(mappings()).unwrap(),
        IdempotencyGuard::new(store.clone(), Duration::from_millis(200)),
        sink,
        clock.clone(),
    )
    .with_dead_letters(dead_letters.clone());
    let shutdown = CancellationToken::new();
    let state = AppState::new(Arc::new(relay), clock, shutdown.clone(), Duration::from_secs(5))
        .with_channel(channel);

    TestApp {
        router: routes::build_router(state),
        store,
        dead_letters,
        shutdown,
    }
}

/// A DynamoDB Streams event for the `Orders` table.
pub fn stream_event(records: &[serde_json::Value]) -> serde_json::Value {
    serde_json::json!({ "Records": records })
}

/// One `Orders` stream record. `new_image` of `None` makes a REMOVE.
pub fn order_stream_record(
    event_name: &str,
    id: &str,
    sequence_number: &str,
    new_image: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut dynamodb = serde_json::json!({
        "Keys": { "pk": { "S": id } },
        "OldImage": { "pk": { "S": id }, "status": { "S": "NEW" } },
        "SequenceNumber": sequence_number,
        "ApproximateCreationDateTime": 1_768_471_200,
    });
    if let Some(image) = new_image {
        dynamodb["NewImage"] = image;
    }
    serde_json::json!({
        "eventID": sequence_number,
        "eventName": event_name,
        "eventSource": "aws:dynamodb",
        "eventSourceARN": "arn:aws:dynamodb:us-east-1:123456789012:table/Orders/stream/2026-01-15T10:00:00.000",
        "dynamodb": dynamodb,
    })
}

/// Send a POST request with a JSON body and return the response.
pub async fn post_json(
    app: Router,
    uri: &str,
    body: &serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body_bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body_bytes).unwrap();

    (status, json)
}

/// Send a GET request and return the response.
pub async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body_bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body_bytes).unwrap();

    (status, json)
}
