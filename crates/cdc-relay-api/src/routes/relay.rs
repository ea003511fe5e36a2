//! Batch relay endpoints.

use std::sync::Arc;

use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::{Json, Router, routing::post};
use cdc_relay_core::record::ChangeRecord;
use tracing::{info, instrument};

use crate::error::ApiError;
use crate::state::AppState;
use crate::wire::{BatchRequest, BatchResponse, DynamoDbStreamEvent};

/// POST /batches
#[instrument(skip_all, fields(batch_size = tracing::field::Empty))]
async fn relay_batch(
    State(state): State<AppState>,
    request: Result<Json<BatchRequest>, JsonRejection>,
) -> Result<Json<BatchResponse>, ApiError> {
    let Json(request) = request?;
    let records: Arc<[ChangeRecord]> = request.records.into();
    tracing::Span::current().record("batch_size", records.len());

    let report = state.relay_batch(Arc::clone(&records)).await?;
    Ok(Json(BatchResponse::new(&records, &report)))
}

/// POST /dynamodb-stream
#[instrument(skip_all, fields(batch_size = tracing::field::Empty))]
async fn relay_dynamodb_stream(
    State(state): State<AppState>,
    event: Result<Json<DynamoDbStreamEvent>, JsonRejection>,
) -> Result<Json<BatchResponse>, ApiError> {
    let Json(event) = event?;
    let received_at = state.clock.now();
    let records: Arc<[ChangeRecord]> = event
        .records
        .into_iter()
        .map(|record| record.into_change_record(received_at))
        .collect();
    tracing::Span::current().record("batch_size", records.len());

    let report = state.relay_batch(Arc::clone(&records)).await?;
    let response = BatchResponse::new(&records, &report);
    info!(
        failures = response.batch_item_failures.len(),
        "handled DynamoDB stream batch"
    );
    Ok(Json(response))
}

/// Returns the relay router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/batches", post(relay_batch))
        .route("/dynamodb-stream", post(relay_dynamodb_stream))
}
