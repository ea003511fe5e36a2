//! API error types.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use cdc_relay_core::error::RelayError;
use serde::Serialize;
use thiserror::Error;

/// Startup and runtime errors for the relay server.
#[derive(Debug, Error)]
pub enum AppError {
    /// A required environment variable is missing or invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// Database connection or pool error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Schema migrations could not be applied.
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// The tracing pipeline could not be installed.
    #[error("telemetry error: {0}")]
    Telemetry(String),

    /// Network binding or I/O error.
    #[error("server error: {0}")]
    Server(#[from] std::io::Error),
}

/// JSON body returned for error responses.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Machine-readable error code.
    pub error: &'static str,
    /// Human-readable error message.
    pub message: String,
}

/// Errors a relay request can end with.
///
/// Per-record failures are never errors; they are reported in the batch
/// response. These cover requests that cannot be relayed at all.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The request body is not a usable batch.
    #[error("invalid batch: {0}")]
    InvalidBatch(String),

    /// The relay could not produce a report aligned with the batch.
    #[error(transparent)]
    Relay(#[from] RelayError),

    /// The relay task panicked before producing a report.
    #[error("relay task failed: {0}")]
    RelayTask(#[from] tokio::task::JoinError),

    /// Event streaming was requested but the channel sink is not active.
    #[error("event streaming requires RELAY_SINK=channel")]
    ChannelDisabled,
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::InvalidBatch(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code) = match &self {
            Self::InvalidBatch(_) => (StatusCode::BAD_REQUEST, "invalid_batch"),
            Self::Relay(_) | Self::RelayTask(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "relay_error")
            }
            Self::ChannelDisabled => (StatusCode::NOT_FOUND, "channel_disabled"),
        };

        let body = ErrorBody {
            error: error_code,
            message: self.to_string(),
        };

        (status, Json(body)).into_response()
    }
}
