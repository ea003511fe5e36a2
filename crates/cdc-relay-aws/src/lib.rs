//! AWS adapters for the CDC fan-out relay.
//!
//! Clients are built once at startup and shared across batches.

pub mod dynamo_idempotency_store;
pub mod sns_sink;

/// Loads the default AWS configuration, optionally pointed at a custom
/// endpoint such as `LocalStack`.
pub async fn load_config(endpoint_url: Option<&str>) -> aws_config::SdkConfig {
    let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
    if let Some(endpoint) = endpoint_url {
        loader = loader.endpoint_url(endpoint);
    }
    loader.load().await
}
