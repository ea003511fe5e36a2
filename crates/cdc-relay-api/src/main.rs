//! CDC fan-out relay server entry point.

use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;

use cdc_relay_api::config::{GuardBackend, RelayConfig, SinkKind};
use cdc_relay_api::error::AppError;
use cdc_relay_api::routes;
use cdc_relay_api::state::AppState;
use cdc_relay_api::telemetry;
use cdc_relay_aws::dynamo_idempotency_store::DynamoIdempotencyStore;
use cdc_relay_aws::sns_sink::SnsSink;
use cdc_relay_core::clock::{Clock, SystemClock};
use cdc_relay_core::idempotency::IdempotencyStore;
use cdc_relay_core::sink::SinkAdapter;
use cdc_relay_pipeline::application::relay::{BatchRelay, RelayOptions};
use cdc_relay_pipeline::domain::decoder::RecordDecoder;
use cdc_relay_pipeline::domain::guard::IdempotencyGuard;
use cdc_relay_pipeline::sinks::channel::ChannelSink;
use cdc_relay_store::dead_letter_queue::PgDeadLetterQueue;
use cdc_relay_store::idempotency_store::PgIdempotencyStore;
use cdc_relay_store::key_value_sink::PgKeyValueSink;
use cdc_relay_store::search_index_sink::PgSearchIndexSink;
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;

/// Buffered events per slow event-stream subscriber.
const CHANNEL_CAPACITY: usize = 1024;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // Read configuration from environment.
    let config = RelayConfig::from_env()?;
    let telemetry = telemetry::init(config.otlp_endpoint.as_deref())?;

    tracing::info!(sink = ?config.sink, guard = ?config.guard_backend, "Starting CDC relay");

    // Create database connection pool.
    let pool = match &config.database_url {
        Some(url) if config.needs_database() => {
            let pool = PgPoolOptions::new()
                .max_connections(config.database_max_connections)
                .connect(url)
                .await
                .map_err(AppError::from)?;
            cdc_relay_store::run_migrations(&pool)
                .await
                .map_err(AppError::from)?;
            Some(pool)
        }
        _ => None,
    };

    let aws_config = if config.needs_aws() {
        Some(cdc_relay_aws::load_config(config.aws_endpoint_url.as_deref()).await)
    } else {
        None
    };

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let store: Arc<dyn IdempotencyStore> = match config.guard_backend {
        GuardBackend::Postgres => Arc::new(PgIdempotencyStore::new(require(pool.clone())?)),
        GuardBackend::DynamoDb => Arc::new(DynamoIdempotencyStore::new(
            require(aws_config.as_ref())?,
            config.guard_table.clone(),
            config.guard_retention,
            clock.clone(),
        )),
    };

    let mut channel = None;
    let sink: Arc<dyn SinkAdapter> = match config.sink {
        SinkKind::KeyValue => Arc::new(PgKeyValueSink::new(require(pool.clone())?)),
        SinkKind::SearchIndex => Arc::new(PgSearchIndexSink::new(require(pool.clone())?)),
        SinkKind::Sns => Arc::new(SnsSink::new(
            require(aws_config.as_ref())?,
            require(config.sns_topic_arn.clone())?,
        )),
        SinkKind::Channel => {
            let sink = ChannelSink::new(CHANNEL_CAPACITY);
            channel = Some(sink.clone());
            Arc::new(sink)
        }
    };

    // Build the relay.
    let decoder = RecordDecoder::new(config.mappings.clone())
        .map_err(|e| AppError::Config(e.to_string()))?;
    let mut relay = BatchRelay::new(
        decoder,
        IdempotencyGuard::new(store, config.guard_timeout),
        sink.clone(),
        clock.clone(),
    )
    .with_options(RelayOptions {
        max_concurrency: config.max_concurrency,
        sink_timeout: config.sink_timeout,
    });
    if config.dead_letter {
        relay = relay.with_dead_letters(Arc::new(PgDeadLetterQueue::new(require(pool.clone())?)));
    }

    let shutdown = CancellationToken::new();
    let app_state = AppState::new(
        Arc::new(relay),
        clock,
        shutdown.clone(),
        config.invocation_timeout,
    )
    .with_channel(channel);

    let app = routes::build_router(app_state);

    // Start server.
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|e| AppError::Config(format!("invalid HOST:PORT combination: {e}")))?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await?;

    sink.shutdown().await;
    if let Some(pool) = pool {
        pool.close().await;
    }
    tracing::info!("CDC relay stopped");
    telemetry.shutdown();

    Ok(())
}

/// Resolves once Ctrl-C is received, after cancelling `shutdown` so that
/// in-progress batches stop starting new records.
async fn shutdown_signal(shutdown: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
    shutdown.cancel();
}

/// Unwraps a resource whose presence configuration validation guarantees.
fn require<T>(resource: Option<T>) -> Result<T, AppError> {
    resource.ok_or_else(|| {
        AppError::Config("a selected adapter is missing its connection settings".to_owned())
    })
}
