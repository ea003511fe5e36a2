//! Process configuration read from the environment.

use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use cdc_relay_pipeline::domain::mapping::{self, ANY_SOURCE, EntityMapping};

use crate::error::AppError;

/// Where dedup reservations are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardBackend {
    /// `relay_dedup_keys` in Postgres.
    Postgres,
    /// A DynamoDB table with a TTL attribute.
    DynamoDb,
}

impl FromStr for GuardBackend {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "postgres" => Ok(Self::Postgres),
            "dynamodb" => Ok(Self::DynamoDb),
            other => Err(format!("unknown guard backend `{other}`")),
        }
    }
}

/// Which sink adapter events are forwarded to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkKind {
    /// Postgres key-value projection.
    KeyValue,
    /// Postgres full-text search index.
    SearchIndex,
    /// SNS topic.
    Sns,
    /// In-process broadcast, streamed to HTTP subscribers.
    Channel,
}

impl FromStr for SinkKind {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "key-value" => Ok(Self::KeyValue),
            "search-index" => Ok(Self::SearchIndex),
            "sns" => Ok(Self::Sns),
            "channel" => Ok(Self::Channel),
            other => Err(format!("unknown sink `{other}`")),
        }
    }
}

/// Typed relay configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct RelayConfig {
    /// Listen host.
    pub host: String,
    /// Listen port.
    pub port: u16,
    /// Postgres connection string, when any Postgres adapter is in use.
    pub database_url: Option<String>,
    /// Postgres pool size.
    pub database_max_connections: u32,
    /// Idempotency store backend.
    pub guard_backend: GuardBackend,
    /// DynamoDB table for the guard.
    pub guard_table: String,
    /// TTL written with DynamoDB guard entries.
    pub guard_retention: Duration,
    /// Sink adapter.
    pub sink: SinkKind,
    /// Topic for the SNS sink.
    pub sns_topic_arn: Option<String>,
    /// AWS endpoint override.
    pub aws_endpoint_url: Option<String>,
    /// Records relayed at once within one batch.
    pub max_concurrency: usize,
    /// Budget for one guard call.
    pub guard_timeout: Duration,
    /// Budget for one sink apply.
    pub sink_timeout: Duration,
    /// Deadline for starting records of one batch.
    pub invocation_timeout: Duration,
    /// Route non-retryable failures to the dead-letter table.
    pub dead_letter: bool,
    /// Entity mappings for the decoder.
    pub mappings: Vec<EntityMapping>,
    /// OTLP collector endpoint.
    pub otlp_endpoint: Option<String>,
}

impl RelayConfig {
    /// Reads configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` naming the first invalid variable.
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads configuration through `lookup`, which returns the value of a
    /// variable or `None` when it is unset.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` naming the first invalid variable.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let config = Self {
            host: lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_owned()),
            port: parse_or(&lookup, "PORT", 3000)?,
            database_url: lookup("DATABASE_URL"),
            database_max_connections: parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", 10)?,
            guard_backend: parse_or(&lookup, "RELAY_GUARD_BACKEND", GuardBackend::Postgres)?,
            guard_table: lookup("RELAY_GUARD_TABLE").unwrap_or_else(|| "relay-dedup".to_owned()),
            guard_retention: Duration::from_secs(parse_or(
                &lookup,
                "RELAY_GUARD_RETENTION_SECS",
                86_400,
            )?),
            sink: parse_or(&lookup, "RELAY_SINK", SinkKind::KeyValue)?,
            sns_topic_arn: lookup("RELAY_SNS_TOPIC_ARN"),
            aws_endpoint_url: lookup("AWS_ENDPOINT_URL"),
            max_concurrency: parse_or(&lookup, "RELAY_MAX_CONCURRENCY", 1)?,
            guard_timeout: millis_or(&lookup, "RELAY_GUARD_TIMEOUT_MS", 2_000)?,
            sink_timeout: millis_or(&lookup, "RELAY_SINK_TIMEOUT_MS", 5_000)?,
            invocation_timeout: millis_or(&lookup, "RELAY_INVOCATION_TIMEOUT_MS", 60_000)?,
            dead_letter: parse_or(&lookup, "RELAY_DEAD_LETTER", true)?,
            mappings: read_mappings(&lookup)?,
            otlp_endpoint: lookup("OTEL_EXPORTER_OTLP_ENDPOINT"),
        };
        config.validate()?;
        Ok(config)
    }

    /// Returns `true` if any selected adapter needs the Postgres pool.
    #[must_use]
    pub fn needs_database(&self) -> bool {
        self.guard_backend == GuardBackend::Postgres
            || matches!(self.sink, SinkKind::KeyValue | SinkKind::SearchIndex)
            || self.dead_letter
    }

    /// Returns `true` if any selected adapter needs AWS clients.
    #[must_use]
    pub fn needs_aws(&self) -> bool {
        self.guard_backend == GuardBackend::DynamoDb || self.sink == SinkKind::Sns
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.needs_database() && self.database_url.is_none() {
            return Err(AppError::Config(
                "DATABASE_URL must be set for the selected guard, sink, or dead-letter queue"
                    .to_owned(),
            ));
        }
        if self.sink == SinkKind::Sns && self.sns_topic_arn.is_none() {
            return Err(AppError::Config(
                "RELAY_SNS_TOPIC_ARN must be set when RELAY_SINK=sns".to_owned(),
            ));
        }
        if self.max_concurrency == 0 {
            return Err(AppError::Config(
                "RELAY_MAX_CONCURRENCY must be at least 1".to_owned(),
            ));
        }
        Ok(())
    }
}

fn parse_or<F, T>(lookup: &F, name: &str, default: T) -> Result<T, AppError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: Display,
{
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| AppError::Config(format!("{name} is invalid: {e}"))),
        None => Ok(default),
    }
}

fn millis_or<F>(lookup: &F, name: &str, default: u64) -> Result<Duration, AppError>
where
    F: Fn(&str) -> Option<String>,
{
    let millis: u64 = parse_or(lookup, name, default)?;
    if millis == 0 {
        return Err(AppError::Config(format!("{name} must be greater than 0")));
    }
    Ok(Duration::from_millis(millis))
}

fn read_mappings<F>(lookup: &F) -> Result<Vec<EntityMapping>, AppError>
where
    F: Fn(&str) -> Option<String>,
{
    let mappings = if let Some(inline) = lookup("RELAY_MAPPINGS") {
        serde_json::from_str(&inline)
            .map_err(|e| AppError::Config(format!("RELAY_MAPPINGS is invalid: {e}")))?
    } else if let Some(path) = lookup("RELAY_MAPPINGS_PATH") {
        let raw = std::fs::read_to_string(&path).map_err(|e| {
            AppError::Config(format!("RELAY_MAPPINGS_PATH {path} is unreadable: {e}"))
        })?;
        serde_yaml::from_str(&raw)
            .map_err(|e| AppError::Config(format!("RELAY_MAPPINGS_PATH {path} is invalid: {e}")))?
    } else {
        vec![EntityMapping::new(ANY_SOURCE, "record", "id")]
    };

    mapping::validate(&mappings)
        .map_err(|e| AppError::Config(format!("entity mappings are invalid: {e}")))?;
    Ok(mappings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Result<RelayConfig, AppError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        RelayConfig::from_lookup(|name| vars.get(name).cloned())
    }

    fn config_error(vars: &[(&str, &str)]) -> String {
        match config_from(vars) {
            Err(AppError::Config(message)) => message,
            other => panic!("expected a config error, got {other:?}"),
        }
    }

    #[test]
    fn test_defaults_with_database_url() {
        // Act
        let config = config_from(&[("DATABASE_URL", "postgres://localhost/relay")]).unwrap();

        // Assert
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.guard_backend, GuardBackend::Postgres);
        assert_eq!(config.sink, SinkKind::KeyValue);
        assert_eq!(config.max_concurrency, 1);
        assert_eq!(config.guard_timeout, Duration::from_secs(2));
        assert_eq!(config.sink_timeout, Duration::from_secs(5));
        assert_eq!(config.invocation_timeout, Duration::from_secs(60));
        assert!(config.dead_letter);
        assert_eq!(
            config.mappings,
            vec![EntityMapping::new(ANY_SOURCE, "record", "id")]
        );
        assert!(!config.needs_aws());
    }

    #[test]
    fn test_database_url_required_for_postgres_adapters() {
        let message = config_error(&[]);

        assert!(message.contains("DATABASE_URL"));
    }

    #[test]
    fn test_all_aws_without_dead_letters_needs_no_database() {
        let config = config_from(&[
            ("RELAY_GUARD_BACKEND", "dynamodb"),
            ("RELAY_SINK", "sns"),
            ("RELAY_SNS_TOPIC_ARN", "arn:aws:sns:us-east-1:1:orders"),
            ("RELAY_DEAD_LETTER", "false"),
        ])
        .unwrap();

        assert!(!config.needs_database());
        assert!(config.needs_aws());
    }

    #[test]
    fn test_sns_sink_requires_topic() {
        let message = config_error(&[
            ("DATABASE_URL", "postgres://localhost/relay"),
            ("RELAY_SINK", "sns"),
        ]);

        assert!(message.contains("RELAY_SNS_TOPIC_ARN"));
    }

    #[test]
    fn test_invalid_values_name_the_variable() {
        let db = ("DATABASE_URL", "postgres://localhost/relay");

        assert!(config_error(&[db, ("PORT", "http")]).contains("PORT"));
        assert!(config_error(&[db, ("RELAY_SINK", "kafka")]).contains("RELAY_SINK"));
        assert!(
            config_error(&[db, ("RELAY_MAX_CONCURRENCY", "0")]).contains("RELAY_MAX_CONCURRENCY")
        );
        assert!(
            config_error(&[db, ("RELAY_SINK_TIMEOUT_MS", "0")]).contains("RELAY_SINK_TIMEOUT_MS")
        );
    }

    #[test]
    fn test_inline_mappings_are_parsed_and_validated() {
        // Arrange
        let db = ("DATABASE_URL", "postgres://localhost/relay");
        let inline = r#"[{"source":"orders","entity":"order","id_field":"orderId"}]"#;

        // Act
        let config = config_from(&[db, ("RELAY_MAPPINGS", inline)]).unwrap();

        // Assert
        assert_eq!(
            config.mappings,
            vec![EntityMapping::new("orders", "order", "orderId")]
        );
        assert!(config_error(&[db, ("RELAY_MAPPINGS", "[]")]).contains("mappings"));
    }
}
