//! # Configuration Structures
//!
//! All configuration structures for the proposal sync engine.
//!
//! All configuration structures:
//! - Use `serde` for serialization/deserialization
//! - Use `validator` for input validation
//! - Default every field so partial files and sparse environments load

use proposal_core::{DocumentRecord, EqualityMode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use validator::Validate;

/// Main configuration structure for the proposal sync engine.
///
/// # M-CANONICAL-DOCS
///
/// ## Purpose
/// Aggregates the connection settings of both stores, the optional lease
/// backend, sync behaviour and observability.
///
/// ## Usage
/// ```rust,no_run
/// use config::Config;
///
/// let config = Config::default();
/// println!("PostgreSQL host: {}", config.postgres.host);
/// ```
///
/// ## Fields
/// - `postgres`: relational store (system of record)
/// - `mongodb`: document store mirror; disabling it runs sync in degraded mode
/// - `redis`: optional cross-process leases for per-record single writers
/// - `sync`: timeouts, comparison rules and audit defaults
/// - `observability`: logging level and metrics toggle
///
/// ## Validation
/// All nested configurations must pass their own validation rules.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    #[validate(nested)]
    pub postgres: PostgresConfig,

    #[serde(default)]
    #[validate(nested)]
    pub mongodb: MongodbConfig,

    #[serde(default)]
    #[validate(nested)]
    pub redis: RedisConfig,

    #[serde(default)]
    #[validate(nested)]
    pub sync: SyncConfig,

    #[serde(default)]
    #[validate(nested)]
    pub observability: ObservabilityConfig
}

/// PostgreSQL connection settings.
///
/// # M-CANONICAL-DOCS
///
/// ## Fields
/// - `host`: Database server hostname (default: "localhost")
/// - `port`: Database server port (default: 5432)
/// - `database`: Database name (default: "proposals")
/// - `username`: Database user (default: "postgres")
/// - `password`: Database password (default: "postgres")
/// - `pool_size`: Maximum connections in pool (default: 10, range: 1-100)
/// - `timeout_seconds`: Connection timeout (default: 30, range: 1-300)
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct PostgresConfig {
    #[serde(default = "default_postgres_host")]
    #[validate(length(min = 1, max = 255))]
    pub host: String,

    #[serde(default = "default_postgres_port")]
    #[validate(range(min = 1, max = 65535))]
    pub port: u16,

    #[serde(default = "default_postgres_database")]
    #[validate(length(min = 1, max = 63))]
    pub database: String,

    #[serde(default = "default_postgres_username")]
    #[validate(length(min = 1, max = 63))]
    pub username: String,

    #[serde(default = "default_postgres_password")]
    #[validate(length(min = 1))]
    pub password: String,

    #[serde(default = "default_postgres_pool_size")]
    #[validate(range(min = 1, max = 100))]
    pub pool_size: u32,

    #[serde(default = "default_postgres_timeout")]
    #[validate(range(min = 1, max = 300))]
    pub timeout_seconds: u64
}

fn default_postgres_host() -> String {
    "localhost".to_string()
}

fn default_postgres_port() -> u16 {
    5432
}

fn default_postgres_database() -> String {
    "proposals".to_string()
}

fn default_postgres_username() -> String {
    "postgres".to_string()
}

fn default_postgres_password() -> String {
    "postgres".to_string()
}

fn default_postgres_pool_size() -> u32 {
    10
}

fn default_postgres_timeout() -> u64 {
    30
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            host: default_postgres_host(),
            port: default_postgres_port(),
            database: default_postgres_database(),
            username: default_postgres_username(),
            password: default_postgres_password(),
            pool_size: default_postgres_pool_size(),
            timeout_seconds: default_postgres_timeout()
        }
    }
}

impl PostgresConfig {
    pub fn connection_url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.username, self.password, self.host, self.port, self.database
        )
    }
}

/// MongoDB document store settings.
///
/// When `enabled` is false the sync engine runs without a document store and
/// every operation reports a degraded result.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct MongodbConfig {
    #[serde(default = "default_mongodb_enabled")]
    pub enabled: bool,

    #[serde(default = "default_mongodb_connection_string")]
    #[validate(length(min = 1))]
    pub connection_string: String,

    #[serde(default = "default_mongodb_database")]
    #[validate(length(min = 1, max = 63))]
    pub database: String,

    #[serde(default = "default_mongodb_collection")]
    #[validate(length(min = 1, max = 255))]
    pub collection: String
}

fn default_mongodb_enabled() -> bool {
    true
}

fn default_mongodb_connection_string() -> String {
    "mongodb://localhost:27017".to_string()
}

fn default_mongodb_database() -> String {
    "proposals".to_string()
}

fn default_mongodb_collection() -> String {
    "proposals".to_string()
}

impl Default for MongodbConfig {
    fn default() -> Self {
        Self {
            enabled: default_mongodb_enabled(),
            connection_string: default_mongodb_connection_string(),
            database: default_mongodb_database(),
            collection: default_mongodb_collection()
        }
    }
}

/// Redis lease settings. Disabled by default; single-instance deployments
/// rely on the in-process per-record locks alone.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct RedisConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_redis_url")]
    #[validate(length(min = 1))]
    pub url: String,

    #[serde(default = "default_redis_lease_ttl")]
    #[validate(range(min = 1, max = 600))]
    pub lease_ttl_seconds: u64
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_redis_lease_ttl() -> u64 {
    30
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: default_redis_url(),
            lease_ttl_seconds: default_redis_lease_ttl()
        }
    }
}

/// Sync behaviour.
///
/// # M-CANONICAL-DOCS
///
/// ## Fields
/// - `store_timeout_ms`: budget for each individual store call (default: 5000)
/// - `ignore_fields`: fields never compared (sync metadata timestamps)
/// - `equality_mode`: `structural` (default) or `serialized`
/// - `default_organization_name`: last resort of the audit name fallback
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct SyncConfig {
    #[serde(default = "default_store_timeout_ms")]
    #[validate(range(min = 100, max = 60000))]
    pub store_timeout_ms: u64,

    #[serde(default = "default_ignore_fields")]
    #[validate(custom(function = "validate_ignore_fields"))]
    pub ignore_fields: Vec<String>,

    #[serde(default)]
    pub equality_mode: EqualityMode,

    #[serde(default = "default_organization_name")]
    #[validate(length(min = 1, max = 255))]
    pub default_organization_name: String
}

fn default_store_timeout_ms() -> u64 {
    5000
}

fn default_ignore_fields() -> Vec<String> {
    vec![
        DocumentRecord::LAST_SYNCED_FROM_RELATIONAL.to_string(),
        DocumentRecord::LAST_SYNCED_TO_RELATIONAL.to_string(),
        "_id".to_string(),
    ]
}

fn default_organization_name() -> String {
    "Unknown Organization".to_string()
}

fn validate_ignore_fields(fields: &Vec<String>) -> Result<(), validator::ValidationError> {
    if fields.iter().any(|f| f.trim().is_empty()) {
        return Err(validator::ValidationError::new("Ignore field names must not be blank"));
    }
    Ok(())
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            store_timeout_ms: default_store_timeout_ms(),
            ignore_fields: default_ignore_fields(),
            equality_mode: EqualityMode::default(),
            default_organization_name: default_organization_name()
        }
    }
}

impl SyncConfig {
    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct ObservabilityConfig {
    /// Enable metrics collection
    #[serde(default = "default_observability_metrics_enabled")]
    pub metrics_enabled: bool,

    /// Logging level
    #[serde(default = "default_observability_logging_level")]
    #[validate(custom(function = "validate_logging_level"))]
    pub logging_level: String
}

fn default_observability_metrics_enabled() -> bool {
    true
}

fn default_observability_logging_level() -> String {
    "info".to_string()
}

fn validate_logging_level(value: &str) -> Result<(), validator::ValidationError> {
    match value {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(validator::ValidationError::new("Invalid logging level"))
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: default_observability_metrics_enabled(),
            logging_level: default_observability_logging_level()
        }
    }
}
