//! # Environment Variable Loader
//!
//! Loads configuration from environment variables following 12-factor app
//! principles.
//!
//! # Naming Convention
//! - `PG_*`: PostgreSQL settings
//! - `MG_*`: MongoDB settings
//! - `RD_*`: Redis lease settings
//! - `SY_*`: Sync settings
//! - `OB_*`: Observability settings

use crate::config::{
    Config, MongodbConfig, ObservabilityConfig, PostgresConfig, RedisConfig, SyncConfig
};
use proposal_core::EqualityMode;
use std::env;
use validator::Validate;

/// Load configuration from environment variables on top of the defaults.
///
/// # M-CANONICAL-DOCS
///
/// ## Usage
/// ```rust,no_run
/// use config::load_from_env;
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = load_from_env()?;
///     println!("PostgreSQL host: {}", config.postgres.host);
///     Ok(())
/// }
/// ```
///
/// ## Environment Variables
/// - `PG_HOST`, `PG_PORT`, `PG_DATABASE`, `PG_USERNAME`, `PG_PASSWORD`,
///   `PG_POOL_SIZE`, `PG_TIMEOUT_SECONDS`
/// - `MG_ENABLED`, `MG_URL`, `MG_DATABASE`, `MG_COLLECTION`
/// - `RD_ENABLED`, `RD_URL`, `RD_LEASE_TTL_SECONDS`
/// - `SY_STORE_TIMEOUT_MS`, `SY_IGNORE_FIELDS` (comma separated),
///   `SY_EQUALITY_MODE` (structural/serialized), `SY_DEFAULT_ORGANIZATION_NAME`
/// - `OB_METRICS_ENABLED`, `OB_LOGGING_LEVEL`
pub fn load_from_env() -> Result<Config, Box<dyn std::error::Error>> {
    apply_env(Config::default())
}

/// Overlay environment variables onto an already loaded configuration and
/// validate the result.
pub fn apply_env(base: Config) -> Result<Config, Box<dyn std::error::Error>> {
    let config = Config {
        postgres: load_postgres_from_env(base.postgres)?,
        mongodb: load_mongodb_from_env(base.mongodb)?,
        redis: load_redis_from_env(base.redis)?,
        sync: load_sync_from_env(base.sync)?,
        observability: load_observability_from_env(base.observability)?
    };

    config.validate()?;
    Ok(config)
}

fn load_postgres_from_env(
    base: PostgresConfig
) -> Result<PostgresConfig, Box<dyn std::error::Error>> {
    Ok(PostgresConfig {
        host: env::var("PG_HOST").unwrap_or(base.host),
        port: parse_env_or("PG_PORT", base.port)?,
        database: env::var("PG_DATABASE").unwrap_or(base.database),
        username: env::var("PG_USERNAME").unwrap_or(base.username),
        password: env::var("PG_PASSWORD").unwrap_or(base.password),
        pool_size: parse_env_or("PG_POOL_SIZE", base.pool_size)?,
        timeout_seconds: parse_env_or("PG_TIMEOUT_SECONDS", base.timeout_seconds)?
    })
}

fn load_mongodb_from_env(
    base: MongodbConfig
) -> Result<MongodbConfig, Box<dyn std::error::Error>> {
    Ok(MongodbConfig {
        enabled: parse_env_or("MG_ENABLED", base.enabled)?,
        connection_string: env::var("MG_URL").unwrap_or(base.connection_string),
        database: env::var("MG_DATABASE").unwrap_or(base.database),
        collection: env::var("MG_COLLECTION").unwrap_or(base.collection)
    })
}

fn load_redis_from_env(base: RedisConfig) -> Result<RedisConfig, Box<dyn std::error::Error>> {
    Ok(RedisConfig {
        enabled: parse_env_or("RD_ENABLED", base.enabled)?,
        url: env::var("RD_URL").unwrap_or(base.url),
        lease_ttl_seconds: parse_env_or("RD_LEASE_TTL_SECONDS", base.lease_ttl_seconds)?
    })
}

fn load_sync_from_env(base: SyncConfig) -> Result<SyncConfig, Box<dyn std::error::Error>> {
    let ignore_fields = match env::var("SY_IGNORE_FIELDS") {
        Ok(raw) => raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect(),
        Err(_) => base.ignore_fields
    };

    let equality_mode = match env::var("SY_EQUALITY_MODE") {
        Ok(raw) => parse_equality_mode(&raw)?,
        Err(_) => base.equality_mode
    };

    Ok(SyncConfig {
        store_timeout_ms: parse_env_or("SY_STORE_TIMEOUT_MS", base.store_timeout_ms)?,
        ignore_fields,
        equality_mode,
        default_organization_name: env::var("SY_DEFAULT_ORGANIZATION_NAME")
            .unwrap_or(base.default_organization_name)
    })
}

fn load_observability_from_env(
    base: ObservabilityConfig
) -> Result<ObservabilityConfig, Box<dyn std::error::Error>> {
    Ok(ObservabilityConfig {
        metrics_enabled: parse_env_or("OB_METRICS_ENABLED", base.metrics_enabled)?,
        logging_level: env::var("OB_LOGGING_LEVEL").unwrap_or(base.logging_level)
    })
}

fn parse_equality_mode(raw: &str) -> Result<EqualityMode, Box<dyn std::error::Error>> {
    match raw.trim().to_lowercase().as_str() {
        "structural" => Ok(EqualityMode::Structural),
        "serialized" => Ok(EqualityMode::Serialized),
        other => Err(format!("Invalid SY_EQUALITY_MODE: {other}").into())
    }
}

/// Parse a variable when it is set; keep `default` when it is not. A set
/// but malformed value is an error rather than a silent fallback.
fn parse_env_or<T>(key: &str, default: T) -> Result<T, Box<dyn std::error::Error>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static
{
    match env::var(key) {
        Ok(s) => s
            .parse::<T>()
            .map_err(|e| format!("Invalid {key}: {e}").into()),
        Err(_) => Ok(default)
    }
}
