//! # Configuration System
//!
//! Centralized configuration management for the proposal sync engine.
//!
//! This crate provides:
//! - Configuration structures for both stores, leases, sync and observability
//! - Environment variable loading (12-factor app principles)
//! - Configuration file loading (TOML/YAML)
//! - Configuration precedence (env > file > defaults)
//! - Configuration validation

pub mod config;
pub mod file_loader;
pub mod loader;

pub use config::{
    Config, MongodbConfig, ObservabilityConfig, PostgresConfig, RedisConfig, SyncConfig
};
pub use file_loader::{ConfigFileError, load, load_from_file, load_from_toml, load_from_yaml};
pub use loader::{apply_env, load_from_env};
pub use validator::Validate;
