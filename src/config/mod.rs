//! Configuration module for the exporter.
//!
//! Provides YAML-based configuration loading and validation for:
//! - Server settings (bind address, port, telemetry path)
//! - Database targets (connection, credentials, timeout, custom queries)

mod app;
mod target;
mod validation;

pub use app::{
    AppConfig, DEFAULT_PORT, DEFAULT_TELEMETRY_PATH, HEALTH_PATH, RESERVED_PATHS, ServerConfig,
    validate_telemetry_path,
};
pub use target::{Credentials, CustomQuery, DEFAULT_QUERY_TIMEOUT, TargetConfig};
pub use validation::{ConfigError, expand_env_vars};
