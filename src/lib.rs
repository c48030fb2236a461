//! oracledb_exporter - Prometheus exporter for Oracle databases
//!
//! This crate provides the scrape machinery behind the `oracledb_exporter`
//! binary. It can also be embedded to serve Oracle metrics from another
//! process.
//!
//! # Architecture
//!
//! - **Config**: YAML target list with `${VAR}` expansion and validation
//! - **Collector**: one Prometheus collector per target, running a fixed set
//!   of diagnostic queries plus user-defined ones on every scrape
//! - **Registry**: lazily created, cached per-target handlers
//! - **Server**: axum endpoint serving `?target=<connection>` scrapes
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use oracledb_exporter::{AppConfig, AppState, OracleConnector, TargetRegistry, create_router};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AppConfig::load("oracle.yml")?;
//!     let registry = TargetRegistry::new(config.connections, Arc::new(OracleConnector::new()));
//!     let app = create_router(AppState::new(registry), &config.server.telemetry_path);
//!
//!     let listener = tokio::net::TcpListener::bind(config.server.listen_addr()?).await?;
//!     axum::serve(listener, app).await?;
//!     Ok(())
//! }
//! ```

pub mod collector;
pub mod config;
pub mod server;

pub use collector::{
    CollectorError, Connector, DatabaseCollector, OracleConnector, RegistryError, Row, Session,
    TargetHandler, TargetRegistry,
};
pub use config::{AppConfig, ConfigError, CustomQuery, ServerConfig, TargetConfig};
pub use server::{AppState, create_router};
