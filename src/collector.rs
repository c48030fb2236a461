//! Collector Layer
//!
//! Per-target Prometheus collectors for Oracle databases.
//!
//! # Architecture
//!
//! - [`Connector`] / [`Session`]: blocking database seam, implemented by
//!   [`OracleConnector`]
//! - [`ScrapeTask`]: one diagnostic query and its row decoding
//! - [`DatabaseCollector`]: runs the task set for one target on every collect
//! - [`TargetRegistry`]: lazily builds and caches one [`TargetHandler`] per
//!   configured target
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use oracledb_exporter::{OracleConnector, TargetConfig, TargetRegistry};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let target = TargetConfig::new("db.example.com:1521/ORCL").with_credentials("system", "secret");
//! let registry = TargetRegistry::new([target], Arc::new(OracleConnector::new()));
//! let handler = registry.resolve("db.example.com:1521/ORCL").await?;
//! let text = tokio::task::spawn_blocking(move || handler.render()).await??;
//! println!("{text}");
//! # Ok(())
//! # }
//! ```

mod exporter;
mod families;
mod oracle;
mod outcome;
mod registry;
mod row;
mod tasks;
#[cfg(test)]
pub(crate) mod testing;
mod traits;

pub use exporter::{DatabaseCollector, IDENTITY_SQL};
pub use families::{
    Bookkeeping, EXPORTER_SUBSYSTEM, Family, FamilySpec, IDENTITY_LABELS, MetricSet, NAMESPACE,
    clean_name,
};
pub use oracle::OracleConnector;
pub use outcome::{Identity, ScrapeOutcome, ScrapeState, TaskFailure};
pub use registry::{RegistryError, TargetHandler, TargetRegistry};
pub use row::Row;
pub use tasks::{Sample, ScrapeTask, task_set};
pub use traits::{CollectorError, Connector, Session};
