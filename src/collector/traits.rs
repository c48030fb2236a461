//! Database seam and collector error types.

use thiserror::Error;

use crate::collector::row::Row;
use crate::config::TargetConfig;

/// Errors raised while scraping a single target.
///
/// None of these escape a scrape cycle: connection and identity failures
/// become `up = 0`, task failures drop the affected family for the cycle.
#[derive(Debug, Error)]
pub enum CollectorError {
    /// Could not open or authenticate a session.
    #[error("connection failed: {0}")]
    Connection(String),

    /// Connected, but `db_unique_name`/`instance_name` could not be read.
    #[error("identity query failed: {0}")]
    Identity(String),

    /// A diagnostic query failed to execute.
    #[error("query failed: {0}")]
    Query(String),

    /// A returned row did not have the expected shape.
    #[error("row decode failed at column {column}: {reason}")]
    Decode { column: usize, reason: String },

    /// The driver call timeout elapsed.
    #[error("timeout elapsed")]
    Timeout,
}

impl CollectorError {
    /// Stable short label for log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connection(_) => "connection",
            Self::Identity(_) => "identity",
            Self::Query(_) => "query",
            Self::Decode { .. } => "decode",
            Self::Timeout => "timeout",
        }
    }

    pub(crate) fn decode(column: usize, reason: impl Into<String>) -> Self {
        Self::Decode {
            column,
            reason: reason.into(),
        }
    }
}

/// Opens sessions against a configured target.
///
/// Implementations are blocking. The collector calls them from a blocking
/// context and never holds a lock across them.
pub trait Connector: Send + Sync + 'static {
    /// Open a new session. The session must already enforce `target.timeout`
    /// on every call.
    fn connect(&self, target: &TargetConfig) -> Result<Box<dyn Session>, CollectorError>;
}

/// A single open database session, owned by one scrape cycle.
pub trait Session: Send {
    /// Execute `sql` and return every row.
    fn query(&mut self, sql: &str) -> Result<Vec<Row>, CollectorError>;

    /// Release the session. Errors here are logged and otherwise ignored.
    fn close(self: Box<Self>) -> Result<(), CollectorError>;
}
