//! Scripted database doubles for unit tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::collector::row::Row;
use crate::collector::{CollectorError, Connector, Session};
use crate::config::TargetConfig;

#[derive(Debug, Clone)]
enum Reply {
    Rows(Vec<Row>),
    Fail,
}

/// Session answering queries by the first registered SQL substring that
/// matches. Unmatched queries return no rows.
#[derive(Debug, Clone, Default)]
pub struct ScriptedSession {
    script: Vec<(String, Reply)>,
    closed: Arc<AtomicUsize>,
}

impl ScriptedSession {
    pub fn with_rows(mut self, pattern: &str, rows: Vec<Row>) -> Self {
        self.script.push((pattern.to_string(), Reply::Rows(rows)));
        self
    }

    pub fn failing(mut self, pattern: &str) -> Self {
        self.script.push((pattern.to_string(), Reply::Fail));
        self
    }

    /// Script for a healthy database reporting `ORCL`/`orcl1`.
    pub fn healthy() -> Self {
        Self::default()
            .with_rows("db_unique_name", vec![Row::from_values(["ORCL", "orcl1"])])
            .with_rows("v$instance", vec![Row::from_values(["12.5"])])
    }
}

impl Session for ScriptedSession {
    fn query(&mut self, sql: &str) -> Result<Vec<Row>, CollectorError> {
        match self.script.iter().find(|(pattern, _)| sql.contains(pattern.as_str())) {
            Some((_, Reply::Rows(rows))) => Ok(rows.clone()),
            Some((pattern, Reply::Fail)) => {
                Err(CollectorError::Query(format!("scripted failure for '{}'", pattern)))
            }
            None => Ok(Vec::new()),
        }
    }

    fn close(self: Box<Self>) -> Result<(), CollectorError> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Connector handing out clones of one scripted session.
#[derive(Debug, Clone, Default)]
pub struct ScriptedConnector {
    session: ScriptedSession,
    refuse: bool,
    opened: Arc<AtomicUsize>,
}

impl ScriptedConnector {
    pub fn new(session: ScriptedSession) -> Self {
        Self {
            session,
            ..Self::default()
        }
    }

    /// Connector whose every connect attempt fails, like bad credentials.
    pub fn refusing() -> Self {
        Self {
            refuse: true,
            ..Self::default()
        }
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.session.closed.load(Ordering::SeqCst)
    }
}

impl Connector for ScriptedConnector {
    fn connect(&self, target: &TargetConfig) -> Result<Box<dyn Session>, CollectorError> {
        if self.refuse {
            return Err(CollectorError::Connection(format!(
                "ORA-01017: invalid username/password; logon denied ({})",
                target.id()
            )));
        }
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(self.session.clone()))
    }
}

/// Value of the first series in `families` named `name` whose labels include
/// every pair in `labels`.
pub fn sample_value(
    families: &[prometheus::proto::MetricFamily],
    name: &str,
    labels: &[(&str, &str)],
) -> Option<f64> {
    families
        .iter()
        .filter(|mf| mf.get_name() == name)
        .flat_map(|mf| mf.get_metric().iter().map(move |m| (mf.get_field_type(), m)))
        .find(|(_, metric)| {
            labels.iter().all(|(key, value)| {
                metric
                    .get_label()
                    .iter()
                    .any(|pair| pair.get_name() == *key && pair.get_value() == *value)
            })
        })
        .map(|(kind, metric)| match kind {
            prometheus::proto::MetricType::COUNTER => metric.get_counter().get_value(),
            _ => metric.get_gauge().get_value(),
        })
}

/// Number of series named `name` in `families`.
pub fn series_count(families: &[prometheus::proto::MetricFamily], name: &str) -> usize {
    families
        .iter()
        .filter(|mf| mf.get_name() == name)
        .map(|mf| mf.get_metric().len())
        .sum()
}
