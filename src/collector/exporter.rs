//! Per-target collector.
//!
//! [`DatabaseCollector`] implements `prometheus::core::Collector`. Every call
//! to `collect` runs one full scrape cycle against its target: open a session,
//! read the identity, run the task set, close the session, then publish the
//! results into the target's metric families.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use prometheus::core::{Collector, Desc};
use prometheus::proto::MetricFamily;

use crate::collector::families::{Bookkeeping, Family, MetricSet};
use crate::collector::outcome::{Identity, ScrapeOutcome, ScrapeState};
use crate::collector::tasks::{ScrapeTask, task_set};
use crate::collector::{CollectorError, Connector, Session};
use crate::config::TargetConfig;

/// Query used to discover the runtime identity of a target.
pub const IDENTITY_SQL: &str = "select db_unique_name, instance_name from v$database, v$instance";

/// Families shared by every scrape of one target.
struct Published {
    families: MetricSet,
    bookkeeping: Bookkeeping,
}

/// Collector for one configured database target.
pub struct DatabaseCollector {
    target: TargetConfig,
    connector: Arc<dyn Connector>,
    tasks: Vec<ScrapeTask>,
    descs: Vec<Desc>,
    published: Mutex<Published>,
}

impl std::fmt::Debug for DatabaseCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseCollector")
            .field("target", &self.target.id())
            .field("tasks", &self.tasks.len())
            .finish_non_exhaustive()
    }
}

impl DatabaseCollector {
    /// Build the collector and its family table. No connection is opened.
    pub fn new(target: TargetConfig, connector: Arc<dyn Connector>) -> prometheus::Result<Self> {
        let families = MetricSet::new()?;
        let bookkeeping = Bookkeeping::new()?;

        let descs = families
            .descs()
            .into_iter()
            .chain(bookkeeping.descs())
            .cloned()
            .collect();

        Ok(Self {
            tasks: task_set(&target.queries),
            target,
            connector,
            descs,
            published: Mutex::new(Published {
                families,
                bookkeeping,
            }),
        })
    }

    pub fn target(&self) -> &TargetConfig {
        &self.target
    }

    pub fn tasks(&self) -> &[ScrapeTask] {
        &self.tasks
    }

    /// Run one scrape cycle and return the published families.
    pub fn scrape(&self) -> Vec<MetricFamily> {
        let started = Instant::now();
        let mut outcome = ScrapeOutcome::new();

        outcome.advance(ScrapeState::Connecting);
        let session = self.connect(&mut outcome);

        outcome.advance(ScrapeState::Scraping);
        if let Some(mut session) = session {
            self.run_tasks(session.as_mut(), &mut outcome);
            if let Err(e) = session.close() {
                tracing::warn!(target_id = %self.target.id(), error = %e, "Failed to close session");
            }
        }
        outcome.set_duration(started.elapsed());

        outcome.advance(ScrapeState::Reporting);
        let families = self.publish(&outcome);
        outcome.advance(ScrapeState::Idle);

        tracing::debug!(
            target_id = %self.target.id(),
            up = outcome.is_up(),
            connect_error = ?outcome.connect_error().map(CollectorError::kind),
            tasks = outcome.tasks_run(),
            failed_tasks = outcome.failures().len(),
            duration_ms = outcome.duration().as_millis() as u64,
            "Scrape finished"
        );
        families
    }

    /// Open a session and read the identity. `None` means the target is down.
    fn connect(&self, outcome: &mut ScrapeOutcome) -> Option<Box<dyn Session>> {
        let mut session = match self.connector.connect(&self.target) {
            Ok(session) => session,
            Err(e) => {
                tracing::info!(target_id = %self.target.id(), error = %e, "Connection failed");
                outcome.disconnected(e);
                return None;
            }
        };

        match query_identity(session.as_mut()) {
            Ok(identity) => {
                outcome.connected(identity);
                Some(session)
            }
            Err(e) => {
                tracing::info!(target_id = %self.target.id(), error = %e, "Identity query failed");
                if let Err(close_err) = session.close() {
                    tracing::debug!(target_id = %self.target.id(), error = %close_err, "Failed to close session");
                }
                outcome.disconnected(e);
                None
            }
        }
    }

    fn run_tasks(&self, session: &mut dyn Session, outcome: &mut ScrapeOutcome) {
        for task in &self.tasks {
            let result = task.run(session);
            if let Err(e) = &result {
                tracing::debug!(
                    target_id = %self.target.id(),
                    task = task.name(),
                    kind = e.kind(),
                    error = %e,
                    "Scrape task failed"
                );
            }
            outcome.record(task.name(), result);
        }
    }

    /// Replace the published snapshot with this cycle's results.
    fn publish(&self, outcome: &ScrapeOutcome) -> Vec<MetricFamily> {
        let published = self
            .published
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let identity = outcome.identity().labels();

        published.families.reset();
        let up = if outcome.is_up() { 1.0 } else { 0.0 };
        if let Err(e) = published.families.set(Family::Up, &identity, &[], up) {
            tracing::error!(target_id = %self.target.id(), error = %e, "Failed to set up metric");
        }
        for sample in outcome.samples() {
            if let Err(e) =
                published
                    .families
                    .set(sample.family, &identity, &sample.labels, sample.value)
            {
                tracing::warn!(
                    target_id = %self.target.id(),
                    family = sample.family.as_ref(),
                    error = %e,
                    "Dropping sample"
                );
            }
        }

        if let Err(e) = published.bookkeeping.record(
            &identity,
            outcome.duration().as_secs_f64(),
            outcome.failed(),
        ) {
            tracing::error!(target_id = %self.target.id(), error = %e, "Failed to record scrape bookkeeping");
        }

        let mut families = published.families.collect();
        families.extend(published.bookkeeping.collect());
        families
    }
}

fn query_identity(session: &mut dyn Session) -> Result<Identity, CollectorError> {
    let as_identity = |e: CollectorError| match e {
        CollectorError::Identity(_) => e,
        other => CollectorError::Identity(other.to_string()),
    };

    let rows = session.query(IDENTITY_SQL).map_err(as_identity)?;
    let row = rows
        .first()
        .ok_or_else(|| CollectorError::Identity("identity query returned no rows".to_string()))?;
    row.expect_columns(2).map_err(as_identity)?;

    Ok(Identity::new(
        row.text(0).map_err(as_identity)?,
        row.text(1).map_err(as_identity)?,
    ))
}

impl Collector for DatabaseCollector {
    fn desc(&self) -> Vec<&Desc> {
        self.descs.iter().collect()
    }

    fn collect(&self) -> Vec<MetricFamily> {
        self.scrape()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::row::Row;
    use crate::collector::testing::{
        ScriptedConnector, ScriptedSession, sample_value, series_count,
    };
    use crate::config::CustomQuery;

    const ERRORS: &str = "oracledb_exporter_scrape_errors_total";

    fn collector(connector: ScriptedConnector, target: TargetConfig) -> DatabaseCollector {
        DatabaseCollector::new(target, Arc::new(connector)).unwrap()
    }

    fn orcl() -> [(&'static str, &'static str); 2] {
        [("database", "ORCL"), ("instance", "orcl1")]
    }

    #[test]
    fn test_describe_before_any_scrape() {
        let c = collector(ScriptedConnector::refusing(), TargetConfig::new("db1/ORCL"));
        let descs = c.desc();
        let names: Vec<&str> = descs.iter().map(|d| d.fq_name.as_str()).collect();

        assert_eq!(names.len(), 15 + 4);
        assert!(names.contains(&"oracledb_up"));
        assert!(names.contains(&"oracledb_asmspace"));
        assert!(names.contains(&"oracledb_exporter_last_scrape_error"));
    }

    #[test]
    fn test_connected_scrape_reports_identity() {
        let connector = ScriptedConnector::new(ScriptedSession::healthy());
        let c = collector(connector.clone(), TargetConfig::new("db1/ORCL"));

        let families = c.scrape();

        assert_eq!(sample_value(&families, "oracledb_up", &orcl()), Some(1.0));
        assert_eq!(sample_value(&families, "oracledb_uptime", &orcl()), Some(12.5));
        assert_eq!(sample_value(&families, ERRORS, &orcl()), Some(0.0));
        assert_eq!(
            sample_value(&families, "oracledb_exporter_last_scrape_error", &orcl()),
            Some(0.0)
        );
        assert_eq!(connector.opened(), 1);
        assert_eq!(connector.closed(), 1);
    }

    #[test]
    fn test_refused_connection_reports_down() {
        let c = collector(ScriptedConnector::refusing(), TargetConfig::new("db1/ORCL"));
        let anonymous = [("database", ""), ("instance", "")];

        let families = c.scrape();

        assert_eq!(sample_value(&families, "oracledb_up", &anonymous), Some(0.0));
        assert_eq!(series_count(&families, "oracledb_tablespace"), 0);
        assert_eq!(series_count(&families, "oracledb_session"), 0);
        assert_eq!(sample_value(&families, ERRORS, &anonymous), Some(1.0));
        assert_eq!(
            sample_value(&families, "oracledb_exporter_scrapes_total", &anonymous),
            Some(1.0)
        );
    }

    #[test]
    fn test_identity_without_rows_is_down() {
        let connector = ScriptedConnector::new(
            ScriptedSession::default()
                .with_rows("db_unique_name", vec![])
                .with_rows("v$instance", vec![Row::from_values(["1"])]),
        );
        let c = collector(connector.clone(), TargetConfig::new("db1/ORCL"));

        let families = c.scrape();

        assert_eq!(sample_value(&families, "oracledb_up", &[]), Some(0.0));
        assert_eq!(series_count(&families, "oracledb_uptime"), 0);
        assert_eq!(connector.closed(), 1);
    }

    #[test]
    fn test_task_failure_is_isolated() {
        let connector = ScriptedConnector::new(
            ScriptedSession::healthy()
                .failing("dba_data_files")
                .with_rows("v$log_history", vec![Row::from_values(["7"])]),
        );
        let c = collector(connector, TargetConfig::new("db1/ORCL"));

        let families = c.scrape();

        assert_eq!(sample_value(&families, "oracledb_up", &orcl()), Some(1.0));
        assert_eq!(series_count(&families, "oracledb_tablespace"), 0);
        assert_eq!(sample_value(&families, "oracledb_redo", &orcl()), Some(7.0));
        assert_eq!(sample_value(&families, ERRORS, &orcl()), Some(1.0));
        assert_eq!(
            sample_value(&families, "oracledb_exporter_last_scrape_error", &orcl()),
            Some(1.0)
        );
    }

    #[test]
    fn test_several_task_failures_count_once() {
        let connector = ScriptedConnector::new(
            ScriptedSession::healthy()
                .failing("dba_data_files")
                .failing("v$sysstat")
                .failing("v$log_history"),
        );
        let c = collector(connector, TargetConfig::new("db1/ORCL"));

        let families = c.scrape();

        assert_eq!(sample_value(&families, "oracledb_up", &orcl()), Some(1.0));
        assert_eq!(sample_value(&families, ERRORS, &orcl()), Some(1.0));
        assert_eq!(series_count(&families, "oracledb_tablespace"), 0);
        assert_eq!(series_count(&families, "oracledb_sysstat"), 0);
        assert_eq!(series_count(&families, "oracledb_redo"), 0);

        let families = c.scrape();
        assert_eq!(sample_value(&families, ERRORS, &orcl()), Some(2.0));
    }

    #[test]
    fn test_error_counter_is_monotonic() {
        let connector = ScriptedConnector::new(ScriptedSession::healthy().failing("v$sysstat"));
        let c = collector(connector, TargetConfig::new("db1/ORCL"));

        let mut previous = 0.0;
        for expected in 1..=3 {
            let families = c.scrape();
            let errors = sample_value(&families, ERRORS, &orcl()).unwrap();
            assert!(errors >= previous);
            assert_eq!(errors, expected as f64);
            previous = errors;
        }
    }

    #[test]
    fn test_custom_query_alongside_builtins() {
        let connector = ScriptedConnector::new(
            ScriptedSession::healthy()
                .with_rows("where type='USER'", vec![Row::from_values(["42"])]),
        );
        let target = TargetConfig::new("db1/ORCL").with_query(CustomQuery::new(
            "active_users",
            "select count(*) from v$session where type='USER'",
        ));
        let c = collector(connector, target);

        let families = c.scrape();

        assert_eq!(
            sample_value(&families, "oracledb_query", &[("name", "active_users")]),
            Some(42.0)
        );
        assert_eq!(sample_value(&families, "oracledb_uptime", &orcl()), Some(12.5));
    }

    #[test]
    fn test_tablespace_series() {
        let connector = ScriptedConnector::new(ScriptedSession::healthy().with_rows(
            "dba_data_files",
            vec![Row::from_values(["USERS", "PERMANENT", "1000", "400", "YES"])],
        ));
        let c = collector(connector, TargetConfig::new("db1/ORCL"));

        let families = c.scrape();
        let series = |kind| {
            sample_value(
                &families,
                "oracledb_tablespace",
                &[
                    ("type", kind),
                    ("name", "USERS"),
                    ("contents", "PERMANENT"),
                    ("autoextend", "YES"),
                    ("database", "ORCL"),
                ],
            )
        };

        assert_eq!(series("total"), Some(1000.0));
        assert_eq!(series("free"), Some(400.0));
        assert_eq!(series("used"), Some(600.0));
        assert_eq!(series_count(&families, "oracledb_tablespace"), 3);
    }

    #[test]
    fn test_stale_series_dropped_between_scrapes() {
        let up = collector(
            ScriptedConnector::new(ScriptedSession::healthy()),
            TargetConfig::new("db1/ORCL"),
        );
        assert_eq!(series_count(&up.scrape(), "oracledb_uptime"), 1);

        // Same published families, next cycle cannot connect.
        let down = DatabaseCollector {
            connector: Arc::new(ScriptedConnector::refusing()),
            ..up
        };
        let families = down.scrape();
        assert_eq!(series_count(&families, "oracledb_uptime"), 0);
        assert_eq!(series_count(&families, "oracledb_up"), 1);
    }
}
