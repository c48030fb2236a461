//! Scrape task set.
//!
//! Each [`ScrapeTask`] runs one diagnostic query and turns its rows into
//! [`Sample`]s. Tasks never write to shared metric state themselves; the
//! collector publishes their samples once the whole cycle is done.

use std::borrow::Cow;

use crate::collector::families::{Family, clean_name};
use crate::collector::row::Row;
use crate::collector::{CollectorError, Session};
use crate::config::CustomQuery;

const UPTIME_SQL: &str = "select sysdate-startup_time from v$instance";

const SESSION_SQL: &str = "SELECT decode(username,NULL,'SYSTEM','SYS','SYSTEM','USER'), status, count(*) \
     FROM v$session \
     GROUP BY decode(username,NULL,'SYSTEM','SYS','SYSTEM','USER'), status";

const SYSSTAT_SQL: &str = "SELECT name, value FROM v$sysstat WHERE statistic# in (6,7,1084,1089)";

const WAITCLASS_SQL: &str = "SELECT n.wait_class, round(m.time_waited/m.INTSIZE_CSEC,3) \
     FROM v$waitclassmetric m, v$system_wait_class n \
     WHERE m.wait_class_id=n.wait_class_id and n.wait_class != 'Idle'";

// 2092/2093: physical read IO requests/bytes per sec, 2100/2124: physical write.
const SYSMETRIC_SQL: &str =
    "select metric_name,value from v$sysmetric where metric_id in (2092,2093,2124,2100)";

const TABLESPACE_SQL: &str = "WITH \
     getsize AS (SELECT tablespace_name, autoextensible, SUM(bytes) tsize \
                 FROM dba_data_files GROUP BY tablespace_name, autoextensible), \
     getfree AS (SELECT tablespace_name, contents, SUM(blocks*block_size) tfree \
                 FROM DBA_LMT_FREE_SPACE a, v$tablespace b, dba_tablespaces c \
                 WHERE a.TABLESPACE_ID= b.ts# and b.name=c.tablespace_name \
                 GROUP BY tablespace_name,contents) \
     SELECT a.tablespace_name, b.contents, a.tsize, b.tfree, a.autoextensible autoextend \
     FROM GETSIZE a, GETFREE b \
     WHERE a.tablespace_name = b.tablespace_name \
     UNION \
     SELECT tablespace_name, 'TEMPORARY', sum(tablespace_size), sum(free_space), 'NO' \
     FROM dba_temp_free_space \
     GROUP BY tablespace_name";

const INTERCONNECT_SQL: &str = "SELECT name, value FROM V$SYSSTAT \
     WHERE name in ('gc cr blocks served','gc cr blocks flushed','gc cr blocks received')";

// nvl: the sums are NULL when no fast recovery area is configured.
const RECOVERY_SQL: &str = "SELECT nvl(sum(percent_space_used),0), nvl(sum(percent_space_reclaimable),0) \
     FROM V$FLASH_RECOVERY_AREA_USAGE";

const REDO_SQL: &str = "select count(*) from v$log_history where first_time > sysdate - 1/24/12";

// 2000 buffer, 2050 cursor, 2110 row, 2112 library cache hit ratio.
const CACHE_SQL: &str = "select metric_name,value from v$sysmetric \
     where group_id=2 and metric_id in (2000,2050,2112,2110)";

const SERVICES_SQL: &str = "select name from v$active_services";

// num 43 is the `sessions` parameter.
const PARAMETER_SQL: &str = "select name,value from v$parameter WHERE num=43";

const ASMSPACE_SQL: &str = "SELECT g.name, sum(d.total_mb), sum(d.free_mb) \
     FROM v$asm_disk d, v$asm_diskgroup g \
     WHERE d.group_number = g.group_number AND d.header_status = 'MEMBER' \
     GROUP by g.name, g.group_number";

/// One labeled value destined for a family.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub family: Family,
    /// Values for the family's extra labels, in declaration order.
    pub labels: Vec<String>,
    pub value: f64,
}

impl Sample {
    pub fn new(family: Family, labels: Vec<String>, value: f64) -> Self {
        Self {
            family,
            labels,
            value,
        }
    }
}

/// How a task's rows map onto samples.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Shape {
    /// `(value)`, no extra labels.
    Scalar,
    /// `(name, value)`, name cleaned into the single extra label.
    Named,
    /// `(user_kind, status, count)`.
    Sessions,
    /// `(percent_used, percent_reclaimable)`.
    Recovery,
    /// `(name, contents, total, free, autoextend)`.
    Tablespace,
    /// `(name, total, free)`.
    AsmSpace,
    /// `(name)`, always 1.
    Presence,
    /// `(value)`, labeled with the configured query name.
    Custom(String),
}

/// A single diagnostic probe.
#[derive(Debug, Clone)]
pub struct ScrapeTask {
    name: Cow<'static, str>,
    family: Family,
    sql: Cow<'static, str>,
    shape: Shape,
}

impl ScrapeTask {
    fn builtin(name: &'static str, family: Family, sql: &'static str, shape: Shape) -> Self {
        Self {
            name: Cow::Borrowed(name),
            family,
            sql: Cow::Borrowed(sql),
            shape,
        }
    }

    fn custom(query: &CustomQuery) -> Self {
        Self {
            name: Cow::Owned(format!("query:{}", query.name)),
            family: Family::Query,
            sql: Cow::Owned(query.sql.clone()),
            shape: Shape::Custom(query.name.clone()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn family(&self) -> Family {
        self.family
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Run the query and decode every row.
    ///
    /// Either every row decodes or the task yields an error and no samples.
    pub fn run(&self, session: &mut dyn Session) -> Result<Vec<Sample>, CollectorError> {
        let rows = session.query(&self.sql)?;
        let mut samples = Vec::with_capacity(rows.len());
        for row in &rows {
            self.decode(row, &mut samples)?;
        }
        Ok(samples)
    }

    fn decode(&self, row: &Row, out: &mut Vec<Sample>) -> Result<(), CollectorError> {
        let family = self.family;
        match &self.shape {
            Shape::Scalar => {
                row.expect_columns(1)?;
                out.push(Sample::new(family, vec![], row.number(0)?));
            }
            Shape::Named => {
                row.expect_columns(2)?;
                let name = clean_name(row.text(0)?);
                out.push(Sample::new(family, vec![name], row.number(1)?));
            }
            Shape::Sessions => {
                row.expect_columns(3)?;
                let labels = vec![row.text(0)?.to_string(), row.text(1)?.to_string()];
                out.push(Sample::new(family, labels, row.number(2)?));
            }
            Shape::Recovery => {
                row.expect_columns(2)?;
                let (used, reclaimable) = (row.number(0)?, row.number(1)?);
                out.push(Sample::new(family, vec!["percent_space_used".into()], used));
                out.push(Sample::new(
                    family,
                    vec!["percent_space_reclaimable".into()],
                    reclaimable,
                ));
            }
            Shape::Tablespace => {
                row.expect_columns(5)?;
                let name = row.text(0)?;
                let contents = row.text(1)?;
                let (total, free) = (row.number(2)?, row.number(3)?);
                let autoextend = row.text(4)?;
                out.extend(space_samples(family, total, free, |kind| {
                    vec![
                        kind.to_string(),
                        name.to_string(),
                        contents.to_string(),
                        autoextend.to_string(),
                    ]
                }));
            }
            Shape::AsmSpace => {
                row.expect_columns(3)?;
                let name = row.text(0)?;
                let (total, free) = (row.number(1)?, row.number(2)?);
                out.extend(space_samples(family, total, free, |kind| {
                    vec![kind.to_string(), name.to_string()]
                }));
            }
            Shape::Presence => {
                row.expect_columns(1)?;
                out.push(Sample::new(family, vec![clean_name(row.text(0)?)], 1.0));
            }
            Shape::Custom(name) => {
                row.expect_columns(1)?;
                out.push(Sample::new(family, vec![name.clone()], row.number(0)?));
            }
        }
        Ok(())
    }
}

/// `total`, `free` and `used = total - free` for one storage resource.
fn space_samples(
    family: Family,
    total: f64,
    free: f64,
    labels: impl Fn(&str) -> Vec<String>,
) -> [Sample; 3] {
    [
        Sample::new(family, labels("total"), total),
        Sample::new(family, labels("free"), free),
        Sample::new(family, labels("used"), total - free),
    ]
}

/// The full task list for one target, in execution order.
///
/// Custom queries run as individual tasks after the fixed parameter probe and
/// before ASM space.
pub fn task_set(custom: &[CustomQuery]) -> Vec<ScrapeTask> {
    let mut tasks = vec![
        ScrapeTask::builtin("uptime", Family::Uptime, UPTIME_SQL, Shape::Scalar),
        ScrapeTask::builtin("sessions", Family::Session, SESSION_SQL, Shape::Sessions),
        ScrapeTask::builtin("sysstat", Family::Sysstat, SYSSTAT_SQL, Shape::Named),
        ScrapeTask::builtin("waitclass", Family::Waitclass, WAITCLASS_SQL, Shape::Named),
        ScrapeTask::builtin("sysmetric", Family::Sysmetric, SYSMETRIC_SQL, Shape::Named),
        ScrapeTask::builtin("tablespace", Family::Tablespace, TABLESPACE_SQL, Shape::Tablespace),
        ScrapeTask::builtin("interconnect", Family::Interconnect, INTERCONNECT_SQL, Shape::Named),
        ScrapeTask::builtin("recovery", Family::Recovery, RECOVERY_SQL, Shape::Recovery),
        ScrapeTask::builtin("redo", Family::Redo, REDO_SQL, Shape::Scalar),
        ScrapeTask::builtin("cache", Family::CacheHitRatio, CACHE_SQL, Shape::Named),
        ScrapeTask::builtin("services", Family::Services, SERVICES_SQL, Shape::Presence),
        ScrapeTask::builtin("parameter", Family::Parameter, PARAMETER_SQL, Shape::Named),
    ];
    tasks.extend(custom.iter().map(ScrapeTask::custom));
    tasks.push(ScrapeTask::builtin(
        "asmspace",
        Family::AsmSpace,
        ASMSPACE_SQL,
        Shape::AsmSpace,
    ));
    tasks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::testing::ScriptedSession;

    fn find<'a>(tasks: &'a [ScrapeTask], name: &str) -> &'a ScrapeTask {
        tasks.iter().find(|t| t.name() == name).unwrap()
    }

    #[test]
    fn test_task_order() {
        let tasks = task_set(&[
            CustomQuery::new("a", "select 1 from dual"),
            CustomQuery::new("b", "select 2 from dual"),
        ]);
        let names: Vec<&str> = tasks.iter().map(ScrapeTask::name).collect();
        assert_eq!(
            names,
            vec![
                "uptime",
                "sessions",
                "sysstat",
                "waitclass",
                "sysmetric",
                "tablespace",
                "interconnect",
                "recovery",
                "redo",
                "cache",
                "services",
                "parameter",
                "query:a",
                "query:b",
                "asmspace",
            ]
        );
    }

    #[test]
    fn test_tablespace_used_is_total_minus_free() {
        let tasks = task_set(&[]);
        let mut session = ScriptedSession::default().with_rows(
            "dba_data_files",
            vec![Row::from_values(["USERS", "PERMANENT", "1000", "400", "YES"])],
        );

        let samples = find(&tasks, "tablespace").run(&mut session).unwrap();
        let labels = |kind: &str| {
            vec![
                kind.to_string(),
                "USERS".to_string(),
                "PERMANENT".to_string(),
                "YES".to_string(),
            ]
        };
        assert_eq!(
            samples,
            vec![
                Sample::new(Family::Tablespace, labels("total"), 1000.0),
                Sample::new(Family::Tablespace, labels("free"), 400.0),
                Sample::new(Family::Tablespace, labels("used"), 600.0),
            ]
        );
    }

    #[test]
    fn test_asm_space_used() {
        let tasks = task_set(&[]);
        let mut session = ScriptedSession::default().with_rows(
            "v$asm_disk",
            vec![Row::from_values(["DATA", "2048.5", "1024.25"])],
        );

        let samples = find(&tasks, "asmspace").run(&mut session).unwrap();
        assert_eq!(samples.len(), 3);
        assert_eq!(samples[2].labels, vec!["used".to_string(), "DATA".to_string()]);
        assert_eq!(samples[2].value, samples[0].value - samples[1].value);
    }

    #[test]
    fn test_named_values_are_cleaned() {
        let tasks = task_set(&[]);
        let mut session = ScriptedSession::default().with_rows(
            "v$waitclassmetric",
            vec![
                Row::from_values(["User I/O", "0.25"]),
                Row::from_values(["Concurrency", "0"]),
            ],
        );

        let samples = find(&tasks, "waitclass").run(&mut session).unwrap();
        assert_eq!(samples[0].labels, vec!["user_io".to_string()]);
        assert_eq!(samples[0].value, 0.25);
        assert_eq!(samples[1].labels, vec!["concurrency".to_string()]);
    }

    #[test]
    fn test_decode_failure_yields_no_samples() {
        let tasks = task_set(&[]);
        let mut session = ScriptedSession::default().with_rows(
            "v$session",
            vec![
                Row::from_values(["USER", "ACTIVE", "3"]),
                Row::new(vec![Some("SYSTEM".into()), Some("ACTIVE".into()), None]),
            ],
        );

        let err = find(&tasks, "sessions").run(&mut session).unwrap_err();
        assert_eq!(err.kind(), "decode");
    }

    #[test]
    fn test_column_count_mismatch() {
        let tasks = task_set(&[]);
        let mut session = ScriptedSession::default()
            .with_rows("v$instance", vec![Row::from_values(["1", "2"])]);

        assert!(find(&tasks, "uptime").run(&mut session).is_err());
    }

    #[test]
    fn test_custom_query_sample() {
        let tasks = task_set(&[CustomQuery::new(
            "active_users",
            "select count(*) from v$session where type='USER'",
        )]);
        let mut session = ScriptedSession::default()
            .with_rows("type='USER'", vec![Row::from_values(["42"])]);

        let samples = find(&tasks, "query:active_users").run(&mut session).unwrap();
        assert_eq!(
            samples,
            vec![Sample::new(Family::Query, vec!["active_users".into()], 42.0)]
        );
    }

    #[test]
    fn test_recovery_and_services() {
        let tasks = task_set(&[]);
        let mut session = ScriptedSession::default()
            .with_rows("RECOVERY_AREA", vec![Row::from_values(["12.5", "3"])])
            .with_rows(
                "v$active_services",
                vec![Row::from_values(["SYS$USERS"]), Row::from_values(["orcl pdb"])],
            );

        let recovery = find(&tasks, "recovery").run(&mut session).unwrap();
        assert_eq!(recovery[0].labels, vec!["percent_space_used".to_string()]);
        assert_eq!(recovery[1].value, 3.0);

        let services = find(&tasks, "services").run(&mut session).unwrap();
        assert_eq!(services[1].labels, vec!["orcl_pdb".to_string()]);
        assert!(services.iter().all(|s| s.value == 1.0));
    }

    #[test]
    fn test_recovery_without_recovery_area_is_zero() {
        let tasks = task_set(&[]);
        let recovery = find(&tasks, "recovery");
        assert!(recovery.sql().contains("nvl(sum(percent_space_used),0)"));
        assert!(recovery.sql().contains("nvl(sum(percent_space_reclaimable),0)"));

        let mut session = ScriptedSession::default()
            .with_rows("RECOVERY_AREA", vec![Row::from_values(["0", "0"])]);
        let samples = recovery.run(&mut session).unwrap();
        assert!(samples.iter().all(|s| s.value == 0.0));
    }

    #[test]
    fn test_query_error_propagates() {
        let tasks = task_set(&[]);
        let mut session = ScriptedSession::default().failing("v$log_history");

        let err = find(&tasks, "redo").run(&mut session).unwrap_err();
        assert_eq!(err.kind(), "query");
    }
}
