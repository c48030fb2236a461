//! Metric family table.
//!
//! Every family a target exports is declared once in [`Family::spec`]. The
//! [`MetricSet`] holds one `GaugeVec` per family, indexed by the enum, so
//! describe/collect iterate the table instead of naming each family.

use prometheus::core::{Collector, Desc};
use prometheus::proto::MetricFamily;
use prometheus::{GaugeVec, IntCounterVec, Opts};
use strum::IntoEnumIterator;
use strum_macros::{AsRefStr, EnumIter};

/// Metric namespace shared by every family.
pub const NAMESPACE: &str = "oracledb";

/// Subsystem of the scrape bookkeeping families.
pub const EXPORTER_SUBSYSTEM: &str = "exporter";

/// Identity labels carried by every family, in this order.
pub const IDENTITY_LABELS: [&str; 2] = ["database", "instance"];

/// Static description of a family.
#[derive(Debug, Clone, Copy)]
pub struct FamilySpec {
    pub name: &'static str,
    pub help: &'static str,
    /// Labels after the identity labels.
    pub labels: &'static [&'static str],
}

/// Semantic key of each exported gauge family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum Family {
    Up,
    Uptime,
    Session,
    Sysstat,
    Waitclass,
    Sysmetric,
    Tablespace,
    Interconnect,
    Recovery,
    Redo,
    CacheHitRatio,
    Services,
    Parameter,
    Query,
    AsmSpace,
}

impl Family {
    pub const fn spec(self) -> FamilySpec {
        match self {
            Self::Up => FamilySpec {
                name: "up",
                help: "Whether the Oracle server is up.",
                labels: &[],
            },
            Self::Uptime => FamilySpec {
                name: "uptime",
                help: "Gauge metric with uptime in days of the Instance.",
                labels: &[],
            },
            Self::Session => FamilySpec {
                name: "session",
                help: "Gauge metric user/system active/passive sessions (v$session).",
                labels: &["type", "state"],
            },
            Self::Sysstat => FamilySpec {
                name: "sysstat",
                help: "Gauge metric with commits/rollbacks/parses (v$sysstat).",
                labels: &["type"],
            },
            Self::Waitclass => FamilySpec {
                name: "waitclass",
                help: "Gauge metric with Waitevents (v$waitclassmetric).",
                labels: &["type"],
            },
            Self::Sysmetric => FamilySpec {
                name: "sysmetric",
                help: "Gauge metric with read/write physical IOPs/bytes (v$sysmetric).",
                labels: &["type"],
            },
            Self::Tablespace => FamilySpec {
                name: "tablespace",
                help: "Gauge metric with total/free/used size of the Tablespaces.",
                labels: &["type", "name", "contents", "autoextend"],
            },
            Self::Interconnect => FamilySpec {
                name: "interconnect",
                help: "Gauge metric with interconnect block transfers (v$sysstat).",
                labels: &["type"],
            },
            Self::Recovery => FamilySpec {
                name: "recovery",
                help: "Gauge metric with percentage usage of FRA (v$recovery_file_dest).",
                labels: &["type"],
            },
            Self::Redo => FamilySpec {
                name: "redo",
                help: "Gauge metric with Redo log switches over last 5 min (v$log_history).",
                labels: &[],
            },
            Self::CacheHitRatio => FamilySpec {
                name: "cachehitratio",
                help: "Gauge metric with Cache hit ratios (v$sysmetric).",
                labels: &["type"],
            },
            Self::Services => FamilySpec {
                name: "services",
                help: "Active Oracle Services (v$active_services).",
                labels: &["name"],
            },
            Self::Parameter => FamilySpec {
                name: "parameter",
                help: "Oracle Configuration Parameters (v$parameter).",
                labels: &["name"],
            },
            Self::Query => FamilySpec {
                name: "query",
                help: "Self defined Queries from Configuration File.",
                labels: &["name"],
            },
            Self::AsmSpace => FamilySpec {
                name: "asmspace",
                help: "Gauge metric with total/free/used size of the ASM Diskgroups.",
                labels: &["type", "name"],
            },
        }
    }

    /// Fully qualified metric name, e.g. `oracledb_tablespace`.
    pub fn metric_name(self) -> String {
        format!("{}_{}", NAMESPACE, self.spec().name)
    }
}

fn label_names(extra: &[&'static str]) -> Vec<&'static str> {
    IDENTITY_LABELS.iter().chain(extra).copied().collect()
}

fn label_values<'a>(identity: &'a [String; 2], extra: &'a [String]) -> Vec<&'a str> {
    identity.iter().chain(extra).map(String::as_str).collect()
}

/// One `GaugeVec` per [`Family`], in enum order.
#[derive(Clone)]
pub struct MetricSet {
    gauges: Vec<GaugeVec>,
}

impl MetricSet {
    pub fn new() -> prometheus::Result<Self> {
        let gauges = Family::iter()
            .map(|family| {
                let spec = family.spec();
                GaugeVec::new(
                    Opts::new(spec.name, spec.help).namespace(NAMESPACE),
                    &label_names(spec.labels),
                )
            })
            .collect::<prometheus::Result<Vec<_>>>()?;
        Ok(Self { gauges })
    }

    pub fn gauge(&self, family: Family) -> &GaugeVec {
        &self.gauges[family as usize]
    }

    /// Set one series. `extra` must match the family's extra labels.
    pub fn set(
        &self,
        family: Family,
        identity: &[String; 2],
        extra: &[String],
        value: f64,
    ) -> prometheus::Result<()> {
        self.gauge(family)
            .get_metric_with_label_values(&label_values(identity, extra))?
            .set(value);
        Ok(())
    }

    /// Drop every series of every family.
    pub fn reset(&self) {
        for gauge in &self.gauges {
            gauge.reset();
        }
    }

    pub fn descs(&self) -> Vec<&Desc> {
        self.gauges.iter().flat_map(|g| g.desc()).collect()
    }

    pub fn collect(&self) -> Vec<MetricFamily> {
        self.gauges.iter().flat_map(|g| g.collect()).collect()
    }
}

/// Per-target scrape bookkeeping series.
#[derive(Clone)]
pub struct Bookkeeping {
    duration: GaugeVec,
    total_scrapes: IntCounterVec,
    scrape_errors: IntCounterVec,
    last_error: GaugeVec,
}

impl Bookkeeping {
    pub fn new() -> prometheus::Result<Self> {
        let opts = |name: &str, help: &str| {
            Opts::new(name, help)
                .namespace(NAMESPACE)
                .subsystem(EXPORTER_SUBSYSTEM)
        };
        let labels = label_names(&[]);

        Ok(Self {
            duration: GaugeVec::new(
                opts(
                    "last_scrape_duration_seconds",
                    "Duration of the last scrape of metrics from Oracle DB.",
                ),
                &labels,
            )?,
            total_scrapes: IntCounterVec::new(
                opts(
                    "scrapes_total",
                    "Total number of times Oracle DB was scraped for metrics.",
                ),
                &labels,
            )?,
            scrape_errors: IntCounterVec::new(
                opts(
                    "scrape_errors_total",
                    "Total number of times an error occurred scraping a Oracle database.",
                ),
                &labels,
            )?,
            last_error: GaugeVec::new(
                opts(
                    "last_scrape_error",
                    "Whether the last scrape of metrics from Oracle DB resulted in an error (1 for error, 0 for success).",
                ),
                &labels,
            )?,
        })
    }

    /// Record one finished scrape cycle.
    pub fn record(
        &self,
        identity: &[String; 2],
        duration_secs: f64,
        failed: bool,
    ) -> prometheus::Result<()> {
        let values = label_values(identity, &[]);
        self.total_scrapes
            .get_metric_with_label_values(&values)?
            .inc();
        let errors = self.scrape_errors.get_metric_with_label_values(&values)?;
        if failed {
            errors.inc();
        }
        self.duration
            .get_metric_with_label_values(&values)?
            .set(duration_secs);
        self.last_error
            .get_metric_with_label_values(&values)?
            .set(if failed { 1.0 } else { 0.0 });
        Ok(())
    }

    pub fn descs(&self) -> Vec<&Desc> {
        let mut descs = self.duration.desc();
        descs.extend(self.total_scrapes.desc());
        descs.extend(self.last_error.desc());
        descs.extend(self.scrape_errors.desc());
        descs
    }

    pub fn collect(&self) -> Vec<MetricFamily> {
        let mut families = self.duration.collect();
        families.extend(self.total_scrapes.collect());
        families.extend(self.last_error.collect());
        families.extend(self.scrape_errors.collect());
        families
    }
}

/// Normalize a database-reported name into a label value: spaces become
/// underscores, parentheses and slashes are removed, and the result is
/// lowercased.
pub fn clean_name(raw: &str) -> String {
    raw.chars()
        .filter(|c| !matches!(c, '(' | ')' | '/'))
        .map(|c| if c == ' ' { '_' } else { c })
        .collect::<String>()
        .to_lowercase()
}
