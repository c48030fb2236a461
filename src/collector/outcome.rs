//! Per-cycle scrape state and failure bookkeeping.

use std::time::Duration;

use strum_macros::{AsRefStr, Display};

use crate::collector::CollectorError;
use crate::collector::tasks::Sample;

/// Lifecycle of a single scrape cycle.
///
/// `Idle → Connecting → (Connected | Disconnected) → Scraping → Reporting → Idle`.
/// Nothing persists between cycles; every scrape starts from `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum ScrapeState {
    Idle,
    Connecting,
    Connected,
    Disconnected,
    Scraping,
    Reporting,
}

impl ScrapeState {
    /// Whether `next` is a legal successor of `self`.
    pub fn can_transition_to(self, next: ScrapeState) -> bool {
        use ScrapeState::*;
        matches!(
            (self, next),
            (Idle, Connecting)
                | (Connecting, Connected)
                | (Connecting, Disconnected)
                | (Connected, Scraping)
                | (Disconnected, Scraping)
                | (Scraping, Reporting)
                | (Reporting, Idle)
        )
    }
}

/// Self-reported database identity, discovered on connect.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identity {
    pub database: String,
    pub instance: String,
}

impl Identity {
    pub fn new(database: impl Into<String>, instance: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            instance: instance.into(),
        }
    }

    /// Identity label values, in `IDENTITY_LABELS` order.
    pub fn labels(&self) -> [String; 2] {
        [self.database.clone(), self.instance.clone()]
    }
}

/// A task that failed during the cycle.
#[derive(Debug)]
pub struct TaskFailure {
    pub task: String,
    pub error: CollectorError,
}

/// Everything a scrape cycle produced, gathered before publication.
#[derive(Debug)]
pub struct ScrapeOutcome {
    state: ScrapeState,
    /// `Some` only when the connection and identity query both succeeded.
    identity: Option<Identity>,
    connect_error: Option<CollectorError>,
    samples: Vec<Sample>,
    failures: Vec<TaskFailure>,
    tasks_run: usize,
    duration: Duration,
}

impl Default for ScrapeOutcome {
    fn default() -> Self {
        Self::new()
    }
}

impl ScrapeOutcome {
    pub fn new() -> Self {
        Self {
            state: ScrapeState::Idle,
            identity: None,
            connect_error: None,
            samples: Vec::new(),
            failures: Vec::new(),
            tasks_run: 0,
            duration: Duration::ZERO,
        }
    }

    pub fn state(&self) -> ScrapeState {
        self.state
    }

    /// Advance the cycle. Illegal transitions are logged and ignored.
    pub fn advance(&mut self, next: ScrapeState) {
        if self.state.can_transition_to(next) {
            tracing::trace!(from = %self.state, to = %next, "Scrape state transition");
            self.state = next;
        } else {
            tracing::warn!(from = %self.state, to = %next, "Ignoring invalid scrape state transition");
        }
    }

    pub fn connected(&mut self, identity: Identity) {
        self.identity = Some(identity);
        self.advance(ScrapeState::Connected);
    }

    pub fn disconnected(&mut self, error: CollectorError) {
        self.identity = None;
        self.connect_error = Some(error);
        self.advance(ScrapeState::Disconnected);
    }

    /// Fold one task result into the outcome.
    pub fn record(&mut self, task: &str, result: Result<Vec<Sample>, CollectorError>) {
        self.tasks_run += 1;
        match result {
            Ok(samples) => self.samples.extend(samples),
            Err(error) => self.failures.push(TaskFailure {
                task: task.to_string(),
                error,
            }),
        }
    }

    pub fn set_duration(&mut self, duration: Duration) {
        self.duration = duration;
    }

    pub fn is_up(&self) -> bool {
        self.identity.is_some()
    }

    /// Identity used for labels; empty when disconnected.
    pub fn identity(&self) -> Identity {
        self.identity.clone().unwrap_or_default()
    }

    pub fn connect_error(&self) -> Option<&CollectorError> {
        self.connect_error.as_ref()
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn failures(&self) -> &[TaskFailure] {
        &self.failures
    }

    pub fn tasks_run(&self) -> usize {
        self.tasks_run
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// A cycle counts as failed when connecting or any task failed.
    pub fn failed(&self) -> bool {
        self.connect_error.is_some() || !self.failures.is_empty()
    }
}
