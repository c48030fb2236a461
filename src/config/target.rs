//! Database target descriptors.

use std::collections::HashSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::validation::{ConfigError, expand_env_vars};

/// Default per-call timeout for every query issued against a target (10 seconds).
///
/// The same bound is applied to session establishment for Easy Connect
/// strings. TNS aliases and full descriptors rely on the client's own
/// connect timeout settings.
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(10);

fn default_timeout() -> Duration {
    DEFAULT_QUERY_TIMEOUT
}

/// A user-defined query whose single numeric column is exported as
/// `oracledb_query{name="..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomQuery {
    /// Value of the `name` label.
    pub name: String,
    /// SQL text, executed verbatim.
    pub sql: String,
}

impl CustomQuery {
    pub fn new(name: impl Into<String>, sql: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sql: sql.into(),
        }
    }
}

/// Credentials used to open a session.
///
/// `Debug` never prints the password.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &"***")
            .finish()
    }
}

/// Immutable configuration for one monitored database.
///
/// Targets are identified by their connection string, which is also the value
/// scrapers pass as `?target=`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Connect descriptor, e.g. `db.example.com:1521/ORCL`.
    pub connection: String,
    #[serde(flatten)]
    pub credentials: Credentials,
    /// Per-call timeout applied to the session (default: 10s).
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
    /// Custom queries, run in order after the built-in tasks.
    #[serde(default)]
    pub queries: Vec<CustomQuery>,
}

impl TargetConfig {
    /// Create a target with no credentials and no custom queries.
    pub fn new(connection: impl Into<String>) -> Self {
        Self {
            connection: connection.into(),
            credentials: Credentials::default(),
            timeout: DEFAULT_QUERY_TIMEOUT,
            queries: Vec::new(),
        }
    }

    /// Identity used by the registry and the scrape endpoint.
    pub fn id(&self) -> &str {
        &self.connection
    }

    pub fn with_credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Credentials {
            user: user.into(),
            password: password.into(),
        };
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_query(mut self, query: CustomQuery) -> Self {
        self.queries.push(query);
        self
    }

    /// Substitute `${VAR}` references in the credentials.
    pub(crate) fn expand_credentials(&mut self) {
        self.credentials.user = expand_env_vars(&self.credentials.user);
        self.credentials.password = expand_env_vars(&self.credentials.password);
    }

    /// Validate a single target.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.connection.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "connection string cannot be empty".to_string(),
            ));
        }

        if self.timeout.is_zero() {
            return Err(ConfigError::ValidationError(format!(
                "target '{}': timeout must be non-zero",
                self.connection
            )));
        }

        let mut seen = HashSet::new();
        for query in &self.queries {
            if query.name.trim().is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "target '{}': query name cannot be empty",
                    self.connection
                )));
            }
            if query.sql.trim().is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "target '{}': query '{}' has empty sql",
                    self.connection, query.name
                )));
            }
            if !seen.insert(query.name.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "target '{}': duplicate query name '{}'",
                    self.connection, query.name
                )));
            }
        }

        Ok(())
    }
}
