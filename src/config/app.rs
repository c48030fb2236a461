//! Application configuration structures.

use std::collections::HashSet;
use std::net::{IpAddr, SocketAddr};
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::target::TargetConfig;
use super::validation::ConfigError;

/// Default listen port.
pub const DEFAULT_PORT: u16 = 9161;

/// Default path of the scrape endpoint.
pub const DEFAULT_TELEMETRY_PATH: &str = "/scrape";

// =============================================================================
// Server Configuration
// =============================================================================

/// Web server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server bind address (default: "0.0.0.0").
    pub bind: String,

    /// Server port (default: 9161).
    pub port: u16,

    /// Path under which targets are scraped (default: "/scrape").
    pub telemetry_path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            telemetry_path: DEFAULT_TELEMETRY_PATH.to_string(),
        }
    }
}

impl ServerConfig {
    /// Socket address built from `bind` and `port`.
    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        let ip: IpAddr = self.bind.parse().map_err(|_| {
            ConfigError::ValidationError(format!("invalid server bind address: '{}'", self.bind))
        })?;
        Ok(SocketAddr::new(ip, self.port))
    }
}

// =============================================================================
// Application Configuration
// =============================================================================

/// Top-level configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Web server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Monitored databases, in file order.
    pub connections: Vec<TargetConfig>,
}

impl AppConfig {
    /// Load configuration from a YAML file.
    ///
    /// Credentials are environment-expanded before validation.
    ///
    /// # Errors
    /// Returns `ConfigError` if the file cannot be read, parsed, or validated.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Parse and validate configuration from a YAML string.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let mut config: Self = serde_yaml::from_str(content)?;
        for target in &mut config.connections {
            target.expand_credentials();
        }
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    /// Returns `ConfigError::ValidationError` if any field is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.listen_addr()?;

        if self.server.port == 0 {
            return Err(ConfigError::ValidationError(
                "server port must be non-zero".to_string(),
            ));
        }

        validate_telemetry_path(&self.server.telemetry_path)?;

        if self.connections.is_empty() {
            return Err(ConfigError::ValidationError(
                "at least one connection must be configured".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for target in &self.connections {
            target.validate()?;
            if !seen.insert(target.id()) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate connection: '{}'",
                    target.id()
                )));
            }
        }

        Ok(())
    }
}

/// Path of the liveness probe.
pub const HEALTH_PATH: &str = "/healthz";

/// Paths served by the router besides the telemetry path.
pub const RESERVED_PATHS: [&str; 2] = ["/", HEALTH_PATH];

/// Check that `path` can be mounted as a literal route next to the landing
/// page and health probe.
pub fn validate_telemetry_path(path: &str) -> Result<(), ConfigError> {
    let invalid = |reason: &str| {
        Err(ConfigError::ValidationError(format!(
            "invalid telemetry path: '{}' ({})",
            path, reason
        )))
    };

    if !path.starts_with('/') {
        return invalid("must start with '/'");
    }
    if RESERVED_PATHS.contains(&path) {
        return invalid("reserved");
    }
    if path.contains(['{', '}']) || path.split('/').any(|segment| segment.starts_with(':')) {
        return invalid("route parameters are not allowed");
    }
    Ok(())
}
