//! oracledb_exporter Binary Entry Point
//!
//! Loads the target list, then serves `?target=` scrapes until shutdown.
//! Core functionality is provided by the `oracledb_exporter` library crate.

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use oracledb_exporter::{
    collector::{OracleConnector, TargetRegistry},
    config::{AppConfig, ConfigError, validate_telemetry_path},
    server::{AppState, create_router},
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Prometheus exporter for Oracle databases
#[derive(Parser, Debug)]
#[command(name = "oracledb_exporter", version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(
        long = "config.file",
        default_value = "oracle.yml",
        env = "ORACLEDB_EXPORTER_CONFIG"
    )]
    config: String,

    /// Address to listen on, e.g. `0.0.0.0:9161` or `:9161` (overrides config file)
    #[arg(long = "web.listen-address", env = "ORACLEDB_EXPORTER_LISTEN_ADDRESS")]
    listen_address: Option<String>,

    /// Path under which to expose metrics (overrides config file)
    #[arg(long = "web.telemetry-path", env = "ORACLEDB_EXPORTER_TELEMETRY_PATH")]
    telemetry_path: Option<String>,
}

/// Parse `host:port`, accepting a bare `:port` as all interfaces.
fn parse_listen_address(raw: &str) -> Result<SocketAddr, ConfigError> {
    let full = if raw.starts_with(':') {
        format!("0.0.0.0{}", raw)
    } else {
        raw.to_string()
    };
    full.parse().map_err(|_| {
        ConfigError::ValidationError(format!("invalid listen address: '{}'", raw))
    })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,oracledb_exporter=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting oracledb_exporter");
    tracing::info!("Loading configuration from: {}", cli.config);
    let mut config = AppConfig::load(&cli.config)?;

    // CLI/env overrides (CLI > ENV > config file)
    let addr = match cli.listen_address.as_deref() {
        Some(raw) => parse_listen_address(raw)?,
        None => config.server.listen_addr()?,
    };
    if let Some(path) = cli.telemetry_path {
        validate_telemetry_path(&path)?;
        config.server.telemetry_path = path;
    }

    for target in &config.connections {
        tracing::info!(
            target_id = %target.id(),
            queries = target.queries.len(),
            timeout = ?target.timeout,
            "Configured target"
        );
    }

    let registry = TargetRegistry::new(config.connections, Arc::new(OracleConnector::new()));
    let app = create_router(AppState::new(registry), &config.server.telemetry_path);

    tracing::info!(
        "Listening on http://{}{}",
        addr,
        config.server.telemetry_path
    );
    tracing::info!("Press Ctrl+C to shutdown");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Resolve on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_listen_address() {
        assert_eq!(
            parse_listen_address(":9161").unwrap(),
            "0.0.0.0:9161".parse::<SocketAddr>().unwrap()
        );
        assert_eq!(
            parse_listen_address("127.0.0.1:9000").unwrap().port(),
            9000
        );
        assert!(parse_listen_address("localhost").is_err());
    }

    #[test]
    fn test_cli_flags() {
        let cli = Cli::try_parse_from([
            "oracledb_exporter",
            "--config.file",
            "/etc/oracle.yml",
            "--web.telemetry-path",
            "/metrics",
        ])
        .unwrap();
        assert_eq!(cli.config, "/etc/oracle.yml");
        assert_eq!(cli.telemetry_path.as_deref(), Some("/metrics"));
    }
}
