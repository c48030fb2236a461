//! Target registry: lazily built, cached scrape handlers.

use std::collections::HashMap;
use std::sync::Arc;

use prometheus::core::{Collector, Desc};
use prometheus::proto::MetricFamily;
use prometheus::{Encoder, Registry, TextEncoder};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::collector::Connector;
use crate::collector::exporter::DatabaseCollector;
use crate::config::TargetConfig;

/// Errors surfaced by the registry to the scrape endpoint.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("target not found: {0}")]
    UnknownTarget(String),

    #[error("failed to register collector for {target}: {source}")]
    Registration {
        target: String,
        #[source]
        source: prometheus::Error,
    },

    #[error("failed to encode metrics: {0}")]
    Encode(String),
}

/// Registers a shared collector with a `prometheus::Registry`, which
/// wants to own its collectors.
struct SharedCollector(Arc<DatabaseCollector>);

impl Collector for SharedCollector {
    fn desc(&self) -> Vec<&Desc> {
        self.0.desc()
    }

    fn collect(&self) -> Vec<MetricFamily> {
        self.0.collect()
    }
}

/// A target's collector together with the metric registry serving it.
pub struct TargetHandler {
    id: String,
    registry: Registry,
    collector: Arc<DatabaseCollector>,
}

impl std::fmt::Debug for TargetHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TargetHandler")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

impl TargetHandler {
    fn new(target: TargetConfig, connector: Arc<dyn Connector>) -> Result<Self, RegistryError> {
        let id = target.id().to_string();
        let registration = |source: prometheus::Error| RegistryError::Registration {
            target: id.clone(),
            source,
        };

        let collector = Arc::new(DatabaseCollector::new(target, connector).map_err(registration)?);
        let registry = Registry::new();
        registry
            .register(Box::new(SharedCollector(Arc::clone(&collector))))
            .map_err(registration)?;

        Ok(Self {
            id,
            registry,
            collector,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn collector(&self) -> &Arc<DatabaseCollector> {
        &self.collector
    }

    /// Run one scrape and encode it in the text exposition format.
    ///
    /// Blocks on database I/O.
    pub fn render(&self) -> Result<String, RegistryError> {
        let families = self.registry.gather();
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&families, &mut buffer)
            .map_err(|e| RegistryError::Encode(e.to_string()))?;
        String::from_utf8(buffer).map_err(|e| RegistryError::Encode(e.to_string()))
    }
}

/// Process-wide map of target id to handler.
///
/// Handlers are created on first request and live for the rest of the
/// process. Only configured targets can ever be resolved.
pub struct TargetRegistry {
    targets: HashMap<String, TargetConfig>,
    connector: Arc<dyn Connector>,
    handlers: RwLock<HashMap<String, Arc<TargetHandler>>>,
}

impl std::fmt::Debug for TargetRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TargetRegistry")
            .field("targets", &self.targets.len())
            .field(
                "handlers",
                &self.handlers.try_read().map(|h| h.len()).unwrap_or(0),
            )
            .finish_non_exhaustive()
    }
}

impl TargetRegistry {
    pub fn new(targets: impl IntoIterator<Item = TargetConfig>, connector: Arc<dyn Connector>) -> Self {
        Self {
            targets: targets
                .into_iter()
                .map(|t| (t.id().to_string(), t))
                .collect(),
            connector,
            handlers: RwLock::new(HashMap::new()),
        }
    }

    /// Number of handlers built so far.
    pub async fn len(&self) -> usize {
        self.handlers.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.handlers.read().await.is_empty()
    }

    /// Return the handler for `id`, building it on first use.
    ///
    /// Concurrent first requests for one id build exactly one handler.
    pub async fn resolve(&self, id: &str) -> Result<Arc<TargetHandler>, RegistryError> {
        let Some(target) = self.targets.get(id) else {
            return Err(RegistryError::UnknownTarget(id.to_string()));
        };

        if let Some(handler) = self.handlers.read().await.get(id) {
            return Ok(Arc::clone(handler));
        }

        let mut handlers = self.handlers.write().await;
        if let Some(handler) = handlers.get(id) {
            return Ok(Arc::clone(handler));
        }

        let handler = Arc::new(TargetHandler::new(
            target.clone(),
            Arc::clone(&self.connector),
        )?);
        handlers.insert(id.to_string(), Arc::clone(&handler));
        tracing::info!(target_id = %id, "Target handler created");
        Ok(handler)
    }
}
