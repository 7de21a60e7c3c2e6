//! # Application State
//!
//! Shared state for the Axum application, passed to all route handlers
//! via the `State` extractor.
//!
//! AppState owns the request-path pipeline components:
//! - **Uploads**: the [`UploadHandler`] writing to the Raw Store, including
//!   upload tickets.
//! - **On-demand reads**: the [`OnDemandTransformer`] serving variants.
//! - **Edge cache**: the [`EdgeCache`] in front of the read route.
//!
//! The eager path is not reachable from handlers. It runs as a background
//! worker fed by the Raw Store's notifications; see [`crate::bootstrap`].

use std::sync::Arc;

use imgsvc_core::ServiceConfig;
use imgsvc_pipeline::{Collaborators, OnDemandTransformer, UploadHandler};
use imgsvc_store::{MemoryObjectStore, MemoryVariantIndex};
use imgsvc_transform::ImageTransform;
use metrics_exporter_prometheus::PrometheusHandle;

use crate::middleware::edge_cache::EdgeCache;

/// Process-level settings of the API binary.
#[derive(Clone)]
pub struct AppConfig {
    /// Port to bind the HTTP server to.
    pub port: u16,
    /// Postgres URL for the Variant Index. In-memory index when absent.
    pub database_url: Option<String>,
}

impl AppConfig {
    /// Read `PORT` (default 8080) and `DATABASE_URL`.
    pub fn from_env() -> Self {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let port = lookup("PORT").and_then(|p| p.parse().ok()).unwrap_or(8080);
        let database_url = lookup("DATABASE_URL").filter(|url| !url.trim().is_empty());
        Self { port, database_url }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            database_url: None,
        }
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("port", &self.port)
            .field(
                "database_url",
                &self.database_url.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

/// Shared application state.
#[derive(Debug, Clone)]
pub struct AppState {
    pub service: Arc<ServiceConfig>,
    pub uploads: Arc<UploadHandler>,
    pub on_demand: Arc<OnDemandTransformer>,
    pub edge_cache: EdgeCache,
    /// Prometheus handle for `/metrics`. `None` when no recorder is installed.
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    /// In-memory stores, the image transform, and default configuration.
    pub fn new() -> Self {
        Self::in_memory(ServiceConfig::default())
    }

    /// In-memory stores and the image transform under `service`.
    pub fn in_memory(service: ServiceConfig) -> Self {
        let deps = Collaborators::new(
            Arc::new(MemoryObjectStore::new()),
            Arc::new(MemoryObjectStore::new()),
            Arc::new(MemoryVariantIndex::new()),
            Arc::new(ImageTransform::new()),
        );
        Self::with_collaborators(service, deps)
    }

    /// Wire the request-path components over the given collaborators.
    pub fn with_collaborators(service: ServiceConfig, deps: Collaborators) -> Self {
        let uploads = UploadHandler::new(deps.raw.clone(), &service);
        let edge_cache = EdgeCache::new(service.edge_ttl(), service.edge_max_entries);
        let on_demand = OnDemandTransformer::new(deps, &service);
        Self {
            service: Arc::new(service),
            uploads: Arc::new(uploads),
            on_demand: Arc::new(on_demand),
            edge_cache,
            metrics: None,
        }
    }

    /// Serve `/metrics` from `handle`.
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
