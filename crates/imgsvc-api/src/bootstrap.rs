//! # Service Bootstrap
//!
//! Builds the production wiring from [`ServiceConfig`] and [`AppConfig`]:
//!
//! 1. Raw and formatted object stores (memory or filesystem).
//! 2. The Raw Store wrapped in a [`NotifyingStore`], so every stored upload
//!    emits a raw-created event.
//! 3. The Variant Index: Postgres when `DATABASE_URL` is set, memory
//!    otherwise.
//! 4. The [`EagerWorker`] consuming raw-created events on a background task.
//! 5. The request-path [`AppState`].

use std::sync::Arc;

use imgsvc_core::{ServiceConfig, StoreLocation};
use imgsvc_pipeline::{Collaborators, EagerTransformer, EagerWorker, RetryPolicy};
use imgsvc_store::{
    FsObjectStore, MemoryObjectStore, MemoryVariantIndex, NotifyingStore, ObjectStore,
    StoreError, VariantIndex,
};
use imgsvc_transform::ImageTransform;
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::db::{self, PgVariantIndex};
use crate::state::{AppConfig, AppState};

/// Startup failures.
#[derive(Error, Debug)]
pub enum BootstrapError {
    #[error("failed to open {tier} store: {source}")]
    Store {
        tier: &'static str,
        #[source]
        source: StoreError,
    },

    #[error("database initialization failed: {0}")]
    Database(#[from] sqlx::Error),

    #[error("database migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// A wired service: request-path state plus the running eager worker.
#[derive(Debug)]
pub struct Service {
    pub state: AppState,
    /// Finishes once every raw-store handle is dropped and in-flight
    /// events are drained.
    pub eager_worker: JoinHandle<()>,
}

async fn open_store(
    tier: &'static str,
    location: &StoreLocation,
) -> Result<Arc<dyn ObjectStore>, BootstrapError> {
    match location {
        StoreLocation::Memory => {
            tracing::info!(tier, "using in-memory object store");
            Ok(Arc::new(MemoryObjectStore::new()))
        }
        StoreLocation::Filesystem { root } => {
            let store = FsObjectStore::open(root.clone())
                .await
                .map_err(|source| BootstrapError::Store { tier, source })?;
            tracing::info!(tier, root = %root.display(), "using filesystem object store");
            Ok(Arc::new(store))
        }
    }
}

async fn open_index(app: &AppConfig) -> Result<Arc<dyn VariantIndex>, BootstrapError> {
    match &app.database_url {
        Some(url) => {
            let pool = db::init_pool(url).await?;
            Ok(Arc::new(PgVariantIndex::new(pool)))
        }
        None => {
            tracing::warn!(
                "DATABASE_URL not set, running with an in-memory variant index. \
                 Index entries will not survive restarts."
            );
            Ok(Arc::new(MemoryVariantIndex::new()))
        }
    }
}

/// Wire every component and start the eager worker.
pub async fn bootstrap(service: ServiceConfig, app: &AppConfig) -> Result<Service, BootstrapError> {
    let raw = open_store("raw", &service.raw_store).await?;
    let formatted = open_store("formatted", &service.formatted_store).await?;
    let index = open_index(app).await?;

    let (raw, events) = NotifyingStore::new(raw);
    let deps = Collaborators::new(
        Arc::new(raw),
        formatted,
        index,
        Arc::new(ImageTransform::new()),
    );

    let eager = EagerTransformer::new(deps.clone(), &service);
    tracing::info!(
        defaults = eager.defaults().len(),
        "eager transformer configured"
    );
    let eager_worker = EagerWorker::new(Arc::new(eager), RetryPolicy::default()).spawn(events);

    Ok(Service {
        state: AppState::with_collaborators(service, deps),
        eager_worker,
    })
}
