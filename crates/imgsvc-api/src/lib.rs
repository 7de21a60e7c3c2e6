//! # imgsvc-api: HTTP Service for imgsvc
//!
//! ## API Surface
//!
//! | Route                                  | Module                 |
//! |----------------------------------------|------------------------|
//! | `POST /v1/images`                      | [`routes::images`]     |
//! | `PUT /v1/images/{image_id}`            | [`routes::images`]     |
//! | `GET /v1/images/{image_id}?w=&h=...`   | [`routes::images`]     |
//! | `GET /v1/images/{image_id}/variants`   | [`routes::images`]     |
//! | `POST /v1/uploads`                     | [`routes::uploads`]    |
//! | `GET /health/liveness`, `/readiness`   | [`routes::health`]     |
//! | `GET /metrics`                         | [`middleware::metrics`]|
//! | `GET /openapi.json`                    | [`openapi`]            |
//!
//! ## Middleware Stack (execution order)
//!
//! ```text
//! TraceLayer → MetricsMiddleware → Handler
//!                                  └ GET /v1/images/{id}: EdgeCache → Handler
//! ```

pub mod bootstrap;
pub mod db;
pub mod error;
pub mod middleware;
pub mod openapi;
pub mod routes;
pub mod state;

use axum::middleware::from_fn;
use axum::routing::get;
use axum::Router;

use crate::state::AppState;

/// Assemble the full application router with all routes and middleware.
///
/// Health checks are mounted outside the metrics and trace layers.
pub fn app(state: AppState) -> Router {
    // One byte over the limit reaches the upload handler, which answers 413
    // in the structured error format.
    let body_limit = usize::try_from(state.uploads.max_upload_bytes())
        .unwrap_or(usize::MAX)
        .saturating_add(1);

    let api = Router::new()
        .merge(routes::images::router(state.edge_cache.clone(), body_limit))
        .merge(routes::uploads::router())
        .merge(openapi::router())
        .route("/metrics", get(middleware::metrics::render))
        .layer(from_fn(middleware::metrics::metrics_middleware))
        .layer(middleware::tracing_layer::layer())
        .with_state(state.clone());

    Router::new()
        .merge(routes::health::router().with_state(state))
        .merge(api)
}
