//! # Middleware
//!
//! - `edge_cache`: response cache in front of the variant read route.
//! - `metrics`: request counters and latency histograms, `/metrics`.
//! - `tracing_layer`: request spans via `tower_http`.

pub mod edge_cache;
pub mod metrics;
pub mod tracing_layer;
