//! # HTTP Metrics
//!
//! Request counters and latency recorded through the `metrics` facade. The
//! binary installs a Prometheus recorder and serves it on `/metrics`; without
//! a recorder the macros are no-ops.

use std::time::Instant;

use axum::extract::{MatchedPath, Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use metrics_exporter_prometheus::PrometheusHandle;

use crate::error::AppError;
use crate::state::AppState;

pub const HTTP_REQUESTS: &str = "imgsvc_http_requests_total";
pub const HTTP_DURATION: &str = "imgsvc_http_request_duration_seconds";

/// Status class label, e.g. `2xx`.
pub fn status_class(status: StatusCode) -> &'static str {
    match status.as_u16() {
        100..=199 => "1xx",
        200..=299 => "2xx",
        300..=399 => "3xx",
        400..=499 => "4xx",
        _ => "5xx",
    }
}

/// Count every request by status class and record its latency by route.
pub async fn metrics_middleware(request: Request, next: Next) -> Response {
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_owned())
        .unwrap_or_else(|| "unmatched".to_owned());
    let method = request.method().to_string();
    let started = Instant::now();

    let response = next.run(request).await;

    ::metrics::counter!(HTTP_REQUESTS, "status_class" => status_class(response.status()))
        .increment(1);
    ::metrics::histogram!(HTTP_DURATION, "method" => method, "route" => route)
        .record(started.elapsed().as_secs_f64());
    response
}

/// GET /metrics: Prometheus text exposition.
pub async fn render(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => render_handle(handle).into_response(),
        None => AppError::NotFound("metrics recorder not installed".into()).into_response(),
    }
}

fn render_handle(handle: &PrometheusHandle) -> impl IntoResponse {
    (
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4",
        )],
        handle.render(),
    )
}
