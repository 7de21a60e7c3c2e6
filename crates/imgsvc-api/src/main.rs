//! # imgsvc-api: Binary Entry Point
//!
//! Loads configuration, wires stores, index and workers, installs the
//! Prometheus recorder, and serves HTTP on `PORT` (default 8080).

use imgsvc_api::state::AppConfig;
use imgsvc_core::ServiceConfig;
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let service = ServiceConfig::load().map_err(|e| {
        tracing::error!("Configuration invalid: {e}");
        e
    })?;
    let app_config = AppConfig::from_env();
    tracing::info!(?app_config, "starting imgsvc-api");

    let metrics = PrometheusBuilder::new().install_recorder().map_err(|e| {
        tracing::error!("Failed to install Prometheus recorder: {e}");
        e
    })?;

    let wired = imgsvc_api::bootstrap::bootstrap(service, &app_config)
        .await
        .map_err(|e| {
            tracing::error!("Bootstrap failed: {e}");
            e
        })?;

    let app = imgsvc_api::app(wired.state.with_metrics(metrics));

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], app_config.port));
    tracing::info!("imgsvc API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
