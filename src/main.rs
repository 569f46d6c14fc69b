//! Binary entrypoint: boots the test/admin HTTP backend over a fresh [`Engine`].
//!
//! Installs the process-wide `tracing` subscriber and Prometheus recorder
//! (library code never does either itself — SPEC §10.1/§10.4) and serves
//! `api::router` on `PORT` (default `8080`).

use sentinel_rules_engine::{app_with_metrics, EngineConfig};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = std::env::var("ENGINE_CONFIG_PATH")
        .ok()
        .and_then(|path| match EngineConfig::load_from_file(&path) {
            Ok(cfg) => Some(cfg),
            Err(err) => {
                tracing::warn!(path, %err, "failed to load engine config, using defaults");
                None
            }
        })
        .unwrap_or_default();

    let router = app_with_metrics(config);

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8080);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    tracing::info!(port, "sentinel-rules-engine admin backend listening");
    axum::serve(listener, router).await?;
    Ok(())
}
