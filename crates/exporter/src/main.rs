//! Threshold Exporter - per-tenant alerting thresholds for Prometheus
//!
//! Reads the tenant threshold config mounted from the `threshold-config`
//! ConfigMap, reloads it when the file changes, and serves the resolved
//! thresholds on `/metrics`.

use anyhow::{Context, Result};
use std::sync::Arc;
use threshold_core::{ConfigManager, ExporterMetrics, StructuredLogger};
use threshold_exporter::{api, config::ExporterConfig};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const EXPORTER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    let config = ExporterConfig::load().context("invalid exporter configuration")?;

    let logger = StructuredLogger::new(config.config_path.display().to_string());
    logger.log_startup(EXPORTER_VERSION, &config.listen_addr, config.reload_interval());

    let manager = Arc::new(ConfigManager::new(&config.config_path));
    let metrics = ExporterMetrics::new(manager.clone()).context("failed to register metrics")?;

    let summary = manager
        .load()
        .await
        .with_context(|| format!("failed to load config from {}", config.config_path.display()))?;
    metrics.record_reload();
    logger.log_config_loaded(&summary);

    tokio::spawn(
        manager
            .clone()
            .watch(config.reload_interval(), metrics.clone(), logger.clone()),
    );

    let app_state = Arc::new(api::AppState::new(manager, metrics));
    let server = tokio::spawn(api::serve(config.bind_addr(), app_state));

    tokio::select! {
        result = server => {
            result.context("API server task panicked")??;
        }
        _ = shutdown_signal() => {
            logger.log_shutdown("signal received");
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
