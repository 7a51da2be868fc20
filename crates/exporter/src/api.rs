//! HTTP API for health checks, Prometheus metrics and the config view

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Router,
};
use chrono::SecondsFormat;
use std::fmt::Write as _;
use std::sync::Arc;
use threshold_core::{ConfigManager, ExporterMetrics};
use tracing::{error, info};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<ConfigManager>,
    pub metrics: ExporterMetrics,
}

impl AppState {
    pub fn new(manager: Arc<ConfigManager>, metrics: ExporterMetrics) -> Self {
        Self { manager, metrics }
    }
}

/// Liveness: the process is serving
async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok\n")
}

/// Readiness - returns 200 once a config has been loaded, 503 before
async fn ready(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    if state.manager.is_loaded() {
        (StatusCode::OK, "ready\n")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "config not loaded\n")
    }
}

/// Prometheus metrics endpoint
async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)],
            body,
        ),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
                format!("failed to encode metrics: {e}\n"),
            )
        }
    }
}

/// Plain-text view of the loaded config and what it resolves to
async fn config_view(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        render_config(&state.manager),
    )
}

pub fn render_config(manager: &ConfigManager) -> String {
    let mut out = String::new();
    let last_reload = manager
        .last_reload()
        .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_else(|| "never".to_string());

    let _ = writeln!(out, "Config loaded: {}", manager.is_loaded());
    let _ = writeln!(out, "Last reload:   {last_reload}");

    let Some(config) = manager.current() else {
        let _ = writeln!(out, "No config loaded");
        return out;
    };

    let _ = writeln!(out, "\nDefaults ({} metrics):", config.defaults.len());
    for (metric, value) in &config.defaults {
        let _ = writeln!(out, "  {metric}: {value}");
    }

    let _ = writeln!(out, "\nTenants ({}):", config.tenants.len());
    for (tenant, overrides) in &config.tenants {
        let _ = writeln!(out, "  {tenant}:");
        for (metric, value) in overrides.iter() {
            let _ = writeln!(out, "    {metric}: {value}");
        }
    }

    let _ = writeln!(out, "\nResolved thresholds:");
    for t in config.resolve() {
        let _ = writeln!(
            out,
            "  tenant={} metric={} value={} severity={} component={}",
            t.tenant, t.metric, t.value, t.severity, t.component
        );
    }

    out
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/metrics", get(metrics))
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/api/v1/config", get(config_view))
        .with_state(state)
}

/// Start the API server
pub async fn serve(addr: String, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
