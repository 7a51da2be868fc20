//! Observability for the threshold exporter
//!
//! Provides:
//! - A Prometheus collector that resolves the current config on every scrape
//! - Reload counters on an explicit registry
//! - Structured JSON logging with tracing

use chrono::Utc;
use prometheus::core::{Collector, Desc};
use prometheus::proto::MetricFamily;
use prometheus::{Encoder, GaugeVec, IntCounter, IntGauge, Opts, Registry, TextEncoder};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::error::LoadError;
use crate::reload::{ConfigManager, LoadSummary};
use crate::resolve::ThresholdConfig;

const THRESHOLD_METRIC: &str = "user_threshold";
const THRESHOLD_HELP: &str =
    "User-defined alerting threshold (config-driven, three-state: custom/default/disable)";
const THRESHOLD_LABELS: &[&str] = &["tenant", "metric", "component", "severity"];

const STATE_FILTER_METRIC: &str = "user_state_filter";
const STATE_FILTER_HELP: &str =
    "State-based monitoring filter flag (1=enabled, absent=disabled)";
const STATE_FILTER_LABELS: &[&str] = &["tenant", "filter", "severity"];

fn desc(name: &str, help: &str, labels: &[&str]) -> prometheus::Result<Desc> {
    Desc::new(
        name.to_string(),
        help.to_string(),
        labels.iter().map(|l| l.to_string()).collect(),
        HashMap::new(),
    )
}

/// Exposes `user_threshold` and `user_state_filter` gauges
///
/// Nothing is cached between scrapes: each collection resolves the
/// snapshot current at that moment.
pub struct ThresholdCollector {
    manager: Arc<ConfigManager>,
    descs: Vec<Desc>,
}

impl ThresholdCollector {
    pub fn new(manager: Arc<ConfigManager>) -> prometheus::Result<Self> {
        Ok(Self {
            manager,
            descs: vec![
                desc(THRESHOLD_METRIC, THRESHOLD_HELP, THRESHOLD_LABELS)?,
                desc(STATE_FILTER_METRIC, STATE_FILTER_HELP, STATE_FILTER_LABELS)?,
            ],
        })
    }

    fn families(config: &ThresholdConfig) -> prometheus::Result<Vec<MetricFamily>> {
        let thresholds = GaugeVec::new(Opts::new(THRESHOLD_METRIC, THRESHOLD_HELP), THRESHOLD_LABELS)?;
        for t in config.resolve() {
            thresholds
                .with_label_values(&[
                    t.tenant.as_str(),
                    t.metric.as_str(),
                    t.component.as_str(),
                    t.severity.as_str(),
                ])
                .set(t.value);
        }

        let filters = GaugeVec::new(
            Opts::new(STATE_FILTER_METRIC, STATE_FILTER_HELP),
            STATE_FILTER_LABELS,
        )?;
        for f in config.resolve_state_filters() {
            filters
                .with_label_values(&[f.tenant.as_str(), f.filter.as_str(), f.severity.as_str()])
                .set(1.0);
        }

        let mut families = thresholds.collect();
        families.extend(filters.collect());
        Ok(families)
    }
}

impl Collector for ThresholdCollector {
    fn desc(&self) -> Vec<&Desc> {
        self.descs.iter().collect()
    }

    fn collect(&self) -> Vec<MetricFamily> {
        let Some(config) = self.manager.current() else {
            return Vec::new();
        };

        match Self::families(&config) {
            Ok(families) => families,
            Err(e) => {
                error!(error = %e, "Failed to build threshold metrics");
                Vec::new()
            }
        }
    }
}

/// Exporter metrics for Prometheus exposition
///
/// Clones share the same registry and counters.
#[derive(Clone)]
pub struct ExporterMetrics {
    registry: Registry,
    reloads: IntCounter,
    reload_failures: IntCounter,
    last_reload_timestamp: IntGauge,
}

impl ExporterMetrics {
    /// Build the registry with the threshold collector and reload counters
    pub fn new(manager: Arc<ConfigManager>) -> prometheus::Result<Self> {
        let registry = Registry::new();

        let reloads = IntCounter::new(
            "threshold_exporter_config_reloads_total",
            "Total number of successful config loads",
        )?;
        let reload_failures = IntCounter::new(
            "threshold_exporter_config_reload_errors_total",
            "Total number of failed config reloads",
        )?;
        let last_reload_timestamp = IntGauge::new(
            "threshold_exporter_config_last_reload_timestamp_seconds",
            "Unix time of the last successful config load",
        )?;

        registry.register(Box::new(ThresholdCollector::new(manager)?))?;
        registry.register(Box::new(reloads.clone()))?;
        registry.register(Box::new(reload_failures.clone()))?;
        registry.register(Box::new(last_reload_timestamp.clone()))?;

        Ok(Self {
            registry,
            reloads,
            reload_failures,
            last_reload_timestamp,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_reload(&self) {
        self.reloads.inc();
        self.last_reload_timestamp.set(Utc::now().timestamp());
    }

    pub fn record_reload_failure(&self) {
        self.reload_failures.inc();
    }

    /// Render the registry in the text exposition format
    pub fn encode(&self) -> prometheus::Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

/// Structured logger for exporter events
#[derive(Clone)]
pub struct StructuredLogger {
    config_path: String,
}

impl StructuredLogger {
    pub fn new(config_path: impl Into<String>) -> Self {
        Self {
            config_path: config_path.into(),
        }
    }

    pub fn log_startup(&self, version: &str, listen_addr: &str, reload_interval: Duration) {
        info!(
            event = "exporter_started",
            config_path = %self.config_path,
            listen_addr = %listen_addr,
            reload_interval_secs = reload_interval.as_secs(),
            exporter_version = %version,
            "Threshold exporter starting"
        );
    }

    pub fn log_config_loaded(&self, summary: &LoadSummary) {
        info!(
            event = "config_loaded",
            config_path = %self.config_path,
            defaults = summary.defaults,
            state_filters = summary.state_filters,
            tenants = summary.tenants,
            resolved_thresholds = summary.resolved_thresholds,
            resolved_state_filters = summary.resolved_state_filters,
            "Config loaded"
        );
    }

    pub fn log_reload_failed(&self, err: &LoadError) {
        warn!(
            event = "config_reload_failed",
            config_path = %self.config_path,
            error = %err,
            "Config reload failed, keeping previous config"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "exporter_shutdown",
            config_path = %self.config_path,
            reason = %reason,
            "Threshold exporter shutting down"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const CONFIG: &str = "\
defaults:
  mysql_cpu: 80
state_filters:
  container_crashloop:
    reasons: [CrashLoopBackOff]
    severity: critical
tenants:
  db-a:
    mysql_cpu: \"60:critical\"
  db-b:
    mysql_cpu: disable
    _state_container_crashloop: disable
";

    async fn loaded(dir: &TempDir) -> Arc<ConfigManager> {
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, CONFIG).unwrap();
        let manager = Arc::new(ConfigManager::new(path));
        manager.load().await.unwrap();
        manager
    }

    fn series<'a>(text: &'a str, metric: &str) -> Vec<&'a str> {
        text.lines()
            .filter(|l| l.starts_with(&format!("{metric}{{")))
            .collect()
    }

    #[tokio::test]
    async fn test_collector_exposes_resolved_config() {
        let dir = TempDir::new().unwrap();
        let metrics = ExporterMetrics::new(loaded(&dir).await).unwrap();
        let text = metrics.encode().unwrap();

        let thresholds = series(&text, THRESHOLD_METRIC);
        assert_eq!(thresholds.len(), 1);
        assert!(thresholds[0].contains("tenant=\"db-a\""));
        assert!(thresholds[0].contains("severity=\"critical\""));
        assert!(thresholds[0].ends_with(" 60"));

        let filters = series(&text, STATE_FILTER_METRIC);
        assert_eq!(filters.len(), 1);
        assert!(filters[0].contains("tenant=\"db-a\""));
        assert!(filters[0].ends_with(" 1"));
    }

    #[tokio::test]
    async fn test_collector_empty_before_load() {
        let manager = Arc::new(ConfigManager::new("/nonexistent/config.yaml"));
        let metrics = ExporterMetrics::new(manager).unwrap();
        let text = metrics.encode().unwrap();

        assert!(series(&text, THRESHOLD_METRIC).is_empty());
        assert!(text.contains("threshold_exporter_config_reloads_total 0"));
    }

    #[tokio::test]
    async fn test_reload_counters() {
        let dir = TempDir::new().unwrap();
        let metrics = ExporterMetrics::new(loaded(&dir).await).unwrap();
        metrics.record_reload();
        metrics.record_reload_failure();

        let text = metrics.encode().unwrap();
        assert!(text.contains("threshold_exporter_config_reloads_total 1"));
        assert!(text.contains("threshold_exporter_config_reload_errors_total 1"));
    }

    #[test]
    fn test_structured_logger_creation() {
        let logger = StructuredLogger::new("/etc/threshold-exporter/config.yaml");
        assert_eq!(logger.config_path, "/etc/threshold-exporter/config.yaml");
    }
}
