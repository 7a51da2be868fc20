//! Threshold resolution
//!
//! Turns the full config document into the thresholds the exporter exposes.
//! Each tenant × default metric pair resolves to one of three states:
//!
//! - custom override → the override's value (and severity, if tagged)
//! - no override     → the system default
//! - disabled        → nothing is exposed
//!
//! State filters follow the same "absent means disabled" rule, switched off
//! per tenant with a `_state_<filter>` override.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use tracing::{debug, warn};

use crate::codec::tenants_from_value;
use crate::error::DecodeError;
use crate::models::TenantMap;

/// Prefix of tenant keys that toggle state filters
pub const STATE_PREFIX: &str = "_state_";

/// Severity used when neither the override nor the filter names one
pub const DEFAULT_SEVERITY: &str = "warning";

/// Component used for metric keys without an underscore
const DEFAULT_COMPONENT: &str = "default";

/// A state-based monitoring filter (e.g. container waiting reasons)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateFilter {
    #[serde(default)]
    pub reasons: Vec<String>,
    #[serde(default)]
    pub severity: String,
}

/// The full threshold config as read by the exporter
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ThresholdConfig {
    pub defaults: IndexMap<String, f64>,
    pub state_filters: IndexMap<String, StateFilter>,
    pub tenants: TenantMap,
}

/// Where a resolved value came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ThresholdSource {
    Custom,
    Default,
}

/// One exposed threshold for a tenant and metric
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedThreshold {
    pub tenant: String,
    pub metric: String,
    pub component: String,
    pub value: f64,
    pub severity: String,
    pub source: ThresholdSource,
}

/// One enabled state filter for a tenant
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedStateFilter {
    pub tenant: String,
    pub filter: String,
    pub severity: String,
}

impl ThresholdConfig {
    /// Parse the whole document; missing sections are empty
    pub fn from_yaml(raw: &str) -> Result<Self, DecodeError> {
        if raw.trim().is_empty() {
            return Err(DecodeError::Empty);
        }

        let root = match serde_yaml::from_str::<Value>(raw)? {
            Value::Mapping(map) => map,
            Value::Null => return Ok(Self::default()),
            _ => return Err(DecodeError::NotAMapping { found: "a non-mapping value" }),
        };

        let defaults = section(root.get("defaults"), "defaults")?;
        let state_filters = section(root.get("state_filters"), "state_filters")?;
        let tenants = match root.get("tenants") {
            Some(value) => tenants_from_value(value)?,
            None => TenantMap::new(),
        };

        Ok(Self {
            defaults,
            state_filters,
            tenants,
        })
    }

    /// Resolve every tenant × default metric pair
    pub fn resolve(&self) -> Vec<ResolvedThreshold> {
        let mut resolved = Vec::new();

        for (tenant, overrides) in &self.tenants {
            for (metric_key, default_value) in &self.defaults {
                if metric_key.starts_with(STATE_PREFIX) {
                    continue;
                }

                let (component, metric) = split_metric_key(metric_key);
                let mut severity = DEFAULT_SEVERITY.to_string();

                if let Some(value) = overrides.get(metric_key) {
                    if value.is_disabled() {
                        debug!(tenant = %tenant, metric = %metric_key, "Threshold disabled");
                        continue;
                    }

                    if let Some(priority) = value.priority() {
                        severity = priority.trim().to_string();
                    }

                    if let Some(custom) = value.numeric() {
                        resolved.push(ResolvedThreshold {
                            tenant: tenant.clone(),
                            metric: metric.to_string(),
                            component: component.to_string(),
                            value: custom,
                            severity,
                            source: ThresholdSource::Custom,
                        });
                        continue;
                    }

                    warn!(
                        tenant = %tenant,
                        metric = %metric_key,
                        value = %value,
                        "Unknown threshold value, using default"
                    );
                }

                resolved.push(ResolvedThreshold {
                    tenant: tenant.clone(),
                    metric: metric.to_string(),
                    component: component.to_string(),
                    value: *default_value,
                    severity,
                    source: ThresholdSource::Default,
                });
            }
        }

        resolved
    }

    /// Resolve state filters; every tenant gets every filter unless it opts out
    pub fn resolve_state_filters(&self) -> Vec<ResolvedStateFilter> {
        let mut resolved = Vec::new();

        for (name, filter) in &self.state_filters {
            let severity = if filter.severity.is_empty() {
                DEFAULT_SEVERITY
            } else {
                filter.severity.as_str()
            };
            let state_key = format!("{STATE_PREFIX}{name}");

            for (tenant, overrides) in &self.tenants {
                if overrides.get(&state_key).is_some_and(|v| v.is_disabled()) {
                    continue;
                }
                resolved.push(ResolvedStateFilter {
                    tenant: tenant.clone(),
                    filter: name.clone(),
                    severity: severity.to_string(),
                });
            }
        }

        resolved
    }
}

fn section<T>(value: Option<&Value>, name: &'static str) -> Result<T, DecodeError>
where
    T: Default + for<'de> Deserialize<'de>,
{
    match value {
        None | Some(Value::Null) => Ok(T::default()),
        Some(value) => serde_yaml::from_value(value.clone()).map_err(|source| {
            DecodeError::InvalidSection {
                section: name,
                source,
            }
        }),
    }
}

/// Split `mysql_connections` into (`mysql`, `connections`)
pub fn split_metric_key(key: &str) -> (&str, &str) {
    match key.split_once('_') {
        Some((component, metric)) => (component, metric),
        None => (DEFAULT_COMPONENT, key),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(raw: &str) -> ThresholdConfig {
        ThresholdConfig::from_yaml(raw).unwrap()
    }

    fn sorted(mut resolved: Vec<ResolvedThreshold>) -> Vec<(String, String, String, f64)> {
        resolved.sort_by(|a, b| (&a.tenant, &a.metric).cmp(&(&b.tenant, &b.metric)));
        resolved
            .into_iter()
            .map(|r| (r.tenant, r.metric, r.component, r.value))
            .collect()
    }

    #[test]
    fn test_resolve_three_state() {
        let cfg = config(
            "defaults:\n  mysql_connections: 80\n  mysql_cpu: 80\ntenants:\n  db-a:\n    mysql_connections: \"70\"\n  db-b:\n    mysql_connections: disable\n    mysql_cpu: \"40\"\n",
        );

        let expected = vec![
            ("db-a".into(), "connections".into(), "mysql".into(), 70.0),
            ("db-a".into(), "cpu".into(), "mysql".into(), 80.0),
            ("db-b".into(), "cpu".into(), "mysql".into(), 40.0),
        ];
        assert_eq!(sorted(cfg.resolve()), expected);
    }

    #[test]
    fn test_resolve_disable_variants() {
        let cfg = config(
            "defaults:\n  mysql_connections: 80\ntenants:\n  t1: {mysql_connections: disable}\n  t2: {mysql_connections: disabled}\n  t3: {mysql_connections: \"off\"}\n  t4: {mysql_connections: \"false\"}\n  t5: {mysql_connections: DISABLE}\n",
        );
        assert!(cfg.resolve().is_empty());
    }

    #[test]
    fn test_resolve_severity_suffix() {
        let cfg = config(
            "defaults:\n  container_cpu: 80\ntenants:\n  db-a:\n    container_cpu: \"70:critical\"\n",
        );
        let resolved = cfg.resolve();

        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].value, 70.0);
        assert_eq!(resolved[0].severity, "critical");
        assert_eq!(resolved[0].source, ThresholdSource::Custom);
    }

    #[test]
    fn test_resolve_unknown_value_falls_back_to_default() {
        let cfg = config("defaults:\n  mysql_cpu: 80\ntenants:\n  db-a:\n    mysql_cpu: lots\n");
        let resolved = cfg.resolve();

        assert_eq!(resolved[0].value, 80.0);
        assert_eq!(resolved[0].source, ThresholdSource::Default);
    }

    #[test]
    fn test_resolve_ignores_overrides_without_default() {
        let cfg = config("defaults:\n  mysql_cpu: 80\ntenants:\n  db-a:\n    redis_memory: \"10\"\n");
        let resolved = cfg.resolve();

        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].metric, "cpu");
    }

    #[test]
    fn test_metric_key_without_underscore() {
        assert_eq!(split_metric_key("uptime"), ("default", "uptime"));
        assert_eq!(split_metric_key("mysql_slow_queries"), ("mysql", "slow_queries"));
    }

    #[test]
    fn test_state_filters_enabled_by_default() {
        let cfg = config(
            "state_filters:\n  container_crashloop:\n    reasons: [CrashLoopBackOff]\n    severity: critical\n  container_imagepull:\n    reasons: [ImagePullBackOff]\ntenants:\n  db-a: {}\n  db-b:\n    _state_container_crashloop: disable\n",
        );
        let mut resolved: Vec<(String, String, String)> = cfg
            .resolve_state_filters()
            .into_iter()
            .map(|r| (r.tenant, r.filter, r.severity))
            .collect();
        resolved.sort();

        assert_eq!(
            resolved,
            vec![
                ("db-a".into(), "container_crashloop".into(), "critical".into()),
                ("db-a".into(), "container_imagepull".into(), "warning".into()),
                ("db-b".into(), "container_imagepull".into(), "warning".into()),
            ]
        );
    }

    #[test]
    fn test_state_keys_are_not_thresholds() {
        let cfg = config(
            "defaults:\n  _state_container_crashloop: 1\n  mysql_cpu: 80\ntenants:\n  db-a: {}\n",
        );
        let resolved = cfg.resolve();
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].metric, "cpu");
    }

    #[test]
    fn test_missing_sections_are_empty() {
        let cfg = config("tenants:\n  db-a: {}\n");
        assert!(cfg.defaults.is_empty());
        assert!(cfg.state_filters.is_empty());
        assert!(cfg.resolve().is_empty());
    }

    #[test]
    fn test_invalid_defaults_section() {
        let err = ThresholdConfig::from_yaml("defaults:\n  mysql_cpu: high\n").unwrap_err();
        assert!(matches!(err, DecodeError::InvalidSection { section: "defaults", .. }));
    }
}
