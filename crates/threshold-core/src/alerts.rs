//! Alert state for one tenant
//!
//! Reduces a Prometheus `/api/v1/alerts` payload to a single state for an
//! (alert name, tenant) pair. An alert belongs to the tenant when its
//! `tenant` or `instance` label equals the tenant, or any label value
//! contains it. Label names are never matched, so a tenant named `job` does
//! not claim every alert that carries a `job` label.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Response envelope of `GET /api/v1/alerts`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AlertsResponse {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub data: AlertsData,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AlertsData {
    #[serde(default)]
    pub alerts: Vec<Alert>,
}

/// One active alert as reported by Prometheus
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub active_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub value: Option<String>,
}

/// Aggregated state, most severe first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertState {
    Firing,
    Pending,
    Unknown,
    Inactive,
}

impl fmt::Display for AlertState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AlertState::Firing => "firing",
            AlertState::Pending => "pending",
            AlertState::Unknown => "unknown",
            AlertState::Inactive => "inactive",
        };
        f.write_str(s)
    }
}

/// Per-alert detail of a matched alert
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertDetail {
    pub state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_at: Option<DateTime<Utc>>,
}

/// Result for one (alert, tenant) pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlertSummary {
    pub alert: String,
    pub tenant: String,
    pub state: AlertState,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<AlertDetail>,
}

impl Alert {
    pub fn name(&self) -> Option<&str> {
        self.labels.get("alertname").map(String::as_str)
    }

    /// Whether the alert's labels point at `tenant`
    pub fn concerns(&self, tenant: &str) -> bool {
        let label_is = |key: &str| self.labels.get(key).is_some_and(|v| v == tenant);
        label_is("tenant")
            || label_is("instance")
            || self.labels.values().any(|v| v.contains(tenant))
    }
}

/// Reduce `alerts` to one state for `alert_name` on `tenant`
///
/// No match yields `inactive`; otherwise `firing` beats `pending`, and
/// anything else is `unknown`.
pub fn summarize(alerts: &[Alert], alert_name: &str, tenant: &str) -> AlertSummary {
    let matched: Vec<&Alert> = alerts
        .iter()
        .filter(|a| a.name() == Some(alert_name) && a.concerns(tenant))
        .collect();

    let has = |state: &str| matched.iter().any(|a| a.state == state);
    let state = if matched.is_empty() {
        AlertState::Inactive
    } else if has("firing") {
        AlertState::Firing
    } else if has("pending") {
        AlertState::Pending
    } else {
        AlertState::Unknown
    };

    AlertSummary {
        alert: alert_name.to_string(),
        tenant: tenant.to_string(),
        state,
        details: matched
            .into_iter()
            .map(|a| AlertDetail {
                state: a.state.clone(),
                active_at: a.active_at,
            })
            .collect(),
    }
}
