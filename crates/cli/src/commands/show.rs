//! `tenantctl show`: resolved thresholds as the exporter would expose them

use anyhow::{bail, Context, Result};
use serde::Serialize;
use tabled::Tabled;
use threshold_core::{ConfigStore, ResolvedStateFilter, ResolvedThreshold, ThresholdConfig};

use crate::output::{
    color_severity, color_source, format_value, print_json, print_warning, OutputFormat,
};

/// Row for thresholds table
#[derive(Tabled)]
struct ThresholdRow {
    #[tabled(rename = "Tenant")]
    tenant: String,
    #[tabled(rename = "Component")]
    component: String,
    #[tabled(rename = "Metric")]
    metric: String,
    #[tabled(rename = "Value")]
    value: String,
    #[tabled(rename = "Severity")]
    severity: String,
    #[tabled(rename = "Source")]
    source: String,
}

/// Row for state filter table
#[derive(Tabled)]
struct StateFilterRow {
    #[tabled(rename = "Tenant")]
    tenant: String,
    #[tabled(rename = "Filter")]
    filter: String,
    #[tabled(rename = "Severity")]
    severity: String,
}

#[derive(Debug, Serialize)]
pub struct ShowReport {
    pub thresholds: Vec<ResolvedThreshold>,
    pub state_filters: Vec<ResolvedStateFilter>,
}

/// Resolve the stored document, optionally for one tenant
pub fn resolve_report(raw: &str, tenant: Option<&str>) -> Result<ShowReport> {
    let config = ThresholdConfig::from_yaml(raw)?;

    if let Some(tenant) = tenant {
        if !config.tenants.contains_key(tenant) {
            bail!("tenant {tenant} not found");
        }
    }
    let wanted = |t: &str| tenant.map_or(true, |wanted| wanted == t);

    Ok(ShowReport {
        thresholds: config
            .resolve()
            .into_iter()
            .filter(|t| wanted(&t.tenant))
            .collect(),
        state_filters: config
            .resolve_state_filters()
            .into_iter()
            .filter(|f| wanted(&f.tenant))
            .collect(),
    })
}

/// Fetch the document and print what it resolves to
pub async fn show_thresholds(
    store: &dyn ConfigStore,
    tenant: Option<String>,
    format: OutputFormat,
) -> Result<()> {
    let fetched = store
        .fetch()
        .await
        .with_context(|| format!("failed to read {}", store.describe()))?;
    let report = resolve_report(&fetched.raw, tenant.as_deref())
        .with_context(|| format!("invalid threshold document in {}", store.describe()))?;

    match format {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Table => {
            if report.thresholds.is_empty() {
                print_warning("No thresholds resolved");
            } else {
                let rows: Vec<ThresholdRow> = report
                    .thresholds
                    .iter()
                    .map(|t| ThresholdRow {
                        tenant: t.tenant.clone(),
                        component: t.component.clone(),
                        metric: t.metric.clone(),
                        value: format_value(t.value),
                        severity: color_severity(&t.severity),
                        source: color_source(t.source),
                    })
                    .collect();

                let table = tabled::Table::new(rows)
                    .with(tabled::settings::Style::rounded())
                    .to_string();
                println!("{}", table);
            }

            if !report.state_filters.is_empty() {
                let rows: Vec<StateFilterRow> = report
                    .state_filters
                    .iter()
                    .map(|f| StateFilterRow {
                        tenant: f.tenant.clone(),
                        filter: f.filter.clone(),
                        severity: color_severity(&f.severity),
                    })
                    .collect();

                let table = tabled::Table::new(rows)
                    .with(tabled::settings::Style::rounded())
                    .to_string();
                println!("\nState filters:\n{}", table);
            }

            println!("\nTotal: {} thresholds", report.thresholds.len());
        }
    }

    Ok(())
}
