//! `tenantctl alert`: current state of one alert for one tenant

use anyhow::Result;
use tabled::Tabled;
use threshold_core::alerts::{summarize, AlertState};

use crate::client::PrometheusClient;
use crate::output::{color_alert_state, print_info, print_json, OutputFormat};

/// Row for matched alerts table
#[derive(Tabled)]
struct AlertRow {
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "Active Since")]
    active_at: String,
}

/// Query Prometheus and report the aggregated state
pub async fn check_alert(
    client: &PrometheusClient,
    alert_name: &str,
    tenant: &str,
    format: OutputFormat,
) -> Result<()> {
    let response = client.alerts().await?;
    let summary = summarize(&response.data.alerts, alert_name, tenant);

    match format {
        OutputFormat::Json => print_json(&summary)?,
        OutputFormat::Table => {
            println!(
                "{} for {}: {}",
                alert_name,
                tenant,
                color_alert_state(summary.state)
            );

            if summary.state == AlertState::Inactive {
                print_info("No matching pending or firing alerts");
                return Ok(());
            }

            let rows: Vec<AlertRow> = summary
                .details
                .iter()
                .map(|d| AlertRow {
                    state: d.state.clone(),
                    active_at: d
                        .active_at
                        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                        .unwrap_or_else(|| "-".to_string()),
                })
                .collect();

            let table = tabled::Table::new(rows)
                .with(tabled::settings::Style::rounded())
                .to_string();
            println!("{}", table);
        }
    }

    Ok(())
}
