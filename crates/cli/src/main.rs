//! tenantctl
//!
//! A command-line tool for tuning per-tenant monitoring thresholds stored in
//! the `threshold-config` ConfigMap, inspecting what they resolve to, and
//! checking alert state in Prometheus.

mod client;
mod commands;
mod config;
mod output;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use commands::{alert, patch, show};
use std::path::PathBuf;
use std::process::ExitCode;
use threshold_core::{ConfigStore, FileStore};
use tracing_subscriber::EnvFilter;

/// Tenant threshold CLI
#[derive(Parser)]
#[command(name = "tenantctl")]
#[command(author, version, about = "CLI for per-tenant monitoring thresholds", long_about = None)]
pub struct Cli {
    /// Namespace of the threshold ConfigMap [default: monitoring]
    #[arg(long, short, env = "TENANTCTL_NAMESPACE", global = true)]
    pub namespace: Option<String>,

    /// Name of the threshold ConfigMap [default: threshold-config]
    #[arg(long, global = true)]
    pub configmap: Option<String>,

    /// ConfigMap data key holding the document [default: config.yaml]
    #[arg(long, global = true)]
    pub key: Option<String>,

    /// Path to kubeconfig file (uses default if not specified)
    #[arg(long, env = "KUBECONFIG", global = true)]
    pub kubeconfig: Option<String>,

    /// Output format
    #[arg(long, short, default_value = "table", global = true)]
    pub format: output::OutputFormat,

    /// Enable verbose output
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Set a tenant's threshold override, or revert it with `default`
    Patch {
        /// Tenant name
        tenant: String,

        /// Metric key (e.g. mysql_connections)
        metric: String,

        /// Threshold value, a disable keyword, or `default`
        value: String,

        /// Priority tag stored as `<value>:<priority>`
        #[arg(long, short)]
        priority: Option<String>,

        /// Refuse to overwrite a document changed since it was read
        #[arg(long)]
        check_version: bool,

        /// Retries after a version conflict
        #[arg(long, default_value_t = 0)]
        retries: u32,

        /// Show the resulting document without writing it
        #[arg(long)]
        dry_run: bool,

        /// Patch a local YAML file instead of the ConfigMap
        #[arg(long)]
        file: Option<PathBuf>,

        /// Accepted metric keys; repeatable, any key if omitted
        #[arg(long = "known-metric")]
        known_metrics: Vec<String>,
    },

    /// Show resolved thresholds
    Show {
        /// Only this tenant
        tenant: Option<String>,

        /// Read a local YAML file instead of the ConfigMap
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Check the state of an alert for a tenant
    Alert {
        /// Alert name (the `alertname` label)
        alert_name: String,

        /// Tenant name
        tenant: String,

        /// Prometheus base URL [default: http://localhost:9090]
        #[arg(long, env = "PROMETHEUS_URL")]
        prometheus_url: Option<String>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let result = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")
        .and_then(|runtime| runtime.block_on(run(cli)));

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            output::print_error(&format!("{e:#}"));
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let settings = config::Config::load()?;
    let target = settings.target(cli.namespace, cli.configmap, cli.key);
    let kubeconfig = cli.kubeconfig;

    match cli.command {
        Commands::Patch {
            tenant,
            metric,
            value,
            priority,
            check_version,
            retries,
            dry_run,
            file,
            known_metrics,
        } => {
            let patch = patch::PatchArgs {
                tenant,
                metric,
                value,
                priority,
                check_version,
                retries,
                dry_run,
                known_metrics,
            }
            .validate()?;
            let store = open_store(target, kubeconfig.as_deref(), file).await?;
            patch::patch_threshold(store.as_ref(), patch, cli.format).await?;
        }
        Commands::Show { tenant, file } => {
            let store = open_store(target, kubeconfig.as_deref(), file).await?;
            show::show_thresholds(store.as_ref(), tenant, cli.format).await?;
        }
        Commands::Alert {
            alert_name,
            tenant,
            prometheus_url,
        } => {
            let url = settings.prometheus_url(prometheus_url);
            let client = client::PrometheusClient::new(&url)?;
            alert::check_alert(&client, &alert_name, &tenant, cli.format).await?;
        }
    }

    Ok(())
}

/// A local file when `--file` is given, otherwise the ConfigMap
async fn open_store(
    target: config::Target,
    kubeconfig: Option<&str>,
    file: Option<PathBuf>,
) -> Result<Box<dyn ConfigStore>> {
    if let Some(path) = file {
        return Ok(Box::new(FileStore::new(path)));
    }

    let kube = client::kube_client(kubeconfig).await?;
    Ok(Box::new(client::ConfigMapStore::new(kube, target)))
}
