//! Configuration management for the CLI

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_NAMESPACE: &str = "monitoring";
pub const DEFAULT_CONFIGMAP: &str = "threshold-config";
pub const DEFAULT_KEY: &str = "config.yaml";
pub const DEFAULT_PROMETHEUS_URL: &str = "http://localhost:9090";

/// Defaults read from `~/.config/tenantctl/config.json`
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Config {
    /// Namespace of the threshold ConfigMap
    pub namespace: Option<String>,
    /// Name of the threshold ConfigMap
    pub configmap: Option<String>,
    /// Data key holding the YAML document
    pub key: Option<String>,
    /// Prometheus base URL for `alert`
    pub prometheus_url: Option<String>,
}

/// Where the threshold document lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub namespace: String,
    pub configmap: String,
    pub key: String,
}

impl Config {
    /// Load configuration from the default location; a missing file is empty
    pub fn load() -> Result<Self> {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Flags win over the file, the file over built-in defaults
    pub fn target(
        &self,
        namespace: Option<String>,
        configmap: Option<String>,
        key: Option<String>,
    ) -> Target {
        Target {
            namespace: namespace
                .or_else(|| self.namespace.clone())
                .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string()),
            configmap: configmap
                .or_else(|| self.configmap.clone())
                .unwrap_or_else(|| DEFAULT_CONFIGMAP.to_string()),
            key: key
                .or_else(|| self.key.clone())
                .unwrap_or_else(|| DEFAULT_KEY.to_string()),
        }
    }

    pub fn prometheus_url(&self, flag: Option<String>) -> String {
        flag.or_else(|| self.prometheus_url.clone())
            .unwrap_or_else(|| DEFAULT_PROMETHEUS_URL.to_string())
    }

    /// Get the configuration file path
    fn config_path() -> Option<PathBuf> {
        dirs_next::home_dir().map(|home| home.join(".config").join("tenantctl").join("config.json"))
    }
}

/// Get kubeconfig path
pub fn kubeconfig_path(override_path: Option<&str>) -> Result<PathBuf> {
    if let Some(path) = override_path {
        return Ok(PathBuf::from(path));
    }

    if let Ok(path) = std::env::var("KUBECONFIG") {
        return Ok(PathBuf::from(path));
    }

    let home = dirs_next::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".kube").join("config"))
}
