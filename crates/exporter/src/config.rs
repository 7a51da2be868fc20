//! Exporter configuration

use anyhow::{bail, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Exporter configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ExporterConfig {
    /// Path of the mounted threshold config file
    #[serde(default = "default_config_path")]
    pub config_path: PathBuf,

    /// HTTP listen address; a bare `:port` binds all interfaces
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// How often the config file's modification time is polled
    #[serde(default = "default_reload_interval")]
    pub reload_interval_secs: u64,
}

fn default_config_path() -> PathBuf {
    PathBuf::from("/etc/threshold-exporter/config.yaml")
}

fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_reload_interval() -> u64 {
    30
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            config_path: default_config_path(),
            listen_addr: default_listen_addr(),
            reload_interval_secs: default_reload_interval(),
        }
    }
}

impl ExporterConfig {
    /// Load configuration from the process environment
    pub fn load() -> Result<Self> {
        Self::from_env(std::env::vars().collect())
    }

    /// `EXPORTER_*` variables, with the unprefixed `CONFIG_PATH` and
    /// `LISTEN_ADDR` taking precedence when set
    pub fn from_env(vars: HashMap<String, String>) -> Result<Self> {
        let legacy = |key: &str| vars.get(key).filter(|v| !v.is_empty()).cloned();

        let config: Self = config::Config::builder()
            .add_source(config::Environment::with_prefix("EXPORTER").source(Some(vars.clone())))
            .set_override_option("config_path", legacy("CONFIG_PATH"))?
            .set_override_option("listen_addr", legacy("LISTEN_ADDR"))?
            .build()?
            .try_deserialize()?;

        if config.reload_interval_secs == 0 {
            bail!("reload interval must be at least one second");
        }
        Ok(config)
    }

    pub fn reload_interval(&self) -> Duration {
        Duration::from_secs(self.reload_interval_secs)
    }

    /// Address to bind, expanding `:8080` to `0.0.0.0:8080`
    pub fn bind_addr(&self) -> String {
        if self.listen_addr.starts_with(':') {
            format!("0.0.0.0{}", self.listen_addr)
        } else {
            self.listen_addr.clone()
        }
    }
}
