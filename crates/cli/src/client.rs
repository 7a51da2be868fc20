//! Clients for the Kubernetes API and the Prometheus HTTP API

use anyhow::{Context, Result};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::api::{Api, Patch, PatchParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use reqwest::Client;
use serde::de::DeserializeOwned;
use threshold_core::alerts::AlertsResponse;
use threshold_core::store::{field_patch, ConfigStore, FetchedDocument};
use threshold_core::StoreError;
use tracing::debug;
use url::Url;

use crate::config::{kubeconfig_path, Target};

/// Build a Kubernetes client from the kubeconfig, or in-cluster config if none exists
pub async fn kube_client(kubeconfig: Option<&str>) -> Result<kube::Client> {
    let path = kubeconfig_path(kubeconfig)?;

    let config = if path.exists() {
        let kubeconfig = Kubeconfig::read_from(&path)
            .with_context(|| format!("Failed to read kubeconfig {}", path.display()))?;
        kube::Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
            .await
            .context("Invalid kubeconfig")?
    } else {
        kube::Config::infer()
            .await
            .context("No kubeconfig found and not running in a cluster")?
    };

    kube::Client::try_from(config).context("Failed to create Kubernetes client")
}

/// One data key of a ConfigMap
pub struct ConfigMapStore {
    api: Api<ConfigMap>,
    target: Target,
}

impl ConfigMapStore {
    pub fn new(client: kube::Client, target: Target) -> Self {
        Self {
            api: Api::namespaced(client, &target.namespace),
            target,
        }
    }
}

#[async_trait]
impl ConfigStore for ConfigMapStore {
    async fn fetch(&self) -> Result<FetchedDocument, StoreError> {
        let configmap = self
            .api
            .get(&self.target.configmap)
            .await
            .map_err(|e| StoreError::fetch(format!("{}: {e}", self.describe())))?;

        let raw = configmap
            .data
            .as_ref()
            .and_then(|data| data.get(&self.target.key))
            .filter(|raw| !raw.is_empty())
            .cloned()
            .ok_or_else(|| {
                StoreError::fetch(format!("{} not found in {}", self.target.key, self.describe()))
            })?;

        let version = configmap.metadata.resource_version;
        debug!(configmap = %self.describe(), version = ?version, "Fetched ConfigMap");
        Ok(FetchedDocument { raw, version })
    }

    async fn patch_field(
        &self,
        new_raw: &str,
        expected_version: Option<&str>,
    ) -> Result<(), StoreError> {
        let patch = field_patch(&self.target.key, new_raw, expected_version);

        match self
            .api
            .patch(&self.target.configmap, &PatchParams::default(), &Patch::Merge(&patch))
            .await
        {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(response)) if response.code == 409 => Err(StoreError::Conflict {
                expected: expected_version.unwrap_or_default().to_string(),
            }),
            Err(e) => Err(StoreError::patch(format!("{}: {e}", self.describe()))),
        }
    }

    fn describe(&self) -> String {
        format!(
            "configmap {}/{} key {}",
            self.target.namespace, self.target.configmap, self.target.key
        )
    }
}

/// Client for the Prometheus HTTP API
pub struct PrometheusClient {
    client: Client,
    base_url: Url,
}

impl PrometheusClient {
    /// Create a new API client
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        // Keep any path prefix when joining relative API paths
        let mut base = base_url.to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url = Url::parse(&base).context("Invalid Prometheus URL")?;

        Ok(Self { client, base_url })
    }

    /// Make a GET request
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| {
                format!(
                    "Cannot connect to Prometheus API at {}. Is port-forward running?",
                    self.base_url
                )
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Prometheus API error ({}): {}", status, body.trim());
        }

        response.json().await.context("Failed to parse response")
    }

    /// Currently pending and firing alerts
    pub async fn alerts(&self) -> Result<AlertsResponse> {
        let response: AlertsResponse = self.get("api/v1/alerts").await?;
        if response.status != "success" {
            anyhow::bail!("Prometheus API returned status {:?}", response.status);
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_alerts_request() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v1/alerts")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"status":"success","data":{"alerts":[{"labels":{"alertname":"X","tenant":"db-a"},"state":"pending"}]}}"#,
            )
            .create_async()
            .await;

        let client = PrometheusClient::new(&server.url()).unwrap();
        let response = client.alerts().await.unwrap();

        mock.assert_async().await;
        assert_eq!(response.data.alerts.len(), 1);
        assert_eq!(response.data.alerts[0].state, "pending");
    }

    #[tokio::test]
    async fn test_api_error_status() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/v1/alerts")
            .with_status(503)
            .with_body("unavailable")
            .create_async()
            .await;

        let client = PrometheusClient::new(&server.url()).unwrap();
        let err = client.alerts().await.unwrap_err();
        assert!(err.to_string().contains("503"));
    }

    #[test]
    fn test_base_path_prefix_is_kept() {
        let client = PrometheusClient::new("http://prometheus.local/prom").unwrap();
        assert_eq!(
            client.base_url.join("api/v1/alerts").unwrap().as_str(),
            "http://prometheus.local/prom/api/v1/alerts"
        );
    }
}
