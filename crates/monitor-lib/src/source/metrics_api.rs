//! `metrics.k8s.io/v1beta1` adapter
//!
//! The metrics API is not part of `k8s-openapi`, so the list is requested as a
//! raw path and decoded into the minimal wire types below.

use super::MetricsSource;
use crate::error::{ConfigError, FetchError};
use crate::models::{RawContainerUsage, Scope, Snapshot};
use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

pub const METRICS_API_GROUP_VERSION: &str = "metrics.k8s.io/v1beta1";

/// `PodMetricsList` as served by metrics-server
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PodMetricsList {
    #[serde(default)]
    pub items: Vec<PodMetricsItem>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PodMetricsItem {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub containers: Vec<ContainerMetricsItem>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContainerMetricsItem {
    pub name: Option<String>,
    #[serde(default)]
    pub usage: RawUsage,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawUsage {
    pub cpu: Option<Quantity>,
    pub memory: Option<Quantity>,
}

impl PodMetricsList {
    /// Flatten pods into one raw entry per container
    pub fn into_entries(self) -> Vec<RawContainerUsage> {
        self.items
            .into_iter()
            .flat_map(|pod| {
                let namespace = pod.metadata.namespace;
                let pod_name = pod.metadata.name;
                pod.containers
                    .into_iter()
                    .map(move |container| RawContainerUsage {
                        namespace: namespace.clone(),
                        pod_name: pod_name.clone(),
                        container_name: container.name,
                        cpu: container.usage.cpu.map(|q| q.0),
                        memory: container.usage.memory.map(|q| q.0),
                    })
            })
            .collect()
    }
}

/// Request path for a scope
pub fn metrics_path(scope: &Scope) -> String {
    match scope {
        Scope::Namespace(ns) => {
            format!("/apis/{METRICS_API_GROUP_VERSION}/namespaces/{ns}/pods")
        }
        Scope::AllNamespaces => format!("/apis/{METRICS_API_GROUP_VERSION}/pods"),
    }
}

/// Map a `kube` error onto the fetch taxonomy
pub fn classify_kube_error(err: kube::Error) -> FetchError {
    match err {
        kube::Error::Api(resp) => match resp.code {
            401 | 403 => FetchError::Auth(format!("{} ({})", resp.message, resp.code)),
            404 => FetchError::Malformed(format!(
                "{METRICS_API_GROUP_VERSION} is not served by this cluster: {}",
                resp.message
            )),
            408 | 429 | 500..=599 => {
                FetchError::Transient(format!("{} ({})", resp.message, resp.code))
            }
            code => FetchError::Malformed(format!("unexpected status {code}: {}", resp.message)),
        },
        kube::Error::Auth(e) => FetchError::Auth(e.to_string()),
        kube::Error::SerdeError(e) => FetchError::Malformed(e.to_string()),
        kube::Error::FromUtf8(e) => FetchError::Malformed(e.to_string()),
        other => FetchError::Transient(other.to_string()),
    }
}

/// Metrics source backed by a `kube` client
pub struct KubeMetricsSource {
    client: Client,
    timeout: Duration,
}

impl KubeMetricsSource {
    /// Wrap an existing client
    pub fn new(client: Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    /// Build a client from the ambient kubeconfig or in-cluster config and
    /// confirm the API server answers.
    pub async fn connect(timeout: Duration) -> Result<Self, ConfigError> {
        let client = Client::try_default()
            .await
            .map_err(|e| ConfigError::Cluster(e.to_string()))?;

        let version = tokio::time::timeout(timeout, client.apiserver_version())
            .await
            .map_err(|_| ConfigError::Unreachable(format!("no answer within {timeout:?}")))?
            .map_err(|e| ConfigError::Unreachable(e.to_string()))?;

        info!(
            git_version = %version.git_version,
            platform = %version.platform,
            "Connected to Kubernetes API server"
        );

        Ok(Self::new(client, timeout))
    }
}

#[async_trait]
impl MetricsSource for KubeMetricsSource {
    async fn fetch(&self, scope: &Scope) -> Result<Snapshot, FetchError> {
        let path = metrics_path(scope);
        let request = http::Request::get(path.as_str())
            .body(Vec::new())
            .map_err(|e| FetchError::Malformed(format!("invalid request {path}: {e}")))?;

        let list: PodMetricsList =
            tokio::time::timeout(self.timeout, self.client.request(request))
                .await
                .map_err(|_| {
                    FetchError::Transient(format!("metrics request timed out after {:?}", self.timeout))
                })?
                .map_err(classify_kube_error)?;

        let entries = list.into_entries();
        debug!(scope = %scope, entries = entries.len(), "Fetched pod metrics");

        Ok(Snapshot::new(scope.clone(), entries))
    }
}
