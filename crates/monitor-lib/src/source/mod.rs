//! Metrics source adapters
//!
//! A source turns one namespace scope into one [`Snapshot`] of raw
//! per-container usage. The production adapter talks to the
//! `metrics.k8s.io/v1beta1` aggregated API through `kube`.

mod metrics_api;

pub use metrics_api::{
    classify_kube_error, ContainerMetricsItem, KubeMetricsSource, PodMetricsItem, PodMetricsList,
    RawUsage,
};

use crate::error::FetchError;
use crate::models::{Scope, Snapshot};

pub use async_trait::async_trait;

/// Trait for metrics source implementations
#[async_trait]
pub trait MetricsSource: Send + Sync {
    /// Fetch the current usage of every container in `scope`.
    ///
    /// An empty snapshot is a valid answer.
    async fn fetch(&self, scope: &Scope) -> Result<Snapshot, FetchError>;
}
