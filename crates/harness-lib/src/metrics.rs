//! Metrics sources
//!
//! The poller consumes metrics through the `MetricsSource` trait so the
//! live `metrics.k8s.io` adapter can be swapped for a scripted in-memory
//! fixture in tests. An empty fetch result means "samples not observable
//! yet" and is retryable; an error is not.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, ListParams};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cluster::Cluster;
use crate::error::{HarnessError, Result};
use crate::quantity::{parse_memory, CpuQuantity};

/// A timestamped CPU/memory reading for one named container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedSample {
    pub container: String,
    pub timestamp: DateTime<Utc>,
    pub cpu: CpuQuantity,
    pub memory_bytes: u64,
}

impl ObservedSample {
    pub fn new(container: impl Into<String>, cpu: CpuQuantity, memory_bytes: u64) -> Self {
        Self {
            container: container.into(),
            timestamp: Utc::now(),
            cpu,
            memory_bytes,
        }
    }
}

/// Trait for live-metrics retrieval implementations
#[async_trait]
pub trait MetricsSource: Send + Sync {
    /// Fetch the most recent samples for the named container across all
    /// pods in scope. An empty vec means metrics are not yet available.
    async fn fetch(&self, container_name: &str) -> Result<Vec<ObservedSample>>;
}

// `metrics.k8s.io/v1beta1` pod metrics, declared manually: the metrics API
// is an aggregated API and not part of k8s-openapi.

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PodMetricsContainerUsage {
    pub cpu: Quantity,
    pub memory: Quantity,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PodMetricsContainer {
    pub name: String,
    pub usage: PodMetricsContainerUsage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PodMetrics {
    pub metadata: ObjectMeta,
    pub timestamp: String,
    pub window: String,
    pub containers: Vec<PodMetricsContainer>,
}

impl k8s_openapi::Resource for PodMetrics {
    type Scope = k8s_openapi::NamespaceResourceScope;

    const API_VERSION: &'static str = "metrics.k8s.io/v1beta1";
    const GROUP: &'static str = "metrics.k8s.io";
    const KIND: &'static str = "PodMetrics";
    const URL_PATH_SEGMENT: &'static str = "pods";
    const VERSION: &'static str = "v1beta1";
}

impl k8s_openapi::Metadata for PodMetrics {
    type Ty = ObjectMeta;

    fn metadata(&self) -> &Self::Ty {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut Self::Ty {
        &mut self.metadata
    }
}

/// Live adapter over the cluster metrics API
pub struct ClusterMetricsSource {
    api: Api<PodMetrics>,
}

impl ClusterMetricsSource {
    pub fn new(cluster: &Cluster) -> Self {
        Self {
            api: cluster.pod_metrics(),
        }
    }

    /// Fetch the most recent samples for every container in the
    /// namespace, not just one target. Used by the metrics listing.
    pub async fn fetch_all(&self) -> Result<Vec<ObservedSample>> {
        self.list(None).await
    }

    async fn list(&self, container_name: Option<&str>) -> Result<Vec<ObservedSample>> {
        let metrics = self
            .api
            .list(&ListParams::default())
            .await
            .map_err(HarnessError::MetricsUnavailable)?;

        let mut samples = Vec::new();
        for pod in &metrics.items {
            samples.extend(samples_from_pod(pod, container_name)?);
        }
        debug!(samples = samples.len(), "Fetched pod metrics");
        Ok(samples)
    }
}

#[async_trait]
impl MetricsSource for ClusterMetricsSource {
    async fn fetch(&self, container_name: &str) -> Result<Vec<ObservedSample>> {
        self.list(Some(container_name)).await
    }
}

/// Convert one pod's metrics into samples, optionally filtered to one
/// container name, parsing every quantity exactly.
fn samples_from_pod(pod: &PodMetrics, container_name: Option<&str>) -> Result<Vec<ObservedSample>> {
    let timestamp = DateTime::parse_from_rfc3339(&pod.timestamp)
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(|_| {
            debug!(timestamp = %pod.timestamp, "Unparsable metrics timestamp, using now");
            Utc::now()
        });

    pod.containers
        .iter()
        .filter(|container| container_name.map_or(true, |name| container.name == name))
        .map(|container| {
            Ok(ObservedSample {
                container: container.name.clone(),
                timestamp,
                cpu: CpuQuantity::parse(&container.usage.cpu.0)?,
                memory_bytes: parse_memory(&container.usage.memory.0)?,
            })
        })
        .collect()
}

/// In-memory fixture that replays a scripted sequence of fetch results.
/// Once the script is exhausted every further fetch reports "no samples
/// yet".
#[derive(Default)]
pub struct ScriptedMetricsSource {
    script: Mutex<VecDeque<Result<Vec<ObservedSample>>>>,
    fetches: AtomicUsize,
}

impl ScriptedMetricsSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a "metrics not yet available" response.
    pub fn push_empty(&self) {
        self.script.lock().unwrap().push_back(Ok(Vec::new()));
    }

    /// Queue a successful response.
    pub fn push_samples(&self, samples: Vec<ObservedSample>) {
        self.script.lock().unwrap().push_back(Ok(samples));
    }

    /// Queue a fetch failure.
    pub fn push_error(&self, error: HarnessError) {
        self.script.lock().unwrap().push_back(Err(error));
    }

    /// Number of fetches observed so far.
    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MetricsSource for ScriptedMetricsSource {
    async fn fetch(&self, _container_name: &str) -> Result<Vec<ObservedSample>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pod_metrics_fixture() -> PodMetrics {
        serde_json::from_value(serde_json::json!({
            "metadata": { "name": "sample-vpa-deployment-7d4b9c-x2k4p", "namespace": "default" },
            "timestamp": "2024-03-01T10:15:30Z",
            "window": "30s",
            "containers": [
                {
                    "name": "vpa-container",
                    "usage": { "cpu": "30m", "memory": "31457280" }
                },
                {
                    "name": "sidecar",
                    "usage": { "cpu": "156340272n", "memory": "9Mi" }
                }
            ]
        }))
        .unwrap()
    }

    #[test]
    fn pod_metrics_deserializes_from_api_shape() {
        let pod = pod_metrics_fixture();
        assert_eq!(pod.containers.len(), 2);
        assert_eq!(pod.containers[0].usage.cpu.0, "30m");
        assert_eq!(pod.window, "30s");
    }

    #[test]
    fn samples_filter_by_container_and_convert_exactly() {
        let pod = pod_metrics_fixture();

        let samples = samples_from_pod(&pod, Some("vpa-container")).unwrap();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].cpu, CpuQuantity::from_millis(30));
        assert_eq!(samples[0].memory_bytes, 31_457_280);
        assert_eq!(
            samples[0].timestamp,
            DateTime::parse_from_rfc3339("2024-03-01T10:15:30Z").unwrap()
        );

        let sidecar = samples_from_pod(&pod, Some("sidecar")).unwrap();
        assert_eq!(sidecar[0].cpu.nanos(), 156_340_272);
        assert_eq!(sidecar[0].memory_bytes, 9 * 1024 * 1024);

        assert!(samples_from_pod(&pod, Some("absent")).unwrap().is_empty());
    }

    #[test]
    fn unfiltered_samples_cover_every_container() {
        let pod = pod_metrics_fixture();
        let samples = samples_from_pod(&pod, None).unwrap();
        assert_eq!(samples.len(), 2);
    }

    #[test]
    fn malformed_usage_quantity_is_an_error() {
        let mut pod = pod_metrics_fixture();
        pod.containers[0].usage.cpu = Quantity("not-a-quantity".to_string());
        assert!(matches!(
            samples_from_pod(&pod, Some("vpa-container")),
            Err(HarnessError::InvalidQuantity(_))
        ));
    }

    #[tokio::test]
    async fn scripted_source_replays_in_order() {
        let source = ScriptedMetricsSource::new();
        source.push_empty();
        source.push_samples(vec![ObservedSample::new(
            "vpa-container",
            CpuQuantity::from_millis(30),
            31_457_280,
        )]);

        assert!(source.fetch("vpa-container").await.unwrap().is_empty());
        let samples = source.fetch("vpa-container").await.unwrap();
        assert_eq!(samples[0].memory_bytes, 31_457_280);
        // Script exhausted: back to "not yet available".
        assert!(source.fetch("vpa-container").await.unwrap().is_empty());
        assert_eq!(source.fetches(), 3);
    }
}
