//! Workload lifecycle management
//!
//! Creates and deletes the stressed Deployment, waits (bounded) for its
//! pods to come up, and exposes the pod-level reads the harness needs:
//! logs and current container resource requests.

use std::path::Path;
use std::time::Duration;

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, DeleteParams, ListParams, LogParams, PostParams};
use kube::ResourceExt;
use tracing::{debug, info};

use crate::cluster::Cluster;
use crate::error::{HarnessError, Result};
use crate::policy::ResourceBounds;
use crate::quantity::{parse_memory, CpuQuantity};

/// Attempt budget for the create-and-wait operation
#[derive(Debug, Clone)]
pub struct WaitConfig {
    pub max_attempts: u32,
    pub interval: Duration,
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            max_attempts: 60,
            interval: Duration::from_secs(2),
        }
    }
}

/// Deployment/pod operations scoped to the cluster namespace
pub struct WorkloadManager {
    deployments: Api<Deployment>,
    pods: Api<Pod>,
    wait: WaitConfig,
}

impl WorkloadManager {
    pub fn new(cluster: &Cluster) -> Self {
        Self {
            deployments: cluster.deployments(),
            pods: cluster.pods(),
            wait: WaitConfig::default(),
        }
    }

    pub fn with_wait_config(mut self, wait: WaitConfig) -> Self {
        self.wait = wait;
        self
    }

    /// Load a Deployment manifest from a YAML file.
    pub fn deployment_from_yaml_file(path: impl AsRef<Path>) -> Result<Deployment> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| HarnessError::ManifestIo {
            path: path.display().to_string(),
            source,
        })?;
        serde_yaml::from_str(&text).map_err(|source| HarnessError::ManifestParse {
            path: path.display().to_string(),
            source,
        })
    }

    pub async fn create(&self, deployment: &Deployment) -> Result<Deployment> {
        let created = self
            .deployments
            .create(&PostParams::default(), deployment)
            .await?;
        info!(deployment = %created.name_any(), "Deployment created successfully");
        Ok(created)
    }

    pub async fn delete(&self, name: &str) -> Result<()> {
        self.deployments
            .delete(name, &DeleteParams::default())
            .await?;
        info!(deployment = %name, "Deployment deleted successfully");
        Ok(())
    }

    /// List pods, optionally restricted by a label selector. An empty
    /// selector lists the whole namespace.
    pub async fn list_pods(&self, label_selector: &str) -> Result<Vec<Pod>> {
        let params = if label_selector.is_empty() {
            ListParams::default()
        } else {
            ListParams::default().labels(label_selector)
        };
        Ok(self.pods.list(&params).await?.items)
    }

    /// Poll until at least one selected pod reports phase `Running`.
    /// Exceeding the attempt budget fails with `Timeout`; a later remote
    /// exec needs a running pod, not merely a scheduled one.
    pub async fn wait_for_running_pods(&self, label_selector: &str) -> Result<Vec<Pod>> {
        for attempt in 1..=self.wait.max_attempts {
            let running = running_pods(self.list_pods(label_selector).await?);
            if !running.is_empty() {
                info!(
                    pods = running.len(),
                    attempt, "Pods created successfully"
                );
                return Ok(running);
            }
            debug!(attempt, selector = %label_selector, "No running pods yet");
            tokio::time::sleep(self.wait.interval).await;
        }
        Err(HarnessError::Timeout {
            operation: format!("wait for running pods matching {label_selector:?}"),
            attempts: self.wait.max_attempts,
        })
    }

    /// Fetch the tail of a container's log.
    pub async fn pod_logs(&self, pod_name: &str, container: &str, tail_lines: i64) -> Result<String> {
        let params = LogParams {
            container: Some(container.to_string()),
            tail_lines: Some(tail_lines),
            ..LogParams::default()
        };
        Ok(self.pods.logs(pod_name, &params).await?)
    }
}

/// Filter to pods whose status phase is `Running`.
pub fn running_pods(pods: Vec<Pod>) -> Vec<Pod> {
    pods.into_iter()
        .filter(|pod| {
            pod.status
                .as_ref()
                .and_then(|status| status.phase.as_deref())
                == Some("Running")
        })
        .collect()
}

/// Render a Deployment's `matchLabels` as a list-call label selector.
pub fn selector_from_deployment(deployment: &Deployment) -> Option<String> {
    let labels = deployment
        .spec
        .as_ref()?
        .selector
        .match_labels
        .as_ref()?;
    if labels.is_empty() {
        return None;
    }
    Some(
        labels
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>()
            .join(","),
    )
}

/// Read a pod container's current resource requests, exactly converted.
/// Returns `Ok(None)` when the container or either request is absent.
/// Used to verify the autoscaler actually rewrote the requests.
pub fn container_requests(pod: &Pod, container: &str) -> Result<Option<ResourceBounds>> {
    let Some(spec) = pod.spec.as_ref() else {
        return Ok(None);
    };
    let Some(container) = spec.containers.iter().find(|c| c.name == container) else {
        return Ok(None);
    };
    let Some(requests) = container
        .resources
        .as_ref()
        .and_then(|resources| resources.requests.as_ref())
    else {
        return Ok(None);
    };
    let (Some(cpu), Some(memory)) = (requests.get("cpu"), requests.get("memory")) else {
        return Ok(None);
    };
    Ok(Some(ResourceBounds {
        cpu: CpuQuantity::parse(&cpu.0)?,
        memory: parse_memory(&memory.0)?,
    }))
}
