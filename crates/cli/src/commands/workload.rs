//! Workload lifecycle commands

use std::path::Path;

use anyhow::{anyhow, Result};
use harness_lib::{Cluster, WorkloadManager};

use crate::output;

pub async fn create(cluster: &Cluster, manifest: &Path) -> Result<()> {
    let deployment = WorkloadManager::deployment_from_yaml_file(manifest)?;
    let name = deployment.metadata.name.clone().ok_or_else(|| {
        anyhow!(
            "deployment manifest {} has no metadata.name",
            manifest.display()
        )
    })?;
    WorkloadManager::new(cluster).create(&deployment).await?;
    output::print_success(&format!("Deployment {name} created"));
    Ok(())
}

pub async fn delete(cluster: &Cluster, name: &str) -> Result<()> {
    WorkloadManager::new(cluster).delete(name).await?;
    output::print_success(&format!("Deployment {name} deleted"));
    Ok(())
}

pub async fn logs(cluster: &Cluster, pod: &str, container: &str, tail: i64) -> Result<()> {
    let logs = WorkloadManager::new(cluster)
        .pod_logs(pod, container, tail)
        .await?;
    if logs.is_empty() {
        output::print_warning("No log output");
    } else {
        print!("{logs}");
    }
    Ok(())
}
