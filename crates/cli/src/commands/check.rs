//! Verify pod container requests against policy bounds
//!
//! Once the autoscaler has acted, the target container's resource
//! requests should themselves sit inside the policy's allowed range.

use std::path::Path;

use anyhow::{anyhow, Result};
use harness_lib::workload::container_requests;
use harness_lib::{Cluster, ResourcePolicy, WorkloadManager};
use kube::ResourceExt;
use serde::Serialize;
use tabled::Tabled;

use crate::output::{self, format_bytes, OutputFormat};

#[derive(Tabled, Serialize)]
struct CheckRow {
    #[tabled(rename = "POD")]
    pod: String,
    #[tabled(rename = "CPU REQUEST")]
    cpu: String,
    #[tabled(rename = "MEMORY REQUEST")]
    memory: String,
    #[tabled(rename = "STATUS")]
    status: String,
}

pub async fn check(
    cluster: &Cluster,
    vpa: &Path,
    container: &str,
    format: OutputFormat,
) -> Result<()> {
    let policy = ResourcePolicy::from_yaml_file(vpa)?;
    let container_policy = policy
        .container(container)
        .ok_or_else(|| anyhow!("no resource policy for container {container:?}"))?;

    let workloads = WorkloadManager::new(cluster);
    let pods = workloads.list_pods("").await?;

    let mut rows = Vec::new();
    let mut violations = 0usize;
    for pod in &pods {
        let Some(requests) = container_requests(pod, container)? else {
            continue;
        };
        let status = match container_policy
            .check_cpu(requests.cpu)
            .and_then(|()| container_policy.check_memory(requests.memory))
        {
            Ok(()) => "within bounds".to_string(),
            Err(error) => {
                violations += 1;
                error.to_string()
            }
        };
        rows.push(CheckRow {
            pod: pod.name_any(),
            cpu: requests.cpu.to_string(),
            memory: format_bytes(requests.memory),
            status,
        });
    }

    if rows.is_empty() {
        output::print_warning(&format!(
            "No pods expose requests for container {container:?}"
        ));
        return Ok(());
    }

    output::print_table(&rows, format);
    if violations > 0 {
        output::print_error(&format!("{violations} pod(s) outside policy bounds"));
        return Err(anyhow!("{violations} pod(s) outside policy bounds"));
    }
    output::print_success("All container requests within policy bounds");
    Ok(())
}
