//! Full stress scenario
//!
//! Creates the workload, waits for its pods, applies the policy-sized
//! memory load, validates the first observed sample, and tears the
//! workload down. Ctrl-C fires the shutdown channel so the stress session
//! and the poll loop stop before teardown.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use harness_lib::workload::selector_from_deployment;
use harness_lib::{
    Cluster, ClusterMetricsSource, ConvergencePoller, HarnessError, MetricsSource, PodExecutor,
    RemoteExecutor, ResourcePolicy, WorkloadManager,
};
use kube::ResourceExt;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::config::HarnessSettings;
use crate::output;

pub struct RunArgs {
    pub deployment: PathBuf,
    pub vpa: PathBuf,
    pub container: String,
    pub keep: bool,
    pub max_attempts: Option<u32>,
    pub poll_interval_secs: Option<u64>,
}

pub async fn run(cluster: &Cluster, settings: &HarnessSettings, args: RunArgs) -> Result<()> {
    let policy = ResourcePolicy::from_yaml_file(&args.vpa)?;
    let container_policy = policy
        .container(&args.container)
        .ok_or_else(|| {
            anyhow!(
                "no resource policy for container {:?} in {}",
                args.container,
                args.vpa.display()
            )
        })?
        .clone();

    let deployment = WorkloadManager::deployment_from_yaml_file(&args.deployment)?;
    let name = deployment.metadata.name.clone().ok_or_else(|| {
        anyhow!(
            "deployment manifest {} has no metadata.name",
            args.deployment.display()
        )
    })?;
    let selector = selector_from_deployment(&deployment).ok_or_else(|| {
        anyhow!(
            "deployment manifest {} has no matchLabels selector",
            args.deployment.display()
        )
    })?;

    let workloads = WorkloadManager::new(cluster).with_wait_config(settings.wait_config());
    workloads.create(&deployment).await?;
    output::print_success(&format!("Deployment {name} created"));

    let (shutdown_tx, _) = broadcast::channel::<()>(4);
    let mut stress: Option<JoinHandle<()>> = None;

    let scenario = async {
        let pods = workloads.wait_for_running_pods(&selector).await?;
        let pod_name = pods[0].name_any();
        output::print_info(&format!("Target pod: {pod_name}"));

        let metrics: Arc<dyn MetricsSource> = Arc::new(ClusterMetricsSource::new(cluster));
        let executor: Arc<dyn RemoteExecutor> =
            Arc::new(PodExecutor::new(cluster).with_container(args.container.clone()));
        let poller = ConvergencePoller::builder(metrics, executor)
            .config(settings.poller_config(args.max_attempts, args.poll_interval_secs))
            .build();

        Ok::<_, HarnessError>(
            poller
                .validate(&container_policy, &pod_name, shutdown_tx.subscribe())
                .await,
        )
    };

    let verdict: Result<()> = tokio::select! {
        outcome = scenario => match outcome {
            Ok(outcome) => {
                stress = Some(outcome.stress);
                outcome.verdict.map_err(Into::into)
            }
            Err(error) => Err(error.into()),
        },
        _ = tokio::signal::ctrl_c() => {
            output::print_warning("Interrupted, tearing down");
            Err(HarnessError::Cancelled.into())
        }
    };

    // Stop the stress session and join it before touching the workload.
    let _ = shutdown_tx.send(());
    if let Some(handle) = stress {
        let _ = handle.await;
    }

    if args.keep {
        output::print_info(&format!("Keeping deployment {name} (--keep)"));
    } else {
        workloads.delete(&name).await?;
        output::print_success(&format!("Deployment {name} deleted"));
    }

    match verdict {
        Ok(()) => {
            output::print_success("Observed memory within policy bounds");
            Ok(())
        }
        Err(error) => {
            output::print_error(&format!("Validation failed: {error:#}"));
            Err(error)
        }
    }
}
