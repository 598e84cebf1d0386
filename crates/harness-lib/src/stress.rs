//! Remote stress execution
//!
//! Applies synthetic memory pressure inside the target container through
//! the pod exec subresource. The stress task is fire-and-forget: its own
//! failure is logged, never surfaced to the poller. Both the task and the
//! poll loop subscribe to one shutdown channel so teardown can cancel
//! outstanding work deterministically.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, AttachParams};
use tokio::io::AsyncReadExt;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::cluster::Cluster;
use crate::error::{HarnessError, Result};

/// Render the synthetic memory-load command for the given byte count.
pub fn stress_command(vm_bytes: u64) -> String {
    format!("stress -m 1 --vm-bytes {vm_bytes} --vm-hang 0")
}

/// Trait for remote command execution inside a pod
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    /// Run `command` under `sh -c` in the pod, returning captured output.
    async fn exec(&self, pod_name: &str, command: &str) -> Result<String>;
}

/// Live executor over the pod exec subresource
pub struct PodExecutor {
    pods: Api<Pod>,
    container: Option<String>,
}

impl PodExecutor {
    pub fn new(cluster: &Cluster) -> Self {
        Self {
            pods: cluster.pods(),
            container: None,
        }
    }

    /// Target a specific container instead of the pod default.
    pub fn with_container(mut self, container: impl Into<String>) -> Self {
        self.container = Some(container.into());
        self
    }
}

#[async_trait]
impl RemoteExecutor for PodExecutor {
    async fn exec(&self, pod_name: &str, command: &str) -> Result<String> {
        let mut params = AttachParams::default().stdout(true).stderr(true);
        if let Some(container) = &self.container {
            params = params.container(container.clone());
        }

        let mut process = self
            .pods
            .exec(pod_name, ["sh", "-c", command], &params)
            .await?;

        let mut output = String::new();
        if let Some(mut stdout) = process.stdout() {
            let mut buf = Vec::new();
            let _ = stdout.read_to_end(&mut buf).await;
            output.push_str(&String::from_utf8_lossy(&buf));
        }
        process
            .join()
            .await
            .map_err(|e| HarnessError::RemoteCommand(e.to_string()))?;
        Ok(output)
    }
}

/// Launch the stress command as a detached task.
///
/// The task waits `start_delay` first (a freshly Running container needs a
/// moment to accept exec sessions), then runs the command until it exits
/// or the shutdown channel fires. The returned handle lets the caller
/// join or abort it at teardown.
pub fn spawn_stress(
    executor: Arc<dyn RemoteExecutor>,
    pod_name: impl Into<String>,
    command: impl Into<String>,
    start_delay: Duration,
    mut shutdown: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    let pod_name = pod_name.into();
    let command = command.into();
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::time::sleep(start_delay) => {}
            _ = shutdown.recv() => {
                info!(pod = %pod_name, "Stress task cancelled before start");
                return;
            }
        }
        info!(pod = %pod_name, command = %command, "Applying synthetic memory load");
        tokio::select! {
            result = executor.exec(&pod_name, &command) => match result {
                Ok(_) => info!(pod = %pod_name, "Stress command completed"),
                Err(error) => warn!(pod = %pod_name, error = %error, "Stress command failed"),
            },
            _ = shutdown.recv() => {
                info!(pod = %pod_name, "Stress task cancelled");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Records exec calls; optionally never returns, like a real stress
    /// process.
    struct RecordingExecutor {
        calls: Mutex<Vec<(String, String)>>,
        hang: bool,
    }

    impl RecordingExecutor {
        fn new(hang: bool) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                hang,
            }
        }
    }

    #[async_trait]
    impl RemoteExecutor for RecordingExecutor {
        async fn exec(&self, pod_name: &str, command: &str) -> Result<String> {
            self.calls
                .lock()
                .unwrap()
                .push((pod_name.to_string(), command.to_string()));
            if self.hang {
                std::future::pending::<()>().await;
            }
            Ok(String::new())
        }
    }

    #[test]
    fn stress_command_is_sized_in_bytes() {
        assert_eq!(
            stress_command(52_428_800),
            "stress -m 1 --vm-bytes 52428800 --vm-hang 0"
        );
    }

    #[tokio::test]
    async fn stress_task_executes_command_once() {
        let executor = Arc::new(RecordingExecutor::new(false));
        let (_tx, rx) = broadcast::channel(1);

        let handle = spawn_stress(
            executor.clone(),
            "sample-pod",
            stress_command(1024),
            Duration::ZERO,
            rx,
        );
        handle.await.unwrap();

        let calls = executor.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "sample-pod");
        assert_eq!(calls[0].1, "stress -m 1 --vm-bytes 1024 --vm-hang 0");
    }

    #[tokio::test]
    async fn shutdown_cancels_hanging_stress() {
        let executor = Arc::new(RecordingExecutor::new(true));
        let (tx, rx) = broadcast::channel(1);

        let handle = spawn_stress(
            executor.clone(),
            "sample-pod",
            stress_command(1024),
            Duration::ZERO,
            rx,
        );
        // Give the task a chance to enter exec, then cancel.
        tokio::task::yield_now().await;
        tx.send(()).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn shutdown_before_start_delay_skips_exec() {
        let executor = Arc::new(RecordingExecutor::new(false));
        let (tx, rx) = broadcast::channel(1);

        let handle = spawn_stress(
            executor.clone(),
            "sample-pod",
            stress_command(1024),
            Duration::from_secs(3600),
            rx,
        );
        tx.send(()).unwrap();
        handle.await.unwrap();

        assert!(executor.calls.lock().unwrap().is_empty());
    }
}
