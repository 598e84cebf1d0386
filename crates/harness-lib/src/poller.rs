//! Convergence poller
//!
//! Bridges the delay between "workload created" and "metrics observable":
//! launches the policy-sized stress task, polls the metrics source until
//! the first non-empty sample set appears, then validates that reading
//! against the policy bounds. The poll is bounded by an attempt ceiling;
//! metrics-fetch errors abort immediately and are not retried.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{HarnessError, Result};
use crate::metrics::{MetricsSource, ObservedSample};
use crate::policy::ContainerPolicy;
use crate::stress::{spawn_stress, stress_command, RemoteExecutor};

/// Configuration for the convergence poller
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Attempt ceiling for the metrics poll (default: 60)
    pub max_attempts: u32,
    /// Delay between poll attempts (default: 5 seconds)
    pub poll_interval: Duration,
    /// Delay before the stress command is issued (default: 5 seconds)
    pub stress_start_delay: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            max_attempts: 60,
            poll_interval: Duration::from_secs(5),
            stress_start_delay: Duration::from_secs(5),
        }
    }
}

/// Result of one convergence run.
///
/// The stress task deliberately outlives the poll; `stress` lets the
/// caller cancel (via the shutdown channel) and join it at teardown.
pub struct PollOutcome {
    pub verdict: Result<()>,
    pub stress: JoinHandle<()>,
}

/// Polls a metrics source and validates the first observed sample
pub struct ConvergencePoller {
    metrics: Arc<dyn MetricsSource>,
    executor: Arc<dyn RemoteExecutor>,
    config: PollerConfig,
}

impl ConvergencePoller {
    pub fn new(
        metrics: Arc<dyn MetricsSource>,
        executor: Arc<dyn RemoteExecutor>,
        config: PollerConfig,
    ) -> Self {
        Self {
            metrics,
            executor,
            config,
        }
    }

    pub fn builder(
        metrics: Arc<dyn MetricsSource>,
        executor: Arc<dyn RemoteExecutor>,
    ) -> ConvergencePollerBuilder {
        ConvergencePollerBuilder {
            metrics,
            executor,
            config: PollerConfig::default(),
        }
    }

    /// Run the full convergence sequence against one pod:
    /// size the load from the policy midpoint, launch the stress task,
    /// poll for the first non-empty sample, and check it against the
    /// allowed memory range.
    pub async fn validate(
        &self,
        policy: &ContainerPolicy,
        pod_name: &str,
        mut shutdown: broadcast::Receiver<()>,
    ) -> PollOutcome {
        let vm_bytes = policy.memory_midpoint();
        info!(
            pod = %pod_name,
            container = %policy.container_name,
            vm_bytes,
            "Sizing synthetic load from policy midpoint"
        );
        let stress = spawn_stress(
            self.executor.clone(),
            pod_name,
            stress_command(vm_bytes),
            self.config.stress_start_delay,
            shutdown.resubscribe(),
        );

        let verdict = match self
            .acquire_sample(&policy.container_name, &mut shutdown)
            .await
        {
            Ok(sample) => {
                let checked = policy.check_memory(sample.memory_bytes);
                if checked.is_ok() {
                    info!(
                        container = %policy.container_name,
                        memory = sample.memory_bytes,
                        cpu = %sample.cpu,
                        "Observed memory within policy bounds"
                    );
                }
                checked
            }
            Err(error) => Err(error),
        };

        if let Err(error) = &verdict {
            warn!(container = %policy.container_name, error = %error, "Validation failed");
        }

        PollOutcome { verdict, stress }
    }

    /// Poll until the source yields at least one sample, taking the first.
    /// Empty results are retried up to the attempt ceiling; errors abort.
    async fn acquire_sample(
        &self,
        container: &str,
        shutdown: &mut broadcast::Receiver<()>,
    ) -> Result<ObservedSample> {
        for attempt in 1..=self.config.max_attempts {
            let samples = self.metrics.fetch(container).await?;
            if let Some(sample) = samples.into_iter().next() {
                info!(
                    container = %container,
                    attempt,
                    "Fetched pod metrics successfully"
                );
                return Ok(sample);
            }
            debug!(container = %container, attempt, "No samples yet");
            tokio::select! {
                _ = tokio::time::sleep(self.config.poll_interval) => {}
                _ = shutdown.recv() => return Err(HarnessError::Cancelled),
            }
        }
        Err(HarnessError::Timeout {
            operation: format!("poll metrics for container {container:?}"),
            attempts: self.config.max_attempts,
        })
    }
}

/// Builder for the convergence poller
pub struct ConvergencePollerBuilder {
    metrics: Arc<dyn MetricsSource>,
    executor: Arc<dyn RemoteExecutor>,
    config: PollerConfig,
}

impl ConvergencePollerBuilder {
    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.config.max_attempts = max_attempts;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval = interval;
        self
    }

    pub fn stress_start_delay(mut self, delay: Duration) -> Self {
        self.config.stress_start_delay = delay;
        self
    }

    pub fn config(mut self, config: PollerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> ConvergencePoller {
        ConvergencePoller::new(self.metrics, self.executor, self.config)
    }
}
