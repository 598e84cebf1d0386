//! Cluster connection
//!
//! Builds one `kube::Client` per run from the standard kubeconfig
//! resolution chain (explicit path, then `KUBECONFIG`, then
//! `~/.kube/config`, then in-cluster) and hands out the namespaced `Api`
//! handles the rest of the harness works through. The `Cluster` value is
//! constructed once and passed by reference; nothing here is a global.

use std::path::{Path, PathBuf};

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Pod;
use kube::api::Api;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use tracing::info;

use crate::error::Result;
use crate::metrics::PodMetrics;

/// Connected cluster handle scoped to one namespace
#[derive(Clone)]
pub struct Cluster {
    client: Client,
    namespace: String,
}

impl Cluster {
    /// Connect using the resolved kubeconfig, or fall back to the client
    /// default chain (which includes in-cluster service-account config).
    pub async fn connect(kubeconfig: Option<&Path>, namespace: impl Into<String>) -> Result<Self> {
        let client = match kubeconfig_path(kubeconfig) {
            Some(path) => {
                info!(kubeconfig = %path.display(), "Connecting to cluster");
                let kubeconfig = Kubeconfig::read_from(&path)?;
                let config =
                    Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                        .await?;
                Client::try_from(config)?
            }
            None => {
                info!("Connecting to cluster via default configuration chain");
                Client::try_default().await?
            }
        };
        Ok(Self::from_client(client, namespace))
    }

    /// Wrap an existing client. Test seam and in-cluster entry point.
    pub fn from_client(client: Client, namespace: impl Into<String>) -> Self {
        let namespace = namespace.into();
        let namespace = if namespace.is_empty() {
            "default".to_string()
        } else {
            namespace
        };
        Self { client, namespace }
    }

    pub fn client(&self) -> Client {
        self.client.clone()
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn pods(&self) -> Api<Pod> {
        Api::namespaced(self.client.clone(), &self.namespace)
    }

    pub fn deployments(&self) -> Api<Deployment> {
        Api::namespaced(self.client.clone(), &self.namespace)
    }

    pub fn pod_metrics(&self) -> Api<PodMetrics> {
        Api::namespaced(self.client.clone(), &self.namespace)
    }
}

/// Resolve the kubeconfig file to use: explicit override, then the
/// `KUBECONFIG` environment variable, then `~/.kube/config` if present.
/// `None` means "let the client infer" (in-cluster config).
pub fn kubeconfig_path(override_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = override_path {
        return Some(path.to_path_buf());
    }
    if let Ok(path) = std::env::var("KUBECONFIG") {
        if !path.is_empty() {
            return Some(PathBuf::from(path));
        }
    }
    dirs_next::home_dir()
        .map(|home| home.join(".kube").join("config"))
        .filter(|path| path.exists())
}
