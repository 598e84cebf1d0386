//! VPA stress-test harness CLI
//!
//! A command-line tool that exercises a Vertical Pod Autoscaler
//! deployment: creates the workload, applies synthetic memory pressure,
//! and validates observed usage against the VPA policy bounds.

mod commands;
mod config;
mod output;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use harness_lib::Cluster;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// VPA stress-test harness CLI
#[derive(Parser)]
#[command(name = "vst")]
#[command(author, version, about = "VPA stress-test harness", long_about = None)]
pub struct Cli {
    /// Path to kubeconfig file (uses the default resolution chain if not
    /// specified)
    #[arg(long, env = "KUBECONFIG")]
    pub kubeconfig: Option<PathBuf>,

    /// Namespace holding the stressed workload
    #[arg(long, short, env = "VST_NAMESPACE", default_value = "default")]
    pub namespace: String,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the full stress scenario: create, load, validate, tear down
    Run {
        /// Deployment manifest for the stressed workload
        #[arg(long, default_value = "manifests/deployment.yaml")]
        deployment: PathBuf,

        /// VPA manifest carrying the resource policy
        #[arg(long, default_value = "manifests/vpa.yaml")]
        vpa: PathBuf,

        /// Target container named in the policy
        #[arg(long, short, default_value = "vpa-container")]
        container: String,

        /// Keep the workload running after validation
        #[arg(long)]
        keep: bool,

        /// Override the metrics poll attempt ceiling
        #[arg(long)]
        max_attempts: Option<u32>,

        /// Override the metrics poll interval in seconds
        #[arg(long)]
        poll_interval_secs: Option<u64>,
    },

    /// Show current container metrics
    Metrics {
        /// Restrict to one container name
        #[arg(long, short)]
        container: Option<String>,
    },

    /// Compare pod container requests against the policy bounds
    Check {
        /// VPA manifest carrying the resource policy
        #[arg(long, default_value = "manifests/vpa.yaml")]
        vpa: PathBuf,

        /// Target container named in the policy
        #[arg(long, short, default_value = "vpa-container")]
        container: String,
    },

    /// Workload lifecycle operations
    #[command(subcommand)]
    Workload(WorkloadCommands),
}

#[derive(Subcommand)]
pub enum WorkloadCommands {
    /// Create a deployment from a manifest
    Create {
        /// Deployment manifest path
        manifest: PathBuf,
    },

    /// Delete a deployment by name
    Delete {
        /// Deployment name
        name: String,
    },

    /// Fetch a container's recent log lines
    Logs {
        /// Pod name
        pod: String,

        /// Container name
        #[arg(long, short, default_value = "vpa-container")]
        container: String,

        /// Number of trailing lines
        #[arg(long, default_value = "100")]
        tail: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_target(false))
        .init();

    let cli = Cli::parse();
    let settings = config::HarnessSettings::load()?;
    let cluster = Cluster::connect(cli.kubeconfig.as_deref(), &cli.namespace).await?;

    match cli.command {
        Commands::Run {
            deployment,
            vpa,
            container,
            keep,
            max_attempts,
            poll_interval_secs,
        } => {
            commands::run::run(
                &cluster,
                &settings,
                commands::run::RunArgs {
                    deployment,
                    vpa,
                    container,
                    keep,
                    max_attempts,
                    poll_interval_secs,
                },
            )
            .await?;
        }
        Commands::Metrics { container } => {
            commands::metrics::show_metrics(&cluster, container, cli.format).await?;
        }
        Commands::Check { vpa, container } => {
            commands::check::check(&cluster, &vpa, &container, cli.format).await?;
        }
        Commands::Workload(workload_cmd) => match workload_cmd {
            WorkloadCommands::Create { manifest } => {
                commands::workload::create(&cluster, &manifest).await?;
            }
            WorkloadCommands::Delete { name } => {
                commands::workload::delete(&cluster, &name).await?;
            }
            WorkloadCommands::Logs {
                pod,
                container,
                tail,
            } => {
                commands::workload::logs(&cluster, &pod, &container, tail).await?;
            }
        },
    }

    Ok(())
}
