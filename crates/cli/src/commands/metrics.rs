//! Container metrics listing

use anyhow::Result;
use harness_lib::{Cluster, ClusterMetricsSource, MetricsSource, ObservedSample};
use serde::Serialize;
use tabled::Tabled;

use crate::output::{self, format_bytes, OutputFormat};

#[derive(Tabled, Serialize)]
struct MetricsRow {
    #[tabled(rename = "CONTAINER")]
    container: String,
    #[tabled(rename = "CPU")]
    cpu: String,
    #[tabled(rename = "MEMORY")]
    memory: String,
    #[tabled(rename = "OBSERVED AT")]
    observed_at: String,
}

impl From<&ObservedSample> for MetricsRow {
    fn from(sample: &ObservedSample) -> Self {
        Self {
            container: sample.container.clone(),
            cpu: sample.cpu.to_string(),
            memory: format_bytes(sample.memory_bytes),
            observed_at: sample.timestamp.to_rfc3339(),
        }
    }
}

pub async fn show_metrics(
    cluster: &Cluster,
    container: Option<String>,
    format: OutputFormat,
) -> Result<()> {
    let source = ClusterMetricsSource::new(cluster);
    let samples = match &container {
        Some(name) => source.fetch(name).await?,
        None => source.fetch_all().await?,
    };

    if samples.is_empty() {
        output::print_warning("No metrics samples available yet");
        return Ok(());
    }

    let rows: Vec<MetricsRow> = samples.iter().map(MetricsRow::from).collect();
    output::print_table(&rows, format);
    Ok(())
}
