//! VPA resource-policy loading and bound checks
//!
//! Deserializes the `autoscaling.k8s.io/v1 VerticalPodAutoscaler` manifest
//! subset the harness needs (target name plus per-container
//! `minAllowed`/`maxAllowed`) and converts every quantity through the
//! exact converter at load time. The policy is loaded once per run and
//! never mutated.

use std::path::Path;

use serde::Deserialize;

use crate::error::{BoundKind, HarnessError, Result};
use crate::quantity::{parse_memory, CpuQuantity};

/// Exact CPU/memory pair used for both sides of an allowed range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceBounds {
    pub cpu: CpuQuantity,
    pub memory: u64,
}

/// Allowed resource range for one named container
#[derive(Debug, Clone)]
pub struct ContainerPolicy {
    pub container_name: String,
    pub min_allowed: ResourceBounds,
    pub max_allowed: ResourceBounds,
}

impl ContainerPolicy {
    /// Midpoint of the allowed memory range, used to size the synthetic
    /// load.
    pub fn memory_midpoint(&self) -> u64 {
        let min = self.min_allowed.memory;
        let max = self.max_allowed.memory;
        min + (max - min) / 2
    }

    /// Check an observed memory sample against the allowed range.
    pub fn check_memory(&self, observed: u64) -> Result<()> {
        if observed < self.min_allowed.memory {
            return Err(self.out_of_range("memory", observed.to_string(), BoundKind::Min));
        }
        if observed > self.max_allowed.memory {
            return Err(self.out_of_range("memory", observed.to_string(), BoundKind::Max));
        }
        Ok(())
    }

    /// Check an observed CPU sample against the allowed range.
    pub fn check_cpu(&self, observed: CpuQuantity) -> Result<()> {
        if observed < self.min_allowed.cpu {
            return Err(self.out_of_range("cpu", observed.to_string(), BoundKind::Min));
        }
        if observed > self.max_allowed.cpu {
            return Err(self.out_of_range("cpu", observed.to_string(), BoundKind::Max));
        }
        Ok(())
    }

    fn out_of_range(&self, resource: &'static str, observed: String, kind: BoundKind) -> HarnessError {
        let bound = match (resource, kind) {
            ("memory", BoundKind::Min) => self.min_allowed.memory.to_string(),
            ("memory", BoundKind::Max) => self.max_allowed.memory.to_string(),
            (_, BoundKind::Min) => self.min_allowed.cpu.to_string(),
            (_, BoundKind::Max) => self.max_allowed.cpu.to_string(),
        };
        HarnessError::OutOfRange {
            container: self.container_name.clone(),
            resource,
            observed,
            bound,
            bound_kind: kind,
        }
    }
}

/// The full resource policy for a validated workload
#[derive(Debug, Clone)]
pub struct ResourcePolicy {
    /// Name of the workload the VPA targets
    pub target: String,
    containers: Vec<ContainerPolicy>,
}

impl ResourcePolicy {
    /// Load a policy from a VPA manifest file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| HarnessError::ManifestIo {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml(&text).map_err(|err| match err {
            HarnessError::ManifestParse { source, .. } => HarnessError::ManifestParse {
                path: path.display().to_string(),
                source,
            },
            other => other,
        })
    }

    /// Parse a policy from VPA manifest text.
    pub fn from_yaml(text: &str) -> Result<Self> {
        let manifest: VpaManifest =
            serde_yaml::from_str(text).map_err(|source| HarnessError::ManifestParse {
                path: "<inline>".to_string(),
                source,
            })?;

        let target = manifest
            .spec
            .target_ref
            .map(|t| t.name)
            .ok_or_else(|| HarnessError::Policy("spec.targetRef.name is missing".to_string()))?;

        let policies = manifest
            .spec
            .resource_policy
            .map(|p| p.container_policies)
            .unwrap_or_default();
        if policies.is_empty() {
            return Err(HarnessError::Policy(
                "spec.resourcePolicy.containerPolicies is empty".to_string(),
            ));
        }

        let containers = policies
            .into_iter()
            .map(ContainerPolicy::try_from)
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { target, containers })
    }

    /// Look up the policy for a named container.
    pub fn container(&self, name: &str) -> Option<&ContainerPolicy> {
        self.containers.iter().find(|c| c.container_name == name)
    }

    pub fn containers(&self) -> &[ContainerPolicy] {
        &self.containers
    }
}

// Manifest subset. Quantities arrive as strings or bare YAML integers
// depending on how the manifest was authored.

#[derive(Debug, Deserialize)]
struct VpaManifest {
    spec: VpaSpec,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VpaSpec {
    target_ref: Option<TargetRef>,
    resource_policy: Option<ResourcePolicySpec>,
}

#[derive(Debug, Deserialize)]
struct TargetRef {
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResourcePolicySpec {
    #[serde(default)]
    container_policies: Vec<ContainerPolicySpec>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContainerPolicySpec {
    container_name: String,
    min_allowed: Option<ResourceListSpec>,
    max_allowed: Option<ResourceListSpec>,
}

#[derive(Debug, Deserialize)]
struct ResourceListSpec {
    cpu: Option<QuantityText>,
    memory: Option<QuantityText>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum QuantityText {
    Number(u64),
    Text(String),
}

impl QuantityText {
    fn render(&self) -> String {
        match self {
            QuantityText::Number(n) => n.to_string(),
            QuantityText::Text(s) => s.clone(),
        }
    }
}

impl TryFrom<ContainerPolicySpec> for ContainerPolicy {
    type Error = HarnessError;

    fn try_from(spec: ContainerPolicySpec) -> Result<Self> {
        let name = spec.container_name;
        let min_allowed = bounds_from_spec(&name, "minAllowed", spec.min_allowed)?;
        let max_allowed = bounds_from_spec(&name, "maxAllowed", spec.max_allowed)?;
        if min_allowed.memory > max_allowed.memory || min_allowed.cpu > max_allowed.cpu {
            return Err(HarnessError::Policy(format!(
                "container {name:?}: minAllowed exceeds maxAllowed"
            )));
        }
        Ok(Self {
            container_name: name,
            min_allowed,
            max_allowed,
        })
    }
}

fn bounds_from_spec(
    container: &str,
    side: &str,
    spec: Option<ResourceListSpec>,
) -> Result<ResourceBounds> {
    let spec = spec.ok_or_else(|| {
        HarnessError::Policy(format!("container {container:?}: {side} is missing"))
    })?;
    let cpu = spec.cpu.ok_or_else(|| {
        HarnessError::Policy(format!("container {container:?}: {side}.cpu is missing"))
    })?;
    let memory = spec.memory.ok_or_else(|| {
        HarnessError::Policy(format!("container {container:?}: {side}.memory is missing"))
    })?;
    Ok(ResourceBounds {
        cpu: CpuQuantity::parse(&cpu.render())?,
        memory: parse_memory(&memory.render())?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE_VPA: &str = r#"
apiVersion: autoscaling.k8s.io/v1
kind: VerticalPodAutoscaler
metadata:
  name: sample-vpa
spec:
  targetRef:
    apiVersion: apps/v1
    kind: Deployment
    name: sample-vpa-deployment
  updatePolicy:
    updateMode: Auto
  resourcePolicy:
    containerPolicies:
      - containerName: vpa-container
        minAllowed:
          cpu: 10m
          memory: 10485760
        maxAllowed:
          cpu: 100m
          memory: 62914560
"#;

    fn sample_policy() -> ContainerPolicy {
        ResourcePolicy::from_yaml(SAMPLE_VPA)
            .unwrap()
            .container("vpa-container")
            .unwrap()
            .clone()
    }

    #[test]
    fn loads_target_and_bounds() {
        let policy = ResourcePolicy::from_yaml(SAMPLE_VPA).unwrap();
        assert_eq!(policy.target, "sample-vpa-deployment");
        let container = policy.container("vpa-container").unwrap();
        assert_eq!(container.min_allowed.memory, 10_485_760);
        assert_eq!(container.max_allowed.memory, 62_914_560);
        assert_eq!(container.min_allowed.cpu, CpuQuantity::from_millis(10));
        assert_eq!(container.max_allowed.cpu, CpuQuantity::from_millis(100));
        assert!(policy.container("other").is_none());
    }

    #[test]
    fn loads_suffixed_memory_quantities() {
        let text = SAMPLE_VPA
            .replace("memory: 10485760", "memory: 10Mi")
            .replace("memory: 62914560", "memory: 60Mi");
        let policy = ResourcePolicy::from_yaml(&text).unwrap();
        let container = policy.container("vpa-container").unwrap();
        assert_eq!(container.min_allowed.memory, 10 * 1024 * 1024);
        assert_eq!(container.max_allowed.memory, 60 * 1024 * 1024);
    }

    #[test]
    fn from_yaml_file_round_trips() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE_VPA.as_bytes()).unwrap();
        let policy = ResourcePolicy::from_yaml_file(file.path()).unwrap();
        assert_eq!(policy.containers().len(), 1);
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = ResourcePolicy::from_yaml_file("/does/not/exist.yaml").unwrap_err();
        assert!(matches!(err, HarnessError::ManifestIo { .. }));
    }

    #[test]
    fn memory_midpoint_sizes_the_load() {
        let container = sample_policy();
        assert_eq!(container.memory_midpoint(), (10_485_760 + 62_914_560) / 2);
    }

    #[test]
    fn in_range_memory_passes() {
        assert!(sample_policy().check_memory(31_457_280).is_ok());
        // Bounds are inclusive.
        assert!(sample_policy().check_memory(10_485_760).is_ok());
        assert!(sample_policy().check_memory(62_914_560).is_ok());
    }

    #[test]
    fn high_memory_cites_max_allowed() {
        let err = sample_policy().check_memory(120_000_000).unwrap_err();
        match err {
            HarnessError::OutOfRange {
                observed,
                bound,
                bound_kind,
                resource,
                ..
            } => {
                assert_eq!(resource, "memory");
                assert_eq!(observed, "120000000");
                assert_eq!(bound, "62914560");
                assert_eq!(bound_kind, BoundKind::Max);
            }
            other => panic!("expected OutOfRange, got {other:?}"),
        }
    }

    #[test]
    fn low_memory_cites_min_allowed() {
        let err = sample_policy().check_memory(1_000_000).unwrap_err();
        match err {
            HarnessError::OutOfRange {
                bound, bound_kind, ..
            } => {
                assert_eq!(bound, "10485760");
                assert_eq!(bound_kind, BoundKind::Min);
            }
            other => panic!("expected OutOfRange, got {other:?}"),
        }
    }

    #[test]
    fn cpu_bounds_checked_exactly() {
        let policy = sample_policy();
        assert!(policy.check_cpu(CpuQuantity::from_millis(50)).is_ok());
        let err = policy
            .check_cpu(CpuQuantity::parse("300m").unwrap())
            .unwrap_err();
        match err {
            HarnessError::OutOfRange {
                resource, bound, ..
            } => {
                assert_eq!(resource, "cpu");
                assert_eq!(bound, "100m");
            }
            other => panic!("expected OutOfRange, got {other:?}"),
        }
    }

    #[test]
    fn rejects_manifest_without_policy() {
        let text = r#"
apiVersion: autoscaling.k8s.io/v1
kind: VerticalPodAutoscaler
spec:
  targetRef:
    name: sample
"#;
        assert!(matches!(
            ResourcePolicy::from_yaml(text),
            Err(HarnessError::Policy(_))
        ));
    }

    #[test]
    fn rejects_inverted_bounds() {
        let text = SAMPLE_VPA
            .replace("memory: 10485760", "memory: 99999999")
            .replace("cpu: 10m", "cpu: 10m");
        assert!(matches!(
            ResourcePolicy::from_yaml(&text),
            Err(HarnessError::Policy(_))
        ));
    }

    #[test]
    fn rejects_malformed_quantity() {
        let text = SAMPLE_VPA.replace("cpu: 10m", "cpu: lots");
        assert!(matches!(
            ResourcePolicy::from_yaml(&text),
            Err(HarnessError::InvalidQuantity(_))
        ));
    }
}
