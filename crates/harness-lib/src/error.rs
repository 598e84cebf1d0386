//! Error types for the VPA stress harness
//!
//! Validation outcomes (`OutOfRange`, `Timeout`) carry the offending value
//! and the bound or budget they violated so test reports can cite both.

use thiserror::Error;

/// Convenience alias used throughout the library
pub type Result<T> = std::result::Result<T, HarnessError>;

/// Which side of the allowed range a sample violated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundKind {
    Min,
    Max,
}

impl std::fmt::Display for BoundKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BoundKind::Min => write!(f, "minAllowed"),
            BoundKind::Max => write!(f, "maxAllowed"),
        }
    }
}

/// Errors produced by the harness library
#[derive(Debug, Error)]
pub enum HarnessError {
    /// Resource-quantity text did not parse. Never silently zeroed.
    #[error("invalid resource quantity {0:?}")]
    InvalidQuantity(String),

    /// The metrics API returned an error (distinct from "no samples yet",
    /// which is retried).
    #[error("metrics unavailable: {0}")]
    MetricsUnavailable(#[source] kube::Error),

    /// An observed sample violated a policy bound. The primary test
    /// assertion outcome.
    #[error("container {container:?}: observed {resource} {observed} violates {bound_kind} {bound}")]
    OutOfRange {
        container: String,
        resource: &'static str,
        observed: String,
        bound: String,
        bound_kind: BoundKind,
    },

    /// An attempt budget was exhausted.
    #[error("{operation}: time limit exceeded after {attempts} attempts")]
    Timeout { operation: String, attempts: u32 },

    /// The shutdown channel fired while work was outstanding.
    #[error("cancelled by shutdown signal")]
    Cancelled,

    #[error(transparent)]
    Kube(#[from] kube::Error),

    #[error("remote command failed: {0}")]
    RemoteCommand(String),

    #[error("failed to load kubeconfig")]
    Kubeconfig(#[from] kube::config::KubeconfigError),

    #[error("failed to read manifest {path}")]
    ManifestIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse manifest {path}")]
    ManifestParse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    /// A manifest was syntactically valid but missing required policy
    /// content.
    #[error("invalid resource policy: {0}")]
    Policy(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_range_cites_bound() {
        let err = HarnessError::OutOfRange {
            container: "vpa-container".to_string(),
            resource: "memory",
            observed: "120000000".to_string(),
            bound: "62914560".to_string(),
            bound_kind: BoundKind::Max,
        };
        let msg = err.to_string();
        assert!(msg.contains("120000000"));
        assert!(msg.contains("maxAllowed 62914560"));
    }

    #[test]
    fn timeout_cites_attempts() {
        let err = HarnessError::Timeout {
            operation: "poll metrics".to_string(),
            attempts: 60,
        };
        assert!(err.to_string().contains("60 attempts"));
        assert!(err.to_string().contains("time limit exceeded"));
    }
}
