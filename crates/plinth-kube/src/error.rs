//! Error types for plinth-kube

use std::time::Duration;
use thiserror::Error;

/// Result type for plinth-kube operations
pub type Result<T> = std::result::Result<T, DeployError>;

fn human(d: &Duration) -> humantime::FormattedDuration {
    humantime::format_duration(*d)
}

fn join_failures(failures: &[DeployError]) -> String {
    failures
        .iter()
        .map(|f| format!("\n  - {}", f))
        .collect()
}

/// Errors that can occur while deploying, upgrading or removing units
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DeployError {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Api(#[from] kube::Error),

    /// Deploy refused: the namespace already exists
    #[error("namespace '{namespace}' already exists\nHint: Run `plinth upgrade` to update an existing installation")]
    NamespacePresent { namespace: String },

    /// Upgrade refused: nothing to upgrade
    #[error("namespace '{namespace}' does not exist\nHint: Run `plinth install` first")]
    NamespaceNotPresent { namespace: String },

    /// The namespace exists but was not created by plinth
    #[error("namespace '{namespace}' is not managed by plinth, refusing to modify it")]
    NamespaceNotOwned { namespace: String },

    /// Option lookup or resolution failure
    #[error(transparent)]
    Option(#[from] plinth_core::CoreError),

    /// External tool exited unsuccessfully
    #[error("command `{command}` failed with exit code {code}:\n{output}")]
    Command {
        command: String,
        code: i32,
        output: String,
    },

    /// A wait exceeded its budget
    #[error("timed out after {}", human(.after))]
    Timeout { after: Duration },

    /// A pod never became ready; carries its recent events
    #[error("pod '{pod}' in namespace '{namespace}' is not ready: {source}\nRecent events:\n{events}")]
    PodNotReady {
        pod: String,
        namespace: String,
        events: String,
        #[source]
        source: Box<DeployError>,
    },

    /// An ingress service never got a load balancer address
    #[error("timed out after {} waiting for a LoadBalancer address on service '{namespace}/{service}'\nHint: Ensure the cluster can provision LoadBalancer addresses (MetalLB, `minikube tunnel` or a cloud load balancer), or raise --timeout-multiplier", human(.after))]
    LoadBalancerPending {
        namespace: String,
        service: String,
        after: Duration,
    },

    /// Selector matched nothing
    #[error("no pods match '{selector}' in namespace '{namespace}'")]
    NoPods { namespace: String, selector: String },

    #[error("job '{name}' in namespace '{namespace}' failed: {message}")]
    JobFailed {
        namespace: String,
        name: String,
        message: String,
    },

    /// Failure inside a specific unit
    #[error("{id}: {source}")]
    Unit {
        id: String,
        #[source]
        source: Box<DeployError>,
    },

    /// Teardown finished with failures
    #[error("{} unit(s) failed to uninstall:{}", .failures.len(), join_failures(.failures))]
    Uninstall { failures: Vec<DeployError> },

    /// The user declined to continue
    #[error("cancelled")]
    Cancelled,

    /// Cluster access error that does not come from the API client
    #[error("cluster error: {0}")]
    Cluster(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DeployError {
    /// Attach the id of the unit this error came from
    pub fn in_unit(self, id: impl Into<String>) -> Self {
        DeployError::Unit {
            id: id.into(),
            source: Box::new(self),
        }
    }

    /// The error underneath any unit context
    pub fn root(&self) -> &DeployError {
        match self {
            DeployError::Unit { source, .. } => source.root(),
            other => other,
        }
    }

    /// Check if this is a Kubernetes 404 Not Found error
    pub fn is_not_found(&self) -> bool {
        matches!(self.root(), DeployError::Api(kube::Error::Api(resp)) if resp.code == 404)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.root(), DeployError::Cancelled)
    }

    pub fn is_timeout(&self) -> bool {
        match self.root() {
            DeployError::Timeout { .. } | DeployError::LoadBalancerPending { .. } => true,
            DeployError::PodNotReady { source, .. } => source.is_timeout(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_peels_unit_context() {
        let err = DeployError::NamespacePresent {
            namespace: "gitea".into(),
        }
        .in_unit("gitea");
        assert!(matches!(err.root(), DeployError::NamespacePresent { .. }));
        assert!(err.to_string().starts_with("gitea: namespace 'gitea' already exists"));
    }

    #[test]
    fn test_timeout_display() {
        let err = DeployError::Timeout {
            after: Duration::from_secs(180),
        };
        assert_eq!(err.to_string(), "timed out after 3m");
        assert!(err.is_timeout());
    }

    #[test]
    fn test_uninstall_lists_failures() {
        let err = DeployError::Uninstall {
            failures: vec![
                DeployError::Cluster("boom".into()).in_unit("b"),
                DeployError::Cancelled.in_unit("c"),
            ],
        };
        let msg = err.to_string();
        assert!(msg.starts_with("2 unit(s) failed to uninstall:"));
        assert!(msg.contains("\n  - b: cluster error: boom"));
    }

    #[test]
    fn test_not_found_through_context() {
        let api = kube::Error::Api(kube::core::ErrorResponse {
            status: "Failure".into(),
            message: "namespaces \"gitea\" not found".into(),
            reason: "NotFound".into(),
            code: 404,
        });
        assert!(DeployError::from(api).in_unit("gitea").is_not_found());
        assert!(!DeployError::Cluster("not found".into()).is_not_found());
    }

    #[test]
    fn test_cancelled_through_context() {
        assert!(DeployError::Cancelled.in_unit("x").is_cancelled());
        assert!(!DeployError::Cluster("x".into()).is_cancelled());
    }
}
