//! Plinth Kube - Kubernetes side of the platform installer
//!
//! This crate provides:
//! - **Cluster boundary**: [`ClusterApi`] over a live client, plus in-memory fakes
//! - **Platform detection**: kind, k3s, ibm, minikube or generic, from the nodes
//! - **Readiness**: polling, retry and pod/CRD/job/namespace/load balancer waits
//! - **Ownership**: labelled namespaces and the deploy/upgrade/delete guards
//! - **Units**: the [`Deployment`] contract and chart, manifest and ingress units
//! - **Installer**: ordered install and upgrade, best-effort reverse uninstall
//! - **Progress Reporting**: status lines for the user

pub mod cluster;
pub mod deployment;
pub mod error;
pub mod exec;
pub mod installer;
pub mod mock;
pub mod ownership;
pub mod platform;
pub mod progress;
pub mod readiness;
pub mod units;
pub mod wait;

pub use cluster::{ClusterApi, KubeCluster, platform_info};
pub use deployment::{Deployment, guard_delete, guard_deploy, guard_upgrade};
pub use error::{DeployError, Result};
pub use exec::{CommandOutput, CommandRunner, Invocation, ProcessRunner, run_checked};
pub use installer::Installer;
pub use mock::{MockCluster, OperationCounts, RecordingRunner};
pub use ownership::{NamespaceState, OWNER_LABEL, OWNER_VALUE, namespace_state};
pub use platform::Platform;
pub use progress::{Level, Ui};
pub use units::{ChartUnit, IngressUnit, build_unit, units_from_catalog};
pub use wait::{RetryPolicy, is_transient, poll_until, retry_if};
