//! Readiness checks built on [`poll_until`]
//!
//! Every wait here polls the cluster once per [`POLL_INTERVAL`] and gives up
//! after the caller's timeout. Pod failures carry the pod's recent events so
//! the user sees why it never started.

use k8s_openapi::api::core::v1::{Pod, Service};
use tracing::debug;

use std::time::Duration;

use crate::cluster::ClusterApi;
use crate::error::{DeployError, Result};
use crate::wait::{POLL_INTERVAL, poll_until};

/// Whether a pod is up and its containers started
///
/// Any waiting container, or any init container still waiting or running,
/// means not ready. Otherwise the phase decides: `Running` and `Succeeded`
/// are ready. `Failed` is not ready but keeps being polled, since a restart
/// may still bring it up.
pub fn pod_ready(pod: &Pod) -> bool {
    let Some(status) = pod.status.as_ref() else {
        return false;
    };

    let waiting = status
        .container_statuses
        .iter()
        .flatten()
        .any(|c| c.state.as_ref().is_some_and(|s| s.waiting.is_some()));
    if waiting {
        return false;
    }

    let initializing = status.init_container_statuses.iter().flatten().any(|c| {
        c.state
            .as_ref()
            .is_some_and(|s| s.waiting.is_some() || s.running.is_some())
    });
    if initializing {
        return false;
    }

    matches!(status.phase.as_deref(), Some("Running") | Some("Succeeded"))
}

/// Recent events of an object, one `reason: message` per line
pub async fn object_events(cluster: &dyn ClusterApi, namespace: &str, name: &str) -> String {
    match cluster.list_events(namespace, name).await {
        Ok(events) if !events.is_empty() => events
            .iter()
            .map(|e| {
                format!(
                    "  {}: {}",
                    e.reason.as_deref().unwrap_or("Unknown"),
                    e.message.as_deref().unwrap_or_default()
                )
            })
            .collect::<Vec<_>>()
            .join("\n"),
        Ok(_) => "  (none)".to_string(),
        Err(e) => format!("  (failed to list events: {})", e),
    }
}

/// Wait for one pod to be ready
pub async fn wait_for_pod_running(
    cluster: &dyn ClusterApi,
    namespace: &str,
    name: &str,
    timeout: Duration,
) -> Result<()> {
    let result = poll_until(POLL_INTERVAL, timeout, || pod_is_ready(cluster, namespace, name)).await;

    match result {
        Ok(()) => Ok(()),
        Err(e) => Err(DeployError::PodNotReady {
            pod: name.to_string(),
            namespace: namespace.to_string(),
            events: object_events(cluster, namespace, name).await,
            source: Box::new(e),
        }),
    }
}

/// Wait until at least one pod matches `selector`
pub async fn wait_until_pods_exist(
    cluster: &dyn ClusterApi,
    namespace: &str,
    selector: &str,
    timeout: Duration,
) -> Result<()> {
    debug!(namespace, selector, "waiting for pods to exist");
    poll_until(POLL_INTERVAL, timeout, || pods_exist(cluster, namespace, selector)).await
}

/// Wait for every pod matching `selector` to be ready
///
/// The pods are listed once; an empty list is [`DeployError::NoPods`].
/// Each pod gets the full `timeout`.
pub async fn wait_for_pods_by_selector_running(
    cluster: &dyn ClusterApi,
    namespace: &str,
    selector: &str,
    timeout: Duration,
) -> Result<()> {
    let pods = cluster.list_pods(namespace, selector).await?;
    if pods.is_empty() {
        return Err(DeployError::NoPods {
            namespace: namespace.to_string(),
            selector: selector.to_string(),
        });
    }

    for pod in &pods {
        let Some(name) = pod.metadata.name.as_deref() else {
            continue;
        };
        debug!(namespace, pod = name, "waiting for pod");
        wait_for_pod_running(cluster, namespace, name, timeout).await?;
    }
    Ok(())
}

/// Wait for a deleted namespace to disappear
pub async fn wait_for_namespace_missing(
    cluster: &dyn ClusterApi,
    name: &str,
    timeout: Duration,
) -> Result<()> {
    poll_until(POLL_INTERVAL, timeout, || namespace_gone(cluster, name)).await
}

/// Wait for a CRD to report `Established`
pub async fn wait_for_crd_established(
    cluster: &dyn ClusterApi,
    name: &str,
    timeout: Duration,
) -> Result<()> {
    poll_until(POLL_INTERVAL, timeout, || crd_established(cluster, name)).await
}

/// Wait for a job to complete; a `Failed` condition aborts immediately
pub async fn wait_for_job_completed(
    cluster: &dyn ClusterApi,
    namespace: &str,
    name: &str,
    timeout: Duration,
) -> Result<()> {
    poll_until(POLL_INTERVAL, timeout, || job_finished(cluster, namespace, name)).await
}

/// First load balancer address of a service, IP or hostname
pub fn load_balancer_address(service: &Service) -> Option<String> {
    service
        .status
        .as_ref()?
        .load_balancer
        .as_ref()?
        .ingress
        .as_ref()?
        .iter()
        .find_map(|i| i.ip.clone().or_else(|| i.hostname.clone()))
}

/// Wait until a service gets a load balancer address and return it
///
/// A missing service counts as not yet assigned. Timing out is
/// [`DeployError::LoadBalancerPending`], which tells the user how to give
/// the cluster a load balancer.
pub async fn wait_service_load_balancer(
    cluster: &dyn ClusterApi,
    namespace: &str,
    name: &str,
    timeout: Duration,
) -> Result<String> {
    debug!(namespace, service = name, "waiting for load balancer address");
    match poll_until(POLL_INTERVAL, timeout, || has_load_balancer(cluster, namespace, name)).await {
        Ok(()) => {}
        Err(DeployError::Timeout { after }) => {
            return Err(DeployError::LoadBalancerPending {
                namespace: namespace.to_string(),
                service: name.to_string(),
                after,
            });
        }
        Err(e) => return Err(e),
    }

    cluster
        .get_service(namespace, name)
        .await?
        .as_ref()
        .and_then(load_balancer_address)
        .ok_or_else(|| {
            DeployError::Cluster(format!(
                "service {}/{} lost its load balancer address",
                namespace, name
            ))
        })
}

async fn has_load_balancer(cluster: &dyn ClusterApi, namespace: &str, name: &str) -> Result<bool> {
    Ok(cluster
        .get_service(namespace, name)
        .await?
        .as_ref()
        .and_then(load_balancer_address)
        .is_some())
}

async fn pod_is_ready(cluster: &dyn ClusterApi, namespace: &str, name: &str) -> Result<bool> {
    Ok(cluster
        .get_pod(namespace, name)
        .await?
        .is_some_and(|p| pod_ready(&p)))
}

async fn pods_exist(cluster: &dyn ClusterApi, namespace: &str, selector: &str) -> Result<bool> {
    Ok(!cluster.list_pods(namespace, selector).await?.is_empty())
}

async fn namespace_gone(cluster: &dyn ClusterApi, name: &str) -> Result<bool> {
    Ok(cluster.get_namespace(name).await?.is_none())
}

async fn crd_established(cluster: &dyn ClusterApi, name: &str) -> Result<bool> {
    let conditions = cluster
        .get_crd(name)
        .await?
        .and_then(|crd| crd.status)
        .and_then(|s| s.conditions)
        .unwrap_or_default();
    Ok(conditions
        .iter()
        .any(|c| c.type_ == "Established" && c.status == "True"))
}

async fn job_finished(cluster: &dyn ClusterApi, namespace: &str, name: &str) -> Result<bool> {
    let conditions = cluster
        .get_job(namespace, name)
        .await?
        .and_then(|job| job.status)
        .and_then(|s| s.conditions)
        .unwrap_or_default();

    for c in conditions.iter().filter(|c| c.status == "True") {
        match c.type_.as_str() {
            "Complete" => return Ok(true),
            "Failed" => {
                return Err(DeployError::JobFailed {
                    namespace: namespace.to_string(),
                    name: name.to_string(),
                    message: c.message.clone().unwrap_or_default(),
                });
            }
            _ => {}
        }
    }
    Ok(false)
}
