//! In-memory fakes for testing
//!
//! [`MockCluster`] stands in for the Kubernetes API and [`RecordingRunner`]
//! for helm/kubectl, so units and the installer can be exercised without a
//! cluster.

use async_trait::async_trait;
use k8s_openapi::api::batch::v1::{Job, JobCondition, JobStatus};
use k8s_openapi::api::core::v1::{
    ContainerState, ContainerStateWaiting, ContainerStatus, Event, LoadBalancerIngress,
    LoadBalancerStatus, Namespace, Node, NodeAddress, NodeSpec, NodeStatus, ObjectReference, Pod,
    PodStatus, Service, ServiceStatus,
};
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::{
    CustomResourceDefinition, CustomResourceDefinitionCondition, CustomResourceDefinitionStatus,
};
use kube::api::ObjectMeta;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::cluster::ClusterApi;
use crate::error::{DeployError, Result};
use crate::exec::{CommandOutput, CommandRunner, Invocation};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Counts of operations performed for testing assertions
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct OperationCounts {
    pub gets: usize,
    pub lists: usize,
    pub creates: usize,
    pub deletes: usize,
}

#[derive(Default)]
struct ClusterState {
    namespaces: BTreeMap<String, Namespace>,
    /// Namespaces still terminating: remaining gets before they vanish
    terminating: HashMap<String, u32>,
    pods: Vec<Pod>,
    events: Vec<Event>,
    crds: BTreeMap<String, CustomResourceDefinition>,
    jobs: BTreeMap<(String, String), Job>,
    services: BTreeMap<(String, String), Service>,
    server_version: String,
    nodes: Vec<Node>,
    deletion_lag: u32,
    created: Vec<String>,
    deleted: Vec<String>,
}

/// In-memory [`ClusterApi`]
#[derive(Clone, Default)]
pub struct MockCluster {
    state: Arc<Mutex<ClusterState>>,
    operations: Arc<Mutex<OperationCounts>>,
}

impl MockCluster {
    /// Create an empty cluster
    pub fn new() -> Self {
        let cluster = Self::default();
        lock(&cluster.state).server_version = "v1.31.0".to_string();
        cluster
    }

    /// Add an existing namespace with the given labels
    pub fn with_namespace(self, name: &str, labels: &[(&str, &str)]) -> Self {
        let labels = labels
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        lock(&self.state)
            .namespaces
            .insert(name.to_string(), namespace(name, labels));
        self
    }

    /// Add one plain node per address, each reporting it as its ExternalIP
    pub fn with_external_ips(self, ips: &[&str]) -> Self {
        for (i, ip) in ips.iter().enumerate() {
            self.add_node(node(&format!("node-{}", i), &[], "", &[("ExternalIP", ip)]));
        }
        self
    }

    pub fn add_node(&self, node: Node) {
        lock(&self.state).nodes.push(node);
    }

    /// Keep deleted namespaces visible for this many further gets
    pub fn with_deletion_lag(self, gets: u32) -> Self {
        lock(&self.state).deletion_lag = gets;
        self
    }

    pub fn add_pod(&self, pod: Pod) {
        lock(&self.state).pods.push(pod);
    }

    pub fn add_event(&self, namespace: &str, object: &str, reason: &str, message: &str) {
        lock(&self.state).events.push(Event {
            metadata: ObjectMeta {
                namespace: Some(namespace.to_string()),
                ..Default::default()
            },
            involved_object: ObjectReference {
                name: Some(object.to_string()),
                namespace: Some(namespace.to_string()),
                ..Default::default()
            },
            reason: Some(reason.to_string()),
            message: Some(message.to_string()),
            ..Default::default()
        });
    }

    pub fn add_crd(&self, crd: CustomResourceDefinition) {
        let name = crd.metadata.name.clone().unwrap_or_default();
        lock(&self.state).crds.insert(name, crd);
    }

    pub fn add_job(&self, job: Job) {
        let key = (
            job.metadata.namespace.clone().unwrap_or_default(),
            job.metadata.name.clone().unwrap_or_default(),
        );
        lock(&self.state).jobs.insert(key, job);
    }

    pub fn add_service(&self, namespace: &str, name: &str) {
        self.insert_service(namespace, name, None);
    }

    /// Add a service whose load balancer reports `ip`
    pub fn add_load_balancer_service(&self, namespace: &str, name: &str, ip: &str) {
        self.insert_service(namespace, name, Some(ip));
    }

    fn insert_service(&self, namespace: &str, name: &str, ip: Option<&str>) {
        let svc = Service {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                ..Default::default()
            },
            status: ip.map(|ip| ServiceStatus {
                load_balancer: Some(LoadBalancerStatus {
                    ingress: Some(vec![LoadBalancerIngress {
                        ip: Some(ip.to_string()),
                        ..Default::default()
                    }]),
                }),
                ..Default::default()
            }),
            ..Default::default()
        };
        lock(&self.state)
            .services
            .insert((namespace.to_string(), name.to_string()), svc);
    }

    /// Whether a namespace is currently visible
    pub fn has_namespace(&self, name: &str) -> bool {
        lock(&self.state).namespaces.contains_key(name)
    }

    /// Labels of a namespace, if present
    pub fn namespace_labels(&self, name: &str) -> Option<BTreeMap<String, String>> {
        lock(&self.state)
            .namespaces
            .get(name)
            .map(|ns| ns.metadata.labels.clone().unwrap_or_default())
    }

    /// Namespaces created through the API, in order
    pub fn created_namespaces(&self) -> Vec<String> {
        lock(&self.state).created.clone()
    }

    /// Namespaces deleted through the API, in order
    pub fn deleted_namespaces(&self) -> Vec<String> {
        lock(&self.state).deleted.clone()
    }

    /// Get operation counts for assertions
    pub fn operation_counts(&self) -> OperationCounts {
        lock(&self.operations).clone()
    }

    fn count(&self, f: impl FnOnce(&mut OperationCounts)) {
        f(&mut lock(&self.operations));
    }
}

/// Whether every `key=value` term of `selector` is among `labels`
fn selector_matches(selector: &str, labels: Option<&BTreeMap<String, String>>) -> bool {
    selector
        .split(',')
        .map(str::trim)
        .filter(|term| !term.is_empty())
        .all(|term| match term.split_once('=') {
            Some((k, v)) => labels.and_then(|l| l.get(k.trim())).map(String::as_str) == Some(v.trim()),
            None => labels.is_some_and(|l| l.contains_key(term)),
        })
}

#[async_trait]
impl ClusterApi for MockCluster {
    async fn get_namespace(&self, name: &str) -> Result<Option<Namespace>> {
        self.count(|c| c.gets += 1);
        let mut state = lock(&self.state);
        if let Some(remaining) = state.terminating.get_mut(name) {
            if *remaining == 0 {
                state.terminating.remove(name);
                state.namespaces.remove(name);
            } else {
                *remaining -= 1;
            }
        }
        Ok(state.namespaces.get(name).cloned())
    }

    async fn create_namespace(&self, name: &str, labels: BTreeMap<String, String>) -> Result<()> {
        self.count(|c| c.creates += 1);
        let mut state = lock(&self.state);
        if state.namespaces.contains_key(name) {
            return Err(DeployError::Cluster(format!(
                "namespaces \"{}\" already exists",
                name
            )));
        }
        state
            .namespaces
            .insert(name.to_string(), namespace(name, labels));
        state.created.push(name.to_string());
        Ok(())
    }

    async fn delete_namespace(&self, name: &str) -> Result<()> {
        self.count(|c| c.deletes += 1);
        let mut state = lock(&self.state);
        if !state.namespaces.contains_key(name) {
            return Ok(());
        }
        state.deleted.push(name.to_string());
        let lag = state.deletion_lag;
        if lag == 0 {
            state.namespaces.remove(name);
        } else {
            state.terminating.insert(name.to_string(), lag);
        }
        Ok(())
    }

    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Option<Pod>> {
        self.count(|c| c.gets += 1);
        Ok(lock(&self.state)
            .pods
            .iter()
            .find(|p| {
                p.metadata.namespace.as_deref() == Some(namespace)
                    && p.metadata.name.as_deref() == Some(name)
            })
            .cloned())
    }

    async fn list_pods(&self, namespace: &str, selector: &str) -> Result<Vec<Pod>> {
        self.count(|c| c.lists += 1);
        Ok(lock(&self.state)
            .pods
            .iter()
            .filter(|p| p.metadata.namespace.as_deref() == Some(namespace))
            .filter(|p| selector_matches(selector, p.metadata.labels.as_ref()))
            .cloned()
            .collect())
    }

    async fn list_events(&self, namespace: &str, object: &str) -> Result<Vec<Event>> {
        self.count(|c| c.lists += 1);
        Ok(lock(&self.state)
            .events
            .iter()
            .filter(|e| e.metadata.namespace.as_deref() == Some(namespace))
            .filter(|e| e.involved_object.name.as_deref() == Some(object))
            .cloned()
            .collect())
    }

    async fn get_crd(&self, name: &str) -> Result<Option<CustomResourceDefinition>> {
        self.count(|c| c.gets += 1);
        Ok(lock(&self.state).crds.get(name).cloned())
    }

    async fn get_job(&self, namespace: &str, name: &str) -> Result<Option<Job>> {
        self.count(|c| c.gets += 1);
        Ok(lock(&self.state)
            .jobs
            .get(&(namespace.to_string(), name.to_string()))
            .cloned())
    }

    async fn get_service(&self, namespace: &str, name: &str) -> Result<Option<Service>> {
        self.count(|c| c.gets += 1);
        Ok(lock(&self.state)
            .services
            .get(&(namespace.to_string(), name.to_string()))
            .cloned())
    }

    async fn server_version(&self) -> Result<String> {
        Ok(lock(&self.state).server_version.clone())
    }

    async fn list_nodes(&self) -> Result<Vec<Node>> {
        self.count(|c| c.lists += 1);
        Ok(lock(&self.state).nodes.clone())
    }
}

fn namespace(name: &str, labels: BTreeMap<String, String>) -> Namespace {
    Namespace {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            labels: Some(labels),
            ..Default::default()
        },
        ..Default::default()
    }
}

/// A node with labels, a provider id (empty for none) and typed addresses
pub fn node(name: &str, labels: &[(&str, &str)], provider_id: &str, addresses: &[(&str, &str)]) -> Node {
    Node {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            labels: Some(
                labels
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            ),
            ..Default::default()
        },
        spec: Some(NodeSpec {
            provider_id: (!provider_id.is_empty()).then(|| provider_id.to_string()),
            ..Default::default()
        }),
        status: Some(NodeStatus {
            addresses: Some(
                addresses
                    .iter()
                    .map(|(t, a)| NodeAddress {
                        type_: t.to_string(),
                        address: a.to_string(),
                    })
                    .collect(),
            ),
            ..Default::default()
        }),
    }
}

fn pod_meta(namespace: &str, name: &str, labels: &[(&str, &str)]) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(namespace.to_string()),
        labels: Some(
            labels
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        ),
        ..Default::default()
    }
}

/// A pod in the given phase with no container statuses
pub fn pod(namespace: &str, name: &str, labels: &[(&str, &str)], phase: &str) -> Pod {
    Pod {
        metadata: pod_meta(namespace, name, labels),
        status: Some(PodStatus {
            phase: Some(phase.to_string()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// A running pod
pub fn running_pod(namespace: &str, name: &str, labels: &[(&str, &str)]) -> Pod {
    pod(namespace, name, labels, "Running")
}

/// A running pod whose only container is waiting
pub fn waiting_pod(namespace: &str, name: &str, labels: &[(&str, &str)], reason: &str) -> Pod {
    let mut pod = running_pod(namespace, name, labels);
    if let Some(status) = pod.status.as_mut() {
        status.container_statuses = Some(vec![ContainerStatus {
            name: "main".to_string(),
            state: Some(ContainerState {
                waiting: Some(ContainerStateWaiting {
                    reason: Some(reason.to_string()),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        }]);
    }
    pod
}

/// A CRD, established or not
pub fn crd(name: &str, established: bool) -> CustomResourceDefinition {
    CustomResourceDefinition {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            ..Default::default()
        },
        status: Some(CustomResourceDefinitionStatus {
            conditions: Some(vec![CustomResourceDefinitionCondition {
                type_: "Established".to_string(),
                status: if established { "True" } else { "False" }.to_string(),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// A job with one condition of the given type (`Complete`, `Failed`), or none
pub fn job(namespace: &str, name: &str, condition: Option<&str>) -> Job {
    Job {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        status: Some(JobStatus {
            conditions: condition.map(|type_| {
                vec![JobCondition {
                    type_: type_.to_string(),
                    status: "True".to_string(),
                    message: Some(format!("job {}", type_.to_lowercase())),
                    ..Default::default()
                }]
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Scripted [`CommandRunner`] that records every invocation
///
/// Responses are matched by substring against the command line; the first
/// matching rule wins. Unmatched commands succeed with empty output.
#[derive(Clone, Default)]
pub struct RecordingRunner {
    calls: Arc<Mutex<Vec<Invocation>>>,
    responses: Arc<Mutex<Vec<(String, CommandOutput)>>>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer commands containing `pattern` with `output`
    pub fn respond(self, pattern: &str, output: CommandOutput) -> Self {
        lock(&self.responses).push((pattern.to_string(), output));
        self
    }

    pub fn calls(&self) -> Vec<Invocation> {
        lock(&self.calls).clone()
    }

    /// Recorded command lines, in order
    pub fn command_lines(&self) -> Vec<String> {
        lock(&self.calls).iter().map(Invocation::command_line).collect()
    }
}

#[async_trait]
impl CommandRunner for RecordingRunner {
    async fn run(&self, invocation: &Invocation) -> Result<CommandOutput> {
        lock(&self.calls).push(invocation.clone());
        let line = invocation.command_line();
        Ok(lock(&self.responses)
            .iter()
            .find(|(pattern, _)| line.contains(pattern.as_str()))
            .map(|(_, output)| output.clone())
            .unwrap_or_else(|| CommandOutput::ok("")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selector_matches() {
        let labels: BTreeMap<String, String> = [("app", "web"), ("tier", "front")]
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        assert!(selector_matches("app=web", Some(&labels)));
        assert!(selector_matches("app=web, tier=front", Some(&labels)));
        assert!(selector_matches("tier", Some(&labels)));
        assert!(!selector_matches("app=db", Some(&labels)));
        assert!(!selector_matches("app=web", None));
        assert!(selector_matches("", None));
    }

    #[tokio::test]
    async fn test_mock_namespace_lifecycle() {
        let cluster = MockCluster::new().with_deletion_lag(2);
        cluster
            .create_namespace("gitea", BTreeMap::new())
            .await
            .unwrap();
        assert!(cluster.create_namespace("gitea", BTreeMap::new()).await.is_err());

        cluster.delete_namespace("gitea").await.unwrap();
        assert!(cluster.get_namespace("gitea").await.unwrap().is_some());
        assert!(cluster.get_namespace("gitea").await.unwrap().is_some());
        assert!(cluster.get_namespace("gitea").await.unwrap().is_none());

        let counts = cluster.operation_counts();
        assert_eq!(counts.creates, 2);
        assert_eq!(counts.deletes, 1);
        assert_eq!(counts.gets, 3);
        assert_eq!(cluster.deleted_namespaces(), vec!["gitea".to_string()]);
    }

    #[tokio::test]
    async fn test_mock_list_pods_by_selector() {
        let cluster = MockCluster::new();
        cluster.add_pod(running_pod("a", "web-1", &[("app", "web")]));
        cluster.add_pod(running_pod("a", "db-1", &[("app", "db")]));
        cluster.add_pod(running_pod("b", "web-2", &[("app", "web")]));

        let pods = cluster.list_pods("a", "app=web").await.unwrap();
        assert_eq!(pods.len(), 1);
        assert_eq!(pods[0].metadata.name.as_deref(), Some("web-1"));
    }

    #[tokio::test]
    async fn test_recording_runner() {
        let runner = RecordingRunner::new().respond("helm", CommandOutput::failed(2, "nope"));
        let out = runner.run(&Invocation::new("helm").arg("list")).await.unwrap();
        assert_eq!(out.code, 2);
        let out = runner.run(&Invocation::new("kubectl")).await.unwrap();
        assert!(out.success);
        assert_eq!(runner.command_lines(), vec!["helm list", "kubectl"]);
    }
}
