//! Kubernetes platform detection
//!
//! Local and managed distributions differ in which node addresses reach the
//! cluster and in whether LoadBalancer services ever get an address. The
//! platform is recognised from its nodes; anything unknown is `Generic`.

use k8s_openapi::api::core::v1::Node;
use std::fmt;

const MINIKUBE_LABEL: &str = "minikube.k8s.io/name";
const IBM_LABEL: &str = "ibm-cloud.kubernetes.io/worker-id";
const INSTANCE_TYPE_LABEL: &str = "node.kubernetes.io/instance-type";

/// A recognised Kubernetes distribution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Kind,
    K3s,
    Ibm,
    Minikube,
    Generic,
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Platform::Kind => "kind",
            Platform::K3s => "k3s",
            Platform::Ibm => "ibm",
            Platform::Minikube => "minikube",
            Platform::Generic => "generic",
        };
        f.write_str(name)
    }
}

fn provider_id(node: &Node) -> &str {
    node.spec
        .as_ref()
        .and_then(|s| s.provider_id.as_deref())
        .unwrap_or_default()
}

fn label<'a>(node: &'a Node, key: &str) -> Option<&'a str> {
    node.metadata
        .labels
        .as_ref()
        .and_then(|l| l.get(key))
        .map(String::as_str)
}

fn kubelet_version(node: &Node) -> &str {
    node.status
        .as_ref()
        .and_then(|s| s.node_info.as_ref())
        .map(|i| i.kubelet_version.as_str())
        .unwrap_or_default()
}

fn is_kind(node: &Node) -> bool {
    provider_id(node).starts_with("kind://")
}

fn is_k3s(node: &Node) -> bool {
    provider_id(node).starts_with("k3s://")
        || label(node, INSTANCE_TYPE_LABEL) == Some("k3s")
        || kubelet_version(node).contains("+k3s")
}

fn is_ibm(node: &Node) -> bool {
    provider_id(node).starts_with("ibm://") || label(node, IBM_LABEL).is_some()
}

fn is_minikube(node: &Node) -> bool {
    label(node, MINIKUBE_LABEL).is_some() || node.metadata.name.as_deref() == Some("minikube")
}

impl Platform {
    /// Recognise the platform from its nodes
    ///
    /// Checked in order kind, k3s, ibm, minikube; the first match on any
    /// node wins.
    pub fn detect(nodes: &[Node]) -> Self {
        let checks: [(Platform, fn(&Node) -> bool); 4] = [
            (Platform::Kind, is_kind),
            (Platform::K3s, is_k3s),
            (Platform::Ibm, is_ibm),
            (Platform::Minikube, is_minikube),
        ];
        checks
            .iter()
            .find(|(_, matches)| nodes.iter().any(|n| matches(n)))
            .map(|(platform, _)| *platform)
            .unwrap_or(Platform::Generic)
    }

    /// Whether LoadBalancer services get an address without extra setup
    ///
    /// kind and minikube need a tunnel or MetalLB for that, so ingress is
    /// exposed on the node addresses instead.
    pub fn has_load_balancer(&self) -> bool {
        !matches!(self, Platform::Kind | Platform::Minikube)
    }

    /// Node addresses that reach services on this platform
    pub fn external_ips(&self, nodes: &[Node]) -> Vec<String> {
        match self {
            Platform::Kind | Platform::K3s | Platform::Minikube => {
                addresses_of_type(nodes, "InternalIP")
            }
            Platform::Ibm => addresses_of_type(nodes, "ExternalIP"),
            Platform::Generic => {
                let external = addresses_of_type(nodes, "ExternalIP");
                if external.is_empty() {
                    addresses_of_type(nodes, "InternalIP")
                } else {
                    external
                }
            }
        }
    }
}

fn addresses_of_type(nodes: &[Node], kind: &str) -> Vec<String> {
    nodes
        .iter()
        .filter_map(|n| n.status.as_ref()?.addresses.as_ref())
        .flatten()
        .filter(|a| a.type_ == kind)
        .map(|a| a.address.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::node;

    const ADDRESSES: &[(&str, &str)] = &[("InternalIP", "10.0.0.5"), ("ExternalIP", "34.1.2.3")];

    #[test]
    fn test_detect_by_provider_id() {
        let kind = node("kind-control-plane", &[], "kind://docker/kind/kind-control-plane", ADDRESSES);
        assert_eq!(Platform::detect(&[kind]), Platform::Kind);

        let ibm = node("10.0.0.5", &[], "ibm://account///worker", ADDRESSES);
        assert_eq!(Platform::detect(&[ibm]), Platform::Ibm);
    }

    #[test]
    fn test_detect_by_labels_and_names() {
        let k3s = node("server-0", &[(INSTANCE_TYPE_LABEL, "k3s")], "", ADDRESSES);
        assert_eq!(Platform::detect(&[k3s]), Platform::K3s);

        let minikube = node("minikube", &[], "", ADDRESSES);
        assert_eq!(Platform::detect(&[minikube]), Platform::Minikube);

        let labelled = node("m01", &[(MINIKUBE_LABEL, "dev")], "", ADDRESSES);
        assert_eq!(Platform::detect(&[labelled]), Platform::Minikube);
    }

    #[test]
    fn test_unknown_is_generic() {
        let gke = node("gke-pool-1", &[], "gce://project/zone/gke-pool-1", ADDRESSES);
        assert_eq!(Platform::detect(&[gke]), Platform::Generic);
        assert_eq!(Platform::detect(&[]), Platform::Generic);
    }

    #[test]
    fn test_address_rules() {
        let nodes = vec![node("n", &[], "", ADDRESSES)];
        assert_eq!(Platform::Kind.external_ips(&nodes), vec!["10.0.0.5".to_string()]);
        assert_eq!(Platform::Ibm.external_ips(&nodes), vec!["34.1.2.3".to_string()]);
        assert_eq!(Platform::Generic.external_ips(&nodes), vec!["34.1.2.3".to_string()]);

        let internal_only = vec![node("n", &[], "", &[("InternalIP", "172.18.0.2"), ("Hostname", "n")])];
        assert_eq!(
            Platform::Generic.external_ips(&internal_only),
            vec!["172.18.0.2".to_string()]
        );
        assert!(Platform::Ibm.external_ips(&internal_only).is_empty());
    }

    #[test]
    fn test_load_balancer_support() {
        assert!(!Platform::Kind.has_load_balancer());
        assert!(!Platform::Minikube.has_load_balancer());
        assert!(Platform::K3s.has_load_balancer());
        assert!(Platform::Generic.has_load_balancer());
        assert_eq!(Platform::Minikube.to_string(), "minikube");
    }
}
