//! Namespace ownership
//!
//! Every namespace plinth creates carries [`OWNER_LABEL`]. A namespace
//! without it belongs to someone else and is never modified or deleted.

use k8s_openapi::api::core::v1::Namespace;
use std::collections::BTreeMap;
use tracing::debug;

use crate::cluster::ClusterApi;
use crate::error::Result;

/// Label key marking plinth-managed namespaces
pub const OWNER_LABEL: &str = "app.kubernetes.io/managed-by";

/// Value of [`OWNER_LABEL`] on plinth-managed namespaces
pub const OWNER_VALUE: &str = "plinth";

/// Live state of a unit's namespace
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamespaceState {
    Absent,
    /// Present and labelled as ours
    Owned,
    /// Present without our label
    Foreign,
}

/// Labels written on every namespace plinth creates
pub fn owner_labels() -> BTreeMap<String, String> {
    BTreeMap::from([(OWNER_LABEL.to_string(), OWNER_VALUE.to_string())])
}

pub fn is_owned(ns: &Namespace) -> bool {
    ns.metadata
        .labels
        .as_ref()
        .and_then(|l| l.get(OWNER_LABEL))
        .is_some_and(|v| v == OWNER_VALUE)
}

/// Query the namespace and classify it
pub async fn namespace_state(cluster: &dyn ClusterApi, name: &str) -> Result<NamespaceState> {
    let state = match cluster.get_namespace(name).await? {
        None => NamespaceState::Absent,
        Some(ns) if is_owned(&ns) => NamespaceState::Owned,
        Some(_) => NamespaceState::Foreign,
    };
    debug!(namespace = name, ?state, "namespace state");
    Ok(state)
}

/// Create a namespace carrying the ownership label
pub async fn create_owned_namespace(cluster: &dyn ClusterApi, name: &str) -> Result<()> {
    cluster.create_namespace(name, owner_labels()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockCluster;

    #[tokio::test]
    async fn test_namespace_states() {
        let cluster = MockCluster::new()
            .with_namespace("ours", &[(OWNER_LABEL, OWNER_VALUE)])
            .with_namespace("theirs", &[(OWNER_LABEL, "helm")])
            .with_namespace("bare", &[]);

        assert_eq!(namespace_state(&cluster, "ours").await.unwrap(), NamespaceState::Owned);
        assert_eq!(namespace_state(&cluster, "theirs").await.unwrap(), NamespaceState::Foreign);
        assert_eq!(namespace_state(&cluster, "bare").await.unwrap(), NamespaceState::Foreign);
        assert_eq!(namespace_state(&cluster, "none").await.unwrap(), NamespaceState::Absent);
    }

    #[tokio::test]
    async fn test_created_namespace_is_owned() {
        let cluster = MockCluster::new();
        create_owned_namespace(&cluster, "gitea").await.unwrap();

        let labels = cluster.namespace_labels("gitea").unwrap();
        assert_eq!(labels.get(OWNER_LABEL).map(String::as_str), Some(OWNER_VALUE));
        assert_eq!(namespace_state(&cluster, "gitea").await.unwrap(), NamespaceState::Owned);
    }
}
