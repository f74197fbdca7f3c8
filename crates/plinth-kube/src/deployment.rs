//! Deployment unit contract
//!
//! A unit owns one namespace (named after its id) and knows how to install,
//! upgrade and remove what lives in it. Whether it may do so is decided
//! from the live namespace state on every call:
//!
//! | state   | deploy             | upgrade               | delete           |
//! |---------|--------------------|-----------------------|------------------|
//! | absent  | proceed            | `NamespaceNotPresent` | notice, success  |
//! | owned   | `NamespacePresent` | proceed               | proceed          |
//! | foreign | `NamespacePresent` | `NamespaceNotOwned`   | notice, success  |

use async_trait::async_trait;
use std::path::Path;

use plinth_core::OptionSet;

use crate::cluster::ClusterApi;
use crate::error::{DeployError, Result};
use crate::ownership::{NamespaceState, namespace_state};
use crate::progress::Ui;

/// One installable component of the platform
#[async_trait]
pub trait Deployment: Send + Sync {
    /// Stable id, also the namespace name
    fn id(&self) -> &str;

    fn version(&self) -> &str;

    /// One line description for listings
    fn describe(&self) -> String;

    /// Options this unit needs resolved before deploy or upgrade
    fn needed_options(&self) -> OptionSet;

    /// Install into a fresh namespace
    async fn deploy(&self, cluster: &dyn ClusterApi, ui: &Ui, options: &OptionSet) -> Result<()>;

    /// Re-apply onto an existing, owned installation
    async fn upgrade(&self, cluster: &dyn ClusterApi, ui: &Ui, options: &OptionSet) -> Result<()>;

    /// Remove everything, including the namespace
    async fn delete(&self, cluster: &dyn ClusterApi, ui: &Ui) -> Result<()>;

    async fn backup(&self, _cluster: &dyn ClusterApi, _ui: &Ui, _target: &Path) -> Result<()> {
        Ok(())
    }

    async fn restore(&self, _cluster: &dyn ClusterApi, _ui: &Ui, _source: &Path) -> Result<()> {
        Ok(())
    }

    /// Reason to skip this unit because the cluster already provides it
    async fn externally_satisfied(&self, _cluster: &dyn ClusterApi) -> Result<Option<String>> {
        Ok(None)
    }
}

/// Deploy may only proceed into an absent namespace
pub async fn guard_deploy(cluster: &dyn ClusterApi, id: &str) -> Result<()> {
    match namespace_state(cluster, id).await? {
        NamespaceState::Absent => Ok(()),
        NamespaceState::Owned | NamespaceState::Foreign => Err(DeployError::NamespacePresent {
            namespace: id.to_string(),
        }),
    }
}

/// Upgrade may only proceed on an owned namespace
pub async fn guard_upgrade(cluster: &dyn ClusterApi, id: &str) -> Result<()> {
    match namespace_state(cluster, id).await? {
        NamespaceState::Owned => Ok(()),
        NamespaceState::Absent => Err(DeployError::NamespaceNotPresent {
            namespace: id.to_string(),
        }),
        NamespaceState::Foreign => Err(DeployError::NamespaceNotOwned {
            namespace: id.to_string(),
        }),
    }
}

/// Whether delete should proceed; prints a notice when it should not
pub async fn guard_delete(cluster: &dyn ClusterApi, ui: &Ui, id: &str) -> Result<bool> {
    match namespace_state(cluster, id).await? {
        NamespaceState::Owned => Ok(true),
        NamespaceState::Absent => {
            ui.exclamation(format!("{} not installed, nothing to remove", id));
            Ok(false)
        }
        NamespaceState::Foreign => {
            ui.exclamation(format!("Namespace {} is not owned by plinth, skipping", id));
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockCluster, OperationCounts};
    use crate::ownership::{OWNER_LABEL, OWNER_VALUE};
    use crate::progress::Level;

    fn cluster() -> MockCluster {
        MockCluster::new()
            .with_namespace("owned", &[(OWNER_LABEL, OWNER_VALUE)])
            .with_namespace("foreign", &[])
    }

    #[tokio::test]
    async fn test_guard_deploy() {
        let c = cluster();
        guard_deploy(&c, "absent").await.unwrap();
        assert!(matches!(
            guard_deploy(&c, "owned").await,
            Err(DeployError::NamespacePresent { .. })
        ));
        assert!(matches!(
            guard_deploy(&c, "foreign").await,
            Err(DeployError::NamespacePresent { .. })
        ));
    }

    #[tokio::test]
    async fn test_guard_upgrade() {
        let c = cluster();
        guard_upgrade(&c, "owned").await.unwrap();
        assert!(matches!(
            guard_upgrade(&c, "absent").await,
            Err(DeployError::NamespaceNotPresent { .. })
        ));
        assert!(matches!(
            guard_upgrade(&c, "foreign").await,
            Err(DeployError::NamespaceNotOwned { .. })
        ));
    }

    #[tokio::test]
    async fn test_guard_delete() {
        let c = cluster();
        let ui = Ui::quiet();
        assert!(guard_delete(&c, &ui, "owned").await.unwrap());
        assert!(!guard_delete(&c, &ui, "absent").await.unwrap());
        assert!(!guard_delete(&c, &ui, "foreign").await.unwrap());
        assert!(ui.saw(Level::Exclamation, "nothing to remove"));
        assert!(ui.saw(Level::Exclamation, "not owned"));
        assert_eq!(c.operation_counts().deletes, 0);
    }

    struct Bare;

    #[async_trait]
    impl Deployment for Bare {
        fn id(&self) -> &str {
            "bare"
        }

        fn version(&self) -> &str {
            "0.0.1"
        }

        fn describe(&self) -> String {
            "bare".to_string()
        }

        fn needed_options(&self) -> OptionSet {
            OptionSet::new()
        }

        async fn deploy(&self, _cluster: &dyn ClusterApi, _ui: &Ui, _options: &OptionSet) -> Result<()> {
            Ok(())
        }

        async fn upgrade(&self, _cluster: &dyn ClusterApi, _ui: &Ui, _options: &OptionSet) -> Result<()> {
            Ok(())
        }

        async fn delete(&self, _cluster: &dyn ClusterApi, _ui: &Ui) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_default_hooks_do_nothing() {
        let c = cluster();
        let ui = Ui::quiet();
        let dir = Path::new("/tmp/plinth-backup");

        Bare.backup(&c, &ui, dir).await.unwrap();
        Bare.restore(&c, &ui, dir).await.unwrap();
        assert_eq!(Bare.externally_satisfied(&c).await.unwrap(), None);
        assert_eq!(c.operation_counts(), OperationCounts::default());
        assert!(ui.transcript().is_empty());
    }
}
