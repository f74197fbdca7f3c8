//! Ingress controller unit
//!
//! Many clusters ship an ingress controller already (k3s bundles Traefik in
//! `kube-system`). Installing a second one would fight over the same ports,
//! so this unit steps aside when it finds one.
//!
//! Once installed, the controller must be reachable. On platforms with load
//! balancers the unit waits for its service to get an address; elsewhere the
//! service is pinned to the node addresses.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

use plinth_core::{OptionSet, Timeouts, UnitSpec};

use crate::cluster::{ClusterApi, platform_info};
use crate::deployment::Deployment;
use crate::error::Result;
use crate::exec::CommandRunner;
use crate::ownership::{NamespaceState, namespace_state};
use crate::progress::Ui;
use crate::readiness::wait_service_load_balancer;
use crate::units::ChartUnit;

const SYSTEM_NAMESPACE: &str = "kube-system";

/// A chart unit skipped when an ingress controller is already running
pub struct IngressUnit {
    chart: ChartUnit,
    timeouts: Timeouts,
}

impl IngressUnit {
    pub fn new(spec: UnitSpec, runner: Arc<dyn CommandRunner>, timeouts: Timeouts) -> Result<Self> {
        Ok(Self {
            chart: ChartUnit::new(spec, runner, timeouts.clone())?,
            timeouts,
        })
    }

    /// Service names to look for; the release name when none are listed
    fn watched_services(&self) -> Vec<&str> {
        let spec = self.chart.spec();
        if spec.services.is_empty() {
            vec![spec.release_name()]
        } else {
            spec.services.iter().map(String::as_str).collect()
        }
    }

    /// Chart values exposing the service, plus whether to wait for a load balancer
    async fn exposure(&self, cluster: &dyn ClusterApi) -> Result<(Vec<(String, String)>, bool)> {
        let platform = platform_info(cluster).await?;
        if platform.has_load_balancer {
            return Ok((Vec::new(), true));
        }
        let values = platform
            .external_ips
            .iter()
            .enumerate()
            .map(|(i, ip)| (format!("service.externalIPs[{}]", i), ip.clone()))
            .collect();
        Ok((values, false))
    }

    async fn wait_reachable(&self, cluster: &dyn ClusterApi, ui: &Ui) -> Result<()> {
        let id = self.id();
        let service = self
            .watched_services()
            .first()
            .copied()
            .unwrap_or_else(|| self.chart.spec().release_name());
        ui.progress(format!("Waiting for a LoadBalancer address on {}/{}", id, service));
        let address =
            wait_service_load_balancer(cluster, id, service, self.timeouts.load_balancer_timeout())
                .await?;
        info!(unit = %id, %address, "load balancer ready");
        ui.success(format!("{} reachable at {}", id, address));
        Ok(())
    }
}

#[async_trait]
impl Deployment for IngressUnit {
    fn id(&self) -> &str {
        self.chart.id()
    }

    fn version(&self) -> &str {
        self.chart.version()
    }

    fn describe(&self) -> String {
        self.chart.describe()
    }

    fn needed_options(&self) -> OptionSet {
        self.chart.needed_options()
    }

    async fn deploy(&self, cluster: &dyn ClusterApi, ui: &Ui, options: &OptionSet) -> Result<()> {
        let (values, load_balancer) = self.exposure(cluster).await?;
        if self.chart.deploy_with(cluster, ui, options, &values).await? && load_balancer {
            self.wait_reachable(cluster, ui).await?;
        }
        Ok(())
    }

    async fn upgrade(&self, cluster: &dyn ClusterApi, ui: &Ui, options: &OptionSet) -> Result<()> {
        let (values, load_balancer) = self.exposure(cluster).await?;
        if self.chart.upgrade_with(cluster, ui, options, &values).await? && load_balancer {
            self.wait_reachable(cluster, ui).await?;
        }
        Ok(())
    }

    async fn delete(&self, cluster: &dyn ClusterApi, ui: &Ui) -> Result<()> {
        self.chart.delete(cluster, ui).await
    }

    async fn externally_satisfied(&self, cluster: &dyn ClusterApi) -> Result<Option<String>> {
        let id = self.id();
        // Our own installation is never "external"
        if namespace_state(cluster, id).await? == NamespaceState::Owned {
            return Ok(None);
        }

        for service in self.watched_services() {
            for namespace in [id, SYSTEM_NAMESPACE] {
                if cluster.get_service(namespace, service).await?.is_some() {
                    return Ok(Some(format!(
                        "found existing ingress service {}/{}",
                        namespace, service
                    )));
                }
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DeployError;
    use crate::mock::{MockCluster, RecordingRunner, node};
    use crate::ownership::{OWNER_LABEL, OWNER_VALUE};
    use crate::progress::Level;
    use plinth_core::PlatformCatalog;
    use std::time::Duration;
    use tokio::time::Instant;

    fn traefik_with(runner: &RecordingRunner) -> IngressUnit {
        let catalog = PlatformCatalog::from_yaml(
            "units:\n  - id: traefik\n    kind: ingress\n    chart: traefik/traefik\n",
        )
        .unwrap();
        let timeouts = Timeouts {
            load_balancer: Duration::from_secs(20),
            ..Timeouts::default()
        };
        IngressUnit::new(catalog.units[0].clone(), Arc::new(runner.clone()), timeouts).unwrap()
    }

    fn traefik() -> IngressUnit {
        traefik_with(&RecordingRunner::new())
    }

    fn kind_cluster() -> MockCluster {
        let cluster = MockCluster::new();
        cluster.add_node(node(
            "kind-control-plane",
            &[],
            "kind://docker/kind/kind-control-plane",
            &[("InternalIP", "172.18.0.2")],
        ));
        cluster
    }

    #[tokio::test(start_paused = true)]
    async fn test_deploy_waits_for_load_balancer() {
        let runner = RecordingRunner::new();
        let unit = traefik_with(&runner);
        let cluster = MockCluster::new().with_external_ips(&["34.1.2.3"]);
        cluster.add_load_balancer_service("traefik", "traefik", "34.1.2.100");
        let ui = Ui::quiet();

        unit.deploy(&cluster, &ui, &unit.needed_options()).await.unwrap();

        assert_eq!(
            runner.command_lines(),
            vec!["helm install traefik traefik/traefik --namespace traefik"]
        );
        assert!(ui.saw(Level::Success, "traefik reachable at 34.1.2.100"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_load_balancer_times_out_with_hint() {
        let unit = traefik();
        let cluster = MockCluster::new().with_external_ips(&["34.1.2.3"]);
        cluster.add_service("traefik", "traefik");

        let start = Instant::now();
        let err = unit
            .deploy(&cluster, &Ui::quiet(), &unit.needed_options())
            .await
            .unwrap_err();
        assert_eq!(start.elapsed(), Duration::from_secs(20));
        assert!(matches!(err, DeployError::LoadBalancerPending { .. }));
        assert!(err.to_string().contains("Hint: Ensure the cluster can provision LoadBalancer"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_load_balancer_platform_pins_node_addresses() {
        let runner = RecordingRunner::new();
        let unit = traefik_with(&runner);
        let cluster = kind_cluster();
        let ui = Ui::quiet();

        unit.deploy(&cluster, &ui, &unit.needed_options()).await.unwrap();

        assert_eq!(
            runner.command_lines(),
            vec!["helm install traefik traefik/traefik --namespace traefik --set service.externalIPs[0]=172.18.0.2"]
        );
        assert!(!ui.saw(Level::Progress, "LoadBalancer"));
    }

    #[tokio::test]
    async fn test_fresh_cluster_needs_ingress() {
        let cluster = MockCluster::new();
        assert_eq!(traefik().externally_satisfied(&cluster).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_bundled_traefik_satisfies() {
        let cluster = MockCluster::new();
        cluster.add_service("kube-system", "traefik");
        let reason = traefik().externally_satisfied(&cluster).await.unwrap();
        assert_eq!(
            reason.as_deref(),
            Some("found existing ingress service kube-system/traefik")
        );
    }

    #[tokio::test]
    async fn test_own_installation_is_not_external() {
        let cluster = MockCluster::new().with_namespace("traefik", &[(OWNER_LABEL, OWNER_VALUE)]);
        cluster.add_service("traefik", "traefik");
        assert_eq!(traefik().externally_satisfied(&cluster).await.unwrap(), None);
    }
}
