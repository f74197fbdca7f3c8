//! CLI command implementations

pub mod info;
pub mod install;
pub mod uninstall;
pub mod upgrade;

use plinth_kube::{KubeCluster, Ui};
use tracing::debug;

use crate::error::Result;

/// Connect with the current kubeconfig context
async fn connect(ui: &Ui) -> Result<KubeCluster> {
    debug!("connecting to cluster");
    let cluster = KubeCluster::connect().await?;
    ui.detail("Connected to cluster");
    Ok(cluster)
}
