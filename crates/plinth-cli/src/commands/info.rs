//! Info command - cluster facts and the state of every unit

use console::style;
use std::fmt::Display;

use plinth_core::PlatformInfo;
use plinth_kube::{Installer, KubeCluster, Ui, namespace_state, platform_info};

use crate::display;
use crate::error::Result;

fn unreachable(ui: &Ui, e: impl Display) {
    ui.exclamation(format!("Cluster unreachable: {}", e));
}

/// Connect and take a first look; `None` when the cluster does not answer
///
/// Building the client does no network I/O, so the platform snapshot is the
/// first request that can fail.
async fn first_contact(ui: &Ui) -> Option<(KubeCluster, PlatformInfo)> {
    let cluster = match super::connect(ui).await {
        Ok(cluster) => cluster,
        Err(e) => {
            unreachable(ui, e);
            return None;
        }
    };
    match platform_info(&cluster).await {
        Ok(platform) => Some((cluster, platform)),
        Err(e) => {
            unreachable(ui, e);
            None
        }
    }
}

fn print_platform(platform: &PlatformInfo) {
    let addresses = if platform.external_ips.is_empty() {
        "none".to_string()
    } else {
        platform.external_ips.join(", ")
    };
    let load_balancer = if platform.has_load_balancer {
        "yes"
    } else {
        "no"
    };
    println!("{} {}", style("Kubernetes:").bold(), platform.server_version);
    println!("{} {}", style("Platform:").bold(), platform.platform);
    println!("{} {}", style("Node addresses:").bold(), addresses);
    println!("{} {}", style("Load balancer:").bold(), load_balancer);
    println!();
}

/// Run the info command
///
/// Without a reachable cluster the units are still listed, without state.
pub async fn run(installer: Installer, ui: &Ui) -> Result<()> {
    let mut cluster = match first_contact(ui).await {
        Some((cluster, platform)) => {
            print_platform(&platform);
            Some(cluster)
        }
        None => None,
    };

    println!("{}", style("Platform units").bold());
    for unit in installer.units() {
        let state = match &cluster {
            Some(c) => namespace_state(c, unit.id()).await.map(Some),
            None => Ok(None),
        };
        let state = state.unwrap_or_else(|e| {
            unreachable(ui, e);
            cluster = None;
            None
        });
        display::print_unit(unit.as_ref(), state);
    }
    Ok(())
}
