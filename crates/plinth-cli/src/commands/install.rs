//! Install command - deploy every unit onto a fresh cluster

use plinth_core::FlagReader;
use plinth_kube::{Installer, Ui, platform_info};

use crate::display;
use crate::error::Result;
use crate::options::{self, DOMAIN_OPTION};

/// Run the install command
pub async fn run(
    mut installer: Installer,
    flags: FlagReader,
    interactive: bool,
    ui: &Ui,
) -> Result<()> {
    let cluster = super::connect(ui).await?;
    let platform = platform_info(&cluster).await?;
    ui.detail(format!("Kubernetes {}", platform.server_version));

    options::attach_dynamic_defaults(installer.options_mut());
    options::resolve(&mut installer, flags, interactive, platform)?;
    options::require_domain(installer.options())?;
    display::print_options(installer.options());

    ui.note("Installing platform");
    installer.install(&cluster, ui).await?;
    ui.success("Platform installed");

    if let Ok(domain) = installer.options().get_string(DOMAIN_OPTION, None) {
        ui.note(format!("Services are exposed under {}", domain));
    }
    Ok(())
}
