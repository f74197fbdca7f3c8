//! Upgrade command - re-apply every unit onto an existing installation

use plinth_core::FlagReader;
use plinth_kube::{Installer, Ui, platform_info};

use crate::display;
use crate::error::Result;
use crate::options;

/// Run the upgrade command
pub async fn run(
    mut installer: Installer,
    flags: FlagReader,
    interactive: bool,
    ui: &Ui,
) -> Result<()> {
    let cluster = super::connect(ui).await?;
    let platform = platform_info(&cluster).await?;

    options::attach_dynamic_defaults(installer.options_mut());
    options::resolve(&mut installer, flags, interactive, platform)?;
    options::require_domain(installer.options())?;
    display::print_options(installer.options());

    ui.note("Upgrading platform");
    installer.upgrade(&cluster, ui).await?;
    ui.success("Platform upgraded");
    Ok(())
}
