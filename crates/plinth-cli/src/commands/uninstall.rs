//! Uninstall command - remove every unit, last installed first

use std::io;

use plinth_core::confirm;
use plinth_kube::{Installer, Ui};

use crate::error::{CliError, Result};

/// Run the uninstall command
pub async fn run(installer: Installer, yes: bool, ui: &Ui) -> Result<()> {
    if !yes {
        let question = format!(
            "Remove {} platform units and their namespaces?",
            installer.units().len()
        );
        let stdin = io::stdin();
        if !confirm(&mut stdin.lock(), &mut io::stdout(), &question)? {
            return Err(CliError::Cancelled);
        }
    }

    let cluster = super::connect(ui).await?;

    ui.note("Removing platform");
    installer.uninstall(&cluster, ui).await?;
    ui.success("Platform removed");
    Ok(())
}
