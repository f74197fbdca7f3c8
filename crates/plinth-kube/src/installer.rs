//! Installer: runs deployment units in order
//!
//! An [`Installer`] is built per command from a fixed list of units. It
//! gathers the options every unit needs into one [`OptionSet`], lets the
//! caller resolve them, and then drives install, upgrade or uninstall.

use std::sync::Arc;
use tracing::{info, warn};

use plinth_core::{OptionSet, OptionsReader, PlatformCatalog};

use crate::cluster::ClusterApi;
use crate::deployment::Deployment;
use crate::error::{DeployError, Result};
use crate::exec::CommandRunner;
use crate::progress::Ui;
use crate::units::units_from_catalog;

/// One orchestration run over a fixed list of units
pub struct Installer {
    units: Vec<Box<dyn Deployment>>,
    options: OptionSet,
}

impl Installer {
    /// Units are installed in the given order and removed in reverse
    pub fn new(units: Vec<Box<dyn Deployment>>) -> Self {
        Self {
            units,
            options: OptionSet::new(),
        }
    }

    /// Installer over every unit of a catalog
    pub fn from_catalog(catalog: &PlatformCatalog, runner: Arc<dyn CommandRunner>) -> Result<Self> {
        Ok(Self::new(units_from_catalog(catalog, runner)?))
    }

    pub fn units(&self) -> &[Box<dyn Deployment>] {
        &self.units
    }

    /// Collect the options of every unit
    ///
    /// Shared options are merged with their value cleared, so whichever
    /// unit declared one last does not decide its value.
    pub fn gather_needed_options(&mut self) -> &OptionSet {
        let mut options = OptionSet::new();
        for unit in &self.units {
            options.merge(unit.needed_options().curated_for_gather());
        }
        self.options = options;
        &self.options
    }

    pub fn options(&self) -> &OptionSet {
        &self.options
    }

    /// Mutable access, e.g. to attach dynamic defaults
    pub fn options_mut(&mut self) -> &mut OptionSet {
        &mut self.options
    }

    pub fn populate_needed_options(&mut self, reader: &mut dyn OptionsReader) -> Result<()> {
        Ok(self.options.populate(reader)?)
    }

    pub fn resolve_needed_options(&mut self, chain: &mut [&mut dyn OptionsReader]) -> Result<()> {
        Ok(self.options.resolve(chain)?)
    }

    /// Deploy every unit in order, stopping at the first failure
    pub async fn install(&self, cluster: &dyn ClusterApi, ui: &Ui) -> Result<()> {
        for unit in &self.units {
            let id = unit.id();
            let satisfied = unit
                .externally_satisfied(cluster)
                .await
                .map_err(|e| e.in_unit(id))?;
            if let Some(reason) = satisfied {
                info!(unit = id, %reason, "skipping, already provided");
                ui.exclamation(format!("Skipping {}: {}", id, reason));
                continue;
            }

            let options = self.options.for_unit(id);
            unit.deploy(cluster, ui, &options)
                .await
                .map_err(|e| e.in_unit(id))?;
        }
        Ok(())
    }

    /// Upgrade every unit in order, stopping at the first failure
    pub async fn upgrade(&self, cluster: &dyn ClusterApi, ui: &Ui) -> Result<()> {
        for unit in &self.units {
            let id = unit.id();
            let satisfied = unit
                .externally_satisfied(cluster)
                .await
                .map_err(|e| e.in_unit(id))?;
            if let Some(reason) = satisfied {
                ui.exclamation(format!("Skipping {}: {}", id, reason));
                continue;
            }

            let options = self.options.for_unit(id);
            unit.upgrade(cluster, ui, &options)
                .await
                .map_err(|e| e.in_unit(id))?;
        }
        Ok(())
    }

    /// Delete every unit in reverse order
    ///
    /// A failing unit does not stop the teardown; all failures are reported
    /// together as [`DeployError::Uninstall`].
    pub async fn uninstall(&self, cluster: &dyn ClusterApi, ui: &Ui) -> Result<()> {
        let mut failures = Vec::new();
        for unit in self.units.iter().rev() {
            let id = unit.id();
            if let Err(e) = unit.delete(cluster, ui).await {
                warn!(unit = id, error = %e, "failed to remove unit");
                ui.problem(format!("Failed to remove {}: {}", id, e));
                failures.push(e.in_unit(id));
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(DeployError::Uninstall { failures })
        }
    }
}
