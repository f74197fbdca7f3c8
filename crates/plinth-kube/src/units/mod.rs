//! Concrete deployment units built from the platform catalog

mod chart;
mod ingress;

pub use chart::ChartUnit;
pub use ingress::IngressUnit;

use std::sync::Arc;

use plinth_core::{PlatformCatalog, Timeouts, UnitKind, UnitSpec};

use crate::deployment::Deployment;
use crate::error::Result;
use crate::exec::CommandRunner;

/// Build the unit matching a spec's kind
pub fn build_unit(
    spec: UnitSpec,
    runner: Arc<dyn CommandRunner>,
    timeouts: Timeouts,
) -> Result<Box<dyn Deployment>> {
    let unit: Box<dyn Deployment> = match spec.kind {
        UnitKind::Chart | UnitKind::Manifest => Box::new(ChartUnit::new(spec, runner, timeouts)?),
        UnitKind::Ingress => Box::new(IngressUnit::new(spec, runner, timeouts)?),
    };
    Ok(unit)
}

/// Every unit of a catalog, in catalog order
pub fn units_from_catalog(
    catalog: &PlatformCatalog,
    runner: Arc<dyn CommandRunner>,
) -> Result<Vec<Box<dyn Deployment>>> {
    catalog
        .units
        .iter()
        .map(|spec| build_unit(spec.clone(), runner.clone(), catalog.timeouts.clone()))
        .collect()
}
