//! Platform catalog: the units to install and how long to wait for them
//!
//! The catalog is plain configuration. It names each unit, where its chart
//! or manifest comes from, which options it needs and what to wait for once
//! applied. The engine never hardcodes any of it.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{CoreError, Result};
use crate::option::{InstallationOption, OptionKind, OptionSet, OptionValue};

/// Wait and retry budgets
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    /// Scales every wait, for slow clusters
    pub multiplier: u32,

    /// How long a unit may take to become ready
    #[serde(with = "humantime_serde")]
    pub deployment: Duration,

    /// How long a deleted namespace may take to vanish
    #[serde(with = "humantime_serde")]
    pub namespace_deletion: Duration,

    /// Pause between retries of transient failures
    #[serde(with = "humantime_serde")]
    pub retry_delay: Duration,

    pub retry_attempts: u32,

    /// How long an ingress service may take to get a load balancer address
    #[serde(with = "humantime_serde")]
    pub load_balancer: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            multiplier: 1,
            deployment: Duration::from_secs(180),
            namespace_deletion: Duration::from_secs(300),
            retry_delay: Duration::from_secs(5),
            retry_attempts: 10,
            load_balancer: Duration::from_secs(120),
        }
    }
}

impl Timeouts {
    pub fn with_multiplier(mut self, multiplier: u32) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Scale `base` by the multiplier, saturating instead of overflowing
    fn scaled(&self, base: Duration) -> Duration {
        base.checked_mul(self.multiplier.max(1))
            .unwrap_or(Duration::MAX)
    }

    /// Readiness budget, scaled by the multiplier
    pub fn deployment_timeout(&self) -> Duration {
        self.scaled(self.deployment)
    }

    /// Namespace removal budget, scaled by the multiplier
    pub fn namespace_deletion_timeout(&self) -> Duration {
        self.scaled(self.namespace_deletion)
    }

    /// Load balancer address budget, scaled by the multiplier
    pub fn load_balancer_timeout(&self) -> Duration {
        self.scaled(self.load_balancer)
    }
}

/// How a unit is applied
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitKind {
    /// A Helm chart release
    #[default]
    Chart,
    /// A raw manifest applied with kubectl
    Manifest,
    /// A chart that is skipped when an ingress controller already exists
    Ingress,
}

/// Option declared by a unit in the catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionSpec {
    pub name: String,
    pub kind: OptionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<OptionValue>,
    #[serde(default)]
    pub description: String,
    /// Private to the declaring unit instead of shared
    #[serde(default)]
    pub private: bool,
}

impl OptionSpec {
    /// Build the option declared by `unit_id`
    pub fn to_option(&self, unit_id: &str) -> Result<InstallationOption> {
        let default = match &self.default {
            None => OptionValue::zero(self.kind),
            Some(value) => value.clone().coerce(self.kind).ok_or_else(|| {
                CoreError::InvalidCatalog {
                    message: format!(
                        "unit '{}': default '{}' of option '{}' is not a {}",
                        unit_id, value, self.name, self.kind
                    ),
                }
            })?,
        };

        let option = InstallationOption::new(&self.name, default).describe(&self.description);
        Ok(if self.private {
            option.private_to(unit_id)
        } else {
            option
        })
    }
}

/// One deployment unit in the catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitSpec {
    /// Unit id, also the namespace it owns
    pub id: String,

    #[serde(default)]
    pub version: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub kind: UnitKind,

    /// Chart reference (`repo/name`, OCI url or local path)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chart: Option<String>,

    /// Chart repository url, passed as `--repo`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo: Option<String>,

    /// Release name, defaults to the unit id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release: Option<String>,

    /// Manifest file for manifest units
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifest: Option<PathBuf>,

    /// Chart values; `${option}` is replaced with the resolved option value
    #[serde(default)]
    pub set: IndexMap<String, String>,

    #[serde(default)]
    pub options: Vec<OptionSpec>,

    /// Label selectors whose pods must be running before the unit is ready
    #[serde(default)]
    pub ready: Vec<String>,

    /// CRDs that must be established before the unit is ready
    #[serde(default)]
    pub crds: Vec<String>,

    /// Inline manifests applied once the unit is ready
    #[serde(default)]
    pub post_apply: Vec<String>,

    /// Shared boolean option that, when true, skips the unit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_option: Option<String>,

    /// Services that, when already present, mean an existing installation
    #[serde(default)]
    pub services: Vec<String>,
}

impl UnitSpec {
    pub fn release_name(&self) -> &str {
        self.release.as_deref().unwrap_or(&self.id)
    }

    /// Options this unit declares
    pub fn needed_options(&self) -> Result<OptionSet> {
        self.options
            .iter()
            .map(|spec| spec.to_option(&self.id))
            .collect()
    }
}

/// The full set of units to install, in install order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformCatalog {
    #[serde(default)]
    pub timeouts: Timeouts,
    pub units: Vec<UnitSpec>,
}

impl PlatformCatalog {
    /// Parse and validate a catalog
    pub fn from_yaml(source: &str) -> Result<Self> {
        let catalog: PlatformCatalog = serde_yaml::from_str(source)?;
        catalog.validate()?;
        Ok(catalog)
    }

    /// Load a catalog file; relative manifest paths resolve against its directory
    ///
    /// Manifests given as `http(s)://` urls are passed to kubectl untouched.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let mut catalog = Self::from_yaml(&content)?;

        let base = path.parent().unwrap_or_else(|| Path::new("."));
        for unit in &mut catalog.units {
            if let Some(manifest) = unit.manifest.as_mut()
                && manifest.is_relative()
                && !is_url(manifest)
            {
                *manifest = base.join(&*manifest);
            }
        }
        Ok(catalog)
    }

    pub fn unit(&self, id: &str) -> Option<&UnitSpec> {
        self.units.iter().find(|u| u.id == id)
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |message: String| Err(CoreError::InvalidCatalog { message });

        if self.timeouts.multiplier == 0 {
            return invalid("timeout multiplier must be at least 1".to_string());
        }

        let mut seen = HashSet::new();
        let mut shared: HashMap<&str, (OptionKind, &str)> = HashMap::new();
        for unit in &self.units {
            if unit.id.is_empty() {
                return invalid("unit with empty id".to_string());
            }
            if !seen.insert(unit.id.as_str()) {
                return invalid(format!("duplicate unit id '{}'", unit.id));
            }
            match unit.kind {
                UnitKind::Manifest if unit.manifest.is_none() => {
                    return invalid(format!("manifest unit '{}' has no manifest path", unit.id));
                }
                UnitKind::Chart | UnitKind::Ingress if unit.chart.is_none() => {
                    return invalid(format!("unit '{}' has no chart", unit.id));
                }
                _ => {}
            }
            unit.needed_options()?;

            for option in unit.options.iter().filter(|o| !o.private) {
                match shared.get(option.name.as_str()) {
                    Some((kind, first)) if *kind != option.kind => {
                        return invalid(format!(
                            "shared option '{}' is a {} in unit '{}' but a {} in unit '{}'",
                            option.name, kind, first, option.kind, unit.id
                        ));
                    }
                    Some(_) => {}
                    None => {
                        shared.insert(option.name.as_str(), (option.kind, unit.id.as_str()));
                    }
                }
            }
        }

        for unit in &self.units {
            let Some(skip) = unit.skip_option.as_deref() else {
                continue;
            };
            let declared = unit
                .options
                .iter()
                .find(|o| o.name == skip)
                .map(|o| o.kind)
                .or_else(|| shared.get(skip).map(|(kind, _)| *kind));
            if let Some(kind) = declared
                && kind != OptionKind::Bool
            {
                return invalid(format!(
                    "unit '{}': skip option '{}' is a {}, not a boolean",
                    unit.id, skip, kind
                ));
            }
        }
        Ok(())
    }
}

fn is_url(path: &Path) -> bool {
    path.to_str()
        .is_some_and(|p| p.starts_with("http://") || p.starts_with("https://"))
}
