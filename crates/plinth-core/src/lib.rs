//! Plinth Core - option model, resolver pipeline and platform catalog
//!
//! This crate holds everything that does not need a cluster:
//! - Typed, scoped installation options ([`InstallationOption`], [`OptionSet`])
//! - The resolver pipeline filling them ([`OptionsReader`] and friends)
//! - The platform catalog describing units and timeouts ([`PlatformCatalog`])

pub mod catalog;
pub mod error;
pub mod option;
pub mod resolve;

pub use catalog::{OptionSpec, PlatformCatalog, Timeouts, UnitKind, UnitSpec};
pub use error::{CoreError, Result};
pub use option::{
    DynamicDefault, InstallationOption, OptionKind, OptionSet, OptionValue, PlatformInfo, Scope,
};
pub use resolve::{
    DefaultsReader, DynamicDefaultReader, FlagReader, InteractiveReader, OptionsReader,
    ValidityReader, confirm, flag_name,
};
