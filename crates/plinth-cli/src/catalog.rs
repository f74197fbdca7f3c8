//! Platform catalog selection

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use plinth_core::PlatformCatalog;

use crate::error::{CliError, Result};

/// Catalog used when no `--config` is given
const BUILTIN: &str = include_str!("../platform.yaml");

/// Load the catalog from `path`, or the built-in one
pub fn load(path: Option<&Path>) -> Result<PlatformCatalog> {
    match path {
        Some(path) => PlatformCatalog::from_file(path).map_err(|e| match e {
            plinth_core::CoreError::Io(io) => {
                CliError::config(format!("cannot read {}: {}", path.display(), io))
            }
            other => other.into(),
        }),
        None => Ok(PlatformCatalog::from_yaml(BUILTIN)?),
    }
}

/// Find `--config` before clap runs
///
/// The option flags of `install` and `upgrade` depend on the catalog, so it
/// has to be known before the command line can be parsed. Falls back to
/// `PLINTH_CONFIG`.
pub fn config_path_from_args(args: &[OsString]) -> Option<PathBuf> {
    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        let arg = arg.to_string_lossy();
        if arg == "--" {
            break;
        }
        if arg == "--config" {
            return iter.next().map(PathBuf::from);
        }
        if let Some(path) = arg.strip_prefix("--config=") {
            return Some(PathBuf::from(path));
        }
    }
    std::env::var_os("PLINTH_CONFIG").map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<OsString> {
        list.iter().map(OsString::from).collect()
    }

    #[test]
    fn test_builtin_catalog_is_valid() {
        let catalog = load(None).unwrap();
        let ids: Vec<_> = catalog.units.iter().map(|u| u.id.as_str()).collect();
        assert_eq!(
            ids,
            vec!["traefik", "cert-manager", "gitea", "registry", "tekton-pipelines"]
        );
    }

    #[test]
    fn test_config_path_forms() {
        assert_eq!(
            config_path_from_args(&args(&["plinth", "--config", "a.yaml", "install"])),
            Some(PathBuf::from("a.yaml"))
        );
        assert_eq!(
            config_path_from_args(&args(&["plinth", "install", "--config=b.yaml"])),
            Some(PathBuf::from("b.yaml"))
        );
    }

    #[test]
    fn test_load_custom_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("platform.yaml");
        std::fs::write(&path, "units:\n  - id: app\n    chart: plinth/app\n").unwrap();

        let catalog = load(Some(path.as_path())).unwrap();
        assert_eq!(catalog.units.len(), 1);
    }

    #[test]
    fn test_load_missing_file_is_config_error() {
        let err = load(Some(Path::new("/nonexistent/platform.yaml"))).unwrap_err();
        assert!(matches!(err, CliError::Config { .. }));
    }
}
