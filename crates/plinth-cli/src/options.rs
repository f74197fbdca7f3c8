//! Command-line surface of installation options
//!
//! Every gathered option gets a `--<flag-name>` on `install` and `upgrade`.
//! The flags are added with the clap builder API since they come from the
//! catalog, not from the source.

use clap::{Arg, ArgAction, ArgMatches, Command};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use plinth_core::{
    DefaultsReader, DynamicDefault, DynamicDefaultReader, FlagReader, InteractiveReader,
    OptionKind, OptionSet, OptionValue, PlatformInfo, Scope, ValidityReader, flag_name,
};
use plinth_kube::Installer;

use crate::error::{CliError, Result};

/// Shared option naming the domain services are exposed under
pub const DOMAIN_OPTION: &str = "system_domain";

const HEADING: &str = "Platform options";

/// Flags owned by the CLI itself; options with these names get no flag
const RESERVED: &[&str] = &[
    "config",
    "help",
    "interactive",
    "timeout-multiplier",
    "verbose",
    "version",
];

fn help_text(option: &plinth_core::InstallationOption) -> String {
    let mut help = match &option.scope {
        Scope::Shared => String::new(),
        Scope::Unit(id) => format!("[{}] ", id),
    };
    if option.description.is_empty() {
        help.push_str(&option.name);
    } else {
        help.push_str(&option.description);
    }
    let default = option.default_value();
    if !default.is_empty() {
        help.push_str(&format!(" [default: {}]", default));
    }
    help
}

/// Add one flag per option to `command`
///
/// A name declared both shared and private gets a single flag, which feeds
/// every option of that name.
pub fn add_option_args(mut command: Command, options: &OptionSet) -> Command {
    let mut seen = HashSet::new();
    for option in options {
        let flag = flag_name(&option.name);
        if RESERVED.contains(&flag.as_str()) || !seen.insert(flag.clone()) {
            continue;
        }

        let arg = Arg::new(flag.clone())
            .long(flag)
            .help(help_text(option))
            .help_heading(HEADING)
            .action(ArgAction::Set);
        let arg = match option.kind() {
            OptionKind::Bool => arg
                .value_name("BOOL")
                .num_args(0..=1)
                .default_missing_value("true"),
            OptionKind::Int => arg.value_name("INT"),
            OptionKind::String => arg.value_name("VALUE"),
        };
        command = command.arg(arg);
    }
    command
}

/// Values given on the command line for the option flags
pub fn flag_values(matches: &ArgMatches, options: &OptionSet) -> FlagReader {
    let mut values = HashMap::new();
    for option in options {
        let flag = flag_name(&option.name);
        if values.contains_key(&flag) {
            continue;
        }
        if let Ok(Some(value)) = matches.try_get_one::<String>(&flag) {
            values.insert(flag, value.clone());
        }
    }
    FlagReader::new(values)
}

fn nip_io_domain(platform: &PlatformInfo) -> std::result::Result<Option<OptionValue>, String> {
    Ok(platform
        .external_ips
        .first()
        .map(|ip| OptionValue::from(format!("{}.nip.io", ip))))
}

/// Attach defaults that need the live cluster
///
/// The domain defaults to a nip.io name of the first node address, which
/// resolves to the cluster without any DNS setup.
pub fn attach_dynamic_defaults(options: &mut OptionSet) {
    if let Some(domain) = options.get_mut(DOMAIN_OPTION, &Scope::Shared) {
        let default: DynamicDefault = Arc::new(nip_io_domain);
        domain.set_dynamic_default(default);
    }
}

/// Fail when the platform declares a domain but none was given or derived
pub fn require_domain(options: &OptionSet) -> Result<()> {
    match options.get(DOMAIN_OPTION, None) {
        Some(domain) if domain.value().is_empty() => Err(CliError::option_with_help(
            "no system_domain given and none could be derived from the node addresses",
            "Pass --system-domain <domain>, or give a node an ExternalIP",
        )),
        _ => Ok(()),
    }
}

/// Resolve every gathered option
///
/// Flags always win. Interactive runs then prompt for the rest; otherwise
/// dynamic and static defaults fill them in. Either way an option still
/// unset at the end is an error.
pub fn resolve(
    installer: &mut Installer,
    mut flags: FlagReader,
    interactive: bool,
    platform: PlatformInfo,
) -> Result<()> {
    if interactive {
        let stdin = std::io::stdin();
        let mut prompt =
            InteractiveReader::new(stdin.lock(), std::io::stdout()).with_platform(platform);
        installer.resolve_needed_options(&mut [&mut flags, &mut prompt, &mut ValidityReader])?;
    } else {
        let mut dynamic = DynamicDefaultReader::new(platform);
        installer.resolve_needed_options(&mut [
            &mut flags,
            &mut dynamic,
            &mut DefaultsReader,
            &mut ValidityReader,
        ])?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use plinth_core::InstallationOption;

    fn declared() -> OptionSet {
        OptionSet::new()
            .with(InstallationOption::string(DOMAIN_OPTION, "").describe("Domain"))
            .with(InstallationOption::bool("skip_registry", false))
            .with(InstallationOption::int("replicas", 1).private_to("gitea"))
            .with(InstallationOption::int("replicas", 2).private_to("registry"))
            .with(InstallationOption::string("verbose", "no"))
    }

    fn parse(args: &[&str]) -> ArgMatches {
        add_option_args(Command::new("install"), &declared())
            .try_get_matches_from(args)
            .unwrap()
    }

    #[test]
    fn test_one_flag_per_name() {
        let command = add_option_args(Command::new("install"), &declared());
        let longs: Vec<_> = command
            .get_arguments()
            .filter_map(|a| a.get_long().map(str::to_string))
            .collect();
        assert_eq!(longs, vec!["system-domain", "skip-registry", "replicas"]);
    }

    #[test]
    fn test_flag_values_feed_resolution() {
        let matches = parse(&[
            "install",
            "--system-domain",
            "example.org",
            "--skip-registry",
            "--replicas=3",
        ]);
        let mut flags = flag_values(&matches, &declared());

        let mut options = declared();
        options.populate(&mut flags).unwrap();
        assert_eq!(options.get_string(DOMAIN_OPTION, None).unwrap(), "example.org");
        assert!(options.get_bool("skip_registry", None).unwrap());
        assert_eq!(options.get_int("replicas", Some("gitea")).unwrap(), 3);
        assert_eq!(options.get_int("replicas", Some("registry")).unwrap(), 3);
    }

    #[test]
    fn test_absent_flags_are_not_values() {
        let matches = parse(&["install"]);
        let mut options = declared();
        options.populate(&mut flag_values(&matches, &declared())).unwrap();
        assert!(options.iter().all(|o| !o.valid));
    }

    #[test]
    fn test_domain_defaults_to_nip_io() {
        let mut options = declared();
        attach_dynamic_defaults(&mut options);
        let platform = PlatformInfo {
            external_ips: vec!["172.18.0.2".to_string(), "172.18.0.3".to_string()],
            server_version: "v1.31.2".to_string(),
            ..Default::default()
        };
        options
            .populate(&mut DynamicDefaultReader::new(platform))
            .unwrap();
        assert_eq!(
            options.get_string(DOMAIN_OPTION, None).unwrap(),
            "172.18.0.2.nip.io"
        );
    }

    #[test]
    fn test_empty_domain_is_refused() {
        let mut options = declared();
        options.populate(&mut DefaultsReader).unwrap();
        let err = require_domain(&options).unwrap_err();
        assert_eq!(err.exit_code(), crate::exit_codes::OPTION_ERROR);

        let mut flags = FlagReader::from_pairs([("system-domain", "example.org")]);
        let mut options = declared();
        options.populate(&mut flags).unwrap();
        options.populate(&mut DefaultsReader).unwrap();
        assert!(require_domain(&options).is_ok());
        assert!(require_domain(&OptionSet::new()).is_ok());
    }

    #[test]
    fn test_no_addresses_leaves_domain_unset() {
        let mut options = declared();
        attach_dynamic_defaults(&mut options);
        options
            .populate(&mut DynamicDefaultReader::new(PlatformInfo::default()))
            .unwrap();
        assert!(!options.get(DOMAIN_OPTION, None).unwrap().valid);
    }
}
