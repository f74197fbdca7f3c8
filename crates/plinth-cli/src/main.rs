//! Plinth CLI - install, upgrade and remove a Kubernetes platform

use clap::error::ErrorKind;
use clap::{ArgMatches, CommandFactory, FromArgMatches, Parser, Subcommand};
use console::style;
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::debug;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use plinth_core::{FlagReader, OptionSet, PlatformCatalog};
use plinth_kube::{Installer, ProcessRunner, Ui};

mod catalog;
mod commands;
mod display;
mod error;
mod exit_codes;
mod options;

use error::Result;

#[derive(Parser)]
#[command(name = "plinth")]
#[command(version)]
#[command(about = "Install, upgrade and remove a Kubernetes platform", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Platform catalog to use instead of the built-in one
    #[arg(long, global = true, env = "PLINTH_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Show detailed progress and debug logs
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Scale every wait, for slow clusters
    #[arg(
        long,
        global = true,
        env = "PLINTH_TIMEOUT_MULTIPLIER",
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    timeout_multiplier: Option<u32>,
}

#[derive(Subcommand)]
enum Commands {
    /// Install the platform on the current cluster
    Install {
        /// Prompt for every option not given as a flag
        #[arg(short, long)]
        interactive: bool,
    },

    /// Upgrade an existing installation
    Upgrade {
        /// Prompt for every option not given as a flag
        #[arg(short, long)]
        interactive: bool,
    },

    /// Remove the platform, last installed unit first
    Uninstall {
        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },

    /// Show cluster information and the state of every unit
    Info,
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "info,plinth=debug,plinth_core=debug,plinth_kube=debug"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_env("PLINTH_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .init();
}

/// Installer over the catalog, with its options gathered
fn build_installer(catalog: &PlatformCatalog, multiplier: Option<u32>) -> Result<Installer> {
    let mut catalog = catalog.clone();
    if let Some(multiplier) = multiplier {
        catalog.timeouts.multiplier = multiplier;
    }
    let mut installer = Installer::from_catalog(&catalog, Arc::new(ProcessRunner))?;
    installer.gather_needed_options();
    Ok(installer)
}

fn option_flags(matches: &ArgMatches, command: &str, declared: &OptionSet) -> FlagReader {
    matches
        .subcommand_matches(command)
        .map(|m| options::flag_values(m, declared))
        .unwrap_or_default()
}

/// Catalog and the options it declares
fn load_catalog(args: &[OsString]) -> Result<(PlatformCatalog, OptionSet)> {
    let config = catalog::config_path_from_args(args);
    let catalog = catalog::load(config.as_deref())?;
    let declared = build_installer(&catalog, None)?.options().clone();
    Ok((catalog, declared))
}

async fn run(args: Vec<OsString>) -> Result<()> {
    // A broken catalog only costs the option flags until a command needs it
    let loaded = load_catalog(&args);
    let mut command = Cli::command();
    if let Ok((_, declared)) = &loaded {
        command = command
            .mut_subcommand("install", |c| options::add_option_args(c, declared))
            .mut_subcommand("upgrade", |c| options::add_option_args(c, declared));
    }

    let matches = match command.try_get_matches_from(args) {
        Ok(matches) => matches,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => e.exit(),
        Err(e) => match loaded {
            Err(config) => return Err(config),
            Ok(_) => e.exit(),
        },
    };
    let cli = match Cli::from_arg_matches(&matches) {
        Ok(cli) => cli,
        Err(e) => e.exit(),
    };
    let (catalog, declared) = loaded?;

    init_tracing(cli.verbose);
    debug!(config = ?cli.config, units = catalog.units.len(), "catalog loaded");

    let ui = if cli.verbose {
        Ui::new().verbose()
    } else {
        Ui::new()
    };
    let installer = build_installer(&catalog, cli.timeout_multiplier)?;

    match cli.command {
        Commands::Install { interactive } => {
            let flags = option_flags(&matches, "install", &declared);
            commands::install::run(installer, flags, interactive, &ui).await
        }
        Commands::Upgrade { interactive } => {
            let flags = option_flags(&matches, "upgrade", &declared);
            commands::upgrade::run(installer, flags, interactive, &ui).await
        }
        Commands::Uninstall { yes } => commands::uninstall::run(installer, yes, &ui).await,
        Commands::Info => commands::info::run(installer, &ui).await,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    miette::set_panic_hook();

    match run(std::env::args_os().collect()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) if e.is_cancelled() => {
            println!("{} Cancelled, nothing was changed", style("⚠").yellow());
            ExitCode::SUCCESS
        }
        Err(e) => {
            let code = e.exit_code();
            eprintln!("{:?}", miette::Report::new(e));
            ExitCode::from(code as u8)
        }
    }
}
