//! CLI error types with exit code handling
//!
//! Engine errors are folded into a handful of categories, each with its own
//! exit code and, where it helps, a hint for the user.

use miette::Diagnostic;
use thiserror::Error;

use plinth_core::CoreError;
use plinth_kube::DeployError;

use crate::exit_codes;

/// CLI error carrying its exit code category
#[derive(Error, Debug, Diagnostic, Clone)]
pub enum CliError {
    /// An option is missing or malformed
    #[error("{message}")]
    #[diagnostic(code(plinth::cli::option))]
    Option {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// The cluster is not in a state the command accepts
    #[error("{message}")]
    #[diagnostic(code(plinth::cli::precondition))]
    Precondition {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// helm or kubectl failed
    #[error("{message}")]
    #[diagnostic(code(plinth::cli::command))]
    Command { message: String },

    /// A readiness wait gave up
    #[error("{message}")]
    #[diagnostic(
        code(plinth::cli::timeout),
        help("Slow cluster? Retry with --timeout-multiplier 2")
    )]
    Timeout { message: String },

    /// Talking to the cluster failed
    #[error("Cluster error: {message}")]
    #[diagnostic(
        code(plinth::cli::cluster),
        help("Check that your kubeconfig points at a reachable cluster")
    )]
    Cluster { message: String },

    /// The platform catalog could not be loaded
    #[error("Configuration error: {message}")]
    #[diagnostic(code(plinth::cli::config))]
    Config { message: String },

    /// IO error (terminal, files)
    #[error("IO error: {message}")]
    #[diagnostic(code(plinth::cli::io))]
    Io { message: String },

    /// The user declined to continue
    #[error("Cancelled")]
    #[diagnostic(code(plinth::cli::cancelled))]
    Cancelled,

    /// Anything else
    #[error("{message}")]
    #[diagnostic(code(plinth::cli::error))]
    Other { message: String },
}

impl CliError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Option { .. } => exit_codes::OPTION_ERROR,
            CliError::Precondition { .. } => exit_codes::PRECONDITION_ERROR,
            CliError::Command { .. } => exit_codes::COMMAND_ERROR,
            CliError::Timeout { .. } => exit_codes::TIMEOUT_ERROR,
            CliError::Config { .. } => exit_codes::CONFIG_ERROR,
            CliError::Cancelled => exit_codes::SUCCESS,
            CliError::Cluster { .. } | CliError::Io { .. } | CliError::Other { .. } => {
                exit_codes::ERROR
            }
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, CliError::Cancelled)
    }

    /// Create an option error with help text
    pub fn option_with_help(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Option {
            message: message.into(),
            help: Some(help.into()),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InvalidCatalog { .. } | CoreError::YamlParse(_) => CliError::Config {
                message: err.to_string(),
            },
            CoreError::Io(e) => e.into(),
            CoreError::MissingOption { ref name, .. } => CliError::Option {
                help: Some(format!(
                    "Pass --{} or run with --interactive",
                    plinth_core::flag_name(name)
                )),
                message: err.to_string(),
            },
            other => CliError::Option {
                message: other.to_string(),
                help: None,
            },
        }
    }
}

impl From<DeployError> for CliError {
    fn from(err: DeployError) -> Self {
        // categorize by the innermost cause, but keep the unit context in the message
        let message = err.to_string();
        match err.root() {
            DeployError::Cancelled => CliError::Cancelled,
            DeployError::NamespacePresent { .. }
            | DeployError::NamespaceNotPresent { .. }
            | DeployError::NamespaceNotOwned { .. } => CliError::Precondition {
                message,
                help: None,
            },
            DeployError::Option(CoreError::MissingOption { name, .. }) => CliError::Option {
                help: Some(format!(
                    "Pass --{} or run with --interactive",
                    plinth_core::flag_name(name)
                )),
                message,
            },
            DeployError::Option(_) => CliError::Option {
                message,
                help: None,
            },
            DeployError::Command { .. } | DeployError::JobFailed { .. } => {
                CliError::Command { message }
            }
            DeployError::Timeout { .. }
            | DeployError::LoadBalancerPending { .. }
            | DeployError::PodNotReady { .. }
            | DeployError::NoPods { .. } => CliError::Timeout { message },
            DeployError::Api(_) | DeployError::Cluster(_) => CliError::Cluster { message },
            DeployError::Io(_) => CliError::Io { message },
            _ => CliError::Other { message },
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        CliError::Io {
            message: err.to_string(),
        }
    }
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

#[cfg(test)]
mod tests {
    use super::*;
    use plinth_core::Scope;
    use std::time::Duration;

    #[test]
    fn test_precondition_inside_unit() {
        let err: CliError = DeployError::NamespacePresent {
            namespace: "gitea".to_string(),
        }
        .in_unit("gitea")
        .into();
        assert_eq!(err.exit_code(), exit_codes::PRECONDITION_ERROR);
        assert!(err.to_string().starts_with("gitea: namespace 'gitea' already exists"));
    }

    #[test]
    fn test_exit_codes() {
        let timeout: CliError = DeployError::Timeout {
            after: Duration::from_secs(180),
        }
        .into();
        assert_eq!(timeout.exit_code(), exit_codes::TIMEOUT_ERROR);

        let load_balancer: CliError = DeployError::LoadBalancerPending {
            namespace: "traefik".to_string(),
            service: "traefik".to_string(),
            after: Duration::from_secs(120),
        }
        .in_unit("traefik")
        .into();
        assert_eq!(load_balancer.exit_code(), exit_codes::TIMEOUT_ERROR);
        assert!(load_balancer.to_string().contains("LoadBalancer address"));

        let command: CliError = DeployError::Command {
            command: "helm install gitea".to_string(),
            code: 1,
            output: "boom".to_string(),
        }
        .into();
        assert_eq!(command.exit_code(), exit_codes::COMMAND_ERROR);

        let config: CliError = CoreError::InvalidCatalog {
            message: "duplicate unit id 'gitea'".to_string(),
        }
        .into();
        assert_eq!(config.exit_code(), exit_codes::CONFIG_ERROR);
    }

    #[test]
    fn test_missing_option_suggests_flag() {
        let err: CliError = CoreError::MissingOption {
            name: "system_domain".to_string(),
            scope: Scope::Shared,
        }
        .into();
        assert_eq!(err.exit_code(), exit_codes::OPTION_ERROR);
        match err {
            CliError::Option { help, .. } => {
                assert_eq!(help.unwrap(), "Pass --system-domain or run with --interactive")
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_cancelled_exits_cleanly() {
        let err: CliError = DeployError::Cancelled.into();
        assert!(err.is_cancelled());
        assert_eq!(err.exit_code(), exit_codes::SUCCESS);
    }
}
