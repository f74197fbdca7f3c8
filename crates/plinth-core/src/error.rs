//! Core error types

use thiserror::Error;

use crate::option::{OptionKind, Scope};

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("option '{name}' ({scope}) has no value")]
    MissingOption { name: String, scope: Scope },

    #[error("option '{name}' not set")]
    UnknownOption { name: String },

    #[error("option '{name}' holds a {actual} value, expected {expected}")]
    WrongKind {
        name: String,
        expected: OptionKind,
        actual: OptionKind,
    },

    #[error("invalid {kind} value '{value}' for option '{name}'")]
    InvalidValue {
        name: String,
        value: String,
        kind: OptionKind,
    },

    #[error("failed reading input for option '{name}': {message}")]
    Input { name: String, message: String },

    #[error("Invalid platform catalog: {message}")]
    InvalidCatalog { message: String },

    #[error("Failed to parse platform catalog: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;
