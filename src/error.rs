//! Error types for datamodel compilation
//!
//! Only fatal conditions live here. Per-type and per-field problems are
//! collected as [`crate::graph::Diagnostics`] and never abort a pass.

use thiserror::Error;

use crate::decl::TypeRefError;

/// Result type for compiler operations
pub type Result<T> = std::result::Result<T, CompileError>;

/// Fatal compiler errors: no graph is produced
#[derive(Error, Debug)]
pub enum CompileError {
    #[error("Duplicate node type: {0}")]
    DuplicateNodeType(String),

    #[error("Identifier must not be empty")]
    EmptyIdentifier,

    #[error("Invalid declaration file {path}: {message}")]
    InvalidDeclaration { path: String, message: String },

    #[error(transparent)]
    TypeRef(#[from] TypeRefError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("Config error: {0}")]
    Config(#[from] config_crate::ConfigError),
}
