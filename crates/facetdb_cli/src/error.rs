//! CLI errors.

use facetdb_core::CoreError;
use facetdb_server::ServerError;
use std::fmt::Display;
use std::path::Path;
use thiserror::Error;

/// Result type for CLI commands.
pub type CliResult<T> = Result<T, CliError>;

/// Errors reported by CLI commands.
#[derive(Debug, Error)]
pub enum CliError {
    /// The configuration file is missing or invalid.
    #[error("configuration {path}: {message}")]
    Config {
        /// File the problem was found in.
        path: String,
        /// What is wrong.
        message: String,
    },

    /// Engine error.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Server error.
    #[error(transparent)]
    Server(#[from] ServerError),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Output encoding failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CliError {
    /// Creates a configuration error.
    pub fn config(path: impl AsRef<Path>, message: impl Display) -> Self {
        Self::Config {
            path: path.as_ref().display().to_string(),
            message: message.to_string(),
        }
    }
}
