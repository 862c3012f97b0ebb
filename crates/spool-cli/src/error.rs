//! CLI error types.

use spool_core::SpoolError;
use thiserror::Error;

/// CLI-specific errors.
#[derive(Debug, Error)]
pub enum CliError {
    /// Invalid argument.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Invalid key file or key material.
    #[error("configuration error: {0}")]
    Config(String),

    /// Output formatting error.
    #[error("format error: {0}")]
    Format(String),

    /// Engine error.
    #[error(transparent)]
    Spool(#[from] SpoolError),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
