//! # spool-cli
//!
//! Offline tooling for directories written by `spool-core`.
//!
//! Provides commands for:
//! - Decoding a log file, encrypted or not, into readable records
//! - Listing a logger's files for a date
//! - Applying the retention window without a running engine

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cli;
pub mod commands;
pub mod error;
pub mod output;

pub use cli::{Cli, Commands, Format};
pub use error::CliError;
pub use output::OutputFormat;
