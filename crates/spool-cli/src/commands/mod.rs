//! CLI command implementations.
//!
//! Each submodule implements a specific CLI command:
//! - [`decode`] - Decode a log file into records
//! - [`files`] - List a logger's files for a date
//! - [`trim`] - Retention sweep over a logger directory

pub mod decode;
pub mod files;
pub mod trim;

pub use decode::DecodeCommand;
pub use files::FilesCommand;
pub use trim::TrimCommand;
