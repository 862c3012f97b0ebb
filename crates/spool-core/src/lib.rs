//! # spool-core
//!
//! Embedded multi-logger engine for applications that keep their logs on
//! the device.
//!
//! This crate provides:
//!
//! - [`Spool`] - The engine context: loggers, callbacks, diagnostics, workers
//! - [`Logger`] - One named stream with buffering, rotation and retention
//! - [`StagingBuffer`] - Memory-mapped staging that survives a crash
//! - [`RecordCodec`] - Block encoding with optional zlib and AEAD encryption
//! - [`RotationPolicy`] - Date- and size-based rotation, file naming
//! - [`LoggerRegistry`] - Name → logger mapping with idempotent creation
//! - [`trim_all`] / [`TrimScheduler`] - Retention sweeps, on demand or periodic
//! - [`QueryEngine`] / [`QueryCallback`] - Asynchronous "files for date" queries
//! - [`Diagnostics`] - Failure side-channel and lifecycle events
//! - [`read_log_file`] - Decoding a file back into records
//! - [`boundary`] - Process-wide entry points for a host application
//!
//! ## Example
//!
//! ```rust,no_run
//! use spool_core::{EngineConfig, LogConfig, LogLevel, Spool};
//!
//! # fn main() -> spool_core::Result<()> {
//! let spool = Spool::init(EngineConfig::default())?;
//! spool.create_log(LogConfig::new("app", "/data/logs").with_keep_days(3))?;
//!
//! spool.log("app", LogLevel::Info, "startup", "application started")?;
//! spool.flush("app")?;
//!
//! let today = chrono::Local::now().format("%Y_%m_%d").to_string();
//! for path in spool.files_for_date("app", &today)? {
//!     println!("{}", path.display());
//! }
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod boundary;
pub mod buffer;
pub mod callback;
pub mod clock;
pub mod codec;
pub mod config;
pub mod diagnostics;
pub mod engine;
pub mod error;
pub mod logger;
pub mod query;
pub mod reader;
pub mod registry;
pub mod rotation;
pub mod telemetry;
pub mod trim;
pub mod types;

// Re-export main types
pub use callback::{CallbackRegistry, FnCallback, QueryCallback};
pub use clock::{Clock, ManualClock, SystemClock};
pub use codec::RecordCodec;
pub use config::{EngineConfig, LogConfig};
pub use diagnostics::{Diagnostic, Diagnostics, Event, EventListener, Operation, Phase};
pub use buffer::StagingBuffer;
pub use engine::Spool;
pub use error::{Result, SpoolError};
pub use logger::Logger;
pub use query::{QueryEngine, QueryId, QueryOutcome, QueryRequest, QueryState};
pub use reader::{FileContents, read_log_file};
pub use registry::LoggerRegistry;
pub use rotation::{RotationPolicy, parse_query_date};
pub use trim::{TrimReport, TrimScheduler, trim_all};
pub use types::{
    Cipher, CipherKey, CipherKind, CompressLevel, Compression, FileState, LogFile, LogLevel,
    LogRecord,
};
