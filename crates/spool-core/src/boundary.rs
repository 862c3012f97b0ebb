//! Process-wide entry points for a host application.
//!
//! These functions front a single [`Spool`] that lives until the process
//! exits. They take the small-integer encodings a foreign caller passes and
//! never panic. Operations without a return channel report their failures to
//! the engine's [`Diagnostics`](crate::Diagnostics) instead.
//!
//! Every function other than [`init`] fails fast with
//! [`SpoolError::NotInitialized`] until [`init`] has run. Calling [`init`]
//! again leaves the running engine and its loggers untouched.

use std::sync::{Arc, OnceLock};

use tracing::{debug, warn};

use crate::callback::FnCallback;
use crate::config::{EngineConfig, LogConfig};
use crate::engine::Spool;
use crate::error::{Result, SpoolError};
use crate::query::QueryId;
use crate::telemetry;
use crate::types::{Cipher, CipherKind, Compression, LogLevel};

static ENGINE: OnceLock<Spool> = OnceLock::new();

/// Returns the process-wide engine.
///
/// # Errors
///
/// Returns [`SpoolError::NotInitialized`] before [`init`].
pub fn engine() -> Result<&'static Spool> {
    ENGINE.get().ok_or(SpoolError::NotInitialized)
}

/// Starts the process-wide engine with default settings.
///
/// Returns true if this call started the engine, false if it was already
/// running or could not be started. No engine exists to record a failure
/// here, so it is only logged; use [`init_with_config`] to get the error.
pub fn init(enable_trace: bool) -> bool {
    init_with_config(EngineConfig::default().with_trace(enable_trace)).unwrap_or_else(|e| {
        warn!(error = %e, "engine initialization failed");
        false
    })
}

/// Starts the process-wide engine with explicit settings.
///
/// # Errors
///
/// Returns an error if the configuration is invalid, even when an engine is
/// already running, or if the engine cannot be started.
pub fn init_with_config(config: EngineConfig) -> Result<bool> {
    config.validate()?;
    telemetry::init_tracing(config.enable_trace);
    if ENGINE.get().is_some() {
        debug!("engine already initialized");
        return Ok(false);
    }

    let spool = Spool::init(config)?;
    // A concurrent init may have won; the engine built here is dropped.
    Ok(ENGINE.set(spool).is_ok())
}

/// Builds a logger configuration from boundary encodings.
///
/// Unknown level codes mean [`LogLevel::Trace`]. Key and nonce are ignored
/// when `cipher` is 0.
///
/// # Errors
///
/// Returns [`SpoolError::InvalidConfig`] for unknown compression or cipher
/// codes and malformed keys or nonces.
#[allow(clippy::too_many_arguments)]
pub fn log_config(
    name: &str,
    level: u8,
    dir: &str,
    keep_days: u32,
    compress: u8,
    compress_level: u8,
    cipher: u8,
    cipher_key: &[u8],
    cipher_nonce: &[u8],
) -> Result<LogConfig> {
    let compression = Compression::from_wire(compress, compress_level)?;
    let cipher = Cipher::from_parts(CipherKind::from_tag(cipher)?, cipher_key, cipher_nonce)?;
    let config = LogConfig::new(name, dir)
        .with_min_level(LogLevel::from_wire(level).unwrap_or(LogLevel::Trace))
        .with_keep_days(keep_days)
        .with_compression(compression)
        .with_cipher(cipher);
    config.validate()?;
    Ok(config)
}

/// Registers a logger.
///
/// # Errors
///
/// Returns [`SpoolError::NotInitialized`], or the creation error, which is
/// also recorded in diagnostics.
#[allow(clippy::too_many_arguments)]
pub fn create_log(
    name: &str,
    level: u8,
    dir: &str,
    keep_days: u32,
    compress: u8,
    compress_level: u8,
    cipher: u8,
    cipher_key: &[u8],
    cipher_nonce: &[u8],
) -> Result<()> {
    let spool = engine()?;
    match log_config(
        name,
        level,
        dir,
        keep_days,
        compress,
        compress_level,
        cipher,
        cipher_key,
        cipher_nonce,
    ) {
        Ok(config) => spool.create_log(config),
        Err(e) => {
            spool
                .diagnostics()
                .record(crate::diagnostics::Operation::CreateLog, Some(name), &e);
            Err(e)
        }
    }
}

/// Appends one record. Failures go to diagnostics.
pub fn log(name: &str, level: u8, target: &str, content: &str) {
    let Ok(spool) = engine() else {
        return;
    };
    let level = LogLevel::from_wire(level).unwrap_or(LogLevel::Trace);
    let _ = spool.log(name, level, target, content);
}

/// Flushes one logger. Failures go to diagnostics.
pub fn flush(name: &str) {
    if let Ok(spool) = engine() {
        let _ = spool.flush(name);
    }
}

/// Flushes every logger. Failures go to diagnostics.
pub fn flush_all() {
    if let Ok(spool) = engine() {
        let _ = spool.flush_all();
    }
}

/// Runs a trim sweep now. Failures go to diagnostics.
pub fn trim() {
    if let Ok(spool) = engine() {
        spool.trim();
    }
}

/// Installs the query callback pair, replacing any previous one.
///
/// Handler state is whatever the closures capture.
///
/// # Errors
///
/// Returns [`SpoolError::NotInitialized`] before [`init`].
pub fn register_callback<S, F>(on_success: S, on_fail: F) -> Result<()>
where
    S: Fn(&str, &str, &[String]) + Send + Sync + 'static,
    F: Fn(&str, &str, &str) + Send + Sync + 'static,
{
    engine()?.register_callback(Arc::new(FnCallback::new(on_success, on_fail)));
    Ok(())
}

/// Submits an asynchronous file query.
///
/// # Errors
///
/// Returns [`SpoolError::NotInitialized`] before [`init`] and
/// [`SpoolError::CallbackNotRegistered`] if no callback is installed. No
/// callback fires in either case.
pub fn request_log_files_for_date(name: &str, date: &str) -> Result<QueryId> {
    engine()?.request_log_files_for_date(name, date)
}
