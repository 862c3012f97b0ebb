//! Engine and logger configuration.
//!
//! - [`EngineConfig`] - process-wide tuning, loadable from TOML
//! - [`LogConfig`] - per-logger policy, immutable once a logger exists

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SpoolError};
use crate::types::{Cipher, CipherKind, Compression, LogLevel};

/// Default size ceiling of a single log file (150 KiB).
pub const DEFAULT_MAX_FILE_SIZE: u64 = 150 * 1024;

/// Smallest size ceiling the engine accepts.
pub const MIN_FILE_SIZE: u64 = 4 * 1024;

/// Process-wide engine settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Size in bytes after which the active file is rotated.
    pub max_file_size: u64,
    /// Bytes buffered per logger before they are written through.
    pub buffer_capacity: usize,
    /// Number of background workers resolving file queries.
    pub query_workers: usize,
    /// Interval between scheduled trim sweeps in seconds (0 disables).
    pub trim_interval_secs: u64,
    /// Number of recent failures kept in the diagnostics ring.
    pub diagnostics_capacity: usize,
    /// Emit engine traces to stderr.
    pub enable_trace: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            buffer_capacity: 4 * 1024,
            query_workers: 2,
            trim_interval_secs: 60 * 60,
            diagnostics_capacity: 256,
            enable_trace: false,
        }
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            SpoolError::InvalidConfig(format!(
                "failed to read config file '{}': {e}",
                path.as_ref().display()
            ))
        })?;

        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid or fails validation.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| SpoolError::InvalidConfig(format!("invalid TOML: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any value is out of range.
    pub fn validate(&self) -> Result<()> {
        if self.max_file_size < MIN_FILE_SIZE {
            return Err(SpoolError::InvalidConfig(format!(
                "max_file_size must be at least {MIN_FILE_SIZE} bytes"
            )));
        }
        if self.query_workers == 0 {
            return Err(SpoolError::InvalidConfig(
                "query_workers must be at least 1".to_string(),
            ));
        }
        if self.diagnostics_capacity == 0 {
            return Err(SpoolError::InvalidConfig(
                "diagnostics_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Interval of the trim scheduler, if enabled.
    #[must_use]
    pub const fn trim_interval(&self) -> Option<Duration> {
        if self.trim_interval_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.trim_interval_secs))
        }
    }

    /// Sets the rotation size ceiling.
    #[must_use]
    pub const fn with_max_file_size(mut self, size: u64) -> Self {
        self.max_file_size = size;
        self
    }

    /// Sets the per-logger buffer capacity.
    #[must_use]
    pub const fn with_buffer_capacity(mut self, capacity: usize) -> Self {
        self.buffer_capacity = capacity;
        self
    }

    /// Sets the number of query workers.
    #[must_use]
    pub const fn with_query_workers(mut self, workers: usize) -> Self {
        self.query_workers = workers;
        self
    }

    /// Sets the trim interval in seconds (0 disables scheduled trims).
    #[must_use]
    pub const fn with_trim_interval_secs(mut self, secs: u64) -> Self {
        self.trim_interval_secs = secs;
        self
    }

    /// Enables or disables engine traces.
    #[must_use]
    pub const fn with_trace(mut self, enable: bool) -> Self {
        self.enable_trace = enable;
        self
    }
}

/// Policy of a single named logger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// Unique logger name, also the file name prefix.
    pub name: String,
    /// Records below this level are dropped.
    pub min_level: LogLevel,
    /// Directory holding this logger's files.
    pub dir: PathBuf,
    /// Sealed files older than this many days are trimmed.
    pub keep_days: u32,
    /// Payload compression.
    pub compression: Compression,
    /// Payload encryption.
    pub cipher: Cipher,
}

impl LogConfig {
    /// Creates a config with default policy for the given name and directory.
    pub fn new(name: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            min_level: LogLevel::Trace,
            dir: dir.into(),
            keep_days: 7,
            compression: Compression::None,
            cipher: Cipher::None,
        }
    }

    /// Sets the minimum level.
    #[must_use]
    pub const fn with_min_level(mut self, level: LogLevel) -> Self {
        self.min_level = level;
        self
    }

    /// Sets the retention window in days.
    #[must_use]
    pub const fn with_keep_days(mut self, days: u32) -> Self {
        self.keep_days = days;
        self
    }

    /// Sets the compression.
    #[must_use]
    pub const fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    /// Sets the cipher.
    #[must_use]
    pub fn with_cipher(mut self, cipher: Cipher) -> Self {
        self.cipher = cipher;
        self
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the name or directory cannot be used for files.
    pub fn validate(&self) -> Result<()> {
        validate_name(&self.name)?;

        if self.dir.as_os_str().is_empty() {
            return Err(SpoolError::InvalidConfig(format!(
                "logger `{}` has an empty directory path",
                self.name
            )));
        }

        if let Cipher::Aes128Gcm { key, .. }
        | Cipher::Aes256Gcm { key, .. }
        | Cipher::ChaCha20Poly1305 { key, .. } = &self.cipher
        {
            let kind: CipherKind = self.cipher.kind();
            if key.as_bytes().len() != kind.key_len() {
                return Err(SpoolError::InvalidConfig(format!(
                    "{kind} key must be {} bytes",
                    kind.key_len()
                )));
            }
        }
        Ok(())
    }
}

/// Checks that a logger name can be embedded in file names.
///
/// # Errors
///
/// Returns [`SpoolError::InvalidConfig`] for empty names, names longer than
/// 128 bytes, or characters outside `[A-Za-z0-9._-]`.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(SpoolError::InvalidConfig(
            "logger name cannot be empty".to_string(),
        ));
    }
    if name.len() > 128 {
        return Err(SpoolError::InvalidConfig(
            "logger name cannot exceed 128 characters".to_string(),
        ));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
    {
        return Err(SpoolError::InvalidConfig(format!(
            "logger name `{name}` must contain only alphanumeric characters, dots, hyphens, and underscores"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CompressLevel, NONCE_SIZE};
    use test_case::test_case;

    #[test]
    fn engine_config_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.max_file_size, 150 * 1024);
        assert_eq!(config.query_workers, 2);
        assert_eq!(config.trim_interval(), Some(Duration::from_secs(3600)));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn engine_config_from_toml_partial() {
        let config = EngineConfig::from_toml(
            r"
            max_file_size = 65536
            trim_interval_secs = 0
            enable_trace = true
            ",
        )
        .expect("valid toml");

        assert_eq!(config.max_file_size, 65536);
        assert_eq!(config.trim_interval(), None);
        assert!(config.enable_trace);
        // Unspecified fields keep their defaults.
        assert_eq!(config.buffer_capacity, 4 * 1024);
    }

    #[test]
    fn engine_config_rejects_bad_values() {
        assert!(EngineConfig::from_toml("max_file_size = 10").is_err());
        assert!(EngineConfig::from_toml("query_workers = 0").is_err());
        assert!(EngineConfig::from_toml("max_file_size = \"big\"").is_err());
    }

    #[test]
    fn engine_config_from_missing_file() {
        let result = EngineConfig::from_file("/nonexistent/spool.toml");
        assert!(matches!(result, Err(SpoolError::InvalidConfig(_))));
    }

    #[test]
    fn log_config_builder() {
        let config = LogConfig::new("app", "/data/logs")
            .with_min_level(LogLevel::Info)
            .with_keep_days(3)
            .with_compression(Compression::Zlib(CompressLevel::Fast));

        assert_eq!(config.name, "app");
        assert_eq!(config.dir, PathBuf::from("/data/logs"));
        assert_eq!(config.min_level, LogLevel::Info);
        assert_eq!(config.keep_days, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn log_config_equality_includes_cipher() {
        let plain = LogConfig::new("app", "/tmp");
        let encrypted = plain.clone().with_cipher(
            Cipher::from_parts(CipherKind::Aes128Gcm, &[1u8; 16], &[2u8; NONCE_SIZE])
                .expect("valid cipher"),
        );
        assert_ne!(plain, encrypted);
        assert_eq!(encrypted.clone(), encrypted);
    }

    #[test_case("app" ; "simple")]
    #[test_case("net.http-v2_main" ; "punctuation")]
    fn valid_names(name: &str) {
        assert!(validate_name(name).is_ok());
    }

    #[test_case("" ; "empty")]
    #[test_case("../escape" ; "path traversal")]
    #[test_case("a/b" ; "separator")]
    #[test_case("has space" ; "space")]
    fn invalid_names(name: &str) {
        assert!(validate_name(name).is_err());
    }

    #[test]
    fn log_config_rejects_empty_dir() {
        assert!(LogConfig::new("app", "").validate().is_err());
    }
}
