//! Error types for the logging engine.

use thiserror::Error;

/// Errors that can occur in the logging engine.
#[derive(Debug, Error)]
pub enum SpoolError {
    /// A logger with this name already exists with a different policy.
    #[error("logger `{name}` already exists with a different configuration")]
    ConfigConflict {
        /// Name of the conflicting logger.
        name: String,
    },

    /// No logger is registered under the given name.
    #[error("logger not found: {name}")]
    NotFound {
        /// Name that was looked up.
        name: String,
    },

    /// Writing, flushing, listing or deleting a log file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Encryption or decryption failed (wrong key/nonce or tampered block).
    #[error("cipher error: {0}")]
    Cipher(String),

    /// A block could not be compressed, decompressed or deserialized.
    #[error("codec error: {0}")]
    Codec(String),

    /// A logger or engine configuration was rejected.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A query date could not be parsed.
    #[error("invalid date `{0}`, expected YYYY_MM_DD")]
    InvalidDate(String),

    /// The engine has not been initialized.
    #[error("engine not initialized")]
    NotInitialized,

    /// A file query was submitted before any callback was registered.
    #[error("no query callback registered")]
    CallbackNotRegistered,
}

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, SpoolError>;

impl SpoolError {
    /// Creates a [`SpoolError::NotFound`] for the given logger name.
    pub fn not_found(name: impl Into<String>) -> Self {
        Self::NotFound { name: name.into() }
    }

    /// Returns true if this error came from the filesystem.
    #[must_use]
    pub const fn is_io(&self) -> bool {
        matches!(self, Self::Io(_))
    }
}
