//! Core types for the logging engine.
//!
//! This module provides:
//! - [`LogLevel`] - Severity levels for records
//! - [`LogRecord`] - A single record as appended by the host
//! - [`Compression`] / [`CompressLevel`] - Payload compression policy
//! - [`Cipher`] / [`CipherKind`] / [`CipherKey`] - Payload encryption policy
//! - [`LogFile`] / [`FileState`] - On-disk files owned by a logger

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::error::{Result, SpoolError};

/// Size of an AEAD nonce in bytes (96 bits).
pub const NONCE_SIZE: usize = 12;

/// Log severity levels, ordered from most to least verbose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Most verbose, detailed debugging information
    Trace = 0,
    /// Debugging information
    Debug = 1,
    /// General information
    Info = 2,
    /// Warning conditions
    Warn = 3,
    /// Error conditions
    Error = 4,
}

impl LogLevel {
    /// Returns true if this level is at least as severe as the given level.
    #[must_use]
    pub fn is_at_least(&self, level: Self) -> bool {
        *self >= level
    }

    /// Returns the string representation of this level.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "TRACE",
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
        }
    }

    /// Decodes a level from the host boundary encoding.
    ///
    /// `1=Error 2=Warn 3=Info 4=Debug 5=Trace`; anything else is `None`.
    #[must_use]
    pub const fn from_wire(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Error),
            2 => Some(Self::Warn),
            3 => Some(Self::Info),
            4 => Some(Self::Debug),
            5 => Some(Self::Trace),
            _ => None,
        }
    }

    /// Encodes this level for the host boundary.
    #[must_use]
    pub const fn to_wire(self) -> u8 {
        match self {
            Self::Error => 1,
            Self::Warn => 2,
            Self::Info => 3,
            Self::Debug => 4,
            Self::Trace => 5,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single log record.
///
/// The timestamp is assigned by the engine at append time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    /// Severity level
    pub level: LogLevel,
    /// Emitting component, e.g. a module path or tag
    pub target: String,
    /// The log message
    pub content: String,
    /// When the record was appended
    pub timestamp: DateTime<Utc>,
}

impl LogRecord {
    /// Creates a new record.
    pub fn new(
        level: LogLevel,
        target: impl Into<String>,
        content: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            level,
            target: target.into(),
            content: content.into(),
            timestamp,
        }
    }

    /// Splits this record into pieces whose content is at most `max_bytes`
    /// long, cutting only on UTF-8 character boundaries.
    ///
    /// Every piece keeps the level, target and timestamp of the original.
    #[must_use]
    pub fn split_content(&self, max_bytes: usize) -> Vec<Self> {
        if max_bytes == 0 || self.content.len() <= max_bytes {
            return vec![self.clone()];
        }

        let mut pieces = Vec::new();
        let mut start = 0;
        while start < self.content.len() {
            let mut end = usize::min(start + max_bytes, self.content.len());
            while end > start && !self.content.is_char_boundary(end) {
                end -= 1;
            }
            if end == start {
                // A single character wider than `max_bytes`; take it whole.
                end = start + 1;
                while !self.content.is_char_boundary(end) {
                    end += 1;
                }
            }
            pieces.push(Self {
                content: self.content[start..end].to_string(),
                ..self.clone()
            });
            start = end;
        }
        pieces
    }
}

impl fmt::Display for LogRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {}",
            self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            self.level,
            self.target,
            self.content
        )
    }
}

/// Compression effort for [`Compression::Zlib`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressLevel {
    /// Fastest compression
    Fast,
    /// Balanced compression
    #[default]
    Default,
    /// Smallest output
    Best,
}

impl CompressLevel {
    /// Decodes a level from the host boundary encoding (`0=Default 1=Fast 2=Best`).
    ///
    /// Unknown values fall back to [`CompressLevel::Default`].
    #[must_use]
    pub const fn from_wire(value: u8) -> Self {
        match value {
            1 => Self::Fast,
            2 => Self::Best,
            _ => Self::Default,
        }
    }
}

/// Payload compression policy of a logger.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Compression {
    /// Payloads are stored as serialized
    #[default]
    None,
    /// Payloads are zlib-compressed
    Zlib(CompressLevel),
}

impl Compression {
    /// Byte stored in every block header for this compression.
    #[must_use]
    pub const fn tag(&self) -> u8 {
        match self {
            Self::None => 0x00,
            Self::Zlib(_) => 0x01,
        }
    }

    /// Decodes compression from the host boundary encoding.
    ///
    /// # Errors
    ///
    /// Returns [`SpoolError::InvalidConfig`] for an unknown compression kind.
    pub fn from_wire(kind: u8, level: u8) -> Result<Self> {
        match kind {
            0x00 => Ok(Self::None),
            0x01 => Ok(Self::Zlib(CompressLevel::from_wire(level))),
            other => Err(SpoolError::InvalidConfig(format!(
                "unknown compression kind {other}"
            ))),
        }
    }
}

/// Cipher algorithm selector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CipherKind {
    /// No encryption
    #[default]
    None,
    /// AES-128 in GCM mode (16-byte key)
    Aes128Gcm,
    /// AES-256 in GCM mode (32-byte key)
    Aes256Gcm,
    /// ChaCha20-Poly1305 (32-byte key)
    #[serde(rename = "chacha20-poly1305")]
    ChaCha20Poly1305,
}

impl CipherKind {
    /// Byte stored in every block header for this cipher.
    #[must_use]
    pub const fn tag(&self) -> u8 {
        match self {
            Self::None => 0x00,
            Self::Aes128Gcm => 0x01,
            Self::Aes256Gcm => 0x02,
            Self::ChaCha20Poly1305 => 0x05,
        }
    }

    /// Decodes a cipher kind from a block header or the host boundary.
    ///
    /// # Errors
    ///
    /// Returns [`SpoolError::InvalidConfig`] for unsupported kinds, including
    /// the GCM-SIV codes `3` and `4`.
    pub fn from_tag(tag: u8) -> Result<Self> {
        match tag {
            0x00 => Ok(Self::None),
            0x01 => Ok(Self::Aes128Gcm),
            0x02 => Ok(Self::Aes256Gcm),
            0x05 => Ok(Self::ChaCha20Poly1305),
            0x03 | 0x04 => Err(SpoolError::InvalidConfig(
                "GCM-SIV ciphers are not supported".to_string(),
            )),
            other => Err(SpoolError::InvalidConfig(format!("unknown cipher kind {other}"))),
        }
    }

    /// Required key length in bytes, or 0 for [`CipherKind::None`].
    #[must_use]
    pub const fn key_len(&self) -> usize {
        match self {
            Self::None => 0,
            Self::Aes128Gcm => 16,
            Self::Aes256Gcm | Self::ChaCha20Poly1305 => 32,
        }
    }
}

impl fmt::Display for CipherKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None => "none",
            Self::Aes128Gcm => "aes-128-gcm",
            Self::Aes256Gcm => "aes-256-gcm",
            Self::ChaCha20Poly1305 => "chacha20-poly1305",
        };
        f.write_str(name)
    }
}

/// Secret key material for a cipher.
///
/// The bytes are zeroized when dropped and never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct CipherKey(Zeroizing<Vec<u8>>);

impl CipherKey {
    /// Wraps raw key bytes.
    #[must_use]
    pub fn new(bytes: &[u8]) -> Self {
        Self(Zeroizing::new(bytes.to_vec()))
    }

    /// Returns the key bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for CipherKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CipherKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Payload encryption policy of a logger, with its parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Cipher {
    /// Payloads are stored in clear
    #[default]
    None,
    /// AES-128-GCM
    Aes128Gcm {
        /// 16-byte key
        key: CipherKey,
        /// Base nonce, mixed with a per-block salt
        nonce: [u8; NONCE_SIZE],
    },
    /// AES-256-GCM
    Aes256Gcm {
        /// 32-byte key
        key: CipherKey,
        /// Base nonce, mixed with a per-block salt
        nonce: [u8; NONCE_SIZE],
    },
    /// ChaCha20-Poly1305
    ChaCha20Poly1305 {
        /// 32-byte key
        key: CipherKey,
        /// Base nonce, mixed with a per-block salt
        nonce: [u8; NONCE_SIZE],
    },
}

impl Cipher {
    /// Builds a cipher from its kind and raw parameters, validating lengths.
    ///
    /// Key and nonce are ignored for [`CipherKind::None`].
    ///
    /// # Errors
    ///
    /// Returns [`SpoolError::InvalidConfig`] if the key or nonce has the wrong length.
    pub fn from_parts(kind: CipherKind, key: &[u8], nonce: &[u8]) -> Result<Self> {
        if kind == CipherKind::None {
            return Ok(Self::None);
        }
        if key.len() != kind.key_len() {
            return Err(SpoolError::InvalidConfig(format!(
                "{kind} key must be {} bytes, got {}",
                kind.key_len(),
                key.len()
            )));
        }
        let nonce: [u8; NONCE_SIZE] = nonce.try_into().map_err(|_| {
            SpoolError::InvalidConfig(format!(
                "cipher nonce must be {NONCE_SIZE} bytes, got {}",
                nonce.len()
            ))
        })?;
        let key = CipherKey::new(key);
        Ok(match kind {
            CipherKind::Aes128Gcm => Self::Aes128Gcm { key, nonce },
            CipherKind::Aes256Gcm => Self::Aes256Gcm { key, nonce },
            CipherKind::ChaCha20Poly1305 => Self::ChaCha20Poly1305 { key, nonce },
            CipherKind::None => Self::None,
        })
    }

    /// Returns the algorithm of this cipher.
    #[must_use]
    pub const fn kind(&self) -> CipherKind {
        match self {
            Self::None => CipherKind::None,
            Self::Aes128Gcm { .. } => CipherKind::Aes128Gcm,
            Self::Aes256Gcm { .. } => CipherKind::Aes256Gcm,
            Self::ChaCha20Poly1305 { .. } => CipherKind::ChaCha20Poly1305,
        }
    }
}

/// Lifecycle state of a log file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileState {
    /// Currently appended to
    Active,
    /// Rotated out; read or deleted only
    Sealed,
}

/// A log file belonging to a logger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogFile {
    /// Absolute path of the file
    pub path: PathBuf,
    /// Calendar date encoded in the file name
    pub date: NaiveDate,
    /// Sequence number within that date
    pub sequence: u32,
    /// Whether the file is still being appended to
    pub state: FileState,
}
