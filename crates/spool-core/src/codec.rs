//! Record codec: turns a [`LogRecord`] into a self-delimiting block and back.
//!
//! Encoding is serialize → compress → encrypt, decoding the reverse. Every
//! block is framed as
//!
//! ```text
//! 0x3b | version | compression | cipher | payload_len (u32 BE)
//!      | salt (12 bytes, encrypted blocks only) | payload | crc32 (u32 BE) | 0x21
//! ```
//!
//! The CRC covers everything between the start marker and the CRC itself. An
//! encrypted block uses `base_nonce XOR salt` as its nonce, with a fresh random
//! salt per block, and binds the three header bytes as associated data.

use std::io::{Read, Write};

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes128Gcm, Aes256Gcm};
use chacha20poly1305::ChaCha20Poly1305;
use rand::RngCore;

use crate::config::LogConfig;
use crate::error::{Result, SpoolError};
use crate::types::{Cipher, CipherKind, CompressLevel, Compression, LogRecord, NONCE_SIZE};

/// First byte of every block.
pub const BLOCK_START: u8 = 0x3b;

/// Last byte of every block.
pub const BLOCK_END: u8 = 0x21;

/// Current block format version.
pub const FORMAT_VERSION: u8 = 1;

/// Bytes before the optional salt: marker, version, compression, cipher, length.
const HEADER_LEN: usize = 8;

/// Bytes after the payload: CRC and end marker.
const TRAILER_LEN: usize = 5;

/// Upper bound on a single block payload; larger lengths mean a corrupt header.
pub const MAX_PAYLOAD_LEN: usize = 16 * 1024 * 1024;

/// A structurally valid block borrowed from a byte buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame<'a> {
    /// Compression tag from the header
    pub compression: u8,
    /// Cipher tag from the header
    pub cipher: u8,
    /// Per-block nonce salt, present for encrypted blocks
    pub salt: Option<&'a [u8]>,
    /// Stored payload bytes
    pub payload: &'a [u8],
    /// Total encoded length of the block
    pub len: usize,
}

impl Frame<'_> {
    fn associated_data(&self) -> [u8; 3] {
        [FORMAT_VERSION, self.compression, self.cipher]
    }
}

/// Outcome of splitting one block off the front of a buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameParse<'a> {
    /// No bytes left
    End,
    /// A complete block followed by the remaining bytes
    Complete(Frame<'a>, &'a [u8]),
    /// A block with intact boundaries but a bad checksum; `rest` follows it
    Damaged {
        /// Bytes after the damaged block
        rest: &'a [u8],
        /// What was wrong
        reason: String,
    },
    /// The buffer ends in the middle of a block
    Truncated,
    /// The bytes at the front are not a block
    Invalid(String),
}

impl<'a> FrameParse<'a> {
    /// Splits the first block off `bytes`.
    ///
    /// A block that runs past the end of `bytes` is only [`FrameParse::Truncated`]
    /// when no intact block starts after it. Otherwise its length field is
    /// corrupt and it is reported as [`FrameParse::Invalid`], so readers
    /// resynchronize instead of dropping the blocks that follow.
    #[must_use]
    pub fn parse(bytes: &'a [u8]) -> Self {
        match Self::parse_front(bytes) {
            Self::Truncated if intact_block_after(bytes) => {
                Self::Invalid("block length runs past an intact later block".to_string())
            }
            parsed => parsed,
        }
    }

    fn parse_front(bytes: &'a [u8]) -> Self {
        if bytes.is_empty() {
            return Self::End;
        }
        if bytes[0] != BLOCK_START {
            return Self::Invalid(format!("unexpected byte {:#04x} at block start", bytes[0]));
        }
        if bytes.len() < HEADER_LEN {
            return Self::Truncated;
        }

        let version = bytes[1];
        if version != FORMAT_VERSION {
            return Self::Invalid(format!("unsupported block version {version}"));
        }
        let compression = bytes[2];
        let cipher = bytes[3];
        let payload_len = u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]) as usize;
        if payload_len > MAX_PAYLOAD_LEN {
            return Self::Invalid(format!("block payload length {payload_len} out of range"));
        }

        let salt_len = if cipher == CipherKind::None.tag() { 0 } else { NONCE_SIZE };
        let body_end = HEADER_LEN + salt_len + payload_len;
        let total = body_end + TRAILER_LEN;
        if bytes.len() < total {
            return Self::Truncated;
        }
        if bytes[total - 1] != BLOCK_END {
            return Self::Invalid("missing block end marker".to_string());
        }

        let rest = &bytes[total..];
        let stored_crc = u32::from_be_bytes([
            bytes[body_end],
            bytes[body_end + 1],
            bytes[body_end + 2],
            bytes[body_end + 3],
        ]);
        if crc32fast::hash(&bytes[1..body_end]) != stored_crc {
            return Self::Damaged {
                rest,
                reason: "block checksum mismatch".to_string(),
            };
        }

        let salt = (salt_len > 0).then(|| &bytes[HEADER_LEN..HEADER_LEN + salt_len]);
        Self::Complete(
            Frame {
                compression,
                cipher,
                salt,
                payload: &bytes[HEADER_LEN + salt_len..body_end],
                len: total,
            },
            rest,
        )
    }
}

/// Returns true if a block with a valid checksum starts anywhere after the
/// first byte of `bytes`.
fn intact_block_after(bytes: &[u8]) -> bool {
    (1..bytes.len()).any(|start| {
        bytes[start] == BLOCK_START
            && matches!(FrameParse::parse_front(&bytes[start..]), FrameParse::Complete(..))
    })
}

/// Returns the length of the longest prefix of `bytes` made of whole blocks.
///
/// Damaged blocks count as whole; parsing stops at a truncated or unreadable
/// tail.
#[must_use]
pub fn complete_prefix_len(bytes: &[u8]) -> usize {
    let mut offset = 0;
    loop {
        match FrameParse::parse(&bytes[offset..]) {
            FrameParse::Complete(frame, _) => offset += frame.len,
            FrameParse::Damaged { rest, .. } => offset = bytes.len() - rest.len(),
            FrameParse::End | FrameParse::Truncated | FrameParse::Invalid(_) => return offset,
        }
    }
}

/// An instantiated AEAD cipher.
enum BlockCipher {
    Aes128(Box<Aes128Gcm>),
    Aes256(Box<Aes256Gcm>),
    ChaCha(Box<ChaCha20Poly1305>),
}

impl BlockCipher {
    fn new(cipher: &Cipher) -> Result<Option<(Self, [u8; NONCE_SIZE])>> {
        Ok(match cipher {
            Cipher::None => None,
            Cipher::Aes128Gcm { key, nonce } => Some((
                Self::Aes128(Box::new(
                    Aes128Gcm::new_from_slice(key.as_bytes()).map_err(invalid_key)?,
                )),
                *nonce,
            )),
            Cipher::Aes256Gcm { key, nonce } => Some((
                Self::Aes256(Box::new(
                    Aes256Gcm::new_from_slice(key.as_bytes()).map_err(invalid_key)?,
                )),
                *nonce,
            )),
            Cipher::ChaCha20Poly1305 { key, nonce } => Some((
                Self::ChaCha(Box::new(
                    ChaCha20Poly1305::new_from_slice(key.as_bytes()).map_err(invalid_key)?,
                )),
                *nonce,
            )),
        })
    }

    fn encrypt(&self, nonce: &[u8; NONCE_SIZE], payload: Payload<'_, '_>) -> Result<Vec<u8>> {
        let result = match self {
            Self::Aes128(c) => c.encrypt(aes_gcm::Nonce::from_slice(nonce), payload),
            Self::Aes256(c) => c.encrypt(aes_gcm::Nonce::from_slice(nonce), payload),
            Self::ChaCha(c) => c.encrypt(chacha20poly1305::Nonce::from_slice(nonce), payload),
        };
        result.map_err(|e| SpoolError::Cipher(format!("encryption failed: {e}")))
    }

    fn decrypt(&self, nonce: &[u8; NONCE_SIZE], payload: Payload<'_, '_>) -> Result<Vec<u8>> {
        let result = match self {
            Self::Aes128(c) => c.decrypt(aes_gcm::Nonce::from_slice(nonce), payload),
            Self::Aes256(c) => c.decrypt(aes_gcm::Nonce::from_slice(nonce), payload),
            Self::ChaCha(c) => c.decrypt(chacha20poly1305::Nonce::from_slice(nonce), payload),
        };
        result.map_err(|_| {
            SpoolError::Cipher("decryption failed: wrong key/nonce or tampered block".to_string())
        })
    }
}

/// Encoder/decoder for one logger's blocks.
///
/// Built once per logger; the cipher parameters are validated here rather
/// than on every append.
pub struct RecordCodec {
    compression: Compression,
    kind: CipherKind,
    cipher: Option<(BlockCipher, [u8; NONCE_SIZE])>,
}

impl std::fmt::Debug for RecordCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordCodec")
            .field("compression", &self.compression)
            .field("cipher", &self.kind)
            .finish_non_exhaustive()
    }
}

impl RecordCodec {
    /// Creates a codec for the given compression and cipher.
    ///
    /// # Errors
    ///
    /// Returns [`SpoolError::InvalidConfig`] if the cipher key is unusable.
    pub fn new(compression: Compression, cipher: &Cipher) -> Result<Self> {
        Ok(Self {
            compression,
            kind: cipher.kind(),
            cipher: BlockCipher::new(cipher)?,
        })
    }

    /// Creates the codec described by a logger's configuration.
    ///
    /// # Errors
    ///
    /// Returns [`SpoolError::InvalidConfig`] if the cipher key is unusable.
    pub fn from_config(config: &LogConfig) -> Result<Self> {
        Self::new(config.compression, &config.cipher)
    }

    /// Encodes one record as a framed block.
    ///
    /// # Errors
    ///
    /// Returns [`SpoolError::Codec`] if serialization or compression fails and
    /// [`SpoolError::Cipher`] if encryption fails.
    pub fn encode(&self, record: &LogRecord) -> Result<Vec<u8>> {
        let serialized = postcard::to_allocvec(record)
            .map_err(|e| SpoolError::Codec(format!("serialize record: {e}")))?;

        let compressed = match self.compression {
            Compression::None => serialized,
            Compression::Zlib(level) => compress(&serialized, level)?,
        };

        let header = [FORMAT_VERSION, self.compression.tag(), self.kind.tag()];
        let (salt, payload) = match &self.cipher {
            None => (None, compressed),
            Some((cipher, base_nonce)) => {
                let mut salt = [0u8; NONCE_SIZE];
                rand::thread_rng().fill_bytes(&mut salt);
                let nonce = mix_nonce(base_nonce, &salt);
                let sealed = cipher.encrypt(
                    &nonce,
                    Payload {
                        msg: &compressed,
                        aad: &header,
                    },
                )?;
                (Some(salt), sealed)
            }
        };

        let payload_len = u32::try_from(payload.len())
            .ok()
            .filter(|len| *len as usize <= MAX_PAYLOAD_LEN)
            .ok_or_else(|| SpoolError::Codec(format!("record too large: {} bytes", payload.len())))?;

        let salt_len = salt.map_or(0, |s| s.len());
        let mut block = Vec::with_capacity(HEADER_LEN + salt_len + payload.len() + TRAILER_LEN);
        block.push(BLOCK_START);
        block.extend_from_slice(&header);
        block.extend_from_slice(&payload_len.to_be_bytes());
        if let Some(salt) = salt {
            block.extend_from_slice(&salt);
        }
        block.extend_from_slice(&payload);
        let crc = crc32fast::hash(&block[1..]);
        block.extend_from_slice(&crc.to_be_bytes());
        block.push(BLOCK_END);
        Ok(block)
    }

    /// Decodes the first block of `bytes`.
    ///
    /// Returns the record and the bytes after it, or `None` when `bytes` is
    /// empty or ends in a truncated block.
    ///
    /// # Errors
    ///
    /// Returns [`SpoolError::Cipher`] on key/nonce mismatch or failed
    /// authentication, and [`SpoolError::Codec`] on a damaged or undecodable block.
    pub fn decode<'a>(&self, bytes: &'a [u8]) -> Result<Option<(LogRecord, &'a [u8])>> {
        match FrameParse::parse(bytes) {
            FrameParse::End | FrameParse::Truncated => Ok(None),
            FrameParse::Complete(frame, rest) => Ok(Some((self.decode_frame(&frame)?, rest))),
            FrameParse::Damaged { reason, .. } | FrameParse::Invalid(reason) => {
                Err(SpoolError::Codec(reason))
            }
        }
    }

    /// Decodes the record carried by a parsed frame.
    ///
    /// # Errors
    ///
    /// See [`RecordCodec::decode`].
    pub fn decode_frame(&self, frame: &Frame<'_>) -> Result<LogRecord> {
        let block_kind = CipherKind::from_tag(frame.cipher)
            .map_err(|_| SpoolError::Cipher(format!("unknown block cipher {}", frame.cipher)))?;
        if block_kind != self.kind {
            return Err(SpoolError::Cipher(format!(
                "block is encrypted with {block_kind}, codec is configured for {}",
                self.kind
            )));
        }

        let decrypted = match (&self.cipher, frame.salt) {
            (None, _) => frame.payload.to_vec(),
            (Some((cipher, base_nonce)), Some(salt)) => {
                let nonce = mix_nonce(base_nonce, salt);
                cipher.decrypt(
                    &nonce,
                    Payload {
                        msg: frame.payload,
                        aad: &frame.associated_data(),
                    },
                )?
            }
            (Some(_), None) => {
                return Err(SpoolError::Cipher("encrypted block without salt".to_string()));
            }
        };

        let serialized = match frame.compression {
            0x00 => decrypted,
            0x01 => decompress(&decrypted)?,
            other => return Err(SpoolError::Codec(format!("unknown compression {other}"))),
        };

        postcard::from_bytes(&serialized)
            .map_err(|e| SpoolError::Codec(format!("deserialize record: {e}")))
    }

    /// Returns the configured cipher kind.
    #[must_use]
    pub const fn cipher_kind(&self) -> CipherKind {
        self.kind
    }
}

fn invalid_key(e: impl std::fmt::Display) -> SpoolError {
    SpoolError::InvalidConfig(format!("invalid cipher key: {e}"))
}

fn mix_nonce(base: &[u8; NONCE_SIZE], salt: &[u8]) -> [u8; NONCE_SIZE] {
    let mut nonce = *base;
    for (byte, s) in nonce.iter_mut().zip(salt) {
        *byte ^= s;
    }
    nonce
}

fn compress(data: &[u8], level: CompressLevel) -> Result<Vec<u8>> {
    let level = match level {
        CompressLevel::Fast => flate2::Compression::fast(),
        CompressLevel::Default => flate2::Compression::default(),
        CompressLevel::Best => flate2::Compression::best(),
    };
    let mut encoder = flate2::write::ZlibEncoder::new(Vec::new(), level);
    encoder
        .write_all(data)
        .and_then(|()| encoder.finish())
        .map_err(|e| SpoolError::Codec(format!("compress: {e}")))
}

fn decompress(data: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = flate2::read::ZlibDecoder::new(data);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| SpoolError::Codec(format!("corrupt compressed stream: {e}")))?;
    Ok(out)
}
