//! Reading log files back into records.

use std::fs;
use std::path::Path;

use tracing::{debug, warn};

use crate::codec::{FrameParse, RecordCodec};
use crate::error::{Result, SpoolError};
use crate::types::LogRecord;

/// Records recovered from one file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileContents {
    /// Decoded records in file order
    pub records: Vec<LogRecord>,
    /// Blocks skipped because they failed checksum, authentication or decoding
    pub damaged_blocks: usize,
    /// Whether the file ended in a partial block
    pub truncated_tail: bool,
}

impl FileContents {
    /// Returns true if every block decoded cleanly.
    #[must_use]
    pub const fn is_clean(&self) -> bool {
        self.damaged_blocks == 0 && !self.truncated_tail
    }
}

/// Reads and decodes a whole log file.
///
/// # Errors
///
/// Returns an error if the file cannot be read, or [`SpoolError::Cipher`] if
/// no block could be decrypted, which means the key or nonce is wrong.
pub fn read_log_file(path: &Path, codec: &RecordCodec) -> Result<FileContents> {
    let bytes = fs::read(path)?;
    let contents = decode_blocks(&bytes, codec)?;
    debug!(
        path = %path.display(),
        records = contents.records.len(),
        damaged = contents.damaged_blocks,
        truncated = contents.truncated_tail,
        "read log file"
    );
    Ok(contents)
}

/// Decodes every block in `bytes`.
///
/// Damaged blocks are skipped; a trailing partial block ends the read.
/// Unparseable bytes between blocks are skipped up to the next start marker.
///
/// # Errors
///
/// Returns [`SpoolError::Cipher`] if there were encrypted blocks and none of
/// them could be decrypted.
pub fn decode_blocks(bytes: &[u8], codec: &RecordCodec) -> Result<FileContents> {
    let mut contents = FileContents::default();
    let mut cipher_failures = 0usize;
    let mut last_cipher_error = None;
    let mut rest = bytes;

    loop {
        match FrameParse::parse(rest) {
            FrameParse::End => break,
            FrameParse::Truncated => {
                contents.truncated_tail = true;
                break;
            }
            FrameParse::Complete(frame, next) => {
                match codec.decode_frame(&frame) {
                    Ok(record) => contents.records.push(record),
                    Err(e) => {
                        warn!(error = %e, "skipping undecodable block");
                        contents.damaged_blocks += 1;
                        if let SpoolError::Cipher(_) = e {
                            cipher_failures += 1;
                            last_cipher_error = Some(e);
                        }
                    }
                }
                rest = next;
            }
            FrameParse::Damaged { rest: next, reason } => {
                warn!(%reason, "skipping damaged block");
                contents.damaged_blocks += 1;
                rest = next;
            }
            FrameParse::Invalid(reason) => {
                warn!(%reason, "resynchronizing after invalid bytes");
                contents.damaged_blocks += 1;
                rest = resync(rest);
            }
        }
    }

    if contents.records.is_empty() && cipher_failures > 0 {
        if let Some(e) = last_cipher_error {
            return Err(e);
        }
    }
    Ok(contents)
}

/// Skips to the next possible block start after the current position.
fn resync(bytes: &[u8]) -> &[u8] {
    bytes
        .iter()
        .skip(1)
        .position(|b| *b == crate::codec::BLOCK_START)
        .map_or(&[], |pos| &bytes[pos + 1..])
}
