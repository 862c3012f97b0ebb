//! Staging area for encoded blocks that are not yet in a log file.
//!
//! A [`StagingBuffer`] is backed by a memory-mapped `<name>.buffer` file next
//! to the logger's files. Bytes pushed into it live in the page cache, so
//! they survive the process dying before a flush and are restored into their
//! log file by the next [`Logger::open`](crate::Logger::open). If the file
//! cannot be mapped the buffer falls back to plain memory.
//!
//! The staging file starts with a fixed header:
//!
//! ```text
//! magic "SPLB" | len u32 | date i32 (days from CE) | sequence u32 | offset u64
//! ```
//!
//! followed by `len` staged bytes destined for the log file with that date
//! and sequence, starting at byte `offset`.

use std::fs::{self, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{Datelike, NaiveDate};
use memmap2::{MmapMut, MmapOptions};
use tracing::warn;

use crate::error::Result;

/// Size of the staging file header.
pub const HEADER_LEN: usize = 24;

const MAGIC: &[u8; 4] = b"SPLB";

/// Extension of a logger's staging file.
pub const BUFFER_EXTENSION: &str = "buffer";

/// Returns the staging file path for logger `name` in `dir`.
#[must_use]
pub fn buffer_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{name}.{BUFFER_EXTENSION}"))
}

/// Where staged bytes belong.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Target {
    /// Date of the destination file
    pub date: NaiveDate,
    /// Sequence of the destination file
    pub sequence: u32,
    /// Length of the destination file when staging started
    pub offset: u64,
}

/// Bytes left in a staging file by a logger that never flushed them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pending {
    /// Destination of the bytes
    pub target: Target,
    /// The staged blocks
    pub bytes: Vec<u8>,
}

/// Reads whatever a previous process left staged at `path`.
///
/// Returns `None` if the file is missing, empty, or does not carry a valid
/// header.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read.
pub fn read_pending(path: &Path) -> Result<Option<Pending>> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let Some((len, target)) = decode_header(&bytes) else {
        return Ok(None);
    };
    if len == 0 {
        return Ok(None);
    }
    let Some(staged) = bytes.get(HEADER_LEN..HEADER_LEN + len) else {
        warn!(path = %path.display(), len, "staging file shorter than its header claims");
        return Ok(None);
    };
    Ok(Some(Pending {
        target,
        bytes: staged.to_vec(),
    }))
}

enum Storage {
    Mapped(MmapMut),
    Memory(Vec<u8>),
}

/// Fixed-capacity buffer of blocks waiting to be written to a log file.
pub struct StagingBuffer {
    storage: Storage,
    capacity: usize,
    len: usize,
    target: Option<Target>,
}

impl std::fmt::Debug for StagingBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StagingBuffer")
            .field("mapped", &self.is_mapped())
            .field("capacity", &self.capacity)
            .field("len", &self.len)
            .field("target", &self.target)
            .finish()
    }
}

impl StagingBuffer {
    /// Maps `path` as an empty staging buffer holding up to `capacity` bytes.
    ///
    /// Any previous content of the file is discarded; call [`read_pending`]
    /// first. Falls back to an in-memory buffer if the file cannot be mapped.
    #[must_use]
    pub fn open(path: &Path, capacity: usize) -> Self {
        if capacity == 0 {
            return Self::in_memory(0);
        }
        match map_file(path, HEADER_LEN + capacity) {
            Ok(map) => {
                let mut buffer = Self {
                    storage: Storage::Mapped(map),
                    capacity,
                    len: 0,
                    target: None,
                };
                buffer.write_header();
                buffer
            }
            Err(e) => {
                warn!(
                    path = %path.display(),
                    error = %e,
                    "cannot map staging file, buffering in memory"
                );
                Self::in_memory(capacity)
            }
        }
    }

    /// Creates a buffer that lives only in memory.
    #[must_use]
    pub fn in_memory(capacity: usize) -> Self {
        Self {
            storage: Storage::Memory(vec![0; HEADER_LEN + capacity]),
            capacity,
            len: 0,
            target: None,
        }
    }

    /// Returns true if staged bytes are backed by a file.
    #[must_use]
    pub const fn is_mapped(&self) -> bool {
        matches!(self.storage, Storage::Mapped(_))
    }

    /// Number of staged bytes.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns true if nothing is staged.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns true if no more bytes fit.
    #[must_use]
    pub const fn is_full(&self) -> bool {
        self.len >= self.capacity
    }

    /// Destination of the staged bytes, if any are staged.
    #[must_use]
    pub const fn target(&self) -> Option<Target> {
        self.target
    }

    /// The staged bytes.
    #[must_use]
    pub fn contents(&self) -> &[u8] {
        &self.region()[HEADER_LEN..HEADER_LEN + self.len]
    }

    /// Stages `bytes` for `target`.
    ///
    /// The target is recorded only when the buffer is empty; later pushes
    /// extend the same run. Returns `false`, staging nothing, if `bytes` do
    /// not fit.
    pub fn push(&mut self, target: Target, bytes: &[u8]) -> bool {
        if bytes.len() > self.capacity - self.len {
            return false;
        }
        if self.target.is_none() {
            self.target = Some(target);
        }
        let start = HEADER_LEN + self.len;
        self.region_mut()[start..start + bytes.len()].copy_from_slice(bytes);
        // Length goes last so an interrupted copy is never read back.
        self.len += bytes.len();
        self.write_header();
        true
    }

    /// Drops every staged byte.
    pub fn clear(&mut self) {
        self.len = 0;
        self.target = None;
        self.write_header();
    }

    fn write_header(&mut self) {
        let header = encode_header(self.len, self.target);
        self.region_mut()[..HEADER_LEN].copy_from_slice(&header);
    }

    fn region(&self) -> &[u8] {
        match &self.storage {
            Storage::Mapped(map) => &map[..],
            Storage::Memory(vec) => &vec[..],
        }
    }

    fn region_mut(&mut self) -> &mut [u8] {
        match &mut self.storage {
            Storage::Mapped(map) => &mut map[..],
            Storage::Memory(vec) => &mut vec[..],
        }
    }
}

fn map_file(path: &Path, len: usize) -> std::io::Result<MmapMut> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)?;
    file.set_len(len as u64)?;

    // SAFETY: the staging file belongs to a single logger, which holds its
    // only mapping under the logger lock; nothing else resizes it while mapped.
    #[allow(unsafe_code)]
    let map = unsafe { MmapOptions::new().len(len).map_mut(&file)? };
    Ok(map)
}

fn encode_header(len: usize, target: Option<Target>) -> [u8; HEADER_LEN] {
    let mut header = [0u8; HEADER_LEN];
    header[..4].copy_from_slice(MAGIC);
    header[4..8].copy_from_slice(&(len as u32).to_be_bytes());
    if let Some(target) = target {
        header[8..12].copy_from_slice(&target.date.num_days_from_ce().to_be_bytes());
        header[12..16].copy_from_slice(&target.sequence.to_be_bytes());
        header[16..24].copy_from_slice(&target.offset.to_be_bytes());
    }
    header
}

fn decode_header(bytes: &[u8]) -> Option<(usize, Target)> {
    let header = bytes.get(..HEADER_LEN)?;
    if &header[..4] != MAGIC {
        return None;
    }
    let len = u32::from_be_bytes(header[4..8].try_into().ok()?) as usize;
    let days = i32::from_be_bytes(header[8..12].try_into().ok()?);
    let sequence = u32::from_be_bytes(header[12..16].try_into().ok()?);
    let offset = u64::from_be_bytes(header[16..24].try_into().ok()?);
    let date = NaiveDate::from_num_days_from_ce_opt(days)?;
    Some((
        len,
        Target {
            date,
            sequence,
            offset,
        },
    ))
}
