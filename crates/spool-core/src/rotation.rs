//! Rotation policy and file naming.
//!
//! Files are named `<name>_<YYYY_MM_DD>.<seq>.log`. The date in the name is
//! authoritative for rotation, retention and queries; filesystem timestamps
//! are never consulted.

use std::fs;
use std::path::Path;

use chrono::{DateTime, FixedOffset, NaiveDate};

use crate::error::{Result, SpoolError};
use crate::types::{FileState, LogFile};

/// Extension of every log file.
pub const FILE_EXTENSION: &str = "log";

const DATE_FORMAT: &str = "%Y_%m_%d";

/// What rotation needs to know about the active file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileMeta {
    /// Calendar date encoded in the file name
    pub date: NaiveDate,
    /// Sequence number within that date
    pub sequence: u32,
    /// Bytes written so far, including buffered bytes
    pub size: u64,
}

/// Size- and date-based rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationPolicy {
    /// Size ceiling of a single file in bytes.
    pub max_file_size: u64,
}

impl RotationPolicy {
    /// Creates a policy with the given size ceiling.
    #[must_use]
    pub const fn new(max_file_size: u64) -> Self {
        Self { max_file_size }
    }

    /// Returns true if the active file must be sealed before the next append.
    #[must_use]
    pub fn should_rotate(&self, meta: &FileMeta, now: DateTime<FixedOffset>) -> bool {
        self.should_rotate_for(meta, now, 0)
    }

    /// Like [`RotationPolicy::should_rotate`], but also rotates when an
    /// incoming block of `incoming` bytes would push a non-empty file past
    /// the ceiling.
    #[must_use]
    pub fn should_rotate_for(
        &self,
        meta: &FileMeta,
        now: DateTime<FixedOffset>,
        incoming: u64,
    ) -> bool {
        if meta.date != now.date_naive() {
            return true;
        }
        if meta.size >= self.max_file_size {
            return true;
        }
        meta.size > 0 && meta.size + incoming > self.max_file_size
    }

    /// Largest record content accepted in one piece; longer content is split.
    #[must_use]
    pub fn max_record_content(&self) -> usize {
        usize::try_from(self.max_file_size / 2).unwrap_or(usize::MAX)
    }
}

/// Formats a file name for the given logger, date and sequence.
#[must_use]
pub fn file_name(logger_name: &str, date: NaiveDate, sequence: u32) -> String {
    format!(
        "{logger_name}_{}.{sequence}.{FILE_EXTENSION}",
        date.format(DATE_FORMAT)
    )
}

/// Derives the name of the next file to open.
///
/// The sequence continues from `prior` when it is on the same date as `now`
/// and restarts at 0 on a new date.
#[must_use]
pub fn next_file_name(
    logger_name: &str,
    now: DateTime<FixedOffset>,
    prior: Option<(NaiveDate, u32)>,
) -> (String, NaiveDate, u32) {
    let date = now.date_naive();
    let sequence = match prior {
        Some((prior_date, seq)) if prior_date == date => seq.saturating_add(1),
        _ => 0,
    };
    (file_name(logger_name, date, sequence), date, sequence)
}

/// Parses a file name produced by [`file_name`] for `logger_name`.
///
/// Returns `None` for files that belong to other loggers or are not log files.
#[must_use]
pub fn parse_file_name(logger_name: &str, file_name: &str) -> Option<(NaiveDate, u32)> {
    let rest = file_name.strip_prefix(logger_name)?.strip_prefix('_')?;
    let rest = rest.strip_suffix(FILE_EXTENSION)?.strip_suffix('.')?;
    let (date, sequence) = rest.split_once('.')?;
    // Guard against `app` matching `app_2024_01_01` style names of `app_x` loggers.
    if date.len() != 10 {
        return None;
    }
    let date = NaiveDate::parse_from_str(date, DATE_FORMAT).ok()?;
    if sequence.is_empty() || !sequence.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let sequence = sequence.parse().ok()?;
    Some((date, sequence))
}

/// Parses a query date given as `YYYY_MM_DD` or `YYYY-MM-DD`.
///
/// # Errors
///
/// Returns [`SpoolError::InvalidDate`] if the string is not a valid date.
pub fn parse_query_date(date: &str) -> Result<NaiveDate> {
    let trimmed = date.trim();
    NaiveDate::parse_from_str(trimmed, DATE_FORMAT)
        .or_else(|_| NaiveDate::parse_from_str(trimmed, "%Y-%m-%d"))
        .map_err(|_| SpoolError::InvalidDate(date.to_string()))
}

/// Formats a date the way file names carry it.
#[must_use]
pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// Lists a logger's files in `dir`, ordered by date then sequence.
///
/// Every file is reported as [`FileState::Sealed`]; the caller marks the
/// active one. A missing directory yields an empty list.
///
/// # Errors
///
/// Returns an error if the directory exists but cannot be read.
pub fn list_log_files(dir: &Path, logger_name: &str) -> Result<Vec<LogFile>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        let Some((date, sequence)) = parse_file_name(logger_name, name) else {
            continue;
        };
        if !entry.file_type().is_ok_and(|t| t.is_file()) {
            continue;
        }
        files.push(LogFile {
            path: entry.path(),
            date,
            sequence,
            state: FileState::Sealed,
        });
    }

    files.sort_by_key(|f| (f.date, f.sequence));
    Ok(files)
}
