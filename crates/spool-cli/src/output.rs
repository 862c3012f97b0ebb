//! Output formatting for CLI commands.
//!
//! Supports table (human-readable) and JSON output formats.

use std::io::Write;
use std::path::PathBuf;

use chrono::NaiveDate;
use serde::Serialize;
use spool_core::{FileState, LogRecord};

use crate::cli::Format;
use crate::error::CliError;

/// Output formatter that handles both table and JSON output.
#[derive(Debug, Clone)]
pub struct OutputFormat {
    format: Format,
}

impl OutputFormat {
    /// Create a new output formatter.
    #[must_use]
    pub const fn new(format: Format) -> Self {
        Self { format }
    }

    /// Get the current format.
    #[must_use]
    pub const fn format(&self) -> Format {
        self.format
    }

    /// Check if JSON format is selected.
    #[must_use]
    pub const fn is_json(&self) -> bool {
        matches!(self.format, Format::Json)
    }

    /// Write a serializable value to the output.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub fn write<W, T>(&self, writer: &mut W, value: &T) -> Result<(), CliError>
    where
        W: Write,
        T: Serialize + TableDisplay,
    {
        match self.format {
            Format::Json => {
                serde_json::to_writer_pretty(&mut *writer, value)
                    .map_err(|e| CliError::Format(format!("JSON serialization failed: {e}")))?;
                writeln!(writer)?;
            }
            Format::Table => {
                value.write_table(writer)?;
            }
        }
        Ok(())
    }

    /// Write a serializable value to a string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_string<T>(&self, value: &T) -> Result<String, CliError>
    where
        T: Serialize + TableDisplay,
    {
        let mut buf = Vec::new();
        self.write(&mut buf, value)?;
        String::from_utf8(buf).map_err(|e| CliError::Format(format!("UTF-8 error: {e}")))
    }
}

impl Default for OutputFormat {
    fn default() -> Self {
        Self::new(Format::Table)
    }
}

/// Trait for types that can be displayed as a table.
pub trait TableDisplay {
    /// Write the value as a human-readable table.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError>;
}

/// Records decoded from one log file.
#[derive(Debug, Clone, Serialize)]
pub struct DecodedFile {
    /// Source file.
    pub file: PathBuf,
    /// Records in file order.
    pub records: Vec<LogRecord>,
    /// Blocks skipped as damaged.
    pub damaged_blocks: usize,
    /// Whether the file ended in a partial block.
    pub truncated_tail: bool,
}

impl TableDisplay for DecodedFile {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        for record in &self.records {
            writeln!(writer, "{record}")?;
        }
        if self.damaged_blocks > 0 || self.truncated_tail {
            writeln!(writer)?;
            writeln!(
                writer,
                "# {} damaged block(s){}",
                self.damaged_blocks,
                if self.truncated_tail { ", truncated tail" } else { "" }
            )?;
        }
        Ok(())
    }
}

/// One file in a listing.
#[derive(Debug, Clone, Serialize)]
pub struct FileEntry {
    /// Absolute path.
    pub path: PathBuf,
    /// Sequence number within the date.
    pub sequence: u32,
    /// Size in bytes.
    pub size: u64,
    /// Active or sealed.
    pub state: FileState,
}

/// A logger's files for one date.
#[derive(Debug, Clone, Serialize)]
pub struct FileList {
    /// Logger name.
    pub name: String,
    /// Queried date.
    pub date: NaiveDate,
    /// Files ordered by sequence.
    pub files: Vec<FileEntry>,
}

impl TableDisplay for FileList {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        if self.files.is_empty() {
            writeln!(writer, "No files for `{}` on {}", self.name, self.date)?;
            return Ok(());
        }

        writeln!(writer, "{:>4}  {:>10}  PATH", "SEQ", "SIZE")?;
        for file in &self.files {
            writeln!(
                writer,
                "{:>4}  {:>10}  {}",
                file.sequence,
                file.size,
                file.path.display()
            )?;
        }
        Ok(())
    }
}

/// Result of a retention sweep.
#[derive(Debug, Clone, Serialize)]
pub struct TrimSummary {
    /// Logger name.
    pub name: String,
    /// Retention window in days.
    pub keep_days: u32,
    /// Whether files were only listed.
    pub dry_run: bool,
    /// Files deleted, or that would be deleted.
    pub deleted: Vec<PathBuf>,
    /// Files that could not be deleted, with the reason.
    pub failed: Vec<(PathBuf, String)>,
}

impl TableDisplay for TrimSummary {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        let verb = if self.dry_run { "Would delete" } else { "Deleted" };
        writeln!(
            writer,
            "{verb} {} file(s) of `{}` older than {} day(s)",
            self.deleted.len(),
            self.name,
            self.keep_days
        )?;
        for path in &self.deleted {
            writeln!(writer, "  {}", path.display())?;
        }
        for (path, reason) in &self.failed {
            writeln!(writer, "  FAILED {}: {reason}", path.display())?;
        }
        Ok(())
    }
}
