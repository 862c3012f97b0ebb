//! Files command implementation.

use std::fs;
use std::io::Write;

use spool_core::config::validate_name;
use spool_core::parse_query_date;
use spool_core::rotation::list_log_files;

use crate::cli::FilesArgs;
use crate::error::CliError;
use crate::output::{FileEntry, FileList, OutputFormat};

/// Command for listing a logger's files on one date.
#[derive(Debug, Default)]
pub struct FilesCommand;

impl FilesCommand {
    /// Create a new files command.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Execute the files command.
    ///
    /// # Errors
    ///
    /// Returns an error if the name or date is malformed, or the directory
    /// cannot be read.
    pub fn execute<W: Write>(
        &self,
        out: &mut W,
        format: &OutputFormat,
        args: &FilesArgs,
    ) -> Result<(), CliError> {
        validate_name(&args.name)?;
        let date = parse_query_date(&args.date)?;

        let mut files = Vec::new();
        for file in list_log_files(&args.dir, &args.name)? {
            if file.date != date {
                continue;
            }
            // A file removed between listing and stat is skipped.
            let Ok(meta) = fs::metadata(&file.path) else {
                continue;
            };
            files.push(FileEntry {
                path: file.path,
                sequence: file.sequence,
                size: meta.len(),
                state: file.state,
            });
        }

        let list = FileList {
            name: args.name.clone(),
            date,
            files,
        };
        format.write(out, &list)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Format;

    fn args(dir: &std::path::Path, date: &str) -> FilesArgs {
        FilesArgs {
            dir: dir.to_path_buf(),
            name: "app".into(),
            date: date.into(),
        }
    }

    #[test]
    fn lists_only_matching_date_in_sequence_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        for name in [
            "app_2024_06_01.1.log",
            "app_2024_06_01.0.log",
            "app_2024_06_02.0.log",
            "other_2024_06_01.0.log",
            "app_2024_06_01.notes",
        ] {
            fs::write(dir.path().join(name), b"x").expect("write");
        }

        let mut out = Vec::new();
        FilesCommand::new()
            .execute(&mut out, &OutputFormat::new(Format::Json), &args(dir.path(), "2024-06-01"))
            .expect("files");
        let value: serde_json::Value = serde_json::from_slice(&out).expect("json");
        let files = value["files"].as_array().expect("array");
        assert_eq!(files.len(), 2);
        assert_eq!(files[0]["sequence"], 0);
        assert_eq!(files[1]["sequence"], 1);
        assert_eq!(files[0]["size"], 1);
    }

    #[test]
    fn missing_directory_lists_nothing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut out = Vec::new();
        FilesCommand::new()
            .execute(
                &mut out,
                &OutputFormat::default(),
                &args(&dir.path().join("absent"), "2024_06_01"),
            )
            .expect("files");
        assert!(String::from_utf8_lossy(&out).starts_with("No files"));
    }

    #[test]
    fn malformed_date_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let result = FilesCommand::new().execute(
            &mut Vec::new(),
            &OutputFormat::default(),
            &args(dir.path(), "June 1st"),
        );
        assert!(matches!(result, Err(CliError::Spool(_))));
    }
}
