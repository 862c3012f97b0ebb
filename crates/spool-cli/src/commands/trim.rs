//! Trim command implementation.
//!
//! Applies the same retention rule as a running engine, without one. The
//! directory is assumed idle: no file is treated as active.

use std::io::Write;

use chrono::{Local, NaiveDate};
use spool_core::config::validate_name;
use spool_core::parse_query_date;
use spool_core::rotation::list_log_files;
use spool_core::trim::{is_expired, sweep_directory};
use tracing::info;

use crate::cli::TrimArgs;
use crate::error::CliError;
use crate::output::{OutputFormat, TrimSummary};

/// Command for deleting expired log files.
#[derive(Debug, Default)]
pub struct TrimCommand;

impl TrimCommand {
    /// Create a new trim command.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Execute the trim command.
    ///
    /// # Errors
    ///
    /// Returns an error if the arguments are invalid or the directory cannot
    /// be listed. Per-file delete failures are reported in the summary.
    pub fn execute<W: Write>(
        &self,
        out: &mut W,
        format: &OutputFormat,
        args: &TrimArgs,
    ) -> Result<(), CliError> {
        validate_name(&args.name)?;
        let today = match &args.today {
            Some(date) => parse_query_date(date)?,
            None => Local::now().date_naive(),
        };

        let summary = if args.dry_run {
            let deleted = expired_files(args, today)?;
            TrimSummary {
                name: args.name.clone(),
                keep_days: args.keep_days,
                dry_run: true,
                deleted,
                failed: Vec::new(),
            }
        } else {
            let report = sweep_directory(&args.dir, &args.name, args.keep_days, today, None)?;
            info!(
                name = %args.name,
                deleted = report.deleted.len(),
                failed = report.failed.len(),
                "trim complete"
            );
            TrimSummary {
                name: args.name.clone(),
                keep_days: args.keep_days,
                dry_run: false,
                deleted: report.deleted,
                failed: report.failed,
            }
        };

        format.write(out, &summary)
    }
}

fn expired_files(args: &TrimArgs, today: NaiveDate) -> Result<Vec<std::path::PathBuf>, CliError> {
    Ok(list_log_files(&args.dir, &args.name)?
        .into_iter()
        .filter(|file| is_expired(file.date, today, args.keep_days))
        .map(|file| file.path)
        .collect())
}
