//! Retention: deleting files older than a logger's window.
//!
//! File age is computed from the date encoded in the file name. A sweep is
//! best-effort: a file that cannot be deleted is reported and the sweep moves
//! on. Files that are already gone count as neither deleted nor failed, so
//! repeated sweeps are idempotent.

use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::NaiveDate;
use tokio::runtime::Handle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::diagnostics::{Diagnostics, Operation};
use crate::error::Result;
use crate::registry::LoggerRegistry;
use crate::rotation;

/// Outcome of a trim sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrimReport {
    /// Files that were deleted
    pub deleted: Vec<PathBuf>,
    /// Files that could not be deleted, with the reason
    pub failed: Vec<(PathBuf, String)>,
}

impl TrimReport {
    /// Folds another report into this one.
    pub fn merge(&mut self, other: Self) {
        self.deleted.extend(other.deleted);
        self.failed.extend(other.failed);
    }

    /// Returns true if nothing failed.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Returns true if a file dated `date` is past a `keep_days` window on `today`.
#[must_use]
pub fn is_expired(date: NaiveDate, today: NaiveDate, keep_days: u32) -> bool {
    (today - date).num_days() > i64::from(keep_days)
}

/// Deletes a logger's expired files in `dir`.
///
/// `skip` names a file that must survive regardless of its date (the active
/// file).
///
/// # Errors
///
/// Returns an error only if the directory cannot be listed.
pub fn sweep_directory(
    dir: &Path,
    logger_name: &str,
    keep_days: u32,
    today: NaiveDate,
    skip: Option<&Path>,
) -> Result<TrimReport> {
    sweep_with(dir, logger_name, keep_days, today, skip, |path| fs::remove_file(path))
}

fn sweep_with(
    dir: &Path,
    logger_name: &str,
    keep_days: u32,
    today: NaiveDate,
    skip: Option<&Path>,
    remove: impl Fn(&Path) -> io::Result<()>,
) -> Result<TrimReport> {
    let mut report = TrimReport::default();

    for file in rotation::list_log_files(dir, logger_name)? {
        if skip == Some(file.path.as_path()) || !is_expired(file.date, today, keep_days) {
            continue;
        }
        match remove(&file.path) {
            Ok(()) => {
                debug!(path = %file.path.display(), date = %file.date, "deleted expired log file");
                report.deleted.push(file.path);
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                warn!(path = %file.path.display(), error = %e, "failed to delete log file");
                report.failed.push((file.path, e.to_string()));
            }
        }
    }

    Ok(report)
}

/// Trims every registered logger.
///
/// Failures are recorded in `diagnostics` and never stop the sweep.
pub fn trim_all(
    registry: &LoggerRegistry,
    today: NaiveDate,
    diagnostics: &Diagnostics,
) -> TrimReport {
    let mut total = TrimReport::default();

    registry.for_each(|logger| match logger.trim(today) {
        Ok(report) => {
            record_failures(diagnostics, logger.name(), &report);
            total.merge(report);
        }
        Err(e) => diagnostics.record(Operation::Trim, Some(logger.name()), &e),
    });

    debug!(
        %today,
        deleted = total.deleted.len(),
        failed = total.failed.len(),
        "trim sweep finished"
    );
    total
}

fn record_failures(diagnostics: &Diagnostics, logger_name: &str, report: &TrimReport) {
    for (path, reason) in &report.failed {
        diagnostics.record(
            Operation::Trim,
            Some(logger_name),
            &format!("{}: {reason}", path.display()),
        );
    }
}

/// Handle to the periodic trim task.
#[derive(Debug, Clone)]
pub struct TrimScheduler {
    running: Arc<AtomicBool>,
}

impl TrimScheduler {
    /// Returns true while the task is scheduled.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Stops the task after its current sweep.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

/// Starts a task on `runtime` that runs [`trim_all`] every `period`.
///
/// The first sweep happens one period after start. Sweeps run on the
/// blocking pool since they touch the filesystem.
pub fn start_trim_task(
    runtime: &Handle,
    period: Duration,
    registry: Arc<LoggerRegistry>,
    clock: Arc<dyn Clock>,
    diagnostics: Arc<Diagnostics>,
) -> TrimScheduler {
    let scheduler = TrimScheduler {
        running: Arc::new(AtomicBool::new(true)),
    };
    let running = Arc::clone(&scheduler.running);

    runtime.spawn(async move {
        let start = tokio::time::Instant::now() + period;
        let mut timer = tokio::time::interval_at(start, period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while running.load(Ordering::SeqCst) {
            timer.tick().await;
            if !running.load(Ordering::SeqCst) {
                break;
            }

            let registry = Arc::clone(&registry);
            let clock = Arc::clone(&clock);
            let diagnostics = Arc::clone(&diagnostics);
            let sweep = tokio::task::spawn_blocking(move || {
                trim_all(&registry, clock.today(), &diagnostics);
            });
            if sweep.await.is_err() {
                warn!("scheduled trim sweep panicked");
            }
        }
    });

    scheduler
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::{EngineConfig, LogConfig};
    use crate::types::LogLevel;
    use test_case::test_case;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, d).expect("valid date")
    }

    #[test_case(1, 10, 7, true ; "older than window")]
    #[test_case(3, 10, 7, false ; "exactly at window")]
    #[test_case(10, 10, 0, false ; "today with zero days")]
    #[test_case(9, 10, 0, true ; "yesterday with zero days")]
    #[test_case(12, 10, 1, false ; "future date")]
    fn expiry(date: u32, today: u32, keep_days: u32, expired: bool) {
        assert_eq!(is_expired(day(date), day(today), keep_days), expired);
    }

    #[test]
    fn sweep_deletes_only_expired() {
        let dir = tempfile::tempdir().expect("tempdir");
        for name in [
            "app_2024_06_01.0.log",
            "app_2024_06_01.1.log",
            "app_2024_06_08.0.log",
            "other_2024_06_01.0.log",
        ] {
            fs::write(dir.path().join(name), b"x").expect("write");
        }

        let report = sweep_directory(dir.path(), "app", 2, day(8), None).expect("sweep");
        assert_eq!(report.deleted.len(), 2);
        assert!(report.is_clean());
        assert!(dir.path().join("app_2024_06_08.0.log").exists());
        assert!(dir.path().join("other_2024_06_01.0.log").exists());

        let again = sweep_directory(dir.path(), "app", 2, day(8), None).expect("sweep");
        assert_eq!(again, TrimReport::default());
    }

    #[test]
    fn sweep_skips_active_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let active = dir.path().join("app_2024_06_01.0.log");
        fs::write(&active, b"x").expect("write");

        let report =
            sweep_directory(dir.path(), "app", 0, day(9), Some(&active)).expect("sweep");
        assert!(report.deleted.is_empty());
        assert!(active.exists());
    }

    #[test]
    fn failed_delete_is_reported_and_sweep_continues() {
        let dir = tempfile::tempdir().expect("tempdir");
        for name in [
            "app_2024_06_01.0.log",
            "app_2024_06_02.0.log",
            "app_2024_06_03.0.log",
        ] {
            fs::write(dir.path().join(name), b"x").expect("write");
        }
        let locked = dir.path().join("app_2024_06_02.0.log");

        let report = sweep_with(dir.path(), "app", 1, day(8), None, |path| {
            if path == locked {
                Err(io::Error::new(ErrorKind::PermissionDenied, "read-only file"))
            } else {
                fs::remove_file(path)
            }
        })
        .expect("sweep");

        assert_eq!(report.deleted.len(), 2);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, locked);
        assert!(!report.is_clean());
        assert!(locked.exists());
        assert!(!dir.path().join("app_2024_06_03.0.log").exists());

        let diagnostics = Diagnostics::new(4);
        record_failures(&diagnostics, "app", &report);
        let last = diagnostics.last().expect("recorded");
        assert_eq!(last.operation, Operation::Trim);
        assert_eq!(last.log_name.as_deref(), Some("app"));
        assert!(last.message.contains("app_2024_06_02.0.log"));
    }

    #[test]
    fn trim_all_visits_every_logger() {
        let dir = tempfile::tempdir().expect("tempdir");
        let clock = Arc::new(ManualClock::at_noon(day(1)));
        let registry = LoggerRegistry::new();
        let diagnostics = Diagnostics::new(16);

        for name in ["a", "b"] {
            let logger = registry
                .create(
                    LogConfig::new(name, dir.path()).with_keep_days(1),
                    &EngineConfig::default(),
                    clock.clone(),
                )
                .expect("create");
            logger.append(LogLevel::Info, "t", "old").expect("append");
        }

        let report = trim_all(&registry, day(1), &diagnostics);
        assert!(report.deleted.is_empty());

        let report = trim_all(&registry, day(3), &diagnostics);
        assert_eq!(report.deleted.len(), 2);
        assert_eq!(diagnostics.error_count(), 0);

        let report = trim_all(&registry, day(3), &diagnostics);
        assert_eq!(report, TrimReport::default());
    }

    #[test]
    fn scheduler_sweeps_periodically() {
        let dir = tempfile::tempdir().expect("tempdir");
        let clock = Arc::new(ManualClock::at_noon(day(1)));
        let registry = Arc::new(LoggerRegistry::new());
        let diagnostics = Arc::new(Diagnostics::new(16));

        let logger = registry
            .create(
                LogConfig::new("app", dir.path()).with_keep_days(1),
                &EngineConfig::default(),
                clock.clone(),
            )
            .expect("create");
        logger.append(LogLevel::Info, "t", "old").expect("append");
        logger.flush().expect("flush");
        clock.set(
            day(5)
                .and_hms_opt(12, 0, 0)
                .expect("valid time")
                .and_utc()
                .fixed_offset(),
        );

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_time()
            .build()
            .expect("runtime");
        let scheduler = start_trim_task(
            runtime.handle(),
            Duration::from_millis(20),
            Arc::clone(&registry),
            clock,
            diagnostics,
        );

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while !logger.list_files().expect("list").is_empty() {
            assert!(std::time::Instant::now() < deadline, "trim task never ran");
            std::thread::sleep(Duration::from_millis(10));
        }

        assert!(scheduler.is_running());
        scheduler.stop();
        assert!(!scheduler.is_running());
    }
}
