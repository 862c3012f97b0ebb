//! A single named log stream.
//!
//! A [`Logger`] owns its directory's files for its name: it encodes appended
//! records into blocks, stages them in a memory-mapped buffer, writes them
//! through to the active file, rotates on date change or size, and trims
//! expired files. Blocks still staged when the process dies are restored into
//! their file the next time the logger is opened.
//!
//! All mutation happens under one per-logger mutex, so appends to the same
//! logger are strictly ordered while different loggers proceed in parallel.

use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::buffer::{self, Pending, StagingBuffer, Target};
use crate::clock::Clock;
use crate::codec::{FrameParse, RecordCodec, complete_prefix_len};
use crate::config::{EngineConfig, LogConfig};
use crate::error::Result;
use crate::rotation::{self, FileMeta, RotationPolicy};
use crate::trim::{self, TrimReport};
use crate::types::{FileState, LogFile, LogLevel, LogRecord};

/// Destination of drained bytes that can cut a failed write back.
trait Sink: Write {
    fn truncate(&mut self, len: u64) -> io::Result<()>;
}

impl Sink for File {
    fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }
}

/// Appends `bytes` to a sink holding `written` bytes.
///
/// If the write fails part way the sink is cut back to `written`, so a retry
/// of the same bytes does not duplicate the prefix that made it.
fn append_all<S: Sink>(sink: &mut S, written: u64, bytes: &[u8]) -> io::Result<()> {
    if let Err(e) = sink.write_all(bytes) {
        if let Err(undo) = sink.truncate(written) {
            warn!(error = %undo, "failed to discard partially written bytes");
        }
        return Err(e);
    }
    Ok(())
}

/// The file currently appended to.
struct ActiveFile {
    path: PathBuf,
    meta: FileMeta,
    file: File,
    /// Bytes written through to `file`; `meta.size` also counts staged bytes.
    written: u64,
}

impl ActiveFile {
    /// Where bytes staged now will land.
    const fn target(&self) -> Target {
        Target {
            date: self.meta.date,
            sequence: self.meta.sequence,
            offset: self.written,
        }
    }

    /// Writes `bytes` through to the file.
    fn write_through(&mut self, bytes: &[u8]) -> Result<()> {
        append_all(&mut self.file, self.written, bytes)?;
        self.written += bytes.len() as u64;
        Ok(())
    }

    /// Moves staged bytes into the file.
    fn drain(&mut self, staging: &mut StagingBuffer) -> Result<()> {
        if !staging.is_empty() {
            self.write_through(staging.contents())?;
            staging.clear();
        }
        Ok(())
    }

    /// Drains staged bytes and waits until the file is durable.
    fn sync(&mut self, staging: &mut StagingBuffer) -> Result<()> {
        self.drain(staging)?;
        self.file.sync_data()?;
        Ok(())
    }
}

struct LoggerState {
    active: Option<ActiveFile>,
    /// A sealed file whose final write failed; retried before anything else.
    sealing: Option<ActiveFile>,
    /// Blocks not yet written; they belong to `sealing` if set, else `active`.
    staging: StagingBuffer,
    /// Date and sequence of the most recently sealed file.
    last_sealed: Option<(NaiveDate, u32)>,
    last_timestamp: Option<DateTime<Utc>>,
}

/// A named, independently configured log stream.
pub struct Logger {
    config: LogConfig,
    dir: PathBuf,
    codec: RecordCodec,
    policy: RotationPolicy,
    clock: Arc<dyn Clock>,
    state: Mutex<LoggerState>,
}

impl std::fmt::Debug for Logger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Logger")
            .field("name", &self.config.name)
            .field("dir", &self.dir)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl Logger {
    /// Opens a logger, creating its directory and resuming today's file if
    /// one exists.
    ///
    /// Blocks a previous process staged but never wrote are appended to their
    /// file first. A partial block at the end of today's newest file is then
    /// cut off and appending resumes after the last complete block.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the directory
    /// cannot be created or read.
    pub fn open(config: LogConfig, engine: &EngineConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;
        fs::create_dir_all(&config.dir)?;
        let dir = fs::canonicalize(&config.dir)?;
        let codec = RecordCodec::from_config(&config)?;

        let staging_path = buffer::buffer_path(&dir, &config.name);
        if let Some(pending) = buffer::read_pending(&staging_path)? {
            restore_pending(&dir, &config.name, &pending)?;
        }

        let mut state = LoggerState {
            active: None,
            sealing: None,
            staging: StagingBuffer::open(&staging_path, engine.buffer_capacity),
            last_sealed: None,
            last_timestamp: None,
        };

        let today = clock.today();
        let todays_newest = rotation::list_log_files(&dir, &config.name)?
            .into_iter()
            .rev()
            .find(|f| f.date == today);
        if let Some(file) = todays_newest {
            match recover(&file)? {
                Some(active) => state.active = Some(active),
                None => state.last_sealed = Some((file.date, file.sequence)),
            }
        }

        debug!(
            log_name = %config.name,
            dir = %dir.display(),
            resumed = state.active.is_some(),
            mapped = state.staging.is_mapped(),
            "logger opened"
        );

        Ok(Self {
            policy: RotationPolicy::new(engine.max_file_size),
            config,
            dir,
            codec,
            clock,
            state: Mutex::new(state),
        })
    }

    /// Returns the logger name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Returns the policy this logger was created with.
    #[must_use]
    pub const fn config(&self) -> &LogConfig {
        &self.config
    }

    /// Returns the canonical directory holding this logger's files.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the codec used for this logger's blocks.
    #[must_use]
    pub const fn codec(&self) -> &RecordCodec {
        &self.codec
    }

    /// Appends one record.
    ///
    /// Records below the configured minimum level are dropped and `Ok(false)`
    /// is returned. Content longer than half the file size ceiling is split
    /// into several records.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding, rotation or writing fails.
    pub fn append(&self, level: LogLevel, target: &str, content: &str) -> Result<bool> {
        if !level.is_at_least(self.config.min_level) {
            return Ok(false);
        }

        let mut state = self.state.lock();
        self.finish_sealing(&mut state)?;

        let now = self.clock.now();
        let utc = now.with_timezone(&Utc);
        let timestamp = match state.last_timestamp {
            Some(last) if last > utc => last,
            _ => utc,
        };
        state.last_timestamp = Some(timestamp);

        let record = LogRecord::new(level, target, content, timestamp);
        for piece in record.split_content(self.policy.max_record_content()) {
            let block = self.codec.encode(&piece)?;
            self.write_block(&mut state, &block, now)?;
        }
        Ok(true)
    }

    /// Forces buffered bytes to stable storage.
    ///
    /// # Errors
    ///
    /// Returns an error if writing or syncing fails; the bytes stay buffered
    /// so the flush can be retried.
    pub fn flush(&self) -> Result<()> {
        let mut state = self.state.lock();
        self.finish_sealing(&mut state)?;
        let LoggerState {
            active, staging, ..
        } = &mut *state;
        if let Some(active) = active {
            active.sync(staging)?;
        }
        Ok(())
    }

    /// Seals the active file, if any. The next append opens a new file.
    ///
    /// # Errors
    ///
    /// Returns an error if the final write of the sealed file fails; it is
    /// retried by the next flush or append.
    pub fn seal_and_rotate(&self) -> Result<()> {
        let mut state = self.state.lock();
        self.seal_locked(&mut state)
    }

    /// Lists this logger's files, marking the active one.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be read.
    pub fn list_files(&self) -> Result<Vec<LogFile>> {
        let state = self.state.lock();
        let mut files = rotation::list_log_files(&self.dir, &self.config.name)?;
        if let Some(active) = &state.active {
            for file in &mut files {
                if file.path == active.path {
                    file.state = FileState::Active;
                }
            }
        }
        Ok(files)
    }

    /// Returns the absolute paths of the files covering `date`, ordered by
    /// sequence.
    ///
    /// If the active file covers `date` it is flushed first, so every
    /// appended record is on disk when the paths are returned.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory is missing or unreadable, or the
    /// flush fails.
    pub fn files_for_date(&self, date: NaiveDate) -> Result<Vec<PathBuf>> {
        let mut state = self.state.lock();
        self.finish_sealing(&mut state)?;
        let LoggerState {
            active, staging, ..
        } = &mut *state;
        if let Some(active) = active.as_mut().filter(|a| a.meta.date == date) {
            active.sync(staging)?;
        }

        fs::metadata(&self.dir)?;
        let paths = rotation::list_log_files(&self.dir, &self.config.name)?
            .into_iter()
            .filter(|f| f.date == date)
            .map(|f| f.path)
            .collect();
        Ok(paths)
    }

    /// Deletes sealed files older than the retention window.
    ///
    /// An active file from an earlier date is sealed first so it becomes
    /// eligible. The active file of today is never deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if an idle file cannot be sealed or the directory
    /// cannot be listed. Individual deletion failures are collected in the
    /// report instead.
    pub fn trim(&self, today: NaiveDate) -> Result<TrimReport> {
        let mut state = self.state.lock();
        if state.active.as_ref().is_some_and(|a| a.meta.date != today) {
            self.seal_locked(&mut state)?;
        }

        let active = state.active.as_ref().map(|a| a.path.as_path());
        let report = trim::sweep_directory(
            &self.dir,
            &self.config.name,
            self.config.keep_days,
            today,
            active,
        )?;
        if !report.deleted.is_empty() {
            info!(
                log_name = %self.config.name,
                deleted = report.deleted.len(),
                "trimmed expired log files"
            );
        }
        Ok(report)
    }

    // ========== Internal Methods ==========

    fn write_block(
        &self,
        state: &mut LoggerState,
        block: &[u8],
        now: DateTime<FixedOffset>,
    ) -> Result<()> {
        let incoming = block.len() as u64;
        if state
            .active
            .as_ref()
            .is_some_and(|a| self.policy.should_rotate_for(&a.meta, now, incoming))
        {
            self.seal_locked(state)?;
        }

        if state.active.is_none() {
            state.active = Some(self.open_new_file(state.last_sealed, now)?);
        }
        let LoggerState {
            active: Some(active),
            staging,
            ..
        } = state
        else {
            return Ok(());
        };

        if !staging.push(active.target(), block) {
            active.drain(staging)?;
            if !staging.push(active.target(), block) {
                active.write_through(block)?;
            }
        }
        active.meta.size += incoming;
        if staging.is_full() {
            active.drain(staging)?;
        }
        Ok(())
    }

    fn seal_locked(&self, state: &mut LoggerState) -> Result<()> {
        let Some(mut active) = state.active.take() else {
            return Ok(());
        };
        state.last_sealed = Some((active.meta.date, active.meta.sequence));

        match active.sync(&mut state.staging) {
            Ok(()) => {
                debug!(
                    log_name = %self.config.name,
                    path = %active.path.display(),
                    size = active.meta.size,
                    "sealed log file"
                );
                Ok(())
            }
            Err(e) => {
                warn!(
                    log_name = %self.config.name,
                    path = %active.path.display(),
                    error = %e,
                    "failed to seal log file"
                );
                state.sealing = Some(active);
                Err(e)
            }
        }
    }

    fn finish_sealing(&self, state: &mut LoggerState) -> Result<()> {
        if let Some(sealing) = state.sealing.as_mut() {
            sealing.sync(&mut state.staging)?;
            debug!(
                log_name = %self.config.name,
                path = %sealing.path.display(),
                "completed deferred seal"
            );
            state.sealing = None;
        }
        Ok(())
    }

    fn open_new_file(
        &self,
        last_sealed: Option<(NaiveDate, u32)>,
        now: DateTime<FixedOffset>,
    ) -> Result<ActiveFile> {
        let (mut name, date, mut sequence) =
            rotation::next_file_name(&self.config.name, now, last_sealed);

        // Sealed files are never reopened; skip names already on disk.
        loop {
            let path = self.dir.join(&name);
            match OpenOptions::new().create_new(true).append(true).open(&path) {
                Ok(file) => {
                    debug!(
                        log_name = %self.config.name,
                        path = %path.display(),
                        "opened log file"
                    );
                    return Ok(ActiveFile {
                        path,
                        meta: FileMeta {
                            date,
                            sequence,
                            size: 0,
                        },
                        file,
                        written: 0,
                    });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists && sequence < u32::MAX => {
                    sequence += 1;
                    name = rotation::file_name(&self.config.name, date, sequence);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

impl Drop for Logger {
    fn drop(&mut self) {
        let LoggerState {
            active,
            sealing,
            staging,
            ..
        } = self.state.get_mut();
        for file in [sealing.as_mut(), active.as_mut()].into_iter().flatten() {
            if let Err(e) = file.sync(staging) {
                warn!(
                    log_name = %self.config.name,
                    path = %file.path.display(),
                    error = %e,
                    "failed to flush log file on close"
                );
            }
        }
    }
}

/// Reopens `file` for appending after its last complete block.
///
/// Returns `None` if the file holds unreadable bytes before its end, in which
/// case it is left untouched and treated as sealed.
fn recover(file: &LogFile) -> Result<Option<ActiveFile>> {
    let bytes = fs::read(&file.path)?;
    let valid = complete_prefix_len(&bytes);

    match FrameParse::parse(&bytes[valid..]) {
        FrameParse::End => {}
        FrameParse::Truncated => {
            warn!(
                path = %file.path.display(),
                kept = valid,
                dropped = bytes.len() - valid,
                "truncating partial block left by an interrupted write"
            );
        }
        _ => {
            warn!(
                path = %file.path.display(),
                "log file has unreadable content, starting a new file"
            );
            return Ok(None);
        }
    }

    let handle = OpenOptions::new().append(true).open(&file.path)?;
    if valid < bytes.len() {
        handle.set_len(valid as u64)?;
    }
    Ok(Some(ActiveFile {
        path: file.path.clone(),
        meta: FileMeta {
            date: file.date,
            sequence: file.sequence,
            size: valid as u64,
        },
        file: handle,
        written: valid as u64,
    }))
}

/// Appends blocks a previous process left staged to their destination file.
///
/// The staged run starts at `pending.target.offset`. A file already holding
/// the whole run is left alone; one holding only part of it is cut back to
/// the offset before the run is written again.
fn restore_pending(dir: &Path, name: &str, pending: &Pending) -> Result<()> {
    let target = pending.target;
    let path = dir.join(rotation::file_name(name, target.date, target.sequence));
    let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
    let on_disk = file.metadata()?.len();
    let end = target.offset + pending.bytes.len() as u64;

    if on_disk >= end {
        debug!(path = %path.display(), "staged blocks already written");
        return Ok(());
    }
    if on_disk > target.offset {
        file.set_len(target.offset)?;
    } else if on_disk < target.offset {
        warn!(
            path = %path.display(),
            expected = target.offset,
            found = on_disk,
            "log file shorter than when blocks were staged"
        );
    }
    let written = on_disk.min(target.offset);
    append_all(&mut file, written, &pending.bytes)?;
    file.sync_data()?;
    info!(
        log_name = %name,
        path = %path.display(),
        bytes = pending.bytes.len(),
        "restored staged blocks"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::reader::read_log_file;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, d).expect("valid date")
    }

    fn setup(dir: &Path, engine: &EngineConfig) -> (Logger, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::at_noon(day(1)));
        let logger = Logger::open(LogConfig::new("app", dir), engine, clock.clone())
            .expect("open logger");
        (logger, clock)
    }

    fn read_contents(logger: &Logger, path: &Path) -> Vec<String> {
        read_log_file(path, logger.codec())
            .expect("read")
            .records
            .into_iter()
            .map(|r| r.content)
            .collect()
    }

    #[test]
    fn append_is_dropped_below_min_level() {
        let dir = tempfile::tempdir().expect("tempdir");
        let clock = Arc::new(ManualClock::at_noon(day(1)));
        let config = LogConfig::new("app", dir.path()).with_min_level(LogLevel::Warn);
        let logger = Logger::open(config, &EngineConfig::default(), clock).expect("open");

        assert!(!logger.append(LogLevel::Info, "t", "ignored").expect("append"));
        assert!(logger.append(LogLevel::Error, "t", "kept").expect("append"));
        logger.flush().expect("flush");

        let files = logger.files_for_date(day(1)).expect("files");
        assert_eq!(files.len(), 1);
        assert_eq!(read_contents(&logger, &files[0]), vec!["kept"]);
    }

    #[test]
    fn no_file_before_first_write() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (logger, _clock) = setup(dir.path(), &EngineConfig::default());
        logger.flush().expect("flush on empty logger");
        assert!(logger.list_files().expect("list").is_empty());
    }

    #[test]
    fn flush_makes_buffered_records_visible() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (logger, _clock) = setup(dir.path(), &EngineConfig::default());
        logger.append(LogLevel::Info, "t", "buffered").expect("append");

        let files = logger.list_files().expect("list");
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].state, FileState::Active);
        assert_eq!(fs::metadata(&files[0].path).expect("meta").len(), 0);

        logger.flush().expect("flush");
        assert_eq!(read_contents(&logger, &files[0].path), vec!["buffered"]);
        // Flushing again with nothing buffered is a no-op.
        logger.flush().expect("second flush");
    }

    #[test]
    fn rotates_on_date_change() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (logger, clock) = setup(dir.path(), &EngineConfig::default());

        logger.append(LogLevel::Info, "t", "day one").expect("append");
        clock.advance(chrono::Duration::days(1));
        logger.append(LogLevel::Info, "t", "day two").expect("append");
        logger.flush().expect("flush");

        let files = logger.list_files().expect("list");
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].date, day(1));
        assert_eq!(files[0].state, FileState::Sealed);
        assert_eq!(files[1].date, day(2));
        assert_eq!(files[1].sequence, 0);
        assert_eq!(files[1].state, FileState::Active);
        assert_eq!(read_contents(&logger, &files[0].path), vec!["day one"]);
        assert_eq!(read_contents(&logger, &files[1].path), vec!["day two"]);
    }

    #[test]
    fn rotates_on_size_with_increasing_sequence() {
        let dir = tempfile::tempdir().expect("tempdir");
        let engine = EngineConfig::default()
            .with_max_file_size(4 * 1024)
            .with_buffer_capacity(0);
        let (logger, _clock) = setup(dir.path(), &engine);

        let line = "x".repeat(700);
        for _ in 0..20 {
            logger.append(LogLevel::Info, "t", &line).expect("append");
        }
        logger.flush().expect("flush");

        let files = logger.list_files().expect("list");
        assert!(files.len() > 1, "expected size rotation, got {files:?}");
        for (i, file) in files.iter().enumerate() {
            assert_eq!(file.sequence as usize, i);
            assert!(fs::metadata(&file.path).expect("meta").len() <= 4 * 1024);
        }
        let total: usize = files
            .iter()
            .map(|f| read_contents(&logger, &f.path).len())
            .sum();
        assert_eq!(total, 20);
    }

    #[test]
    fn oversized_content_is_split() {
        let dir = tempfile::tempdir().expect("tempdir");
        let engine = EngineConfig::default().with_max_file_size(4 * 1024);
        let (logger, _clock) = setup(dir.path(), &engine);

        let content = "é".repeat(3000);
        logger.append(LogLevel::Info, "t", &content).expect("append");
        logger.flush().expect("flush");

        let joined: String = logger
            .list_files()
            .expect("list")
            .iter()
            .flat_map(|f| read_contents(&logger, &f.path))
            .collect();
        assert_eq!(joined, content);
    }

    #[test]
    fn timestamps_never_go_backwards() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (logger, clock) = setup(dir.path(), &EngineConfig::default());

        logger.append(LogLevel::Info, "t", "first").expect("append");
        clock.advance(chrono::Duration::minutes(-5));
        logger.append(LogLevel::Info, "t", "second").expect("append");
        logger.flush().expect("flush");

        let files = logger.files_for_date(day(1)).expect("files");
        let records = read_log_file(&files[0], logger.codec()).expect("read").records;
        assert_eq!(records.len(), 2);
        assert!(records[1].timestamp >= records[0].timestamp);
    }

    #[test]
    fn reopen_truncates_partial_block_and_resumes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let engine = EngineConfig::default();
        let path = {
            let (logger, _clock) = setup(dir.path(), &engine);
            logger.append(LogLevel::Info, "t", "one").expect("append");
            logger.append(LogLevel::Info, "t", "two").expect("append");
            logger.flush().expect("flush");
            logger.files_for_date(day(1)).expect("files").remove(0)
        };

        // Simulate a crash mid-write of a third block.
        let mut bytes = fs::read(&path).expect("read");
        let partial = bytes[..12].to_vec();
        bytes.extend_from_slice(&partial);
        fs::write(&path, &bytes).expect("write");

        let (logger, _clock) = setup(dir.path(), &engine);
        logger.append(LogLevel::Info, "t", "three").expect("append");
        logger.flush().expect("flush");

        let files = logger.files_for_date(day(1)).expect("files");
        assert_eq!(files, vec![path.clone()]);
        let contents = read_log_file(&path, logger.codec()).expect("read");
        assert!(contents.is_clean());
        let names: Vec<_> = contents.records.into_iter().map(|r| r.content).collect();
        assert_eq!(names, vec!["one", "two", "three"]);
    }

    #[test]
    fn reopen_on_later_day_continues_fresh() {
        let dir = tempfile::tempdir().expect("tempdir");
        let engine = EngineConfig::default();
        {
            let (logger, _clock) = setup(dir.path(), &engine);
            logger.append(LogLevel::Info, "t", "old").expect("append");
        }

        let clock = Arc::new(ManualClock::at_noon(day(2)));
        let logger =
            Logger::open(LogConfig::new("app", dir.path()), &engine, clock).expect("open");
        logger.append(LogLevel::Info, "t", "new").expect("append");
        logger.flush().expect("flush");

        let old = logger.files_for_date(day(1)).expect("files");
        assert_eq!(old.len(), 1);
        assert_eq!(read_contents(&logger, &old[0]), vec!["old"]);
        assert_eq!(logger.files_for_date(day(2)).expect("files").len(), 1);
    }

    #[test]
    fn seal_and_rotate_starts_next_sequence() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (logger, _clock) = setup(dir.path(), &EngineConfig::default());

        logger.append(LogLevel::Info, "t", "a").expect("append");
        logger.seal_and_rotate().expect("seal");
        logger.append(LogLevel::Info, "t", "b").expect("append");

        let files = logger.files_for_date(day(1)).expect("files");
        assert_eq!(files.len(), 2);
        assert!(files[1].to_string_lossy().ends_with("app_2024_06_01.1.log"));
    }

    #[test]
    fn trim_seals_idle_file_and_keeps_today() {
        let dir = tempfile::tempdir().expect("tempdir");
        let clock = Arc::new(ManualClock::at_noon(day(1)));
        let config = LogConfig::new("app", dir.path()).with_keep_days(1);
        let logger =
            Logger::open(config, &EngineConfig::default(), clock.clone()).expect("open");

        logger.append(LogLevel::Info, "t", "stale").expect("append");
        let report = logger.trim(day(5)).expect("trim");
        assert_eq!(report.deleted.len(), 1);
        assert!(logger.list_files().expect("list").is_empty());

        clock.set(
            day(5)
                .and_hms_opt(12, 0, 0)
                .expect("valid time")
                .and_utc()
                .fixed_offset(),
        );
        logger.append(LogLevel::Info, "t", "fresh").expect("append");
        let report = logger.trim(day(5)).expect("trim");
        assert!(report.deleted.is_empty());
        assert_eq!(logger.list_files().expect("list").len(), 1);
    }

    #[test]
    fn reopen_keeps_blocks_after_corrupt_length() {
        let dir = tempfile::tempdir().expect("tempdir");
        let engine = EngineConfig::default();
        let path = {
            let (logger, _clock) = setup(dir.path(), &engine);
            for content in ["one", "two", "three", "four"] {
                logger.append(LogLevel::Info, "t", content).expect("append");
            }
            logger.flush().expect("flush");
            logger.files_for_date(day(1)).expect("files").remove(0)
        };

        let mut bytes = fs::read(&path).expect("read");
        bytes[5] ^= 0x01;
        fs::write(&path, &bytes).expect("write");

        let (logger, _clock) = setup(dir.path(), &engine);
        logger.append(LogLevel::Info, "t", "five").expect("append");

        let files = logger.files_for_date(day(1)).expect("files");
        assert_eq!(files.len(), 2);
        assert_eq!(files[0], path);
        assert_eq!(fs::metadata(&path).expect("meta").len(), bytes.len() as u64);
        assert_eq!(read_contents(&logger, &path), vec!["two", "three", "four"]);
        assert_eq!(read_contents(&logger, &files[1]), vec!["five"]);
    }

    #[test]
    fn unflushed_blocks_survive_a_lost_process() {
        let dir = tempfile::tempdir().expect("tempdir");
        let engine = EngineConfig::default();
        let (logger, _clock) = setup(dir.path(), &engine);
        logger.append(LogLevel::Info, "t", "one").expect("append");
        logger.append(LogLevel::Info, "t", "two").expect("append");
        let path = logger.list_files().expect("list").remove(0).path;
        // Nothing runs on exit: no flush, no drop.
        std::mem::forget(logger);

        assert_eq!(fs::metadata(&path).expect("meta").len(), 0);
        let pending = buffer::read_pending(&buffer::buffer_path(dir.path(), "app"))
            .expect("read staging")
            .expect("staged blocks");
        assert_eq!(pending.target.offset, 0);

        let (logger, _clock) = setup(dir.path(), &engine);
        logger.append(LogLevel::Info, "t", "three").expect("append");
        let files = logger.files_for_date(day(1)).expect("files");
        assert_eq!(files, vec![path.clone()]);
        assert_eq!(read_contents(&logger, &path), vec!["one", "two", "three"]);
    }

    #[test]
    fn restore_replaces_partially_drained_run() {
        let dir = tempfile::tempdir().expect("tempdir");
        let engine = EngineConfig::default();
        let (logger, _clock) = setup(dir.path(), &engine);
        logger.append(LogLevel::Info, "t", "kept").expect("append");
        logger.flush().expect("flush");
        logger.append(LogLevel::Info, "t", "staged").expect("append");
        let path = logger.list_files().expect("list").remove(0).path;
        std::mem::forget(logger);

        let pending = buffer::read_pending(&buffer::buffer_path(dir.path(), "app"))
            .expect("read staging")
            .expect("staged blocks");
        let flushed = fs::metadata(&path).expect("meta").len();
        assert_eq!(pending.target.offset, flushed);

        // Only the front of the staged run reached the file.
        let mut file = OpenOptions::new().append(true).open(&path).expect("open");
        file.write_all(&pending.bytes[..7]).expect("write");
        drop(file);

        let (logger, _clock) = setup(dir.path(), &engine);
        logger.flush().expect("flush");
        let contents = read_log_file(&path, logger.codec()).expect("read");
        assert!(contents.is_clean());
        let names: Vec<_> = contents.records.into_iter().map(|r| r.content).collect();
        assert_eq!(names, vec!["kept", "staged"]);
    }

    #[test]
    fn zero_capacity_writes_through() {
        let dir = tempfile::tempdir().expect("tempdir");
        let engine = EngineConfig::default().with_buffer_capacity(0);
        let (logger, _clock) = setup(dir.path(), &engine);
        logger.append(LogLevel::Info, "t", "direct").expect("append");

        let path = logger.list_files().expect("list").remove(0).path;
        assert!(fs::metadata(&path).expect("meta").len() > 0);
    }

    /// Accepts `room` bytes, then fails every write.
    struct ShortSink {
        data: Vec<u8>,
        room: usize,
    }

    impl Write for ShortSink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let n = buf.len().min(self.room);
            if n == 0 {
                return Err(io::Error::other("device full"));
            }
            self.data.extend_from_slice(&buf[..n]);
            self.room -= n;
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Sink for ShortSink {
        fn truncate(&mut self, len: u64) -> io::Result<()> {
            self.data.truncate(len as usize);
            Ok(())
        }
    }

    #[test]
    fn failed_write_discards_partial_prefix() {
        let mut sink = ShortSink {
            data: b"head".to_vec(),
            room: 3,
        };
        let err = append_all(&mut sink, 4, b"block").expect_err("short write");
        assert_eq!(err.kind(), ErrorKind::Other);
        assert_eq!(sink.data, b"head");

        sink.room = 16;
        append_all(&mut sink, 4, b"block").expect("retry");
        assert_eq!(sink.data, b"headblock");
    }

    #[test]
    fn files_for_date_missing_dir_is_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let logs = dir.path().join("logs");
        let (logger, _clock) = setup(&logs, &EngineConfig::default());
        fs::remove_dir_all(&logs).expect("remove");

        let err = logger.files_for_date(day(1)).expect_err("missing dir");
        assert!(err.is_io());
    }
}
