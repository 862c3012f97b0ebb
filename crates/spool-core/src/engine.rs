//! The engine context.
//!
//! A [`Spool`] owns every piece of process state: the logger registry, the
//! callback registry, the diagnostics ring, and the worker runtime that
//! resolves queries and runs scheduled trims. Operations take `&self` and may
//! be called from any thread.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::runtime::{Builder, Runtime};
use tokio::sync::oneshot;
use tracing::{debug, info};

use crate::callback::{CallbackRegistry, QueryCallback};
use crate::clock::{Clock, SystemClock};
use crate::config::{EngineConfig, LogConfig};
use crate::diagnostics::{Diagnostics, Operation, Phase};
use crate::error::{Result, SpoolError};
use crate::logger::Logger;
use crate::query::{self, QueryEngine, QueryId, QueryOutcome, QueryRequest};
use crate::registry::LoggerRegistry;
use crate::trim::{self, TrimReport, TrimScheduler};
use crate::types::LogLevel;

/// The logging engine.
pub struct Spool {
    config: EngineConfig,
    clock: Arc<dyn Clock>,
    registry: Arc<LoggerRegistry>,
    callbacks: CallbackRegistry,
    diagnostics: Arc<Diagnostics>,
    queries: QueryEngine,
    trim_task: Option<TrimScheduler>,
    runtime: Option<Runtime>,
}

impl std::fmt::Debug for Spool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Spool")
            .field("config", &self.config)
            .field("loggers", &self.registry.names())
            .field("callbacks", &self.callbacks)
            .finish_non_exhaustive()
    }
}

impl Spool {
    /// Starts an engine on the local wall clock.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the worker runtime
    /// cannot be started.
    pub fn init(config: EngineConfig) -> Result<Self> {
        Self::init_with_clock(config, Arc::new(SystemClock))
    }

    /// Starts an engine whose dates come from `clock`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the worker runtime
    /// cannot be started.
    pub fn init_with_clock(config: EngineConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;

        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .max_blocking_threads(config.query_workers)
            .thread_name("spool-worker")
            .enable_time()
            .build()?;

        let registry = Arc::new(LoggerRegistry::new());
        let diagnostics = Arc::new(Diagnostics::new(config.diagnostics_capacity));
        let queries = QueryEngine::new(runtime.handle().clone(), Arc::clone(&registry));
        let trim_task = config.trim_interval().map(|period| {
            trim::start_trim_task(
                runtime.handle(),
                period,
                Arc::clone(&registry),
                Arc::clone(&clock),
                Arc::clone(&diagnostics),
            )
        });

        info!(
            max_file_size = config.max_file_size,
            query_workers = config.query_workers,
            trim_interval_secs = config.trim_interval_secs,
            "engine initialized"
        );

        Ok(Self {
            config,
            clock,
            registry,
            callbacks: CallbackRegistry::new(),
            diagnostics,
            queries,
            trim_task,
            runtime: Some(runtime),
        })
    }

    /// Returns the engine configuration.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Returns the failure side-channel.
    #[must_use]
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Returns the names of the registered loggers, sorted.
    #[must_use]
    pub fn log_names(&self) -> Vec<String> {
        self.registry.names()
    }

    /// Looks up a logger.
    ///
    /// # Errors
    ///
    /// Returns [`SpoolError::NotFound`] for an unknown name.
    pub fn logger(&self, name: &str) -> Result<Arc<Logger>> {
        self.registry.get(name)
    }

    /// Registers a logger.
    ///
    /// Creating a logger that exists with the same configuration is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`SpoolError::ConfigConflict`] if the name is taken with a
    /// different configuration, or an error opening the logger's directory.
    pub fn create_log(&self, config: LogConfig) -> Result<()> {
        let name = config.name.clone();
        self.observe(Operation::CreateLog, Some(&name), || {
            self.registry
                .create(config, &self.config, Arc::clone(&self.clock))
                .map(|_| ())
        })
    }

    /// Unregisters a logger after flushing it.
    ///
    /// Its files stay on disk; recreating the logger resumes them.
    ///
    /// # Errors
    ///
    /// Returns [`SpoolError::NotFound`] for an unknown name, or the flush error.
    pub fn destroy_log(&self, name: &str) -> Result<()> {
        self.observe(Operation::DestroyLog, Some(name), || {
            self.registry.remove(name).and_then(|logger| logger.flush())
        })
    }

    /// Appends one record to the named logger.
    ///
    /// Returns `Ok(false)` when the record is below the logger's level.
    ///
    /// # Errors
    ///
    /// Returns [`SpoolError::NotFound`] for an unknown logger, or the append error.
    pub fn log(&self, name: &str, level: LogLevel, target: &str, content: &str) -> Result<bool> {
        self.diagnostics.emit(Operation::Append, Phase::Start, Some(name));
        let appended = self
            .registry
            .get(name)
            .and_then(|logger| logger.append(level, target, content));
        if let Ok(kept) = appended {
            let phase = if kept { Phase::End } else { Phase::Filtered };
            self.diagnostics.emit(Operation::Append, phase, Some(name));
        }
        self.report(Operation::Append, Some(name), appended)
    }

    /// Makes the named logger's buffered records durable.
    ///
    /// # Errors
    ///
    /// Returns [`SpoolError::NotFound`] for an unknown logger, or the I/O error.
    pub fn flush(&self, name: &str) -> Result<()> {
        self.observe(Operation::Flush, Some(name), || {
            self.registry.get(name).and_then(|logger| logger.flush())
        })
    }

    /// Flushes every logger, continuing past failures.
    ///
    /// # Errors
    ///
    /// Returns the first failure after every logger was attempted.
    pub fn flush_all(&self) -> Result<()> {
        self.diagnostics.emit(Operation::FlushAll, Phase::Start, None);
        let mut first_error = None;
        for logger in self.registry.snapshot() {
            let flushed = self.observe(Operation::Flush, Some(logger.name()), || logger.flush());
            if let Err(e) = flushed {
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => {
                self.diagnostics.emit(Operation::FlushAll, Phase::End, None);
                Ok(())
            }
        }
    }

    /// Runs a trim sweep over every logger now.
    pub fn trim(&self) -> TrimReport {
        trim::trim_all(&self.registry, self.clock.today(), &self.diagnostics)
    }

    /// Installs the query callback, replacing any previous one.
    ///
    /// Queries already submitted still deliver to the callback that was
    /// current when they were submitted.
    pub fn register_callback(&self, callback: Arc<dyn QueryCallback>) {
        self.callbacks.register(callback);
    }

    /// Submits an asynchronous file query delivered to the registered callback.
    ///
    /// # Errors
    ///
    /// Returns [`SpoolError::CallbackNotRegistered`] if no callback is
    /// installed; no callback is invoked in that case.
    pub fn request_log_files_for_date(&self, name: &str, date: &str) -> Result<QueryId> {
        let Some(callback) = self.callbacks.snapshot() else {
            return self.report(Operation::Query, Some(name), Err(SpoolError::CallbackNotRegistered));
        };

        Ok(self.queries.submit(QueryRequest::new(name, date), move |id, outcome| {
            debug!(query_id = %id, state = %outcome.state(), "delivering query outcome");
            outcome.deliver(callback.as_ref());
        }))
    }

    /// Submits an asynchronous file query whose outcome arrives on a channel.
    pub fn query_files(&self, name: &str, date: &str) -> oneshot::Receiver<QueryOutcome> {
        let (tx, rx) = oneshot::channel();
        self.queries.submit(QueryRequest::new(name, date), move |_, outcome| {
            // The receiver may have been dropped; nobody is waiting then.
            let _ = tx.send(outcome);
        });
        rx
    }

    /// Resolves the files of a logger for a date on the calling thread.
    ///
    /// # Errors
    ///
    /// Returns [`SpoolError::InvalidDate`], [`SpoolError::NotFound`], or the
    /// logger's I/O error.
    pub fn files_for_date(&self, name: &str, date: &str) -> Result<Vec<PathBuf>> {
        query::resolve(&self.registry, name, date)
    }

    /// Returns the number of submitted queries not yet resolved.
    #[must_use]
    pub fn pending_queries(&self) -> usize {
        self.queries.in_flight()
    }

    /// Runs `op` between start and end events, recording its failure.
    fn observe<T>(
        &self,
        operation: Operation,
        name: Option<&str>,
        op: impl FnOnce() -> Result<T>,
    ) -> Result<T> {
        self.diagnostics.emit(operation, Phase::Start, name);
        let result = op();
        if result.is_ok() {
            self.diagnostics.emit(operation, Phase::End, name);
        }
        self.report(operation, name, result)
    }

    fn report<T>(&self, operation: Operation, name: Option<&str>, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            self.diagnostics.record(operation, name, e);
        }
        result
    }
}

impl Drop for Spool {
    fn drop(&mut self) {
        if let Some(task) = &self.trim_task {
            task.stop();
        }
        let _ = self.flush_all();
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
        debug!("engine shut down");
    }
}
