//! Name → [`Logger`] mapping.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::clock::Clock;
use crate::config::{EngineConfig, LogConfig};
use crate::error::{Result, SpoolError};
use crate::logger::Logger;

/// Process-wide set of loggers, keyed by name.
///
/// Lookups take a shared lock; creation and removal take an exclusive one.
/// Iteration works on a snapshot, so loggers created during a sweep may or
/// may not be visited.
#[derive(Debug, Default)]
pub struct LoggerRegistry {
    loggers: RwLock<HashMap<String, Arc<Logger>>>,
}

impl LoggerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates and registers a logger unless one with this name exists.
    ///
    /// Creating an existing logger with an identical configuration returns
    /// the existing logger.
    ///
    /// # Errors
    ///
    /// Returns [`SpoolError::ConfigConflict`] if the name is taken by a logger
    /// with a different configuration, or the logger's own open error.
    pub fn create(
        &self,
        config: LogConfig,
        engine: &EngineConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Arc<Logger>> {
        if let Some(existing) = self.loggers.read().get(&config.name) {
            return Self::check_existing(existing, &config);
        }

        let mut loggers = self.loggers.write();
        // Another caller may have won the race between the two locks.
        if let Some(existing) = loggers.get(&config.name) {
            return Self::check_existing(existing, &config);
        }

        let name = config.name.clone();
        let logger = Arc::new(Logger::open(config, engine, clock)?);
        loggers.insert(name.clone(), Arc::clone(&logger));
        debug!(log_name = %name, "logger registered");
        Ok(logger)
    }

    fn check_existing(existing: &Arc<Logger>, config: &LogConfig) -> Result<Arc<Logger>> {
        if existing.config() == config {
            Ok(Arc::clone(existing))
        } else {
            Err(SpoolError::ConfigConflict {
                name: config.name.clone(),
            })
        }
    }

    /// Looks up a logger by name.
    ///
    /// # Errors
    ///
    /// Returns [`SpoolError::NotFound`] if no logger has this name.
    pub fn get(&self, name: &str) -> Result<Arc<Logger>> {
        self.loggers
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| SpoolError::not_found(name))
    }

    /// Unregisters a logger, returning it.
    ///
    /// # Errors
    ///
    /// Returns [`SpoolError::NotFound`] if no logger has this name.
    pub fn remove(&self, name: &str) -> Result<Arc<Logger>> {
        let removed = self
            .loggers
            .write()
            .remove(name)
            .ok_or_else(|| SpoolError::not_found(name))?;
        debug!(log_name = %name, "logger unregistered");
        Ok(removed)
    }

    /// Returns the registered loggers, sorted by name.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Arc<Logger>> {
        let mut loggers: Vec<_> = self.loggers.read().values().cloned().collect();
        loggers.sort_by(|a, b| a.name().cmp(b.name()));
        loggers
    }

    /// Calls `f` for every registered logger without holding the registry lock.
    pub fn for_each(&self, mut f: impl FnMut(&Logger)) {
        for logger in self.snapshot() {
            f(&logger);
        }
    }

    /// Returns the registered logger names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.loggers.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Returns the number of registered loggers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.loggers.read().len()
    }

    /// Returns true if no logger is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.loggers.read().is_empty()
    }
}
