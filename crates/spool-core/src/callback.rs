//! The single, replaceable query callback.
//!
//! Queries capture the registration that is current when they are
//! submitted. Replacing the callback later does not redirect results of
//! queries already in flight; they are delivered to the callback they were
//! submitted under.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

/// Receives the result of a file query.
///
/// Exactly one of the two methods is called per query, on a worker thread.
pub trait QueryCallback: Send + Sync {
    /// Called with the absolute paths of the files covering `date`, ordered
    /// by sequence. The list may be empty.
    fn on_success(&self, log_name: &str, date: &str, paths: &[String]);

    /// Called with a description of why the query failed.
    fn on_fail(&self, log_name: &str, date: &str, error: &str);
}

/// A [`QueryCallback`] built from a pair of closures.
pub struct FnCallback<S, F> {
    success: S,
    fail: F,
}

impl<S, F> FnCallback<S, F>
where
    S: Fn(&str, &str, &[String]) + Send + Sync,
    F: Fn(&str, &str, &str) + Send + Sync,
{
    /// Creates a callback from a success handler and a failure handler.
    pub const fn new(success: S, fail: F) -> Self {
        Self { success, fail }
    }
}

impl<S, F> QueryCallback for FnCallback<S, F>
where
    S: Fn(&str, &str, &[String]) + Send + Sync,
    F: Fn(&str, &str, &str) + Send + Sync,
{
    fn on_success(&self, log_name: &str, date: &str, paths: &[String]) {
        (self.success)(log_name, date, paths);
    }

    fn on_fail(&self, log_name: &str, date: &str, error: &str) {
        (self.fail)(log_name, date, error);
    }
}

impl<S, F> fmt::Debug for FnCallback<S, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnCallback").finish_non_exhaustive()
    }
}

/// Holds at most one active callback.
#[derive(Default)]
pub struct CallbackRegistry {
    current: RwLock<Option<Arc<dyn QueryCallback>>>,
}

impl fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackRegistry")
            .field("registered", &self.is_registered())
            .finish()
    }
}

impl CallbackRegistry {
    /// Creates a registry with no callback.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs `callback`, returning the one it replaces.
    pub fn register(&self, callback: Arc<dyn QueryCallback>) -> Option<Arc<dyn QueryCallback>> {
        let previous = self.current.write().replace(callback);
        debug!(replaced = previous.is_some(), "query callback registered");
        previous
    }

    /// Returns the current callback for a query being submitted.
    #[must_use]
    pub fn snapshot(&self) -> Option<Arc<dyn QueryCallback>> {
        self.current.read().clone()
    }

    /// Returns true if a callback is installed.
    #[must_use]
    pub fn is_registered(&self) -> bool {
        self.current.read().is_some()
    }
}
