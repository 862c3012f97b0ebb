//! Failure side-channel for fire-and-forget operations.
//!
//! Appends, flushes and trims issued through the boundary have no return
//! value, so their failures are kept here: a bounded ring of the most recent
//! [`Diagnostic`]s, a running failure count, and an optional
//! [`EventListener`] notified as each failure is recorded.
//!
//! The same listener can also follow successful work: the engine emits an
//! [`Event`] when an operation starts and when it ends.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// The engine operation a failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// Logger creation
    CreateLog,
    /// Logger teardown
    DestroyLog,
    /// Appending a record
    Append,
    /// Flushing buffered data
    Flush,
    /// Flushing every logger
    FlushAll,
    /// Deleting expired files
    Trim,
    /// Submitting or resolving a file query
    Query,
}

impl Operation {
    /// Returns the string representation of this operation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::CreateLog => "create_log",
            Self::DestroyLog => "destroy_log",
            Self::Append => "append",
            Self::Flush => "flush",
            Self::FlushAll => "flush_all",
            Self::Trim => "trim",
            Self::Query => "query",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One recorded failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// When the failure was recorded
    pub at: DateTime<Utc>,
    /// Operation that failed
    pub operation: Operation,
    /// Logger involved, if any
    pub log_name: Option<String>,
    /// Error description
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.log_name {
            Some(name) => write!(f, "[{}] {name}: {}", self.operation, self.message),
            None => write!(f, "[{}] {}", self.operation, self.message),
        }
    }
}

/// Where an operation is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// The operation began
    Start,
    /// The operation completed successfully
    End,
    /// A record was dropped by the logger's level filter
    Filtered,
}

/// A lifecycle step of an engine operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Event<'a> {
    /// Operation in progress
    pub operation: Operation,
    /// Step reached
    pub phase: Phase,
    /// Logger involved, if any
    pub log_name: Option<&'a str>,
}

/// Receives failures as they are recorded, and optionally lifecycle events.
///
/// Called on the thread doing the work; implementations must not block.
pub trait EventListener: Send + Sync {
    /// Called once per recorded failure.
    fn on_failure(&self, diagnostic: &Diagnostic);

    /// Called when an operation starts, ends, or filters a record.
    fn on_event(&self, _event: &Event<'_>) {}
}

impl<F> EventListener for F
where
    F: Fn(&Diagnostic) + Send + Sync,
{
    fn on_failure(&self, diagnostic: &Diagnostic) {
        self(diagnostic);
    }
}

/// Bounded store of recent failures.
pub struct Diagnostics {
    capacity: usize,
    entries: Mutex<VecDeque<Diagnostic>>,
    total: AtomicU64,
    listener: RwLock<Option<Arc<dyn EventListener>>>,
}

impl fmt::Debug for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Diagnostics")
            .field("capacity", &self.capacity)
            .field("total", &self.total.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl Diagnostics {
    /// Creates an empty store keeping at most `capacity` entries.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            total: AtomicU64::new(0),
            listener: RwLock::new(None),
        }
    }

    /// Records a failure, evicting the oldest entry when full.
    pub fn record(&self, operation: Operation, log_name: Option<&str>, error: &dyn fmt::Display) {
        let diagnostic = Diagnostic {
            at: Utc::now(),
            operation,
            log_name: log_name.map(str::to_string),
            message: error.to_string(),
        };
        warn!(
            operation = %operation,
            log_name = log_name.unwrap_or("-"),
            error = %diagnostic.message,
            "operation failed"
        );

        self.total.fetch_add(1, Ordering::Relaxed);
        let listener = self.listener.read().clone();
        if let Some(listener) = listener {
            listener.on_failure(&diagnostic);
        }

        let mut entries = self.entries.lock();
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(diagnostic);
    }

    /// Passes a lifecycle event to the listener, if one is installed.
    pub fn emit(&self, operation: Operation, phase: Phase, log_name: Option<&str>) {
        let listener = self.listener.read().clone();
        if let Some(listener) = listener {
            listener.on_event(&Event {
                operation,
                phase,
                log_name,
            });
        }
    }

    /// Returns the retained failures, oldest first.
    #[must_use]
    pub fn recent(&self) -> Vec<Diagnostic> {
        self.entries.lock().iter().cloned().collect()
    }

    /// Returns the most recent failure.
    #[must_use]
    pub fn last(&self) -> Option<Diagnostic> {
        self.entries.lock().back().cloned()
    }

    /// Returns how many failures were recorded, including evicted ones.
    #[must_use]
    pub fn error_count(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    /// Removes and returns the retained failures.
    pub fn drain(&self) -> Vec<Diagnostic> {
        self.entries.lock().drain(..).collect()
    }

    /// Installs a listener, replacing any previous one.
    pub fn set_listener(&self, listener: Arc<dyn EventListener>) {
        *self.listener.write() = Some(listener);
    }

    /// Removes the listener.
    pub fn clear_listener(&self) {
        *self.listener.write() = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SpoolError;

    #[test]
    fn ring_evicts_oldest() {
        let diagnostics = Diagnostics::new(2);
        for i in 0..3 {
            diagnostics.record(Operation::Append, Some("app"), &format!("failure {i}"));
        }

        let recent = diagnostics.recent();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].message, "failure 1");
        assert_eq!(recent[1].message, "failure 2");
        assert_eq!(diagnostics.error_count(), 3);
    }

    #[test]
    fn listener_sees_each_failure() {
        let diagnostics = Diagnostics::new(8);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        diagnostics.set_listener(Arc::new(move |d: &Diagnostic| {
            sink.lock().push(d.operation);
        }));

        diagnostics.record(Operation::Flush, None, &SpoolError::not_found("x"));
        diagnostics.record(Operation::Trim, Some("app"), &"permission denied");
        assert_eq!(*seen.lock(), vec![Operation::Flush, Operation::Trim]);

        diagnostics.clear_listener();
        diagnostics.record(Operation::Trim, None, &"ignored by listener");
        assert_eq!(seen.lock().len(), 2);
    }

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<(Operation, Phase, Option<String>)>>,
        failures: Mutex<Vec<Operation>>,
    }

    impl EventListener for Recorder {
        fn on_failure(&self, diagnostic: &Diagnostic) {
            self.failures.lock().push(diagnostic.operation);
        }

        fn on_event(&self, event: &Event<'_>) {
            self.events
                .lock()
                .push((event.operation, event.phase, event.log_name.map(str::to_string)));
        }
    }

    #[test]
    fn listener_sees_lifecycle_events() {
        let diagnostics = Diagnostics::new(4);
        let recorder = Arc::new(Recorder::default());
        diagnostics.set_listener(recorder.clone());

        diagnostics.emit(Operation::Flush, Phase::Start, Some("app"));
        diagnostics.emit(Operation::Flush, Phase::End, Some("app"));
        diagnostics.record(Operation::Flush, Some("app"), &"disk full");

        assert_eq!(
            *recorder.events.lock(),
            vec![
                (Operation::Flush, Phase::Start, Some("app".to_string())),
                (Operation::Flush, Phase::End, Some("app".to_string())),
            ]
        );
        assert_eq!(*recorder.failures.lock(), vec![Operation::Flush]);
        // Events are not failures.
        assert_eq!(diagnostics.error_count(), 1);
    }

    #[test]
    fn closure_listener_ignores_events() {
        let diagnostics = Diagnostics::new(4);
        let seen = Arc::new(Mutex::new(0usize));
        let sink = Arc::clone(&seen);
        diagnostics.set_listener(Arc::new(move |_: &Diagnostic| *sink.lock() += 1));

        diagnostics.emit(Operation::Append, Phase::Start, None);
        assert_eq!(*seen.lock(), 0);
    }

    #[test]
    fn operation_names_match_serde() {
        for op in [
            Operation::CreateLog,
            Operation::DestroyLog,
            Operation::Append,
            Operation::Flush,
            Operation::FlushAll,
            Operation::Trim,
            Operation::Query,
        ] {
            let json = serde_json::to_string(&op).expect("serialize");
            assert_eq!(json, format!("\"{}\"", op.as_str()));
        }
    }

    #[test]
    fn drain_empties_but_keeps_count() {
        let diagnostics = Diagnostics::new(4);
        diagnostics.record(Operation::Query, Some("app"), &"boom");
        assert_eq!(diagnostics.drain().len(), 1);
        assert!(diagnostics.recent().is_empty());
        assert!(diagnostics.last().is_none());
        assert_eq!(diagnostics.error_count(), 1);
    }

    #[test]
    fn display_includes_logger() {
        let diagnostics = Diagnostics::new(1);
        diagnostics.record(Operation::CreateLog, Some("net"), &"bad key");
        let last = diagnostics.last().expect("recorded");
        assert_eq!(last.to_string(), "[create_log] net: bad key");
    }
}
