//! Asynchronous resolution of "which files hold logs for date D".
//!
//! A query moves through `Submitted → Resolving → {Succeeded, Failed}` on the
//! engine's blocking pool. Its completion handler is called exactly once with
//! the [`QueryOutcome`], including when resolution panics.

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tracing::{debug, warn};

use crate::callback::QueryCallback;
use crate::error::Result;
use crate::registry::LoggerRegistry;
use crate::rotation::parse_query_date;

/// Identifier of a submitted query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QueryId(pub u64);

impl fmt::Display for QueryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "query-{}", self.0)
    }
}

/// Lifecycle state of a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryState {
    /// Accepted, waiting for a worker
    Submitted,
    /// Being resolved on a worker
    Resolving,
    /// Resolved; the success handler fires
    Succeeded,
    /// Resolution failed; the failure handler fires
    Failed,
}

impl QueryState {
    /// Returns the string representation of this state.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Submitted => "submitted",
            Self::Resolving => "resolving",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }

    /// Returns true for `Succeeded` and `Failed`.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

impl fmt::Display for QueryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request for the files of one logger on one date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryRequest {
    /// Logger to query
    pub log_name: String,
    /// Date as given by the caller (`YYYY_MM_DD` or `YYYY-MM-DD`)
    pub date: String,
}

impl QueryRequest {
    /// Creates a request.
    pub fn new(log_name: impl Into<String>, date: impl Into<String>) -> Self {
        Self {
            log_name: log_name.into(),
            date: date.into(),
        }
    }
}

/// Terminal result of a query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum QueryOutcome {
    /// The files covering the date, ordered by sequence (possibly none)
    Succeeded {
        /// Queried logger
        log_name: String,
        /// Queried date as given
        date: String,
        /// Absolute UTF-8 paths
        paths: Vec<String>,
    },
    /// Resolution failed
    Failed {
        /// Queried logger
        log_name: String,
        /// Queried date as given
        date: String,
        /// Description naming the logger and date
        error: String,
    },
}

impl QueryOutcome {
    /// Returns the terminal state this outcome represents.
    #[must_use]
    pub const fn state(&self) -> QueryState {
        match self {
            Self::Succeeded { .. } => QueryState::Succeeded,
            Self::Failed { .. } => QueryState::Failed,
        }
    }

    /// Returns the paths of a successful outcome.
    #[must_use]
    pub fn paths(&self) -> Option<&[String]> {
        match self {
            Self::Succeeded { paths, .. } => Some(paths),
            Self::Failed { .. } => None,
        }
    }

    /// Invokes the matching handler of `callback`.
    pub fn deliver(&self, callback: &dyn QueryCallback) {
        match self {
            Self::Succeeded {
                log_name,
                date,
                paths,
            } => callback.on_success(log_name, date, paths),
            Self::Failed {
                log_name,
                date,
                error,
            } => callback.on_fail(log_name, date, error),
        }
    }
}

/// Resolves a request synchronously.
///
/// # Errors
///
/// Returns [`crate::SpoolError::InvalidDate`] for an unparseable date,
/// [`crate::SpoolError::NotFound`] for an unknown logger, or the logger's I/O
/// error.
pub fn resolve(registry: &LoggerRegistry, log_name: &str, date: &str) -> Result<Vec<PathBuf>> {
    let date = parse_query_date(date)?;
    let logger = registry.get(log_name)?;
    logger.files_for_date(date)
}

fn outcome_of(request: QueryRequest, resolved: Result<Vec<PathBuf>>) -> QueryOutcome {
    let QueryRequest { log_name, date } = request;
    match resolved {
        Ok(paths) => QueryOutcome::Succeeded {
            paths: paths
                .iter()
                .map(|p| p.to_string_lossy().into_owned())
                .collect(),
            log_name,
            date,
        },
        Err(e) => QueryOutcome::Failed {
            error: format!("cannot list files of `{log_name}` for {date}: {e}"),
            log_name,
            date,
        },
    }
}

/// Runs queries on a runtime's blocking pool.
#[derive(Debug)]
pub struct QueryEngine {
    runtime: Handle,
    registry: Arc<LoggerRegistry>,
    next_id: AtomicU64,
    in_flight: Arc<AtomicUsize>,
}

impl QueryEngine {
    /// Creates an engine resolving against `registry` on `runtime`.
    #[must_use]
    pub fn new(runtime: Handle, registry: Arc<LoggerRegistry>) -> Self {
        Self {
            runtime,
            registry,
            next_id: AtomicU64::new(1),
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Submits a query; `on_done` is called exactly once with its outcome.
    ///
    /// Returns immediately. Resolution and `on_done` run on a worker thread.
    pub fn submit<F>(&self, request: QueryRequest, on_done: F) -> QueryId
    where
        F: FnOnce(QueryId, QueryOutcome) + Send + 'static,
    {
        let id = QueryId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let registry = Arc::clone(&self.registry);
        let in_flight = Arc::clone(&self.in_flight);
        in_flight.fetch_add(1, Ordering::SeqCst);

        debug!(
            query_id = %id,
            log_name = %request.log_name,
            date = %request.date,
            state = %QueryState::Submitted,
            "query submitted"
        );

        self.runtime.spawn_blocking(move || {
            debug!(query_id = %id, state = %QueryState::Resolving, "query resolving");

            let resolved = catch_unwind(AssertUnwindSafe(|| {
                resolve(&registry, &request.log_name, &request.date)
            }));
            let outcome = match resolved {
                Ok(result) => outcome_of(request, result),
                Err(_) => {
                    let QueryRequest { log_name, date } = request;
                    QueryOutcome::Failed {
                        error: format!("query for `{log_name}` on {date} panicked"),
                        log_name,
                        date,
                    }
                }
            };

            match &outcome {
                QueryOutcome::Succeeded { paths, .. } => debug!(
                    query_id = %id,
                    state = %QueryState::Succeeded,
                    files = paths.len(),
                    "query resolved"
                ),
                QueryOutcome::Failed { error, .. } => warn!(
                    query_id = %id,
                    state = %QueryState::Failed,
                    %error,
                    "query failed"
                ),
            }

            in_flight.fetch_sub(1, Ordering::SeqCst);
            if catch_unwind(AssertUnwindSafe(move || on_done(id, outcome))).is_err() {
                warn!(query_id = %id, "query completion handler panicked");
            }
        });

        id
    }

    /// Returns the number of queries not yet resolved.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }
}
