//! Engine and connector error types.
//!
//! Provides a unified error hierarchy split by concern:
//! - [`ConnectorError`]: Failures talking to one remote target
//! - [`SourceError`] / [`SinkError`]: Collaborator failures
//! - [`EngineError`]: Registry, pool, and orchestration failures surfaced to
//!   the caller

use thiserror::Error;

use crate::registry::TaskId;

/// Errors that can occur while talking to one remote target.
///
/// Connector calls return `Result`, so there is no separate "last error"
/// accessor; a failure with no underlying cause (the connection silently
/// went away) is the distinct [`ConnectorError::ConnectionLost`] variant.
#[derive(Debug, Error)]
pub enum ConnectorError {
    /// Failed to connect to the target.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Authentication or authorization error.
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// A required connection parameter is missing or empty.
    #[error("missing connection parameter: {0}")]
    MissingParam(&'static str),

    /// The target rejected or failed a query.
    #[error("query failed: {0}")]
    QueryFailed(String),

    /// The connection went away with no captured cause.
    #[error("connection lost")]
    ConnectionLost,

    /// Operation timed out.
    #[error("timeout after {0}ms")]
    Timeout(u64),

    /// The connector has been closed.
    #[error("connector closed")]
    Closed,

    /// An I/O error from the underlying transport.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Error produced by a [`TaskSource`](crate::source::TaskSource).
#[derive(Debug, Error)]
#[error("{0}")]
pub struct SourceError(
    /// Underlying cause, rendered as text.
    pub String,
);

impl SourceError {
    /// Creates a source error from any displayable cause.
    #[must_use]
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

impl From<csv::Error> for SourceError {
    fn from(e: csv::Error) -> Self {
        Self(e.to_string())
    }
}

impl From<std::io::Error> for SourceError {
    fn from(e: std::io::Error) -> Self {
        Self(e.to_string())
    }
}

/// Error produced by a [`ResultSink`](crate::sink::ResultSink).
///
/// Workers catch sink errors and convert them to per-query statuses; they
/// never abort a task.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct SinkError(
    /// Underlying cause, rendered as text.
    pub String,
);

impl SinkError {
    /// Creates a sink error from any displayable cause.
    #[must_use]
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

impl From<csv::Error> for SinkError {
    fn from(e: csv::Error) -> Self {
        Self(e.to_string())
    }
}

impl From<std::io::Error> for SinkError {
    fn from(e: std::io::Error) -> Self {
        Self(e.to_string())
    }
}

/// Errors surfaced to the caller of the dispatch engine.
///
/// Per-task failures never appear here; they are contained inside the
/// owning worker and recorded as statuses. These are programming or
/// environment errors the caller must act on.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The task id is not present in the registry.
    #[error("task {0} is not registered")]
    UnknownTask(TaskId),

    /// The worker queue is saturated and the submission was rejected.
    #[error("worker queue is full")]
    QueueFull,

    /// The pool has been shut down and accepts no new submissions.
    #[error("pool is shut down")]
    PoolClosed,

    /// The task source produced no targets; there is nothing to do.
    #[error("task source produced no targets")]
    NoTasks,

    /// The task source produced no queries.
    #[error("task source produced no queries")]
    NoQueries,

    /// The task source failed before any task was created.
    #[error("source error: {0}")]
    Source(#[from] SourceError),

    /// The result sink failed during setup or teardown.
    #[error("sink error: {0}")]
    Sink(#[from] SinkError),
}
