//! Result sink trait and status types.
//!
//! A [`ResultSink`] durably records, for each target and each query, a
//! status and (for non-empty successes) the result rows. It is shared by
//! every worker at once and must serialize its own writes internally; the
//! engine relies on that contract.

use std::fmt;

use async_trait::async_trait;

use crate::connector::ResultSet;
use crate::error::SinkError;
use crate::registry::TaskId;
use crate::source::QueryId;

/// Overall outcome of one target.
///
/// Every task ends with exactly one of these, regardless of how it failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskStatus {
    /// The task ran to completion without a fatal error. Individual queries
    /// may still have failed; those carry their own [`QueryStatus`].
    Ok,

    /// The task failed before or while connecting; the message is the
    /// captured error.
    Failed(String),
}

impl TaskStatus {
    /// Returns `true` for [`TaskStatus::Ok`].
    #[must_use]
    pub fn is_ok(&self) -> bool {
        matches!(self, TaskStatus::Ok)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskStatus::Ok => write!(f, "OK"),
            TaskStatus::Failed(msg) => write!(f, "{msg}"),
        }
    }
}

/// Outcome of one query on one target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryStatus {
    /// The query succeeded but returned zero rows; nothing was saved.
    EmptyResult,

    /// The query failed with a captured error.
    Failed(String),

    /// The query failed because the connection went away with no captured
    /// cause.
    ConnectionInterrupted,

    /// The query succeeded but the sink failed to persist its rows.
    SaveFailed(String),
}

impl fmt::Display for QueryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryStatus::EmptyResult => write!(f, "empty result"),
            QueryStatus::Failed(msg) => write!(f, "{msg}"),
            QueryStatus::ConnectionInterrupted => write!(f, "connection interrupted"),
            QueryStatus::SaveFailed(msg) => write!(f, "save failed: {msg}"),
        }
    }
}

/// Durably records per-target and per-query outcomes.
///
/// # Concurrency contract
///
/// All methods take `&self` and are called from arbitrarily many workers
/// concurrently; implementations must serialize their own writes. Errors
/// returned from any method are caught by the calling worker and converted
/// to statuses or log lines; they never abort a task or affect siblings.
#[async_trait]
pub trait ResultSink: Send + Sync {
    /// Called once per target before its lifecycle starts.
    ///
    /// # Errors
    ///
    /// Returns `SinkError` if preparation fails.
    async fn prepare_target(&self, task: TaskId) -> Result<(), SinkError>;

    /// Records the overall status of one target. Called exactly once per
    /// target.
    ///
    /// # Errors
    ///
    /// Returns `SinkError` if the status cannot be recorded.
    async fn set_target_status(&self, task: TaskId, status: TaskStatus) -> Result<(), SinkError>;

    /// Records the status of one query on one target. Called at most once
    /// per (target, query) pair.
    ///
    /// # Errors
    ///
    /// Returns `SinkError` if the status cannot be recorded.
    async fn set_query_status(
        &self,
        task: TaskId,
        query: QueryId,
        status: QueryStatus,
    ) -> Result<(), SinkError>;

    /// Persists the rows of one non-empty query result.
    ///
    /// # Errors
    ///
    /// Returns `SinkError` on persistence failure; the worker records a
    /// [`QueryStatus::SaveFailed`] and continues with the next query.
    async fn save_result(
        &self,
        result: &ResultSet,
        task: TaskId,
        query: QueryId,
    ) -> Result<(), SinkError>;

    /// Flushes and closes the sink. Called by the controlling process after
    /// the run completes, never by workers.
    ///
    /// # Errors
    ///
    /// Returns `SinkError` if teardown fails.
    async fn close(&self) -> Result<(), SinkError> {
        Ok(())
    }
}
