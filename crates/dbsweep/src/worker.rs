//! Per-task worker lifecycle.
//!
//! A [`Worker`] carries exactly one task through connect, query execution,
//! and teardown. Every failure it encounters is converted into a status for
//! the sink; nothing escapes to sibling tasks, the pool, or the barrier.
//!
//! Lifecycle: resolve parameters, connect, run all queries in query-set
//! order, then unconditionally record the overall status, mark the task
//! finished in the registry, and release the connector handle.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::connector::{ConnectionParams, Connector};
use crate::error::ConnectorError;
use crate::metrics::EngineMetrics;
use crate::registry::{TaskId, TaskRegistry};
use crate::sink::{QueryStatus, ResultSink, TaskStatus};
use crate::source::{QueryId, QuerySet};

/// Column name under which the originating task id is stamped onto every
/// saved result.
pub const TARGET_ID_COLUMN: &str = "target_id";

/// One execution unit bound to exactly one task.
pub struct Worker {
    task_id: TaskId,
    registry: Arc<TaskRegistry>,
    queries: Arc<QuerySet>,
    sink: Arc<dyn ResultSink>,
    metrics: Arc<EngineMetrics>,
    deadline: Option<Duration>,
}

impl Worker {
    /// Creates a worker for one registered task.
    #[must_use]
    pub fn new(
        task_id: TaskId,
        registry: Arc<TaskRegistry>,
        queries: Arc<QuerySet>,
        sink: Arc<dyn ResultSink>,
        metrics: Arc<EngineMetrics>,
    ) -> Self {
        Self {
            task_id,
            registry,
            queries,
            sink,
            metrics,
            deadline: None,
        }
    }

    /// Bounds the task's whole lifecycle by a wall-clock budget.
    ///
    /// Every connector call is cut off at the deadline; a lapsed deadline is
    /// contained exactly like a connector error at the step it interrupts.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Returns the id of the task this worker is bound to.
    #[must_use]
    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    /// Runs the full lifecycle for this worker's task.
    ///
    /// Never fails: all errors end up as statuses in the sink, and the task
    /// is marked finished in the registry on every path.
    pub async fn run(self) {
        let id = self.task_id;
        let deadline = self.deadline.map(|budget| (budget, Instant::now() + budget));

        let params = match self.registry.params(id) {
            Ok(params) => params,
            Err(e) => {
                // Nothing to report against: the task was never registered.
                error!(task = %id, error = %e, "worker bound to unregistered task");
                return;
            }
        };
        let target = params.display_name().to_string();
        info!(task = %id, target = %target, "worker start");

        if let Err(e) = self.sink.prepare_target(id).await {
            warn!(task = %id, error = %e, "prepare_target failed");
        }

        let mut connector = self.registry.take_connector(id).ok().flatten();

        let status = match self.execute(&params, connector.as_deref_mut(), deadline).await {
            Ok(()) => TaskStatus::Ok,
            Err(e) => {
                warn!(task = %id, target = %target, error = %e, "task failed");
                TaskStatus::Failed(e.to_string())
            }
        };
        self.metrics.record_task(status.is_ok());

        if let Err(e) = self.sink.set_target_status(id, status).await {
            warn!(task = %id, error = %e, "set_target_status failed");
        }

        if let Err(e) = self.registry.mark_finished(id) {
            error!(task = %id, error = %e, "mark_finished failed");
        }

        if let Some(conn) = connector.as_deref_mut() {
            if let Err(e) = conn.disconnect().await {
                debug!(task = %id, error = %e, "disconnect failed");
            }
        }

        info!(task = %id, target = %target, "worker end");
    }

    /// Connects and runs all queries. Fatal errors (missing parameters,
    /// connect failure, a deadline lapsing before the connection is up)
    /// abort the task; per-query errors are recorded and skipped.
    async fn execute(
        &self,
        params: &ConnectionParams,
        connector: Option<&mut (dyn Connector + 'static)>,
        deadline: Option<(Duration, Instant)>,
    ) -> Result<(), ConnectorError> {
        if let Some(field) = params.missing_field() {
            return Err(ConnectorError::MissingParam(field));
        }

        // The registry hands the connector out exactly once; a missing
        // handle means the task was already executed.
        let Some(connector) = connector else {
            return Err(ConnectorError::Closed);
        };

        await_bounded(deadline, connector.connect(params)).await?;

        for (query_id, text) in self.queries.iter() {
            self.metrics.record_query();

            let result = match await_bounded(deadline, connector.execute(text, &[])).await {
                Ok(result) => result,
                Err(ConnectorError::ConnectionLost) => {
                    self.metrics.record_query_failure();
                    self.report_query(query_id, QueryStatus::ConnectionInterrupted)
                        .await;
                    continue;
                }
                Err(e) => {
                    self.metrics.record_query_failure();
                    self.report_query(query_id, QueryStatus::Failed(e.to_string()))
                        .await;
                    continue;
                }
            };

            if result.is_empty() {
                debug!(task = %self.task_id, query = %query_id, "no rows in result");
                self.metrics.record_empty_result();
                self.report_query(query_id, QueryStatus::EmptyResult).await;
                continue;
            }

            let stamped =
                result.with_leading_column(TARGET_ID_COLUMN, Value::from(self.task_id.get()));
            match self.sink.save_result(&stamped, self.task_id, query_id).await {
                Ok(()) => self.metrics.record_saved_rows(stamped.num_rows() as u64),
                Err(e) => {
                    warn!(task = %self.task_id, query = %query_id, error = %e, "save_result failed");
                    self.metrics.record_save_failure();
                    self.report_query(query_id, QueryStatus::SaveFailed(e.to_string()))
                        .await;
                }
            }
        }

        Ok(())
    }

    async fn report_query(&self, query_id: QueryId, status: QueryStatus) {
        if let Err(e) = self
            .sink
            .set_query_status(self.task_id, query_id, status)
            .await
        {
            warn!(task = %self.task_id, query = %query_id, error = %e, "set_query_status failed");
        }
    }
}

impl fmt::Debug for Worker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Worker")
            .field("task_id", &self.task_id)
            .finish_non_exhaustive()
    }
}

/// Awaits a connector call, cut off at the task deadline when one is set.
async fn await_bounded<T>(
    deadline: Option<(Duration, Instant)>,
    fut: impl Future<Output = Result<T, ConnectorError>>,
) -> Result<T, ConnectorError> {
    match deadline {
        Some((budget, at)) => match tokio::time::timeout_at(at, fut).await {
            Ok(result) => result,
            Err(_) => Err(ConnectorError::Timeout(
                u64::try_from(budget.as_millis()).unwrap_or(u64::MAX),
            )),
        },
        None => fut.await,
    }
}
