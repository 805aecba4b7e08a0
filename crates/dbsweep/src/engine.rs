//! Dispatch engine orchestration.
//!
//! The [`DispatchEngine`] ties the registry, pool, and barrier together:
//! bulk-insert every target from the task source, submit one worker per
//! registry entry, wait on the completion barrier, then shut the pool down
//! and report a [`RunSummary`].
//!
//! All collaborators are explicit handles passed in at construction; there
//! is no process-wide state, so multiple engines can coexist in one process
//! (and in one test).

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::info;

use crate::barrier::CompletionBarrier;
use crate::config::EngineConfig;
use crate::connector::{ConnectionParams, Connector};
use crate::error::EngineError;
use crate::metrics::{EngineMetrics, MetricsSnapshot};
use crate::pool::WorkerPool;
use crate::registry::TaskRegistry;
use crate::sink::ResultSink;
use crate::source::TaskSource;
use crate::worker::Worker;

/// Factory producing one connector handle per task at insertion time.
pub type ConnectorFactory = Arc<dyn Fn() -> Box<dyn Connector> + Send + Sync>;

/// Outcome of one engine run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// Number of targets dispatched.
    pub tasks: usize,

    /// Number of queries in the query set.
    pub queries: usize,

    /// Wall-clock duration of the run.
    pub elapsed: Duration,

    /// Final metrics snapshot.
    pub metrics: MetricsSnapshot,
}

/// Fans the query set out across all targets of a task source.
///
/// One engine drives a single run: after [`run`](Self::run) returns the pool
/// is shut down and further runs fail with [`EngineError::PoolClosed`].
pub struct DispatchEngine {
    config: EngineConfig,
    registry: Arc<TaskRegistry>,
    pool: WorkerPool,
    metrics: Arc<EngineMetrics>,
    connector_factory: ConnectorFactory,
    sink: Arc<dyn ResultSink>,
}

impl DispatchEngine {
    /// Creates an engine from explicit collaborator handles.
    #[must_use]
    pub fn new(
        config: EngineConfig,
        connector_factory: ConnectorFactory,
        sink: Arc<dyn ResultSink>,
    ) -> Self {
        let pool = WorkerPool::new(config.pool.clone());
        Self {
            config,
            registry: Arc::new(TaskRegistry::new()),
            pool,
            metrics: Arc::new(EngineMetrics::new()),
            connector_factory,
            sink,
        }
    }

    /// Returns the task registry, e.g. to inspect statuses after a run.
    #[must_use]
    pub fn registry(&self) -> &Arc<TaskRegistry> {
        &self.registry
    }

    /// Returns the worker pool.
    #[must_use]
    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// Returns a point-in-time metrics snapshot.
    #[must_use]
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Runs the full dispatch: read the source, fan out, wait, shut down.
    ///
    /// The caller remains responsible for closing the source and the sink.
    ///
    /// # Errors
    ///
    /// Returns `EngineError` when the source fails or is empty
    /// ([`EngineError::NoTasks`] / [`EngineError::NoQueries`] — fatal
    /// conditions that occur before any task is created), or when a worker
    /// cannot be submitted. Per-task failures never surface here; they are
    /// recorded in the sink as statuses.
    pub async fn run(&self, source: &mut dyn TaskSource) -> Result<RunSummary, EngineError> {
        let start = Instant::now();

        let specs = source.tasks().await?;
        if specs.is_empty() {
            return Err(EngineError::NoTasks);
        }
        let queries = Arc::new(source.queries().await?);
        if queries.is_empty() {
            return Err(EngineError::NoQueries);
        }

        info!(tasks = specs.len(), queries = queries.len(), "dispatch starting");

        for spec in specs {
            let params = ConnectionParams::new(spec.url, spec.username, spec.password);
            self.registry
                .insert(params, spec.external_id, (self.connector_factory)());
        }

        for id in self.registry.ids() {
            let mut worker = Worker::new(
                id,
                Arc::clone(&self.registry),
                Arc::clone(&queries),
                Arc::clone(&self.sink),
                Arc::clone(&self.metrics),
            );
            if let Some(deadline) = self.config.task_deadline {
                worker = worker.with_deadline(deadline);
            }
            if let Err(e) = self.pool.submit(worker).await {
                // Surface the failed submission, but don't leak runners.
                self.pool.shutdown(self.config.shutdown_grace).await;
                return Err(e);
            }
        }

        CompletionBarrier::new(Arc::clone(&self.registry), self.pool.clone())
            .with_poll_interval(self.config.poll_interval)
            .wait()
            .await;

        self.pool.shutdown(self.config.shutdown_grace).await;

        let summary = RunSummary {
            tasks: self.registry.len(),
            queries: queries.len(),
            elapsed: start.elapsed(),
            metrics: self.metrics.snapshot(),
        };
        info!(
            tasks = summary.tasks,
            ok = summary.metrics.tasks_ok,
            failed = summary.metrics.tasks_failed,
            elapsed_ms = u64::try_from(summary.elapsed.as_millis()).unwrap_or(u64::MAX),
            "dispatch complete"
        );
        Ok(summary)
    }
}

impl fmt::Debug for DispatchEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchEngine")
            .field("registry", &self.registry)
            .field("pool", &self.pool)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{queue_factory, MockConnector, RecordingSink, StaticTaskSource};

    #[tokio::test]
    async fn test_empty_task_list_is_fatal_before_any_task_exists() {
        let sink = Arc::new(RecordingSink::new());
        let engine = DispatchEngine::new(
            EngineConfig::default(),
            queue_factory(vec![]),
            sink,
        );

        let mut source = StaticTaskSource::new(vec![], vec!["Q1".into()]);
        let result = engine.run(&mut source).await;
        assert!(matches!(result, Err(EngineError::NoTasks)));
        assert!(engine.registry().is_empty());
    }

    #[tokio::test]
    async fn test_empty_query_set_is_fatal() {
        let sink = Arc::new(RecordingSink::new());
        let engine = DispatchEngine::new(
            EngineConfig::default(),
            queue_factory(vec![MockConnector::new()]),
            sink,
        );

        let mut source = StaticTaskSource::new(
            vec![crate::source::TaskSpec::new("db://host", "admin", "pw")],
            vec![],
        );
        let result = engine.run(&mut source).await;
        assert!(matches!(result, Err(EngineError::NoQueries)));
    }
}
