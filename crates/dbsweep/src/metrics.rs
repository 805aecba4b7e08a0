//! Engine metrics counters.
//!
//! Maintained by workers as they execute, read by the engine for the run
//! summary and by tests. All counters are relaxed atomics; exactness across
//! a snapshot taken mid-run is not guaranteed or needed.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters tracked across one engine run.
#[derive(Debug, Default)]
pub struct EngineMetrics {
    /// Tasks that reached their finished state.
    pub tasks_finished: AtomicU64,

    /// Tasks that finished with an `OK` overall status.
    pub tasks_ok: AtomicU64,

    /// Tasks that finished with a failure status.
    pub tasks_failed: AtomicU64,

    /// Queries handed to a connector.
    pub queries_executed: AtomicU64,

    /// Queries that failed (execution error or interrupted connection).
    pub queries_failed: AtomicU64,

    /// Queries that succeeded with zero rows.
    pub empty_results: AtomicU64,

    /// Result rows handed to the sink and persisted.
    pub rows_saved: AtomicU64,

    /// Sink persistence failures.
    pub save_failures: AtomicU64,
}

impl EngineMetrics {
    /// Creates zeroed metrics.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a finished task.
    pub fn record_task(&self, ok: bool) {
        self.tasks_finished.fetch_add(1, Ordering::Relaxed);
        if ok {
            self.tasks_ok.fetch_add(1, Ordering::Relaxed);
        } else {
            self.tasks_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Records a query handed to a connector.
    pub fn record_query(&self) {
        self.queries_executed.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a failed query.
    pub fn record_query_failure(&self) {
        self.queries_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Records an empty result.
    pub fn record_empty_result(&self) {
        self.empty_results.fetch_add(1, Ordering::Relaxed);
    }

    /// Records rows persisted by the sink.
    pub fn record_saved_rows(&self, rows: u64) {
        self.rows_saved.fetch_add(rows, Ordering::Relaxed);
    }

    /// Records a sink persistence failure.
    pub fn record_save_failure(&self) {
        self.save_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns a point-in-time snapshot.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            tasks_finished: self.tasks_finished.load(Ordering::Relaxed),
            tasks_ok: self.tasks_ok.load(Ordering::Relaxed),
            tasks_failed: self.tasks_failed.load(Ordering::Relaxed),
            queries_executed: self.queries_executed.load(Ordering::Relaxed),
            queries_failed: self.queries_failed.load(Ordering::Relaxed),
            empty_results: self.empty_results.load(Ordering::Relaxed),
            rows_saved: self.rows_saved.load(Ordering::Relaxed),
            save_failures: self.save_failures.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time snapshot of [`EngineMetrics`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Tasks that reached their finished state.
    pub tasks_finished: u64,

    /// Tasks that finished with an `OK` overall status.
    pub tasks_ok: u64,

    /// Tasks that finished with a failure status.
    pub tasks_failed: u64,

    /// Queries handed to a connector.
    pub queries_executed: u64,

    /// Queries that failed.
    pub queries_failed: u64,

    /// Queries that succeeded with zero rows.
    pub empty_results: u64,

    /// Result rows persisted.
    pub rows_saved: u64,

    /// Sink persistence failures.
    pub save_failures: u64,
}
