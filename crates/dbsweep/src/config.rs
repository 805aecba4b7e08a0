//! Engine and pool configuration.
//!
//! Plain structs with `Default` impls; loading them from files or CLI
//! arguments is the caller's concern.

use std::time::Duration;

/// Configuration for the bounded worker pool.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum number of workers that may be queued awaiting execution
    /// before submission blocks (or is rejected, for `try_submit`).
    pub max_queue_size: usize,

    /// Upper bound on simultaneously executing workers.
    pub max_running: usize,

    /// Upper bound on live runner tasks, including idle ones kept warm.
    pub max_total: usize,

    /// How long an idle runner task may live before it is reclaimed.
    pub idle_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_queue_size: 99_999,
            max_running: 25,
            max_total: 50,
            idle_timeout: Duration::from_secs(10),
        }
    }
}

/// Configuration for the dispatch engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Worker pool limits.
    pub pool: PoolConfig,

    /// Sleep interval between completion-barrier polls.
    pub poll_interval: Duration,

    /// Optional wall-clock budget for one task's whole lifecycle.
    ///
    /// When set, every connector call a worker makes is bounded by the
    /// task's deadline; a lapsed deadline is contained exactly like a
    /// connector error. When `None`, timeout enforcement is delegated
    /// entirely to the connector layer, and a connector call that hangs
    /// forever will stall the run.
    pub task_deadline: Option<Duration>,

    /// How long `shutdown` waits for in-flight workers after the barrier
    /// releases.
    pub shutdown_grace: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pool: PoolConfig::default(),
            poll_interval: Duration::from_millis(500),
            task_deadline: None,
            shutdown_grace: Duration::from_secs(2),
        }
    }
}

impl EngineConfig {
    /// Creates a config with the given pool limits and default timings.
    #[must_use]
    pub fn with_pool(pool: PoolConfig) -> Self {
        Self {
            pool,
            ..Self::default()
        }
    }
}
