//! Completion barrier.
//!
//! The [`CompletionBarrier`] lets the controlling process block until all
//! work is done without busy-spinning: it polls on a fixed interval until
//! the registry reports every task finished *and* the pool reports zero
//! active workers.
//!
//! The conjunction matters: a worker marks its task finished in the registry
//! strictly before the pool's active count decrements, so either condition
//! alone can be observed one scheduling tick early.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tracing::debug;

use crate::pool::WorkerPool;
use crate::registry::TaskRegistry;

/// Default sleep interval between completion polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Blocks the caller until the registry and pool agree that no work is in
/// flight.
///
/// The barrier supports no cancellation: `wait` blocks until the condition
/// holds. If a connector call can hang forever and no task deadline is
/// configured, the barrier hangs with it.
#[derive(Debug, Clone)]
pub struct CompletionBarrier {
    registry: Arc<TaskRegistry>,
    pool: WorkerPool,
    poll_interval: Duration,
}

impl CompletionBarrier {
    /// Creates a barrier over a registry and pool with the default poll
    /// interval.
    #[must_use]
    pub fn new(registry: Arc<TaskRegistry>, pool: WorkerPool) -> Self {
        Self {
            registry,
            pool,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Overrides the poll interval.
    #[must_use]
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Returns `true` when every task is finished and no worker is active.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.registry.is_all_finished() && self.pool.active_count() == 0
    }

    /// Blocks until [`is_complete`](Self::is_complete) holds.
    pub async fn wait(&self) {
        loop {
            if self.is_complete() {
                return;
            }
            debug!(
                finished = self.registry.finished_count(),
                total = self.registry.len(),
                active = self.pool.active_count(),
                "waiting for completion"
            );
            sleep(self.poll_interval).await;
        }
    }
}
