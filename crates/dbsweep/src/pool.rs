//! Bounded worker pool.
//!
//! The [`WorkerPool`] decouples "task submitted" from "task running": an
//! arbitrarily large backlog queues behind a bounded channel while at most
//! `max_running` workers execute at once. Runner tasks are spawned lazily up
//! to `max_total` and reclaimed after `idle_timeout` without work.
//!
//! Dispatch is FIFO in submission order; nothing is guaranteed about the
//! order in which tasks *complete*.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::{timeout, timeout_at, Instant};
use tracing::{debug, error, info};

use crate::config::PoolConfig;
use crate::error::EngineError;
use crate::worker::Worker;

/// Bounded pool of concurrently executing workers.
///
/// Cheap to clone; all clones share the same pool.
#[derive(Clone)]
pub struct WorkerPool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    config: PoolConfig,
    intake: parking_lot::Mutex<Option<mpsc::Sender<Worker>>>,
    queue: tokio::sync::Mutex<mpsc::Receiver<Worker>>,
    running: Arc<Semaphore>,
    active: AtomicUsize,
    queued: AtomicUsize,
    live: AtomicUsize,
    idle: AtomicUsize,
    closed: AtomicBool,
    runners: parking_lot::Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    /// Creates a pool with the given limits. No runner tasks are spawned
    /// until work arrives.
    #[must_use]
    pub fn new(config: PoolConfig) -> Self {
        let (tx, rx) = mpsc::channel(config.max_queue_size.max(1));
        Self {
            inner: Arc::new(PoolInner {
                running: Arc::new(Semaphore::new(config.max_running.max(1))),
                config,
                intake: parking_lot::Mutex::new(Some(tx)),
                queue: tokio::sync::Mutex::new(rx),
                active: AtomicUsize::new(0),
                queued: AtomicUsize::new(0),
                live: AtomicUsize::new(0),
                idle: AtomicUsize::new(0),
                closed: AtomicBool::new(false),
                runners: parking_lot::Mutex::new(Vec::new()),
            }),
        }
    }

    /// Enqueues a worker, waiting for queue capacity when the backlog is
    /// saturated.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::PoolClosed`] after `shutdown`.
    pub async fn submit(&self, worker: Worker) -> Result<(), EngineError> {
        let tx = self
            .inner
            .intake
            .lock()
            .clone()
            .ok_or(EngineError::PoolClosed)?;

        self.inner.queued.fetch_add(1, Ordering::Relaxed);
        if tx.send(worker).await.is_err() {
            self.inner.queued.fetch_sub(1, Ordering::Relaxed);
            return Err(EngineError::PoolClosed);
        }
        PoolInner::spawn_runner_if_needed(&self.inner);
        Ok(())
    }

    /// Enqueues a worker without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::QueueFull`] when the backlog is saturated and
    /// [`EngineError::PoolClosed`] after `shutdown`. Either way the caller
    /// keeps the rejection; nothing is silently dropped.
    pub fn try_submit(&self, worker: Worker) -> Result<(), EngineError> {
        let tx = self
            .inner
            .intake
            .lock()
            .clone()
            .ok_or(EngineError::PoolClosed)?;

        self.inner.queued.fetch_add(1, Ordering::Relaxed);
        match tx.try_send(worker) {
            Ok(()) => {
                PoolInner::spawn_runner_if_needed(&self.inner);
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.inner.queued.fetch_sub(1, Ordering::Relaxed);
                Err(EngineError::QueueFull)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.inner.queued.fetch_sub(1, Ordering::Relaxed);
                Err(EngineError::PoolClosed)
            }
        }
    }

    /// Returns the number of workers currently executing (not queued).
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.inner.active.load(Ordering::Relaxed)
    }

    /// Returns the number of workers queued awaiting execution.
    #[must_use]
    pub fn queued_count(&self) -> usize {
        self.inner.queued.load(Ordering::Relaxed)
    }

    /// Returns `true` once `shutdown` has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Relaxed)
    }

    /// Stops accepting submissions, lets queued and in-flight workers run
    /// for up to `grace`, then reclaims the runner tasks.
    ///
    /// A worker still executing when `grace` lapses keeps running detached;
    /// only the pool's bookkeeping is reclaimed. Callers that need all work
    /// accounted for wait on the completion barrier before shutting down.
    pub async fn shutdown(&self, grace: Duration) {
        self.inner.closed.store(true, Ordering::Relaxed);
        // Dropping the sender closes intake; runners drain the backlog and
        // then observe the closed channel.
        self.inner.intake.lock().take();

        let mut handles: Vec<JoinHandle<()>> = self.inner.runners.lock().drain(..).collect();
        let deadline = Instant::now() + grace;
        for handle in &mut handles {
            if handle.is_finished() {
                continue;
            }
            if Instant::now() >= deadline || timeout_at(deadline, &mut *handle).await.is_err() {
                handle.abort();
            }
        }
        info!("pool shut down");
    }
}

impl PoolInner {
    /// Spawns a runner when there is no idle runner to pick up new work and
    /// the live-runner budget allows one more.
    fn spawn_runner_if_needed(inner: &Arc<PoolInner>) {
        if inner.closed.load(Ordering::Relaxed) || inner.idle.load(Ordering::Relaxed) > 0 {
            return;
        }
        let reserved = inner
            .live
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| {
                (n < inner.config.max_total).then_some(n + 1)
            });
        if reserved.is_err() {
            return;
        }

        let handle = tokio::spawn(runner_loop(Arc::clone(inner)));
        inner.runners.lock().push(handle);
    }
}

/// One runner task: dequeue, acquire an execution permit, run the worker,
/// repeat; exit when idle for `idle_timeout` or when intake is closed and
/// the backlog is drained.
async fn runner_loop(inner: Arc<PoolInner>) {
    debug!("runner started");
    loop {
        inner.idle.fetch_add(1, Ordering::Relaxed);
        let received = {
            let mut queue = inner.queue.lock().await;
            timeout(inner.config.idle_timeout, queue.recv()).await
        };
        inner.idle.fetch_sub(1, Ordering::Relaxed);

        match received {
            Ok(Some(worker)) => {
                inner.queued.fetch_sub(1, Ordering::Relaxed);
                let Ok(permit) = Arc::clone(&inner.running).acquire_owned().await else {
                    break;
                };
                let task_id = worker.task_id();
                inner.active.fetch_add(1, Ordering::Relaxed);
                // The worker runs in its own task so a panicking collaborator
                // cannot corrupt the pool's bookkeeping.
                let result = tokio::spawn(worker.run()).await;
                inner.active.fetch_sub(1, Ordering::Relaxed);
                drop(permit);
                if let Err(e) = result {
                    error!(task = %task_id, error = %e, "worker panicked");
                }
            }
            Ok(None) => break,
            Err(_) => {
                // Idle timeout. Work submitted in this instant is picked up
                // by a fresh runner below.
                break;
            }
        }
    }
    inner.live.fetch_sub(1, Ordering::Relaxed);
    if inner.queued.load(Ordering::Relaxed) > 0 {
        PoolInner::spawn_runner_if_needed(&inner);
    }
    debug!("runner reclaimed");
}

impl fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPool")
            .field("active", &self.active_count())
            .field("queued", &self.queued_count())
            .field("closed", &self.is_closed())
            .finish()
    }
}
