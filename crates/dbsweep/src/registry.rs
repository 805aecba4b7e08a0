//! Thread-safe task registry.
//!
//! The [`TaskRegistry`] is the single source of truth for connection
//! parameters and live status. It is shared across arbitrarily many
//! concurrent workers plus the completion barrier's poller.
//!
//! Records are append-only for the duration of a run and addressed by
//! sequential 1-based [`TaskId`]s, so traversal is a plain bounded-range
//! walk. Each record sits behind its own mutex: operations on different ids
//! run fully in parallel, operations on the same id are linearizable.

use std::fmt;
use std::time::Instant;

use parking_lot::{Mutex, RwLock};

use crate::connector::{ConnectionParams, Connector};
use crate::error::EngineError;

/// Identifier of one task (one target) within a registry.
///
/// Sequential from 1, unique, assigned at insertion, stable for the record's
/// lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

impl TaskId {
    /// Creates a task id.
    #[must_use]
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw id.
    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }

    fn index(self) -> Option<usize> {
        (self.0 as usize).checked_sub(1)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One task's record: connection parameters, correlation id, the lazily
/// connected connector handle, and the finished flag.
struct TaskRecord {
    external_id: u64,
    params: ConnectionParams,
    connector: Option<Box<dyn Connector>>,
    finished: bool,
    last_update: Instant,
}

impl TaskRecord {
    fn touch(&mut self) {
        self.last_update = Instant::now();
    }
}

/// Thread-safe, append-only store of all task records.
#[derive(Default)]
pub struct TaskRegistry {
    records: RwLock<Vec<Mutex<TaskRecord>>>,
}

impl TaskRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a task record and returns its id.
    ///
    /// Id allocation is atomic: no two calls ever receive the same id, even
    /// under concurrent invocation. The connector handle is owned by the
    /// record until the owning worker takes it.
    pub fn insert(
        &self,
        params: ConnectionParams,
        external_id: Option<u64>,
        connector: Box<dyn Connector>,
    ) -> TaskId {
        let mut records = self.records.write();
        let id = TaskId::new(records.len() as u64 + 1);
        records.push(Mutex::new(TaskRecord {
            external_id: external_id.unwrap_or(id.get()),
            params,
            connector: Some(connector),
            finished: false,
            last_update: Instant::now(),
        }));
        id
    }

    fn with_record<T>(
        &self,
        id: TaskId,
        f: impl FnOnce(&mut TaskRecord) -> T,
    ) -> Result<T, EngineError> {
        let records = self.records.read();
        let slot = id
            .index()
            .and_then(|idx| records.get(idx))
            .ok_or(EngineError::UnknownTask(id))?;
        let mut record = slot.lock();
        Ok(f(&mut record))
    }

    /// Returns a task's connection parameters.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::UnknownTask`] for an unregistered id.
    pub fn params(&self, id: TaskId) -> Result<ConnectionParams, EngineError> {
        self.with_record(id, |rec| rec.params.clone())
    }

    /// Replaces a task's connection parameters (re-trimmed on write).
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::UnknownTask`] for an unregistered id.
    pub fn set_params(&self, id: TaskId, params: ConnectionParams) -> Result<(), EngineError> {
        self.with_record(id, |rec| {
            rec.params =
                ConnectionParams::new(params.url, params.username, params.password);
            rec.touch();
        })
    }

    /// Returns a task's external correlation id.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::UnknownTask`] for an unregistered id.
    pub fn external_id(&self, id: TaskId) -> Result<u64, EngineError> {
        self.with_record(id, |rec| rec.external_id)
    }

    /// Takes ownership of a task's connector handle.
    ///
    /// Only the owning worker calls this; a second call returns `None`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::UnknownTask`] for an unregistered id.
    pub fn take_connector(&self, id: TaskId) -> Result<Option<Box<dyn Connector>>, EngineError> {
        self.with_record(id, |rec| {
            rec.touch();
            rec.connector.take()
        })
    }

    /// Returns whether a task has finished.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::UnknownTask`] for an unregistered id.
    pub fn is_finished(&self, id: TaskId) -> Result<bool, EngineError> {
        self.with_record(id, |rec| rec.finished)
    }

    /// Marks a task finished.
    ///
    /// The transition is one-way: once set, `finished` never reverts, and
    /// repeated calls are no-ops.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::UnknownTask`] for an unregistered id.
    pub fn mark_finished(&self, id: TaskId) -> Result<(), EngineError> {
        self.with_record(id, |rec| {
            if !rec.finished {
                rec.finished = true;
                rec.touch();
            }
        })
    }

    /// Returns the instant of a task's most recent mutation.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::UnknownTask`] for an unregistered id.
    pub fn last_update(&self, id: TaskId) -> Result<Instant, EngineError> {
        self.with_record(id, |rec| rec.last_update)
    }

    /// Returns `true` only if every registered task has finished.
    ///
    /// Each record is read under its own lock, so a concurrent writer can
    /// never be observed half-way through an update.
    #[must_use]
    pub fn is_all_finished(&self) -> bool {
        let records = self.records.read();
        records.iter().all(|slot| slot.lock().finished)
    }

    /// Returns the number of finished tasks.
    #[must_use]
    pub fn finished_count(&self) -> usize {
        let records = self.records.read();
        records.iter().filter(|slot| slot.lock().finished).count()
    }

    /// Returns the number of registered tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Returns `true` if no tasks are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Returns all task ids in insertion order.
    #[must_use]
    pub fn ids(&self) -> Vec<TaskId> {
        (1..=self.len() as u64).map(TaskId::new).collect()
    }
}

impl fmt::Debug for TaskRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskRegistry")
            .field("tasks", &self.len())
            .field("finished", &self.finished_count())
            .finish()
    }
}
