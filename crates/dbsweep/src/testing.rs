//! Testing utilities.
//!
//! Provides mock collaborators for testing the engine and for writing tests
//! against code that embeds it: a scriptable [`MockConnector`], an in-memory
//! [`StaticTaskSource`], and a [`RecordingSink`] that captures everything
//! workers report.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::Semaphore;

use crate::connector::{ConnectionParams, Connector, ResultSet};
use crate::engine::ConnectorFactory;
use crate::error::{ConnectorError, SinkError, SourceError};
use crate::registry::TaskId;
use crate::sink::{QueryStatus, ResultSink, TaskStatus};
use crate::source::{QueryId, QuerySet, TaskSource, TaskSpec};

/// Creates a result set with `n` rows and `id`/`value` columns.
#[must_use]
pub fn mock_result(n: usize) -> ResultSet {
    let mut result = ResultSet::new(vec!["id".into(), "value".into()]);
    for i in 0..n {
        result.push_row(vec![json!(i), json!(format!("value_{i}"))]);
    }
    result
}

/// Scriptable connector for tests.
///
/// By default every connect succeeds and every query returns one row.
/// Behaviors are layered on with builder methods: scripted per-query
/// responses (consumed once each), connect failures, artificial delays,
/// and a semaphore gate that holds `connect` open until the test releases
/// permits.
pub struct MockConnector {
    connect_error: Option<String>,
    responses: HashMap<String, Result<ResultSet, ConnectorError>>,
    recorder: Arc<Mutex<Vec<String>>>,
    connects: Arc<AtomicU64>,
    connected: bool,
    gate: Option<Arc<Semaphore>>,
    connect_delay: Option<Duration>,
    execute_delay: Option<Duration>,
    disconnect_delay: Option<Duration>,
}

impl MockConnector {
    /// Creates a connector that succeeds at everything.
    #[must_use]
    pub fn new() -> Self {
        Self {
            connect_error: None,
            responses: HashMap::new(),
            recorder: Arc::new(Mutex::new(Vec::new())),
            connects: Arc::new(AtomicU64::new(0)),
            connected: false,
            gate: None,
            connect_delay: None,
            execute_delay: None,
            disconnect_delay: None,
        }
    }

    /// Makes every connect attempt fail with the given message.
    #[must_use]
    pub fn fail_connect(mut self, msg: impl Into<String>) -> Self {
        self.connect_error = Some(msg.into());
        self
    }

    /// Scripts the response for one query text (consumed on first use).
    #[must_use]
    pub fn respond(mut self, query: impl Into<String>, result: ResultSet) -> Self {
        self.responses.insert(query.into(), Ok(result));
        self
    }

    /// Scripts an error response for one query text (consumed on first use).
    #[must_use]
    pub fn respond_err(mut self, query: impl Into<String>, err: ConnectorError) -> Self {
        self.responses.insert(query.into(), Err(err));
        self
    }

    /// Holds `connect` open until the test adds permits to the semaphore.
    #[must_use]
    pub fn with_gate(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Sleeps this long inside `connect`.
    #[must_use]
    pub fn with_connect_delay(mut self, delay: Duration) -> Self {
        self.connect_delay = Some(delay);
        self
    }

    /// Sleeps this long inside every `execute`.
    #[must_use]
    pub fn with_execute_delay(mut self, delay: Duration) -> Self {
        self.execute_delay = Some(delay);
        self
    }

    /// Sleeps this long inside `disconnect`.
    #[must_use]
    pub fn with_disconnect_delay(mut self, delay: Duration) -> Self {
        self.disconnect_delay = Some(delay);
        self
    }

    /// Shares an execution recorder, e.g. across the connectors of several
    /// tasks to observe cross-task dispatch order.
    #[must_use]
    pub fn share_recorder(mut self, recorder: Arc<Mutex<Vec<String>>>) -> Self {
        self.recorder = recorder;
        self
    }

    /// Returns the recorder capturing executed query texts in order.
    #[must_use]
    pub fn recorder(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.recorder)
    }

    /// Returns the counter of connect attempts.
    #[must_use]
    pub fn connect_count(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.connects)
    }
}

impl Default for MockConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&mut self, _params: &ConnectionParams) -> Result<(), ConnectorError> {
        self.connects.fetch_add(1, Ordering::Relaxed);

        if let Some(gate) = &self.gate {
            let permit = gate
                .acquire()
                .await
                .map_err(|_| ConnectorError::Closed)?;
            permit.forget();
        }
        if let Some(delay) = self.connect_delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(msg) = &self.connect_error {
            return Err(ConnectorError::ConnectionFailed(msg.clone()));
        }
        self.connected = true;
        Ok(())
    }

    async fn execute(
        &mut self,
        query: &str,
        _binds: &[serde_json::Value],
    ) -> Result<ResultSet, ConnectorError> {
        if !self.connected {
            return Err(ConnectorError::ConnectionLost);
        }
        self.recorder.lock().push(query.to_string());
        if let Some(delay) = self.execute_delay {
            tokio::time::sleep(delay).await;
        }
        match self.responses.remove(query) {
            Some(response) => response,
            None => Ok(mock_result(1)),
        }
    }

    async fn disconnect(&mut self) -> Result<(), ConnectorError> {
        if let Some(delay) = self.disconnect_delay {
            tokio::time::sleep(delay).await;
        }
        self.connected = false;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

/// Builds a connector factory that hands out the given connectors in order.
///
/// Connector `i` goes to the `i`-th inserted task, which makes per-task
/// scripting deterministic.
///
/// # Panics
///
/// The returned factory panics when called more times than connectors were
/// supplied.
#[must_use]
pub fn queue_factory(connectors: Vec<MockConnector>) -> ConnectorFactory {
    let queue = Mutex::new(VecDeque::from(connectors));
    Arc::new(move || -> Box<dyn Connector> {
        Box::new(
            queue
                .lock()
                .pop_front()
                .expect("queue_factory ran out of scripted connectors"),
        )
    })
}

/// In-memory task source with fixed targets and query texts.
#[derive(Debug, Clone)]
pub struct StaticTaskSource {
    tasks: Vec<TaskSpec>,
    queries: Vec<String>,
}

impl StaticTaskSource {
    /// Creates a source from fixed targets and query texts.
    #[must_use]
    pub fn new(tasks: Vec<TaskSpec>, queries: Vec<String>) -> Self {
        Self { tasks, queries }
    }
}

#[async_trait]
impl TaskSource for StaticTaskSource {
    async fn tasks(&mut self) -> Result<Vec<TaskSpec>, SourceError> {
        Ok(self.tasks.clone())
    }

    async fn queries(&mut self) -> Result<QuerySet, SourceError> {
        Ok(QuerySet::from_texts(self.queries.iter().cloned()))
    }
}

/// Sink that records everything in memory for assertions.
#[derive(Debug, Default)]
pub struct RecordingSink {
    prepared: Mutex<Vec<TaskId>>,
    target_statuses: Mutex<HashMap<TaskId, TaskStatus>>,
    query_statuses: Mutex<Vec<(TaskId, QueryId, QueryStatus)>>,
    saved: Mutex<Vec<(TaskId, QueryId, ResultSet)>>,
    fail_saves: bool,
}

impl RecordingSink {
    /// Creates an empty recording sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every `save_result` call fail.
    #[must_use]
    pub fn failing_saves(mut self) -> Self {
        self.fail_saves = true;
        self
    }

    /// Returns whether `prepare_target` was called for a task.
    #[must_use]
    pub fn prepared(&self, task: TaskId) -> bool {
        self.prepared.lock().contains(&task)
    }

    /// Returns a task's recorded overall status, if any.
    #[must_use]
    pub fn target_status(&self, task: TaskId) -> Option<TaskStatus> {
        self.target_statuses.lock().get(&task).cloned()
    }

    /// Returns the per-query statuses recorded for a task, in order.
    #[must_use]
    pub fn query_statuses(&self, task: TaskId) -> Vec<(QueryId, QueryStatus)> {
        self.query_statuses
            .lock()
            .iter()
            .filter(|(t, _, _)| *t == task)
            .map(|(_, q, s)| (*q, s.clone()))
            .collect()
    }

    /// Returns the results saved for a task, in order.
    #[must_use]
    pub fn saved(&self, task: TaskId) -> Vec<(QueryId, ResultSet)> {
        self.saved
            .lock()
            .iter()
            .filter(|(t, _, _)| *t == task)
            .map(|(_, q, r)| (*q, r.clone()))
            .collect()
    }

    /// Returns the total number of saved results across all tasks.
    #[must_use]
    pub fn saved_total(&self) -> usize {
        self.saved.lock().len()
    }
}

#[async_trait]
impl ResultSink for RecordingSink {
    async fn prepare_target(&self, task: TaskId) -> Result<(), SinkError> {
        self.prepared.lock().push(task);
        Ok(())
    }

    async fn set_target_status(&self, task: TaskId, status: TaskStatus) -> Result<(), SinkError> {
        self.target_statuses.lock().insert(task, status);
        Ok(())
    }

    async fn set_query_status(
        &self,
        task: TaskId,
        query: QueryId,
        status: QueryStatus,
    ) -> Result<(), SinkError> {
        self.query_statuses.lock().push((task, query, status));
        Ok(())
    }

    async fn save_result(
        &self,
        result: &ResultSet,
        task: TaskId,
        query: QueryId,
    ) -> Result<(), SinkError> {
        if self.fail_saves {
            return Err(SinkError::new("sink write rejected"));
        }
        self.saved.lock().push((task, query, result.clone()));
        Ok(())
    }
}
