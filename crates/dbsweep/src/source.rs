//! Task source trait and query definitions.
//!
//! A [`TaskSource`] supplies the initial list of targets and the ordered set
//! of queries to run on every target. Whether it is backed by a file, a
//! database, or test fixtures is irrelevant to the engine.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::SourceError;

/// One target as supplied by a task source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSpec {
    /// Connect descriptor or URL.
    pub url: String,

    /// Login user.
    pub username: String,

    /// Login password.
    pub password: String,

    /// Caller-side correlation id, e.g. the primary key of the target's row
    /// in an unrelated schema. Defaults to the registry-assigned id when
    /// absent.
    pub external_id: Option<u64>,
}

impl TaskSpec {
    /// Creates a spec without an external id.
    #[must_use]
    pub fn new(
        url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            username: username.into(),
            password: password.into(),
            external_id: None,
        }
    }

    /// Sets the external correlation id.
    #[must_use]
    pub fn with_external_id(mut self, external_id: u64) -> Self {
        self.external_id = Some(external_id);
        self
    }
}

/// Identifier of one query within a [`QuerySet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryId(u64);

impl QueryId {
    /// Creates a query id.
    #[must_use]
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw id.
    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for QueryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Immutable, ordered set of query definitions.
///
/// Ids are sequential from 1 in insertion order, and insertion order is the
/// execution order on every target. Shared read-only across all workers.
#[derive(Debug, Clone, Default)]
pub struct QuerySet {
    entries: Vec<(QueryId, String)>,
}

impl QuerySet {
    /// Creates an empty query set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a query set from texts, assigning sequential ids from 1.
    #[must_use]
    pub fn from_texts<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set = Self::new();
        for text in texts {
            set.add(text);
        }
        set
    }

    /// Appends a query and returns its assigned id.
    pub fn add(&mut self, text: impl Into<String>) -> QueryId {
        let id = QueryId::new(self.entries.len() as u64 + 1);
        self.entries.push((id, text.into()));
        id
    }

    /// Returns the query text for an id.
    #[must_use]
    pub fn get(&self, id: QueryId) -> Option<&str> {
        self.entries
            .iter()
            .find(|(qid, _)| *qid == id)
            .map(|(_, text)| text.as_str())
    }

    /// Iterates queries in execution order.
    pub fn iter(&self) -> impl Iterator<Item = (QueryId, &str)> {
        self.entries.iter().map(|(id, text)| (*id, text.as_str()))
    }

    /// Returns the number of queries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the set holds no queries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Supplies the target list and the query set for one run.
#[async_trait]
pub trait TaskSource: Send {
    /// Returns the targets to dispatch to.
    ///
    /// # Errors
    ///
    /// Returns `SourceError` if the backing store cannot be read.
    async fn tasks(&mut self) -> Result<Vec<TaskSpec>, SourceError>;

    /// Returns the queries to execute on every target, in execution order.
    ///
    /// # Errors
    ///
    /// Returns `SourceError` if the backing store cannot be read.
    async fn queries(&mut self) -> Result<QuerySet, SourceError>;
}
