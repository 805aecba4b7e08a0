//! Connector trait, connection parameters, and tabular results.
//!
//! A [`Connector`] owns all network/protocol/auth detail for one remote
//! target. The engine never interprets connection parameters or query text;
//! it only routes them and collects [`ResultSet`]s.

use std::fmt;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::ConnectorError;

/// Connection parameters for one remote target.
///
/// All fields are trimmed on construction; the engine treats an empty field
/// as absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionParams {
    /// Connect descriptor or URL understood by the connector.
    pub url: String,

    /// Login user.
    pub username: String,

    /// Login password.
    pub password: String,
}

impl ConnectionParams {
    /// Creates trimmed connection parameters.
    #[must_use]
    pub fn new(
        url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into().trim().to_string(),
            username: username.into().trim().to_string(),
            password: password.into().trim().to_string(),
        }
    }

    /// Returns the name of the first missing (empty) parameter, if any.
    #[must_use]
    pub fn missing_field(&self) -> Option<&'static str> {
        if self.url.is_empty() {
            Some("url")
        } else if self.username.is_empty() {
            Some("username")
        } else if self.password.is_empty() {
            Some("password")
        } else {
            None
        }
    }

    /// Derives a short human-readable label for log lines.
    ///
    /// Strips any scheme and credentials and cuts at the first path or
    /// query separator, so `postgres://admin@db-3.internal:5432/sales`
    /// becomes `db-3.internal:5432`. Falls back to the full url when no
    /// structure is recognized.
    #[must_use]
    pub fn display_name(&self) -> &str {
        let mut name = self.url.as_str();
        if let Some(idx) = name.find("://") {
            name = &name[idx + 3..];
        }
        if let Some(idx) = name.rfind('@') {
            name = &name[idx + 1..];
        }
        if let Some(idx) = name.find(['/', '?']) {
            name = &name[..idx];
        }
        if name.is_empty() {
            self.url.as_str()
        } else {
            name
        }
    }
}

impl fmt::Display for ConnectionParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never renders the password.
        write!(f, "{}@{}", self.username, self.display_name())
    }
}

/// One result row; cells are JSON values so sinks can persist arbitrary
/// tabular data.
pub type Row = Vec<Value>;

/// A tabular query result.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultSet {
    /// Column names, in result order.
    pub columns: Vec<String>,

    /// Result rows; every row has `columns.len()` cells.
    pub rows: Vec<Row>,
}

impl ResultSet {
    /// Creates an empty result set with the given columns.
    #[must_use]
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Appends a row.
    pub fn push_row(&mut self, row: Row) {
        self.rows.push(row);
    }

    /// Returns the number of rows.
    #[must_use]
    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    /// Returns `true` if the result has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Returns a copy with an extra leading column set to `value` on every
    /// row.
    ///
    /// Workers use this to stamp the originating target id onto results
    /// before they reach the sink, so rows from many targets can share one
    /// output.
    #[must_use]
    pub fn with_leading_column(&self, name: impl Into<String>, value: Value) -> Self {
        let mut columns = Vec::with_capacity(self.columns.len() + 1);
        columns.push(name.into());
        columns.extend(self.columns.iter().cloned());

        let rows = self
            .rows
            .iter()
            .map(|row| {
                let mut out = Vec::with_capacity(row.len() + 1);
                out.push(value.clone());
                out.extend(row.iter().cloned());
                out
            })
            .collect();

        Self { columns, rows }
    }
}

/// Opens a connection to one remote target and executes queries against it.
///
/// # Lifecycle
///
/// 1. `connect()` - Establish the connection
/// 2. `execute()` - Run queries, any number of times
/// 3. `disconnect()` - Clean shutdown; must be safe to call when the
///    connection was never established
///
/// Implementations own every protocol detail, including authentication and
/// any connector-level timeouts. Failure with no underlying cause (the
/// connection silently went away) is reported as
/// [`ConnectorError::ConnectionLost`].
#[async_trait]
pub trait Connector: Send {
    /// Connects to the target.
    ///
    /// # Errors
    ///
    /// Returns `ConnectorError` if the connection cannot be established.
    async fn connect(&mut self, params: &ConnectionParams) -> Result<(), ConnectorError>;

    /// Executes one query with bound parameters and returns its rows.
    ///
    /// # Errors
    ///
    /// Returns `ConnectorError` on execution failure;
    /// [`ConnectorError::ConnectionLost`] when the connection went away
    /// without a captured cause.
    async fn execute(&mut self, query: &str, binds: &[Value]) -> Result<ResultSet, ConnectorError>;

    /// Closes the connection and releases all resources.
    ///
    /// # Errors
    ///
    /// Returns `ConnectorError` if cleanup fails; callers log and continue.
    async fn disconnect(&mut self) -> Result<(), ConnectorError>;

    /// Returns `true` while a connection is established.
    fn is_connected(&self) -> bool;
}
