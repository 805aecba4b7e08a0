//! CSV-backed task source and result sink.
//!
//! [`CsvTaskSource`] reads targets from a `url,username,password` file;
//! [`CsvResultSink`] appends saved result rows to an output file, writing
//! the column headline once and buffering non-OK target statuses until
//! `close`.

use std::fs::File;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::debug;

use crate::connector::ResultSet;
use crate::error::{SinkError, SourceError};
use crate::registry::TaskId;
use crate::sink::{QueryStatus, ResultSink, TaskStatus};
use crate::source::{QueryId, QuerySet, TaskSource, TaskSpec};

/// Reads targets from a CSV file of `url,username,password` rows.
///
/// Rows with a different field count are skipped with a debug log; the
/// queries are supplied programmatically.
#[derive(Debug, Clone)]
pub struct CsvTaskSource {
    path: PathBuf,
    delimiter: u8,
    queries: QuerySet,
}

impl CsvTaskSource {
    /// Creates a source reading from `path` with a `,` delimiter.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, queries: QuerySet) -> Self {
        Self {
            path: path.into(),
            delimiter: b',',
            queries,
        }
    }

    /// Overrides the field delimiter.
    #[must_use]
    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }
}

#[async_trait]
impl TaskSource for CsvTaskSource {
    async fn tasks(&mut self) -> Result<Vec<TaskSpec>, SourceError> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(self.delimiter)
            .has_headers(false)
            .flexible(true)
            .from_path(&self.path)?;

        let mut specs = Vec::new();
        for (line, record) in reader.records().enumerate() {
            let record = record?;
            if record.len() == 3 {
                specs.push(TaskSpec::new(&record[0], &record[1], &record[2]));
            } else {
                debug!(line = line + 1, fields = record.len(), "skipped malformed row");
            }
        }
        Ok(specs)
    }

    async fn queries(&mut self) -> Result<QuerySet, SourceError> {
        Ok(self.queries.clone())
    }
}

struct CsvSinkInner {
    writer: csv::Writer<File>,
    headline: bool,
    errors: Vec<String>,
}

/// Appends saved result rows to a CSV file.
///
/// The column names of the first non-empty result become the headline (when
/// enabled); non-OK target statuses are buffered and written as one-field
/// rows on [`close`](ResultSink::close). Writes from concurrent workers are
/// serialized internally, as the sink contract requires.
pub struct CsvResultSink {
    inner: Mutex<CsvSinkInner>,
}

impl CsvResultSink {
    /// Creates the output file with a `,` delimiter and headline enabled.
    ///
    /// # Errors
    ///
    /// Returns `SinkError` if the file cannot be created.
    pub fn create(path: impl AsRef<Path>) -> Result<Self, SinkError> {
        Self::with_options(path, b',', true)
    }

    /// Creates the output file with explicit delimiter and headline choice.
    ///
    /// # Errors
    ///
    /// Returns `SinkError` if the file cannot be created.
    pub fn with_options(
        path: impl AsRef<Path>,
        delimiter: u8,
        headline: bool,
    ) -> Result<Self, SinkError> {
        let writer = csv::WriterBuilder::new()
            .delimiter(delimiter)
            .flexible(true)
            .from_path(path.as_ref())?;
        Ok(Self {
            inner: Mutex::new(CsvSinkInner {
                writer,
                headline,
                errors: Vec::new(),
            }),
        })
    }
}

fn cell_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[async_trait]
impl ResultSink for CsvResultSink {
    async fn prepare_target(&self, _task: TaskId) -> Result<(), SinkError> {
        Ok(())
    }

    async fn set_target_status(&self, _task: TaskId, status: TaskStatus) -> Result<(), SinkError> {
        if !status.is_ok() {
            let mut inner = self.inner.lock();
            inner.errors.push(status.to_string().trim_end().to_string());
        }
        Ok(())
    }

    async fn set_query_status(
        &self,
        _task: TaskId,
        _query: QueryId,
        _status: QueryStatus,
    ) -> Result<(), SinkError> {
        Ok(())
    }

    async fn save_result(
        &self,
        result: &ResultSet,
        _task: TaskId,
        _query: QueryId,
    ) -> Result<(), SinkError> {
        let mut inner = self.inner.lock();
        if inner.headline {
            inner.writer.write_record(&result.columns)?;
            inner.headline = false;
        }
        for row in &result.rows {
            let cells: Vec<String> = row.iter().map(cell_to_string).collect();
            inner.writer.write_record(&cells)?;
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), SinkError> {
        let mut inner = self.inner.lock();
        let errors = std::mem::take(&mut inner.errors);
        for error in errors {
            inner.writer.write_record([error.as_str()])?;
        }
        inner.writer.flush()?;
        Ok(())
    }
}

impl std::fmt::Debug for CsvResultSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("CsvResultSink")
            .field("headline", &inner.headline)
            .field("buffered_errors", &inner.errors.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_source_parses_three_field_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("targets.csv");
        std::fs::write(
            &path,
            "db://a,user_a,pw_a\nmalformed,row\ndb://b,user_b,pw_b\nway,too,many,fields\n",
        )
        .unwrap();

        let mut source = CsvTaskSource::new(&path, QuerySet::from_texts(["SELECT 1"]));
        let tasks = source.tasks().await.unwrap();

        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].url, "db://a");
        assert_eq!(tasks[1].username, "user_b");

        let queries = source.queries().await.unwrap();
        assert_eq!(queries.len(), 1);
    }

    #[tokio::test]
    async fn test_source_with_custom_delimiter() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("targets.csv");
        std::fs::write(&path, "db://a;user;pw\n").unwrap();

        let mut source =
            CsvTaskSource::new(&path, QuerySet::new()).with_delimiter(b';');
        let tasks = source.tasks().await.unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].password, "pw");
    }

    #[tokio::test]
    async fn test_source_missing_file_is_an_error() {
        let mut source = CsvTaskSource::new("/nonexistent/targets.csv", QuerySet::new());
        assert!(source.tasks().await.is_err());
    }

    fn sample_result() -> ResultSet {
        let mut result = ResultSet::new(vec!["target_id".into(), "name".into()]);
        result.push_row(vec![json!(1), json!("alpha")]);
        result.push_row(vec![json!(1), json!("beta")]);
        result
    }

    #[tokio::test]
    async fn test_sink_writes_headline_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let sink = CsvResultSink::create(&path).unwrap();

        sink.save_result(&sample_result(), TaskId::new(1), QueryId::new(1))
            .await
            .unwrap();
        sink.save_result(&sample_result(), TaskId::new(2), QueryId::new(1))
            .await
            .unwrap();
        sink.close().await.unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines[0], "target_id,name");
        // One headline plus four data rows.
        assert_eq!(lines.len(), 5);
        assert_eq!(lines[1], "1,alpha");
    }

    #[tokio::test]
    async fn test_sink_without_headline() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let sink = CsvResultSink::with_options(&path, b',', false).unwrap();

        sink.save_result(&sample_result(), TaskId::new(1), QueryId::new(1))
            .await
            .unwrap();
        sink.close().await.unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 2);
        assert!(contents.starts_with("1,alpha"));
    }

    #[tokio::test]
    async fn test_sink_buffers_failure_statuses_until_close() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let sink = CsvResultSink::create(&path).unwrap();

        sink.set_target_status(TaskId::new(1), TaskStatus::Ok)
            .await
            .unwrap();
        sink.set_target_status(
            TaskId::new(2),
            TaskStatus::Failed("connection failed: refused".into()),
        )
        .await
        .unwrap();

        // Nothing on disk until close.
        sink.close().await.unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.trim(), "connection failed: refused");
    }

    #[tokio::test]
    async fn test_cell_rendering() {
        assert_eq!(cell_to_string(&Value::Null), "");
        assert_eq!(cell_to_string(&json!("plain")), "plain");
        assert_eq!(cell_to_string(&json!(42)), "42");
        assert_eq!(cell_to_string(&json!(true)), "true");
    }
}
