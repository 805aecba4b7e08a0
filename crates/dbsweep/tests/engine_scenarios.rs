//! End-to-end dispatch scenarios.
//!
//! Drives the full engine — source, registry, pool, workers, barrier, sink —
//! with scripted connectors and asserts the per-target and per-query
//! outcomes.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;

use dbsweep::config::{EngineConfig, PoolConfig};
use dbsweep::engine::DispatchEngine;
use dbsweep::error::ConnectorError;
use dbsweep::registry::TaskId;
use dbsweep::sink::{QueryStatus, ResultSink, TaskStatus};
use dbsweep::source::{QuerySet, TaskSpec};
use dbsweep::testing::{mock_result, queue_factory, MockConnector, RecordingSink, StaticTaskSource};

fn fast_config() -> EngineConfig {
    let mut config = EngineConfig::with_pool(PoolConfig {
        max_queue_size: 64,
        max_running: 4,
        max_total: 8,
        idle_timeout: Duration::from_millis(500),
    });
    config.poll_interval = Duration::from_millis(20);
    config.shutdown_grace = Duration::from_secs(2);
    config
}

fn spec(n: usize) -> TaskSpec {
    TaskSpec::new(format!("db://target-{n}"), "admin", "pw")
}

// ── Scenario: mixed outcomes across three targets ──

#[tokio::test]
async fn test_three_target_mixed_outcomes() {
    // Target A succeeds on both queries, target B fails to connect, target C
    // connects but gets only empty results.
    let connector_a = MockConnector::new()
        .respond("Q1", mock_result(2))
        .respond("Q2", mock_result(1));
    let connector_b = MockConnector::new().fail_connect("refused");
    let connector_c = MockConnector::new()
        .respond("Q1", dbsweep::connector::ResultSet::new(vec!["id".into()]))
        .respond("Q2", dbsweep::connector::ResultSet::new(vec!["id".into()]));

    let sink = Arc::new(RecordingSink::new());
    let engine = DispatchEngine::new(
        fast_config(),
        queue_factory(vec![connector_a, connector_b, connector_c]),
        Arc::clone(&sink) as Arc<dyn ResultSink>,
    );

    let mut source = StaticTaskSource::new(
        vec![spec(1), spec(2), spec(3)],
        vec!["Q1".into(), "Q2".into()],
    );
    let summary = engine.run(&mut source).await.unwrap();

    assert_eq!(summary.tasks, 3);
    assert_eq!(summary.queries, 2);
    assert_eq!(summary.metrics.tasks_finished, 3);
    assert_eq!(summary.metrics.tasks_ok, 2);
    assert_eq!(summary.metrics.tasks_failed, 1);

    let (a, b, c) = (TaskId::new(1), TaskId::new(2), TaskId::new(3));

    // A: OK with both results saved.
    assert_eq!(sink.target_status(a), Some(TaskStatus::Ok));
    assert_eq!(sink.saved(a).len(), 2);
    assert!(sink.query_statuses(a).is_empty());

    // B: connection error, no queries attempted.
    assert!(matches!(
        sink.target_status(b),
        Some(TaskStatus::Failed(msg)) if msg.contains("refused")
    ));
    assert!(sink.query_statuses(b).is_empty());
    assert!(sink.saved(b).is_empty());

    // C: OK overall, one empty-result status per query, nothing saved.
    assert_eq!(sink.target_status(c), Some(TaskStatus::Ok));
    let c_statuses = sink.query_statuses(c);
    assert_eq!(c_statuses.len(), 2);
    assert!(c_statuses
        .iter()
        .all(|(_, status)| *status == QueryStatus::EmptyResult));
    assert!(sink.saved(c).is_empty());

    // Every target was prepared and got exactly one overall status.
    for id in [a, b, c] {
        assert!(sink.prepared(id));
        assert!(sink.target_status(id).is_some());
    }
}

// ── Scenario: one failing target cannot affect its siblings ──

#[tokio::test]
async fn test_failing_target_is_isolated() {
    let healthy = MockConnector::new().respond("Q1", mock_result(3));
    let broken = MockConnector::new().fail_connect("host down");

    let sink = Arc::new(RecordingSink::new());
    let engine = DispatchEngine::new(
        fast_config(),
        queue_factory(vec![broken, healthy]),
        Arc::clone(&sink) as Arc<dyn ResultSink>,
    );

    let mut source = StaticTaskSource::new(vec![spec(1), spec(2)], vec!["Q1".into()]);
    let summary = engine.run(&mut source).await.unwrap();

    assert_eq!(summary.metrics.tasks_finished, 2);
    assert!(matches!(
        sink.target_status(TaskId::new(1)),
        Some(TaskStatus::Failed(_))
    ));
    assert_eq!(sink.target_status(TaskId::new(2)), Some(TaskStatus::Ok));
    assert_eq!(sink.saved(TaskId::new(2)).len(), 1);
}

// ── Scenario: sink failures never abort a task ──

#[tokio::test]
async fn test_save_failures_are_contained() {
    let sink = Arc::new(RecordingSink::new().failing_saves());
    let engine = DispatchEngine::new(
        fast_config(),
        queue_factory(vec![MockConnector::new()]),
        Arc::clone(&sink) as Arc<dyn ResultSink>,
    );

    let mut source = StaticTaskSource::new(vec![spec(1)], vec!["Q1".into(), "Q2".into()]);
    let summary = engine.run(&mut source).await.unwrap();

    // The failed saves are the only issue: overall status stays OK.
    assert_eq!(sink.target_status(TaskId::new(1)), Some(TaskStatus::Ok));
    assert_eq!(summary.metrics.save_failures, 2);
    assert_eq!(summary.metrics.rows_saved, 0);

    let statuses = sink.query_statuses(TaskId::new(1));
    assert_eq!(statuses.len(), 2);
    assert!(statuses
        .iter()
        .all(|(_, s)| matches!(s, QueryStatus::SaveFailed(_))));
}

// ── Scenario: the running bound holds while a backlog drains ──

#[tokio::test]
async fn test_engine_respects_running_bound() {
    let gate = Arc::new(Semaphore::new(0));
    let connectors: Vec<MockConnector> = (0..10)
        .map(|_| MockConnector::new().with_gate(Arc::clone(&gate)))
        .collect();

    let mut config = fast_config();
    config.pool.max_running = 2;

    let sink = Arc::new(RecordingSink::new());
    let engine = Arc::new(DispatchEngine::new(
        config,
        queue_factory(connectors),
        Arc::clone(&sink) as Arc<dyn ResultSink>,
    ));

    let mut source = StaticTaskSource::new((0..10).map(spec).collect(), vec!["Q1".into()]);
    let run = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move { engine.run(&mut source).await })
    };

    // All workers block inside connect; the execution bound must hold.
    for _ in 0..30 {
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(engine.pool().active_count() <= 2);
    }

    gate.add_permits(100);
    let summary = run.await.unwrap().unwrap();
    assert_eq!(summary.metrics.tasks_finished, 10);
    assert_eq!(summary.metrics.tasks_ok, 10);
    assert_eq!(engine.pool().active_count(), 0);
}

// ── Scenario: a hanging connector is cut off by the task deadline ──

#[tokio::test]
async fn test_task_deadline_contains_hanging_connector() {
    let hanging = MockConnector::new().with_connect_delay(Duration::from_secs(60));
    let healthy = MockConnector::new().respond("Q1", mock_result(1));

    let mut config = fast_config();
    config.task_deadline = Some(Duration::from_millis(100));

    let sink = Arc::new(RecordingSink::new());
    let engine = DispatchEngine::new(
        config,
        queue_factory(vec![hanging, healthy]),
        Arc::clone(&sink) as Arc<dyn ResultSink>,
    );

    let mut source = StaticTaskSource::new(vec![spec(1), spec(2)], vec!["Q1".into()]);

    // Without the deadline this run would block for a minute.
    let summary = tokio::time::timeout(Duration::from_secs(10), engine.run(&mut source))
        .await
        .expect("run did not complete in time")
        .unwrap();

    assert_eq!(summary.metrics.tasks_finished, 2);
    assert!(matches!(
        sink.target_status(TaskId::new(1)),
        Some(TaskStatus::Failed(msg)) if msg.contains("timeout")
    ));
    assert_eq!(sink.target_status(TaskId::new(2)), Some(TaskStatus::Ok));
}

// ── Scenario: connection loss mid-task is a per-query interrupt ──

#[tokio::test]
async fn test_connection_interrupt_recorded_per_query() {
    let connector = MockConnector::new()
        .respond("Q1", mock_result(1))
        .respond_err("Q2", ConnectorError::ConnectionLost)
        .respond("Q3", mock_result(1));

    let sink = Arc::new(RecordingSink::new());
    let engine = DispatchEngine::new(
        fast_config(),
        queue_factory(vec![connector]),
        Arc::clone(&sink) as Arc<dyn ResultSink>,
    );

    let mut source = StaticTaskSource::new(
        vec![spec(1)],
        vec!["Q1".into(), "Q2".into(), "Q3".into()],
    );
    engine.run(&mut source).await.unwrap();

    let id = TaskId::new(1);
    assert_eq!(sink.target_status(id), Some(TaskStatus::Ok));
    let statuses = sink.query_statuses(id);
    assert_eq!(statuses.len(), 1);
    assert_eq!(statuses[0].1, QueryStatus::ConnectionInterrupted);
    // Q1 and Q3 still saved their rows.
    assert_eq!(sink.saved(id).len(), 2);
}

// ── Scenario: external ids flow from the source into the registry ──

#[tokio::test]
async fn test_external_ids_default_and_propagate() {
    let sink = Arc::new(RecordingSink::new());
    let engine = DispatchEngine::new(
        fast_config(),
        queue_factory(vec![MockConnector::new(), MockConnector::new()]),
        Arc::clone(&sink) as Arc<dyn ResultSink>,
    );

    let mut source = StaticTaskSource::new(
        vec![spec(1), spec(2).with_external_id(4711)],
        vec!["Q1".into()],
    );
    engine.run(&mut source).await.unwrap();

    let registry = engine.registry();
    assert_eq!(registry.external_id(TaskId::new(1)).unwrap(), 1);
    assert_eq!(registry.external_id(TaskId::new(2)).unwrap(), 4711);
    assert!(registry.is_all_finished());
}

// ── Scenario: CSV file in, CSV file out ──

#[tokio::test]
async fn test_csv_source_to_csv_sink() {
    use dbsweep::csv::{CsvResultSink, CsvTaskSource};

    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("targets.csv");
    let output = dir.path().join("results.csv");
    std::fs::write(
        &input,
        "db://alpha,admin,pw\nbroken,row\ndb://beta,admin,pw\n",
    )
    .unwrap();

    let connector_a = MockConnector::new().respond("Q1", mock_result(2));
    let connector_b = MockConnector::new().fail_connect("refused");

    let sink = Arc::new(CsvResultSink::create(&output).unwrap());
    let engine = DispatchEngine::new(
        fast_config(),
        queue_factory(vec![connector_a, connector_b]),
        Arc::clone(&sink) as Arc<dyn ResultSink>,
    );

    let mut source = CsvTaskSource::new(&input, QuerySet::from_texts(["Q1"]));
    let summary = engine.run(&mut source).await.unwrap();
    sink.close().await.unwrap();

    assert_eq!(summary.tasks, 2);
    assert_eq!(summary.metrics.tasks_ok, 1);
    assert_eq!(summary.metrics.tasks_failed, 1);

    let contents = std::fs::read_to_string(&output).unwrap();
    let lines: Vec<&str> = contents.lines().collect();
    // Headline, two saved rows stamped with the target id, one buffered
    // connection error written at close.
    assert_eq!(lines[0], "target_id,id,value");
    assert_eq!(lines.len(), 4);
    assert!(lines[1].starts_with("1,"));
    assert!(lines[3].contains("refused"));
}
