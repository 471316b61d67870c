use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use chainwatch_detector::broadcast::NullSink;
use chainwatch_detector::config::Config;
use chainwatch_detector::error::{SchedulerError, TaskError};
use chainwatch_detector::tasks::{
    build_executor, ExecutionMode, Task, TaskId, TaskKind, TaskOutcome, TaskPriority, TaskQueue,
    TaskReport,
};
use chainwatch_detector::{AlertPipeline, Event};

const NOW: i64 = 1_700_000_000_000;

fn low(id: u64) -> Task {
    Task::new(
        TaskId(id),
        TaskKind::Single(Event::transaction(NOW, json!({}))),
        TaskPriority::Low,
    )
}

fn pipeline(config: &Config) -> Arc<AlertPipeline> {
    Arc::new(
        AlertPipeline::from_config(config, Arc::new(NullSink))
            .unwrap()
            .with_clock(Arc::new(|| NOW)),
    )
}

fn burst(n: i64) -> Vec<Event> {
    (0..n)
        .map(|i| Event::transaction(NOW - n + i, json!({ "from": "0xfeed", "fee": 1 })))
        .collect()
}

#[test]
fn critical_task_evicts_low_when_full() {
    let mut queue = TaskQueue::new(10);
    for id in 0..10 {
        queue.push(low(id)).unwrap();
    }

    let critical = Task::new(
        TaskId(99),
        TaskKind::Single(Event::transaction(NOW, json!({}))),
        TaskPriority::Critical,
    );
    let evicted = queue.push(critical).unwrap();
    assert_eq!(evicted.map(|t| t.priority), Some(TaskPriority::Low));
    assert_eq!(queue.len(), 10);
    assert_eq!(queue.pop().map(|t| t.id), Some(TaskId(99)));

    let err = queue.push(low(100)).and_then(|_| queue.push(low(101))).unwrap_err();
    assert!(matches!(err, SchedulerError::QueueFull { capacity: 10, .. }));
}

#[test]
fn no_runtime_falls_back_to_inline() {
    let config = Config::default();
    let (executor, mut reports) = build_executor(&config.scheduler, pipeline(&config));

    assert_eq!(executor.stats().mode, ExecutionMode::Inline);
    let ids = executor.queue_batch(burst(12), TaskPriority::High).unwrap();
    assert_eq!(ids.len(), 2);

    let alerts: usize = std::iter::from_fn(|| reports.try_recv().ok())
        .map(|r| r.outcome.alerts().len())
        .sum();
    assert_eq!(alerts, 2);
}

#[test]
fn disabled_scheduler_runs_inline() {
    let config = Config::parse("[scheduler]\nenabled = false\n").unwrap();
    let rt = tokio::runtime::Runtime::new().unwrap();
    let _guard = rt.enter();

    let (executor, mut reports) = build_executor(&config.scheduler, pipeline(&config));
    assert_eq!(executor.stats().mode, ExecutionMode::Inline);

    let id = executor
        .queue_task(TaskKind::Single(Event::transaction(NOW, json!({}))), TaskPriority::Low)
        .unwrap();
    assert_eq!(reports.try_recv().unwrap().task_id, id);
}

async fn collect(reports: &mut tokio::sync::mpsc::UnboundedReceiver<TaskReport>, n: usize) -> Vec<TaskReport> {
    let mut out = Vec::with_capacity(n);
    while out.len() < n {
        let report = tokio::time::timeout(Duration::from_secs(5), reports.recv())
            .await
            .expect("report in time")
            .expect("channel open");
        out.push(report);
    }
    out
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn worker_pool_matches_inline_alerts() {
    let config = Config::parse(
        r#"
        [scheduler]
        worker_count = 1
        batch_size = 4
        "#,
    )
    .unwrap();
    let pool_pipeline = pipeline(&config);
    let (executor, mut reports) = build_executor(&config.scheduler, pool_pipeline.clone());
    assert_eq!(executor.stats().mode, ExecutionMode::WorkerPool);

    let ids = executor.queue_batch(burst(12), TaskPriority::Medium).unwrap();
    assert_eq!(ids.len(), 3);

    let reports = collect(&mut reports, 3).await;
    let alerts: usize = reports.iter().map(|r| r.outcome.alerts().len()).sum();
    assert_eq!(alerts, 2);
    assert!(reports
        .iter()
        .all(|r| matches!(&r.outcome, TaskOutcome::Batch(items) if items.len() == 4)));
    assert_eq!(pool_pipeline.alerts().len(), 2);

    executor.shutdown().await;
    let stats = executor.stats();
    assert_eq!(stats.submitted, 3);
    assert_eq!(stats.completed, 3);
    assert!(matches!(
        executor.queue_task(TaskKind::Single(Event::transaction(NOW, json!({}))), TaskPriority::Critical),
        Err(SchedulerError::Closed)
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn shutdown_fails_queued_tasks() {
    let config = Config::parse(
        r#"
        [scheduler]
        worker_count = 1
        task_timeout_ms = 5000
        "#,
    )
    .unwrap();
    let (executor, mut reports) = build_executor(&config.scheduler, pipeline(&config));

    for _ in 0..50 {
        executor
            .queue_task(TaskKind::Batch(burst(10)), TaskPriority::Low)
            .unwrap();
    }
    executor.shutdown().await;

    let reports = collect(&mut reports, 50).await;
    let shut_down = reports
        .iter()
        .filter(|r| matches!(&r.outcome, TaskOutcome::Batch(items) if items.iter().all(|i| matches!(i, Err(TaskError::ShuttingDown)))))
        .count();
    let stats = executor.stats();
    assert_eq!(stats.completed + stats.failed, 50);
    assert_eq!(stats.failed as usize, shut_down);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn tasks_accepted_during_shutdown_are_always_reported() {
    let config = Config::parse("[scheduler]\nworker_count = 2\nqueue_capacity = 4000\n").unwrap();

    for round in 0..20 {
        let (executor, mut reports) = build_executor(&config.scheduler, pipeline(&config));

        let producer = {
            let executor = executor.clone();
            std::thread::spawn(move || {
                let mut accepted = Vec::new();
                for i in 0..2_000 {
                    let event = Event::transaction(NOW - i, json!({ "from": "0xload" }));
                    match executor.queue_task(TaskKind::Single(event), TaskPriority::Low) {
                        Ok(id) => accepted.push(id),
                        Err(SchedulerError::Closed) => break,
                        Err(e) => panic!("unexpected rejection: {}", e),
                    }
                }
                accepted
            })
        };

        tokio::time::sleep(Duration::from_micros(200 * round)).await;
        executor.shutdown().await;
        let accepted = producer.join().unwrap();

        let mut reported: Vec<TaskId> = std::iter::from_fn(|| reports.try_recv().ok())
            .map(|r| r.task_id)
            .collect();
        reported.sort_by_key(|id| id.0);
        assert_eq!(reported, accepted, "round {}", round);

        let stats = executor.stats();
        assert_eq!(stats.submitted as usize, accepted.len());
        assert_eq!(stats.completed + stats.failed, stats.submitted);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unhealthy_pool_falls_back_inline_with_same_alerts() {
    let config = Config::parse(
        r#"
        [scheduler]
        worker_count = 1
        batch_size = 4
        health_check_interval_ms = 10
        ping_timeout_ms = 0
        "#,
    )
    .unwrap();
    let pool_pipeline = pipeline(&config);
    let (executor, mut reports) = build_executor(&config.scheduler, pool_pipeline.clone());

    tokio::time::timeout(Duration::from_secs(5), async {
        while executor.stats().healthy_workers > 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("worker marked unhealthy");

    executor.queue_batch(burst(12), TaskPriority::Medium).unwrap();
    let reports = collect(&mut reports, 3).await;
    assert!(reports.iter().all(|r| r.outcome.is_success()));

    let reference = pipeline(&config);
    let expected: Vec<String> = burst(12)
        .into_iter()
        .flat_map(|e| reference.process(e))
        .map(|a| a.alert_type)
        .collect();
    let actual: Vec<String> = pool_pipeline
        .alerts()
        .snapshot()
        .into_iter()
        .map(|a| a.alert_type)
        .collect();
    assert_eq!(actual, expected);
    assert_eq!(actual.len(), 2);

    let stats = executor.stats();
    assert_eq!(stats.inline_fallbacks, 3);
    assert!(stats.workers_replaced >= 1);
    executor.shutdown().await;
}
