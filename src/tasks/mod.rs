//! Off-ingestion-path detection.
//!
//! Work is wrapped as a [`Task`] and handed to an [`Executor`]. Two strategies
//! exist and are chosen once at startup:
//! - [`WorkerPoolExecutor`]: bounded priority queue drained by health-checked
//!   workers, each task bounded by a timeout
//! - [`InlineExecutor`]: runs the pipeline on the caller's thread
//!
//! Both report results as [`TaskReport`] messages and produce the same alerts
//! for the same input.

pub mod executor;
pub mod queue;
pub mod worker;

use futures::future::BoxFuture;
use serde::Serialize;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;

use crate::anomaly::AnomalyAlert;
use crate::config::SchedulerConfig;
use crate::error::{SchedulerError, TaskError};
use crate::events::Event;
use crate::pipeline::AlertPipeline;

pub use executor::{InlineExecutor, WorkerPoolExecutor};
pub use queue::TaskQueue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct TaskId(pub u64);

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    Low,
    Medium,
    High,
    Critical,
}

impl TaskPriority {
    /// Tier index, lowest priority first.
    pub fn index(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Clone)]
pub enum TaskKind {
    Single(Event),
    Batch(Vec<Event>),
}

impl TaskKind {
    pub fn events(&self) -> &[Event] {
        match self {
            Self::Single(event) => std::slice::from_ref(event),
            Self::Batch(events) => events,
        }
    }

    pub fn is_batch(&self) -> bool {
        matches!(self, Self::Batch(_))
    }
}

#[derive(Debug, Clone)]
pub struct Task {
    pub id: TaskId,
    pub kind: TaskKind,
    pub priority: TaskPriority,
    pub enqueued_at: Instant,
}

impl Task {
    pub fn new(id: TaskId, kind: TaskKind, priority: TaskPriority) -> Self {
        Self {
            id,
            kind,
            priority,
            enqueued_at: Instant::now(),
        }
    }
}

pub type ItemResult = Result<Vec<AnomalyAlert>, TaskError>;

#[derive(Debug, Clone)]
pub enum TaskOutcome {
    Single(ItemResult),
    /// Per-item results; items that succeeded keep their alerts even when
    /// others in the batch failed.
    Batch(Vec<ItemResult>),
}

impl TaskOutcome {
    fn from_items(batch: bool, mut items: Vec<ItemResult>) -> Self {
        if batch {
            Self::Batch(items)
        } else {
            Self::Single(items.pop().unwrap_or_else(|| Ok(Vec::new())))
        }
    }

    /// Outcome for a task that never ran.
    pub fn failed(kind: &TaskKind, error: TaskError) -> Self {
        let items = kind.events().iter().map(|_| Err(error.clone())).collect();
        Self::from_items(kind.is_batch(), items)
    }

    pub fn is_success(&self) -> bool {
        match self {
            Self::Single(r) => r.is_ok(),
            Self::Batch(items) => items.iter().all(Result::is_ok),
        }
    }

    /// Every alert produced by the items that succeeded.
    pub fn alerts(&self) -> Vec<&AnomalyAlert> {
        match self {
            Self::Single(r) => r.iter().flatten().collect(),
            Self::Batch(items) => items.iter().flatten().flatten().collect(),
        }
    }
}

/// Result message delivered for every accepted task.
#[derive(Debug, Clone)]
pub struct TaskReport {
    pub task_id: TaskId,
    pub priority: TaskPriority,
    pub outcome: TaskOutcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    WorkerPool,
    Inline,
}

#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStats {
    pub mode: ExecutionMode,
    pub submitted: u64,
    pub completed: u64,
    pub failed: u64,
    pub timed_out: u64,
    pub evicted: u64,
    pub inline_fallbacks: u64,
    pub workers_replaced: u64,
    pub queue_depth: usize,
    pub healthy_workers: usize,
}

#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub submitted: AtomicU64,
    pub completed: AtomicU64,
    pub failed: AtomicU64,
    pub timed_out: AtomicU64,
    pub evicted: AtomicU64,
    pub inline_fallbacks: AtomicU64,
    pub workers_replaced: AtomicU64,
}

impl Counters {
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn stats(&self, mode: ExecutionMode, queue_depth: usize, healthy_workers: usize) -> SchedulerStats {
        SchedulerStats {
            mode,
            submitted: self.submitted.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            timed_out: self.timed_out.load(Ordering::Relaxed),
            evicted: self.evicted.load(Ordering::Relaxed),
            inline_fallbacks: self.inline_fallbacks.load(Ordering::Relaxed),
            workers_replaced: self.workers_replaced.load(Ordering::Relaxed),
            queue_depth,
            healthy_workers,
        }
    }
}

/// Strategy for running detection off (or on) the ingestion path.
pub trait Executor: Send + Sync {
    /// Accept a task. The only failure is backpressure or shutdown.
    fn queue_task(&self, kind: TaskKind, priority: TaskPriority) -> Result<TaskId, SchedulerError>;

    /// Maximum number of events grouped into one batch task.
    fn batch_size(&self) -> usize;

    fn stats(&self) -> SchedulerStats;

    /// Stop accepting work and fail whatever is still queued.
    fn shutdown(&self) -> BoxFuture<'_, ()>;

    /// Split `events` into batch tasks of at most `batch_size`. Stops at the
    /// first rejected chunk; chunks accepted before it still run and report.
    fn queue_batch(
        &self,
        events: Vec<Event>,
        priority: TaskPriority,
    ) -> Result<Vec<TaskId>, SchedulerError> {
        let size = self.batch_size().max(1);
        let mut ids = Vec::with_capacity(events.len().div_ceil(size));
        let mut events = events.into_iter().peekable();
        while events.peek().is_some() {
            let chunk: Vec<Event> = events.by_ref().take(size).collect();
            ids.push(self.queue_task(TaskKind::Batch(chunk), priority)?);
        }
        Ok(ids)
    }
}

/// Pick the executor for this process. Falls back to inline execution when
/// workers are disabled or there is no tokio runtime to host them.
pub fn build_executor(
    config: &SchedulerConfig,
    pipeline: Arc<AlertPipeline>,
) -> (Arc<dyn Executor>, mpsc::UnboundedReceiver<TaskReport>) {
    let (reports_tx, reports_rx) = mpsc::unbounded_channel();

    let runtime = tokio::runtime::Handle::try_current().ok();
    let executor: Arc<dyn Executor> = match runtime {
        Some(handle) if config.enabled && config.worker_count > 0 => {
            tracing::info!(
                workers = config.worker_count,
                queue_capacity = config.queue_capacity,
                "Starting worker pool"
            );
            Arc::new(WorkerPoolExecutor::start(
                &handle,
                config.clone(),
                pipeline,
                reports_tx,
            ))
        }
        _ => {
            if config.enabled {
                tracing::warn!("Worker support unavailable, running detection inline");
            }
            Arc::new(InlineExecutor::new(pipeline, config.batch_size, reports_tx))
        }
    };

    (executor, reports_rx)
}

/// Count the outcome and send its report.
pub(crate) fn deliver(
    reports: &mpsc::UnboundedSender<TaskReport>,
    counters: &Counters,
    task_id: TaskId,
    priority: TaskPriority,
    outcome: TaskOutcome,
) {
    if outcome.is_success() {
        Counters::incr(&counters.completed);
    } else {
        Counters::incr(&counters.failed);
    }
    let report = TaskReport {
        task_id,
        priority,
        outcome,
    };
    if reports.send(report).is_err() {
        tracing::debug!(task_id = %task_id, "Report receiver dropped");
    }
}

/// Run every event of a task through the pipeline, one guarded call each.
pub(crate) fn run_items(
    pipeline: &AlertPipeline,
    task_id: TaskId,
    events: impl IntoIterator<Item = Event>,
    mut on_item: impl FnMut(usize, ItemResult) -> bool,
) {
    for (index, event) in events.into_iter().enumerate() {
        let result = panic::catch_unwind(AssertUnwindSafe(|| pipeline.process(event)))
            .map_err(|_| TaskError::Panicked { task_id });
        if !on_item(index, result) {
            break;
        }
    }
}

/// Synchronous execution used by the inline executor and the degraded path.
pub(crate) fn execute_inline(pipeline: &AlertPipeline, task: Task) -> TaskOutcome {
    let batch = task.kind.is_batch();
    let mut items = Vec::with_capacity(task.kind.events().len());
    let events = match task.kind {
        TaskKind::Single(event) => vec![event],
        TaskKind::Batch(events) => events,
    };
    run_items(pipeline, task.id, events, |_, r| {
        items.push(r);
        true
    });
    TaskOutcome::from_items(batch, items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_priority_order() {
        assert!(TaskPriority::Critical > TaskPriority::High);
        assert!(TaskPriority::High > TaskPriority::Medium);
        assert!(TaskPriority::Medium > TaskPriority::Low);
        assert_eq!(TaskPriority::Low.index(), 0);
        assert_eq!(TaskPriority::Critical.index(), 3);
    }

    #[test]
    fn test_failed_outcome_shapes() {
        let err = TaskError::ShuttingDown;
        let single = TaskOutcome::failed(&TaskKind::Single(Event::transaction(1, json!({}))), err.clone());
        assert!(matches!(single, TaskOutcome::Single(Err(TaskError::ShuttingDown))));

        let batch = TaskOutcome::failed(
            &TaskKind::Batch(vec![Event::transaction(1, json!({})); 3]),
            err,
        );
        match batch {
            TaskOutcome::Batch(items) => assert_eq!(items.len(), 3),
            other => panic!("unexpected outcome {:?}", other),
        }
    }
}
