use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::SchedulerConfig;
use crate::error::{SchedulerError, TaskError};
use crate::pipeline::AlertPipeline;

use super::queue::TaskQueue;
use super::worker::{self, PoolShared, WorkerHandle};
use super::{
    deliver, execute_inline, Counters, ExecutionMode, Executor, SchedulerStats, Task, TaskId,
    TaskKind, TaskOutcome, TaskPriority, TaskReport,
};

/// Runs every task synchronously on the submitting thread.
pub struct InlineExecutor {
    pipeline: Arc<AlertPipeline>,
    batch_size: usize,
    reports: mpsc::UnboundedSender<TaskReport>,
    counters: Counters,
    next_id: AtomicU64,
    closed: AtomicBool,
}

impl InlineExecutor {
    pub fn new(
        pipeline: Arc<AlertPipeline>,
        batch_size: usize,
        reports: mpsc::UnboundedSender<TaskReport>,
    ) -> Self {
        Self {
            pipeline,
            batch_size: batch_size.max(1),
            reports,
            counters: Counters::default(),
            next_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
        }
    }
}

impl Executor for InlineExecutor {
    fn queue_task(&self, kind: TaskKind, priority: TaskPriority) -> Result<TaskId, SchedulerError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SchedulerError::Closed);
        }

        let task = Task::new(TaskId(self.next_id.fetch_add(1, Ordering::Relaxed)), kind, priority);
        let id = task.id;
        Counters::incr(&self.counters.submitted);

        let outcome = execute_inline(&self.pipeline, task);
        deliver(&self.reports, &self.counters, id, priority, outcome);
        Ok(id)
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn stats(&self) -> SchedulerStats {
        self.counters.stats(ExecutionMode::Inline, 0, 0)
    }

    fn shutdown(&self) -> BoxFuture<'_, ()> {
        self.closed.store(true, Ordering::Release);
        Box::pin(async {})
    }
}

/// Bounded priority queue drained by a fixed set of supervised workers.
///
/// When no worker passes the latest health check, submissions run inline
/// until one recovers.
pub struct WorkerPoolExecutor {
    shared: Arc<PoolShared>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
    next_id: AtomicU64,
    degraded: AtomicBool,
}

impl WorkerPoolExecutor {
    pub fn start(
        runtime: &Handle,
        config: SchedulerConfig,
        pipeline: Arc<AlertPipeline>,
        reports: mpsc::UnboundedSender<TaskReport>,
    ) -> Self {
        let worker_count = config.worker_count;
        let shared = Arc::new(PoolShared {
            pipeline,
            queue: Mutex::new(TaskQueue::new(config.queue_capacity)),
            notify: Notify::new(),
            reports,
            config,
            counters: Counters::default(),
            healthy: AtomicUsize::new(worker_count),
            shutdown: CancellationToken::new(),
        });

        let workers = (0..worker_count)
            .map(|id| WorkerHandle::spawn(id, shared.clone(), runtime))
            .collect();
        let supervisor = runtime.spawn(worker::supervise(shared.clone(), runtime.clone(), workers));

        Self {
            shared,
            supervisor: Mutex::new(Some(supervisor)),
            next_id: AtomicU64::new(1),
            degraded: AtomicBool::new(false),
        }
    }

    fn run_degraded(&self, task: Task) {
        if !self.degraded.swap(true, Ordering::AcqRel) {
            tracing::warn!("No healthy workers, running detection inline");
        }
        Counters::incr(&self.shared.counters.inline_fallbacks);

        let (id, priority) = (task.id, task.priority);
        let outcome = execute_inline(&self.shared.pipeline, task);
        deliver(&self.shared.reports, &self.shared.counters, id, priority, outcome);
    }
}

impl Executor for WorkerPoolExecutor {
    fn queue_task(&self, kind: TaskKind, priority: TaskPriority) -> Result<TaskId, SchedulerError> {
        if self.shared.shutdown.is_cancelled() {
            return Err(SchedulerError::Closed);
        }

        let task = Task::new(TaskId(self.next_id.fetch_add(1, Ordering::Relaxed)), kind, priority);
        let id = task.id;

        if self.shared.healthy.load(Ordering::Acquire) == 0 {
            if self.shared.queue.lock().is_closed() {
                return Err(SchedulerError::Closed);
            }
            Counters::incr(&self.shared.counters.submitted);
            self.run_degraded(task);
            return Ok(id);
        }
        if self.degraded.swap(false, Ordering::AcqRel) {
            tracing::info!("Workers healthy again, resuming queued execution");
        }

        let evicted = self.shared.queue.lock().push(task)?;
        Counters::incr(&self.shared.counters.submitted);

        if let Some(evicted) = evicted {
            Counters::incr(&self.shared.counters.evicted);
            let error = TaskError::Evicted {
                task_id: evicted.id,
            };
            self.shared
                .report(&evicted, TaskOutcome::failed(&evicted.kind, error));
        }

        self.shared.notify.notify_one();
        Ok(id)
    }

    fn batch_size(&self) -> usize {
        self.shared.config.batch_size.max(1)
    }

    fn stats(&self) -> SchedulerStats {
        let depth = self.shared.queue.lock().len();
        let healthy = self.shared.healthy.load(Ordering::Acquire);
        self.shared
            .counters
            .stats(ExecutionMode::WorkerPool, depth, healthy)
    }

    fn shutdown(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            self.shared.shutdown.cancel();
            let supervisor = self.supervisor.lock().take();
            if let Some(handle) = supervisor {
                if let Err(e) = handle.await {
                    tracing::error!(error = %e, "Worker supervisor exited abnormally");
                }
            }
        })
    }
}

impl Drop for WorkerPoolExecutor {
    fn drop(&mut self) {
        self.shared.shutdown.cancel();
    }
}
