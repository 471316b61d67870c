use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot, Notify};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::config::SchedulerConfig;
use crate::error::TaskError;
use crate::pipeline::AlertPipeline;

use super::queue::TaskQueue;
use super::{deliver, run_items, Counters, ItemResult, Task, TaskKind, TaskOutcome, TaskReport};

/// State shared by the executor front end, the workers and the supervisor.
pub(crate) struct PoolShared {
    pub pipeline: Arc<AlertPipeline>,
    pub queue: Mutex<TaskQueue>,
    pub notify: Notify,
    pub reports: mpsc::UnboundedSender<TaskReport>,
    pub config: SchedulerConfig,
    pub counters: Counters,
    pub healthy: AtomicUsize,
    pub shutdown: CancellationToken,
}

impl PoolShared {
    /// Wait for the next task in priority order and record it as in flight.
    /// Returns `None` once the worker has been retired by the supervisor.
    async fn next_task(&self, slot: &Mutex<InFlight>) -> Option<Task> {
        loop {
            let notified = self.notify.notified();
            {
                let mut slot = slot.lock();
                if slot.retired {
                    return None;
                }
                if let Some(task) = self.queue.lock().pop() {
                    slot.task = Some(task.clone());
                    return Some(task);
                }
            }
            notified.await;
        }
    }

    pub fn report(&self, task: &Task, outcome: TaskOutcome) {
        deliver(&self.reports, &self.counters, task.id, task.priority, outcome);
    }
}

type Ping = oneshot::Sender<()>;

/// The task a worker is running. Whoever takes it out reports it.
#[derive(Default)]
struct InFlight {
    task: Option<Task>,
    retired: bool,
}

/// Supervisor-side handle to one worker.
pub(crate) struct WorkerHandle {
    pub id: usize,
    pings: mpsc::Sender<Ping>,
    in_flight: Arc<Mutex<InFlight>>,
    join: JoinHandle<()>,
}

impl WorkerHandle {
    pub fn spawn(id: usize, shared: Arc<PoolShared>, runtime: &Handle) -> Self {
        let (pings, rx) = mpsc::channel(1);
        let in_flight = Arc::new(Mutex::new(InFlight::default()));
        let join = runtime.spawn(run_worker(id, shared, rx, in_flight.clone()));
        Self {
            id,
            pings,
            in_flight,
            join,
        }
    }

    /// Ping the worker and wait up to `timeout` for the pong.
    pub async fn probe(&self, timeout: Duration) -> bool {
        if self.join.is_finished() {
            return false;
        }
        let (tx, rx) = oneshot::channel();
        if self.pings.try_send(tx).is_err() {
            return false;
        }
        matches!(tokio::time::timeout(timeout, rx).await, Ok(Ok(())))
    }

    /// Abort the worker and hand back the task it was running, if any.
    pub fn terminate(self) -> Option<Task> {
        self.join.abort();
        let mut slot = self.in_flight.lock();
        slot.retired = true;
        slot.task.take()
    }
}

/// Worker loop: answer pings, pull tasks, run them under the task timeout.
/// Pings are answered while a task is running so long detections do not
/// look like a dead worker.
async fn run_worker(
    id: usize,
    shared: Arc<PoolShared>,
    mut pings: mpsc::Receiver<Ping>,
    in_flight: Arc<Mutex<InFlight>>,
) {
    tracing::debug!(worker = id, "Worker started");

    loop {
        let task = tokio::select! {
            _ = shared.shutdown.cancelled() => break,
            Some(reply) = pings.recv() => {
                let _ = reply.send(());
                continue;
            }
            task = shared.next_task(&in_flight) => match task {
                Some(task) => task,
                None => break,
            },
        };

        let exec = execute_with_timeout(&shared, task.clone());
        tokio::pin!(exec);
        let outcome = loop {
            tokio::select! {
                outcome = &mut exec => break outcome,
                Some(reply) = pings.recv() => {
                    let _ = reply.send(());
                }
            }
        };

        // None means the supervisor already failed this task.
        if in_flight.lock().task.take().is_some() {
            shared.report(&task, outcome);
        }
    }

    tracing::debug!(worker = id, "Worker stopped");
}

/// Run a task on the blocking pool. Items finished before the deadline keep
/// their results; the rest fail with a timeout.
async fn execute_with_timeout(shared: &Arc<PoolShared>, task: Task) -> TaskOutcome {
    let timeout_ms = shared.config.task_timeout_ms;
    let task_id = task.id;
    let batch = task.kind.is_batch();
    let events = match task.kind {
        TaskKind::Single(event) => vec![event],
        TaskKind::Batch(events) => events,
    };
    let total = events.len();

    let (tx, mut rx) = mpsc::unbounded_channel::<(usize, ItemResult)>();
    let pipeline = shared.pipeline.clone();
    // Detached: a timed-out detection finishes its current item on its own.
    let _blocking = tokio::task::spawn_blocking(move || {
        run_items(&pipeline, task_id, events, |index, result| {
            tx.send((index, result)).is_ok()
        });
    });

    let mut items: Vec<Option<ItemResult>> = std::iter::repeat_with(|| None).take(total).collect();
    let collect = async {
        while let Some((index, result)) = rx.recv().await {
            items[index] = Some(result);
        }
    };
    let timed_out = tokio::time::timeout(Duration::from_millis(timeout_ms), collect)
        .await
        .is_err();

    if timed_out {
        Counters::incr(&shared.counters.timed_out);
        tracing::warn!(task_id = %task_id, timeout_ms, "Task timed out");
    }

    let items = items
        .into_iter()
        .map(|slot| {
            slot.unwrap_or_else(|| {
                Err(if timed_out {
                    TaskError::Timeout {
                        task_id,
                        timeout_ms,
                    }
                } else {
                    TaskError::Panicked { task_id }
                })
            })
        })
        .collect();

    TaskOutcome::from_items(batch, items)
}

/// Health-check loop. Unresponsive workers are aborted and replaced; the
/// task they were running is failed explicitly. On shutdown, waits for the
/// workers and fails everything still queued.
pub(crate) async fn supervise(shared: Arc<PoolShared>, runtime: Handle, mut workers: Vec<WorkerHandle>) {
    let interval = Duration::from_millis(shared.config.health_check_interval_ms.max(1));
    let ping_timeout = Duration::from_millis(shared.config.ping_timeout_ms);

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = shared.shutdown.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let mut healthy = 0;
        for slot in workers.iter_mut() {
            if slot.probe(ping_timeout).await {
                healthy += 1;
                continue;
            }

            tracing::error!(worker = slot.id, "Worker failed health check, replacing");
            let replacement = WorkerHandle::spawn(slot.id, shared.clone(), &runtime);
            let old = std::mem::replace(slot, replacement);
            if let Some(task) = old.terminate() {
                let error = TaskError::WorkerFault {
                    task_id: task.id,
                    worker: slot.id,
                };
                shared.report(&task, TaskOutcome::failed(&task.kind, error));
            }
            Counters::incr(&shared.counters.workers_replaced);

            if slot.probe(ping_timeout).await {
                healthy += 1;
            }
        }
        shared.healthy.store(healthy, Ordering::Release);
    }

    shared.healthy.store(0, Ordering::Release);
    futures::future::join_all(workers.into_iter().map(|w| w.join)).await;

    let remaining = {
        let mut queue = shared.queue.lock();
        queue.close();
        queue.drain()
    };
    if !remaining.is_empty() {
        tracing::info!(tasks = remaining.len(), "Failing queued tasks on shutdown");
    }
    for task in remaining {
        shared.report(&task, TaskOutcome::failed(&task.kind, TaskError::ShuttingDown));
    }

    tracing::info!("Worker pool stopped");
}
