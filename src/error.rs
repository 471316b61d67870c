use thiserror::Error;

use crate::tasks::{TaskId, TaskPriority};

/// A raw event failed structural validation and must not enter the store.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ValidationError {
    #[error("event type is missing or empty")]
    EmptyType,

    #[error("unknown event type '{0}'")]
    UnknownType(String),

    #[error("event timestamp is missing or not numeric")]
    NonNumericTimestamp,

    #[error("event timestamp {0} is negative")]
    NegativeTimestamp(i64),

    #[error("event data must be a JSON object")]
    DataNotObject,
}

/// A pattern failed while checking an event. The pattern contributes no match.
#[derive(Debug, Clone, Error)]
pub enum PatternEvaluationError {
    #[error("pattern '{pattern}' failed: {reason}")]
    Failed { pattern: String, reason: String },

    #[error("pattern '{pattern}' panicked during evaluation")]
    Panicked { pattern: String },
}

impl PatternEvaluationError {
    pub fn failed(pattern: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Failed {
            pattern: pattern.into(),
            reason: reason.into(),
        }
    }
}

/// Delivering an alert to subscribers failed. The stored alert is unaffected.
#[derive(Debug, Clone, Error)]
pub enum BroadcastError {
    #[error("no active subscribers")]
    NoSubscribers,

    #[error("broadcast channel closed")]
    Closed,

    #[error("sink rejected alert: {0}")]
    Rejected(String),
}

/// Failure of a single scheduled task.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TaskError {
    #[error("task {task_id} timed out after {timeout_ms}ms")]
    Timeout { task_id: TaskId, timeout_ms: u64 },

    #[error("task {task_id} lost: worker {worker} was replaced")]
    WorkerFault { task_id: TaskId, worker: usize },

    #[error("task {task_id} evicted by higher priority work")]
    Evicted { task_id: TaskId },

    #[error("task {task_id} panicked during detection")]
    Panicked { task_id: TaskId },

    #[error("scheduler is shutting down")]
    ShuttingDown,
}

/// Caller-visible scheduling failure. Callers apply their own backpressure.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SchedulerError {
    #[error("task queue full (capacity {capacity}), no task below {priority:?} priority to evict")]
    QueueFull {
        capacity: usize,
        priority: TaskPriority,
    },

    #[error("scheduler is shut down")]
    Closed,
}
