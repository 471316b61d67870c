use std::collections::VecDeque;

use crate::error::SchedulerError;

use super::{Task, TaskPriority};

const TIERS: usize = 4;

/// Bounded priority queue: one FIFO per priority tier, drained
/// critical > high > medium > low.
///
/// When full, a new task evicts the most recently queued task of the lowest
/// non-empty tier strictly below its own priority. With no such task the
/// push is rejected. Once closed, every push is rejected.
pub struct TaskQueue {
    tiers: [VecDeque<Task>; TIERS],
    capacity: usize,
    len: usize,
    closed: bool,
}

impl TaskQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            tiers: Default::default(),
            capacity: capacity.max(1),
            len: 0,
            closed: false,
        }
    }

    /// Enqueue a task. Returns the evicted task, if one had to make room.
    pub fn push(&mut self, task: Task) -> Result<Option<Task>, SchedulerError> {
        if self.closed {
            return Err(SchedulerError::Closed);
        }
        let tier = task.priority.index();

        if self.len < self.capacity {
            self.tiers[tier].push_back(task);
            self.len += 1;
            return Ok(None);
        }

        let victim_tier = (0..tier).find(|&t| !self.tiers[t].is_empty());
        match victim_tier.and_then(|t| self.tiers[t].pop_back()) {
            Some(evicted) => {
                tracing::debug!(
                    evicted = %evicted.id,
                    evicted_priority = ?evicted.priority,
                    admitted = %task.id,
                    "Queue full, evicted lower priority task"
                );
                self.tiers[tier].push_back(task);
                Ok(Some(evicted))
            }
            None => Err(SchedulerError::QueueFull {
                capacity: self.capacity,
                priority: task.priority,
            }),
        }
    }

    /// Next task by priority, FIFO within a tier.
    pub fn pop(&mut self) -> Option<Task> {
        let task = self.tiers.iter_mut().rev().find_map(VecDeque::pop_front)?;
        self.len -= 1;
        Some(task)
    }

    /// Remove and return everything still queued, highest priority first.
    pub fn drain(&mut self) -> Vec<Task> {
        let mut drained = Vec::with_capacity(self.len);
        while let Some(task) = self.pop() {
            drained.push(task);
        }
        drained
    }

    /// Stop accepting tasks. Already queued tasks stay until drained.
    pub fn close(&mut self) {
        self.closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len_at(&self, priority: TaskPriority) -> usize {
        self.tiers[priority.index()].len()
    }
}
