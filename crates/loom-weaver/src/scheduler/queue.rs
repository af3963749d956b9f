//! Priority lanes with key coalescing.

use super::{ActivityLevel, ScheduledTask, TaskPriority};
use serde::Serialize;
use std::collections::{BTreeSet, VecDeque};

/// Pending work per priority.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub urgent: usize,
    pub normal: usize,
    pub low: usize,
}

impl QueueStats {
    pub fn total(&self) -> usize {
        self.urgent + self.normal + self.low
    }
}

/// Three FIFO lanes. A key already waiting in any lane is not queued twice.
#[derive(Debug)]
pub struct TaskQueue<T: ScheduledTask> {
    lanes: [VecDeque<T>; 3],
    pending: BTreeSet<T::Key>,
}

impl<T: ScheduledTask> Default for TaskQueue<T> {
    fn default() -> Self {
        Self {
            lanes: [VecDeque::new(), VecDeque::new(), VecDeque::new()],
            pending: BTreeSet::new(),
        }
    }
}

impl<T: ScheduledTask> TaskQueue<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `task`. Returns `false` if its key was already waiting.
    pub fn push(&mut self, task: T) -> bool {
        if !self.pending.insert(task.key()) {
            return false;
        }
        self.lanes[task.priority().lane()].push_back(task);
        true
    }

    /// The next task `level` admits, most urgent lane first.
    pub fn pop(&mut self, level: ActivityLevel) -> Option<T> {
        for priority in TaskPriority::ALL {
            if !level.admits(priority) {
                continue;
            }
            if let Some(task) = self.lanes[priority.lane()].pop_front() {
                self.pending.remove(&task.key());
                return Some(task);
            }
        }
        None
    }

    pub fn len(&self) -> usize {
        self.lanes.iter().map(VecDeque::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop everything. Returns how many tasks were abandoned.
    pub fn clear(&mut self) -> usize {
        let abandoned = self.len();
        self.lanes.iter_mut().for_each(VecDeque::clear);
        self.pending.clear();
        abandoned
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            urgent: self.lanes[TaskPriority::Urgent.lane()].len(),
            normal: self.lanes[TaskPriority::Normal.lane()].len(),
            low: self.lanes[TaskPriority::Low.lane()].len(),
        }
    }
}
