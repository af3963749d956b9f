//! # Task Scheduler
//!
//! Background work waits in three priority lanes. What may leave the queue
//! depends on foreground activity:
//!
//! | Activity | Admitted |
//! |----------|----------|
//! | High     | Urgent |
//! | Low      | Urgent, Normal |
//! | Sleep    | Urgent, Normal, Low |
//!
//! Enqueueing never blocks. Workers call [`Scheduler::next`], which waits
//! until something admissible arrives, re-checking activity every
//! `poll_interval`.

mod activity;
mod queue;

pub use activity::{ActivityLevel, ActivityMonitor};
pub use queue::{QueueStats, TaskQueue};

use crate::config::SchedulerConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tracing::debug;

/// Urgency of a background task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    Urgent,
    Normal,
    Low,
}

impl TaskPriority {
    /// Every priority, most urgent first.
    pub const ALL: [Self; 3] = [Self::Urgent, Self::Normal, Self::Low];

    const fn lane(self) -> usize {
        match self {
            Self::Urgent => 0,
            Self::Normal => 1,
            Self::Low => 2,
        }
    }
}

impl fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Urgent => f.write_str("urgent"),
            Self::Normal => f.write_str("normal"),
            Self::Low => f.write_str("low"),
        }
    }
}

impl ActivityLevel {
    /// Whether work of `priority` may run at this level.
    pub const fn admits(self, priority: TaskPriority) -> bool {
        match self {
            Self::High => matches!(priority, TaskPriority::Urgent),
            Self::Low => matches!(priority, TaskPriority::Urgent | TaskPriority::Normal),
            Self::Sleep => true,
        }
    }
}

/// Work the scheduler can hold.
pub trait ScheduledTask: Send {
    /// Identity used to coalesce duplicates.
    type Key: Ord + Clone + Send + fmt::Debug;

    fn key(&self) -> Self::Key;

    fn priority(&self) -> TaskPriority;
}

/// Activity-gated priority queue shared by producers and workers.
#[derive(Debug)]
pub struct Scheduler<T: ScheduledTask> {
    queue: Mutex<TaskQueue<T>>,
    activity: Arc<ActivityMonitor>,
    notify: Notify,
    closed: AtomicBool,
    poll_interval: Duration,
}

impl<T: ScheduledTask> Scheduler<T> {
    pub fn new(config: &SchedulerConfig, activity: Arc<ActivityMonitor>) -> Self {
        Self {
            queue: Mutex::new(TaskQueue::new()),
            activity,
            notify: Notify::new(),
            closed: AtomicBool::new(false),
            poll_interval: config.poll_interval(),
        }
    }

    fn queue(&self) -> MutexGuard<'_, TaskQueue<T>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn activity(&self) -> &Arc<ActivityMonitor> {
        &self.activity
    }

    /// Queue `task` without blocking.
    ///
    /// Returns `false` when the scheduler is closed or the task's key is
    /// already waiting.
    pub fn enqueue(&self, task: T) -> bool {
        if self.is_closed() {
            return false;
        }
        let accepted = self.queue().push(task);
        if accepted {
            self.notify.notify_one();
        }
        accepted
    }

    /// Wait for the next admissible task. `None` once the scheduler is closed.
    pub async fn next(&self) -> Option<T> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.is_closed() {
                return None;
            }
            let level = self.activity.level();
            if let Some(task) = self.queue().pop(level) {
                return Some(task);
            }

            tokio::select! {
                () = &mut notified => {}
                () = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }

    /// Take the next admissible task without waiting.
    pub fn try_next(&self) -> Option<T> {
        if self.is_closed() {
            return None;
        }
        let level = self.activity.level();
        self.queue().pop(level)
    }

    /// Stop handing out work and abandon what is queued. Returns the abandoned count.
    pub fn close(&self) -> usize {
        self.closed.store(true, Ordering::Release);
        let abandoned = self.queue().clear();
        self.notify.notify_waiters();
        debug!(abandoned, "Scheduler closed");
        abandoned
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> QueueStats {
        self.queue().stats()
    }
}
