//! # Scheduler Tests
//!
//! Priority lanes, activity gating and coalescing.

use loom_weaver::{ActivityLevel, ActivityMonitor, ScheduledTask, Scheduler, SchedulerConfig, TaskPriority, TaskQueue};
use proptest::prelude::*;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
struct Job {
    key: u8,
    priority: TaskPriority,
}

impl Job {
    fn new(key: u8, priority: TaskPriority) -> Self {
        Self { key, priority }
    }
}

impl ScheduledTask for Job {
    type Key = u8;

    fn key(&self) -> u8 {
        self.key
    }

    fn priority(&self) -> TaskPriority {
        self.priority
    }
}

fn config() -> SchedulerConfig {
    SchedulerConfig {
        window_ms: 10_000,
        high_activity_requests: 3,
        sleep_after_ms: 60_000,
        poll_interval_ms: 10,
    }
}

fn scheduler(level: ActivityLevel) -> (Arc<ActivityMonitor>, Arc<Scheduler<Job>>) {
    let activity = Arc::new(ActivityMonitor::new(config()));
    activity.set_override(Some(level));
    let scheduler = Arc::new(Scheduler::new(&config(), Arc::clone(&activity)));
    (activity, scheduler)
}

#[tokio::test]
async fn low_priority_waits_until_host_sleeps() {
    let (activity, scheduler) = scheduler(ActivityLevel::High);
    assert!(scheduler.enqueue(Job::new(1, TaskPriority::Low)));

    let held = tokio::time::timeout(Duration::from_millis(50), scheduler.next()).await;
    assert!(held.is_err(), "low priority ran under high activity");

    activity.set_override(Some(ActivityLevel::Sleep));
    let job = tokio::time::timeout(Duration::from_secs(2), scheduler.next())
        .await
        .expect("admitted after sleep");
    assert_eq!(job, Some(Job::new(1, TaskPriority::Low)));
}

#[tokio::test]
async fn urgent_runs_under_high_activity() {
    let (_activity, scheduler) = scheduler(ActivityLevel::High);
    scheduler.enqueue(Job::new(1, TaskPriority::Low));
    scheduler.enqueue(Job::new(2, TaskPriority::Normal));
    scheduler.enqueue(Job::new(3, TaskPriority::Urgent));

    let job = tokio::time::timeout(Duration::from_secs(1), scheduler.next())
        .await
        .expect("urgent admitted");
    assert_eq!(job.map(|j| j.key), Some(3));
    assert!(scheduler.try_next().is_none());
    assert_eq!(scheduler.stats().total(), 2);
}

#[test]
fn normal_admitted_at_low_activity() {
    let (activity, scheduler) = scheduler(ActivityLevel::Low);
    scheduler.enqueue(Job::new(1, TaskPriority::Low));
    scheduler.enqueue(Job::new(2, TaskPriority::Normal));

    assert_eq!(scheduler.try_next().map(|j| j.key), Some(2));
    assert!(scheduler.try_next().is_none());

    activity.set_override(Some(ActivityLevel::Sleep));
    assert_eq!(scheduler.try_next().map(|j| j.key), Some(1));
}

#[tokio::test]
async fn close_wakes_waiting_workers() {
    let (_activity, scheduler) = scheduler(ActivityLevel::High);
    scheduler.enqueue(Job::new(1, TaskPriority::Low));

    let waiter = {
        let scheduler = Arc::clone(&scheduler);
        tokio::spawn(async move { scheduler.next().await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(scheduler.close(), 1);
    let result = tokio::time::timeout(Duration::from_secs(1), waiter)
        .await
        .expect("woken")
        .expect("join");
    assert!(result.is_none());
    assert!(!scheduler.enqueue(Job::new(2, TaskPriority::Urgent)));
}

#[test]
fn pending_duplicates_coalesce() {
    let (_activity, scheduler) = scheduler(ActivityLevel::Sleep);
    assert!(scheduler.enqueue(Job::new(7, TaskPriority::Normal)));
    assert!(!scheduler.enqueue(Job::new(7, TaskPriority::Urgent)));
    assert_eq!(scheduler.stats().total(), 1);

    // Once taken, the same key may queue again.
    assert!(scheduler.try_next().is_some());
    assert!(scheduler.enqueue(Job::new(7, TaskPriority::Normal)));
}

#[test]
fn request_bursts_raise_activity() {
    let activity = ActivityMonitor::new(config());
    assert_eq!(activity.level(), ActivityLevel::Low);
    for _ in 0..3 {
        activity.record_request();
    }
    assert_eq!(activity.level(), ActivityLevel::High);

    activity.set_override(Some(ActivityLevel::Sleep));
    assert_eq!(activity.level(), ActivityLevel::Sleep);
    activity.set_override(None);
    assert_eq!(activity.level(), ActivityLevel::High);
}

fn priority() -> impl Strategy<Value = TaskPriority> {
    prop_oneof![
        Just(TaskPriority::Urgent),
        Just(TaskPriority::Normal),
        Just(TaskPriority::Low),
    ]
}

fn level() -> impl Strategy<Value = ActivityLevel> {
    prop_oneof![
        Just(ActivityLevel::High),
        Just(ActivityLevel::Low),
        Just(ActivityLevel::Sleep),
    ]
}

proptest! {
    #[test]
    fn pops_only_admitted_work_most_urgent_first(
        jobs in prop::collection::vec((0u8..16, priority()), 0..64),
        level in level(),
    ) {
        let mut queue = TaskQueue::new();
        let mut accepted = BTreeMap::new();
        for (key, priority) in &jobs {
            if queue.push(Job::new(*key, *priority)) {
                accepted.insert(*key, *priority);
            }
        }
        prop_assert_eq!(queue.len(), accepted.len());

        let popped: Vec<Job> = std::iter::from_fn(|| queue.pop(level)).collect();
        for job in &popped {
            prop_assert!(level.admits(job.priority));
        }
        prop_assert!(popped.windows(2).all(|w| w[0].priority <= w[1].priority));

        let held = accepted.values().filter(|p| !level.admits(**p)).count();
        prop_assert_eq!(queue.len(), held);
    }
}
