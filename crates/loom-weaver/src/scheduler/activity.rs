//! Foreground activity detection.

use crate::config::SchedulerConfig;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tracing::debug;

/// How busy the foreground is. Decides which priorities may run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityLevel {
    /// The host is issuing requests rapidly.
    High,
    /// Some recent requests.
    Low,
    /// No requests for a while.
    Sleep,
}

impl fmt::Display for ActivityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::High => f.write_str("high"),
            Self::Low => f.write_str("low"),
            Self::Sleep => f.write_str("sleep"),
        }
    }
}

#[derive(Debug)]
struct ActivityState {
    recent: VecDeque<Instant>,
    last_request: Instant,
    override_level: Option<ActivityLevel>,
    reported: Option<ActivityLevel>,
}

/// Sliding-window counter of foreground requests.
///
/// Activity is High while at least `high_activity_requests` requests fall
/// inside `window`, Sleep once nothing has happened for `sleep_after`, and
/// Low otherwise. A manual override wins over both.
#[derive(Debug)]
pub struct ActivityMonitor {
    config: SchedulerConfig,
    state: Mutex<ActivityState>,
}

impl ActivityMonitor {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            state: Mutex::new(ActivityState {
                recent: VecDeque::new(),
                last_request: Instant::now(),
                override_level: None,
                reported: None,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, ActivityState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Note one foreground request.
    pub fn record_request(&self) {
        let now = Instant::now();
        let mut state = self.state();
        state.last_request = now;
        state.recent.push_back(now);
        let cap = self.config.high_activity_requests;
        while state.recent.len() > cap {
            state.recent.pop_front();
        }
    }

    /// Pin the level, or return to detection with `None`.
    pub fn set_override(&self, level: Option<ActivityLevel>) {
        self.state().override_level = level;
    }

    /// The current level.
    pub fn level(&self) -> ActivityLevel {
        let now = Instant::now();
        let mut state = self.state();
        let level = match state.override_level {
            Some(level) => level,
            None => {
                let window = self.config.window();
                while state
                    .recent
                    .front()
                    .is_some_and(|t| now.duration_since(*t) > window)
                {
                    state.recent.pop_front();
                }
                if state.recent.len() >= self.config.high_activity_requests {
                    ActivityLevel::High
                } else if now.duration_since(state.last_request) >= self.config.sleep_after() {
                    ActivityLevel::Sleep
                } else {
                    ActivityLevel::Low
                }
            }
        };
        if state.reported != Some(level) {
            debug!(from = ?state.reported, to = %level, "Activity level changed");
            state.reported = Some(level);
        }
        level
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    fn config(high: usize, window_ms: u64, sleep_after_ms: u64) -> SchedulerConfig {
        SchedulerConfig {
            window_ms,
            high_activity_requests: high,
            sleep_after_ms,
            poll_interval_ms: 10,
        }
    }

    #[test]
    fn burst_of_requests_is_high() {
        let monitor = ActivityMonitor::new(config(3, 60_000, 60_000));
        assert_eq!(monitor.level(), ActivityLevel::Low);
        for _ in 0..3 {
            monitor.record_request();
        }
        assert_eq!(monitor.level(), ActivityLevel::High);
    }

    #[test]
    fn requests_age_out_of_the_window() {
        let monitor = ActivityMonitor::new(config(2, 20, 60_000));
        monitor.record_request();
        monitor.record_request();
        assert_eq!(monitor.level(), ActivityLevel::High);
        thread::sleep(Duration::from_millis(40));
        assert_eq!(monitor.level(), ActivityLevel::Low);
    }

    #[test]
    fn idle_monitor_falls_asleep() {
        let monitor = ActivityMonitor::new(config(5, 1000, 20));
        thread::sleep(Duration::from_millis(40));
        assert_eq!(monitor.level(), ActivityLevel::Sleep);
        monitor.record_request();
        assert_eq!(monitor.level(), ActivityLevel::Low);
    }

    #[test]
    fn override_wins() {
        let monitor = ActivityMonitor::new(config(1, 60_000, 60_000));
        monitor.record_request();
        monitor.set_override(Some(ActivityLevel::Sleep));
        assert_eq!(monitor.level(), ActivityLevel::Sleep);
        monitor.set_override(None);
        assert_eq!(monitor.level(), ActivityLevel::High);
    }
}
