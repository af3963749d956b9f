//! # Weaver Configuration
//!
//! Durations are plain integers in config files (`*_ms`, `*_secs`) and are
//! exposed as [`Duration`] through accessor methods.

use loom_core::ConfigError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default similarity an associative link must reach.
pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.85;

/// Default cap on associative links created per node.
pub const DEFAULT_MAX_ASSOCIATIONS: usize = 3;

/// Default association window: thirty days.
pub const DEFAULT_ASSOCIATION_WINDOW_SECS: u64 = 30 * 24 * 60 * 60;

/// Default number of unsummarized messages that triggers a summary.
pub const DEFAULT_SUMMARY_THRESHOLD: usize = 20;

/// Default event queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 10_000;

/// Background enrichment settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeaverConfig {
    /// Start the Weaver at all.
    pub enabled: bool,
    /// Worker tasks, and threads of the dedicated runtime.
    pub workers: usize,
    /// Events buffered between commits and the dispatcher. Further events are dropped.
    pub queue_capacity: usize,
    pub similarity_threshold: f32,
    pub max_associations: usize,
    /// Only nodes created this close in time are associated.
    pub association_window_secs: u64,
    pub summary_threshold: usize,
    pub shutdown_timeout_ms: u64,
    pub scheduler: SchedulerConfig,
}

impl Default for WeaverConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            workers: 2,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            max_associations: DEFAULT_MAX_ASSOCIATIONS,
            association_window_secs: DEFAULT_ASSOCIATION_WINDOW_SECS,
            summary_threshold: DEFAULT_SUMMARY_THRESHOLD,
            shutdown_timeout_ms: 5_000,
            scheduler: SchedulerConfig::default(),
        }
    }
}

impl WeaverConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::Invalid {
                field: "weaver.workers",
                reason: "must be positive".to_string(),
            });
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::Invalid {
                field: "weaver.queue_capacity",
                reason: "must be positive".to_string(),
            });
        }
        if !(-1.0..=1.0).contains(&self.similarity_threshold) {
            return Err(ConfigError::Invalid {
                field: "weaver.similarity_threshold",
                reason: format!("{} is outside [-1, 1]", self.similarity_threshold),
            });
        }
        if self.summary_threshold == 0 {
            return Err(ConfigError::Invalid {
                field: "weaver.summary_threshold",
                reason: "must be positive".to_string(),
            });
        }
        self.scheduler.validate()
    }

    /// Association window in milliseconds, the unit of node timestamps.
    pub fn association_window_millis(&self) -> i64 {
        i64::try_from(self.association_window_secs.saturating_mul(1000)).unwrap_or(i64::MAX)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

/// Activity detection and admission polling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Sliding window over which foreground requests are counted.
    pub window_ms: u64,
    /// Requests within the window that make activity High.
    pub high_activity_requests: usize,
    /// Idle time after which activity drops to Sleep.
    pub sleep_after_ms: u64,
    /// How often waiting workers re-evaluate activity.
    pub poll_interval_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            window_ms: 10_000,
            high_activity_requests: 20,
            sleep_after_ms: 5 * 60 * 1000,
            poll_interval_ms: 100,
        }
    }
}

impl SchedulerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.high_activity_requests == 0 {
            return Err(ConfigError::Invalid {
                field: "weaver.scheduler.high_activity_requests",
                reason: "must be positive".to_string(),
            });
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "weaver.scheduler.poll_interval_ms",
                reason: "must be positive".to_string(),
            });
        }
        Ok(())
    }

    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    pub fn sleep_after(&self) -> Duration {
        Duration::from_millis(self.sleep_after_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(WeaverConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_zero_workers() {
        let config = WeaverConfig {
            workers: 0,
            ..WeaverConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "weaver.workers", .. })
        ));
    }

    #[test]
    fn rejects_threshold_out_of_range() {
        let config = WeaverConfig {
            similarity_threshold: 1.5,
            ..WeaverConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn window_converts_to_millis() {
        let config = WeaverConfig {
            association_window_secs: 2,
            ..WeaverConfig::default()
        };
        assert_eq!(config.association_window_millis(), 2000);
    }
}
