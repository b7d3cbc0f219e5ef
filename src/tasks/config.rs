// src/tasks/config.rs
// Configuration for background tasks

use std::time::Duration;

pub struct TaskConfig {
    // Proactive tick driver
    pub proactive_enabled: bool,
    pub proactive_tick_interval: Duration,

    // Follow-up queue poller
    pub follow_up_enabled: bool,
    pub follow_up_poll_interval: Duration,

    // Daily counter cleanup
    pub cleanup_enabled: bool,
    pub cleanup_interval: Duration,
    pub counter_retention_days: i64,

    // Fan-out worker pool size
    pub worker_limit: usize,
}

impl TaskConfig {
    pub fn from_env() -> Self {
        Self {
            // Proactive driver base cadence: every minute. Per-user check
            // intervals gate on top of this inside the scheduler.
            proactive_enabled: std::env::var("TASK_PROACTIVE_ENABLED")
                .unwrap_or_else(|_| "true".to_string())
                .parse()
                .unwrap_or(true),
            proactive_tick_interval: Duration::from_secs(
                std::env::var("TASK_PROACTIVE_INTERVAL")
                    .unwrap_or_else(|_| "60".to_string())
                    .parse()
                    .unwrap_or(60),
            ),

            // Follow-up queue polled every 30 seconds
            follow_up_enabled: std::env::var("TASK_FOLLOW_UP_ENABLED")
                .unwrap_or_else(|_| "true".to_string())
                .parse()
                .unwrap_or(true),
            follow_up_poll_interval: Duration::from_secs(
                std::env::var("TASK_FOLLOW_UP_INTERVAL")
                    .unwrap_or_else(|_| "30".to_string())
                    .parse()
                    .unwrap_or(30),
            ),

            // Cleanup once a day
            cleanup_enabled: std::env::var("TASK_CLEANUP_ENABLED")
                .unwrap_or_else(|_| "true".to_string())
                .parse()
                .unwrap_or(true),
            cleanup_interval: Duration::from_secs(
                std::env::var("TASK_CLEANUP_INTERVAL")
                    .unwrap_or_else(|_| "86400".to_string())
                    .parse()
                    .unwrap_or(86400),
            ),
            counter_retention_days: std::env::var("TASK_COUNTER_RETENTION_DAYS")
                .unwrap_or_else(|_| "14".to_string())
                .parse()
                .unwrap_or(14),

            worker_limit: std::env::var("TASK_WORKER_LIMIT")
                .unwrap_or_else(|_| "8".to_string())
                .parse()
                .unwrap_or(8),
        }
    }

    /// Get a human-readable summary of the configuration
    pub fn summary(&self) -> String {
        format!(
            "Tasks Config:\n\
            - Proactive: {} (every {} secs)\n\
            - Follow-up: {} (every {} secs)\n\
            - Cleanup: {} (every {} hours, retention {} days)\n\
            - Worker limit: {}",
            if self.proactive_enabled { "ON" } else { "OFF" },
            self.proactive_tick_interval.as_secs(),
            if self.follow_up_enabled { "ON" } else { "OFF" },
            self.follow_up_poll_interval.as_secs(),
            if self.cleanup_enabled { "ON" } else { "OFF" },
            self.cleanup_interval.as_secs() / 3600,
            self.counter_retention_days,
            self.worker_limit,
        )
    }
}
