// src/tasks/mod.rs

//! Background task management for the engagement schedulers.
//! Owns the proactive tick driver, the follow-up queue poller, and the
//! housekeeping loops.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, error, info};

use crate::engagement::TickInstant;
use crate::state::AppState;

pub mod config;
pub mod metrics;

use config::TaskConfig;
use metrics::TaskMetrics;

/// Manages all background tasks for the engagement system
pub struct TaskManager {
    app_state: Arc<AppState>,
    config: TaskConfig,
    metrics: Arc<TaskMetrics>,
    handles: Vec<JoinHandle<()>>,
}

impl TaskManager {
    /// Creates a new task manager
    pub fn new(app_state: Arc<AppState>) -> Self {
        Self {
            app_state,
            config: TaskConfig::from_env(),
            metrics: Arc::new(TaskMetrics::new()),
            handles: Vec::new(),
        }
    }

    /// Starts all background tasks
    pub fn start(&mut self) {
        info!("Starting background task manager");
        debug!("{}", self.config.summary());

        if self.config.proactive_enabled {
            let handle = self.spawn_proactive_driver();
            self.handles.push(handle);
        }

        if self.config.follow_up_enabled {
            let handle = self.spawn_follow_up_poller();
            self.handles.push(handle);
        }

        if self.config.cleanup_enabled {
            let handle = self.spawn_ledger_cleanup();
            self.handles.push(handle);
        }

        let handle = self.spawn_metrics_reporter();
        self.handles.push(handle);

        info!("Started {} background tasks", self.handles.len());
    }

    /// Spawns the proactive tick driver. The base cadence is process-wide;
    /// each user's own check interval is honored inside the scheduler.
    fn spawn_proactive_driver(&self) -> JoinHandle<()> {
        let app_state = self.app_state.clone();
        let interval = self.config.proactive_tick_interval;
        let metrics = self.metrics.clone();

        tokio::spawn(async move {
            info!("Proactive driver started (interval: {:?})", interval);

            let mut interval_timer = time::interval(interval);
            interval_timer.set_missed_tick_behavior(time::MissedTickBehavior::Skip);

            loop {
                interval_timer.tick().await;

                let start = std::time::Instant::now();
                match app_state.proactive.run_tick(TickInstant::now()).await {
                    Ok(report) => {
                        if report.sent > 0 || report.failures > 0 {
                            info!(
                                "Proactive tick: {} evaluated, {} sent, {} unmatched, {} failures",
                                report.evaluated, report.sent, report.unmatched, report.failures
                            );
                        }
                        metrics.record_task_duration("proactive", start.elapsed());
                        metrics.add_processed_items("proactive", report.sent);
                        for _ in 0..report.failures {
                            metrics.record_error("proactive");
                        }
                    }
                    Err(e) => {
                        error!("Proactive tick failed: {:#}", e);
                        metrics.record_error("proactive");
                    }
                }
            }
        })
    }

    /// Spawns the follow-up queue poller
    fn spawn_follow_up_poller(&self) -> JoinHandle<()> {
        let app_state = self.app_state.clone();
        let interval = self.config.follow_up_poll_interval;
        let metrics = self.metrics.clone();

        tokio::spawn(async move {
            info!("Follow-up poller started (interval: {:?})", interval);

            let mut interval_timer = time::interval(interval);
            interval_timer.set_missed_tick_behavior(time::MissedTickBehavior::Skip);

            loop {
                interval_timer.tick().await;

                match app_state.follow_up.run_due(TickInstant::now()).await {
                    Ok(fired) => {
                        if fired > 0 {
                            info!("Fired {} left-on-read follow-ups", fired);
                            metrics.add_processed_items("follow_up", fired);
                        }
                    }
                    Err(e) => {
                        error!("Follow-up poll failed: {:#}", e);
                        metrics.record_error("follow_up");
                    }
                }
            }
        })
    }

    /// Spawns the daily-counter and lock-table cleanup task
    fn spawn_ledger_cleanup(&self) -> JoinHandle<()> {
        let app_state = self.app_state.clone();
        let interval = self.config.cleanup_interval;
        let retention_days = self.config.counter_retention_days;
        let metrics = self.metrics.clone();

        tokio::spawn(async move {
            info!(
                "Ledger cleanup started (interval: {:?}, retention: {} days)",
                interval, retention_days
            );

            let mut interval_timer = time::interval(interval);
            interval_timer.set_missed_tick_behavior(time::MissedTickBehavior::Skip);

            loop {
                interval_timer.tick().await;

                let cutoff = (chrono::Local::now()
                    - chrono::Duration::days(retention_days))
                .format("%Y-%m-%d")
                .to_string();

                match app_state.budget.purge_older_than(&cutoff).await {
                    Ok(purged) => {
                        if purged > 0 {
                            info!("Purged {} stale daily counter rows", purged);
                            metrics.add_processed_items("cleanup", purged as usize);
                        }
                    }
                    Err(e) => {
                        error!("Counter cleanup failed: {:#}", e);
                        metrics.record_error("cleanup");
                    }
                }

                app_state.pair_locks.cleanup_unused().await;
            }
        })
    }

    /// Spawns the metrics reporter task
    fn spawn_metrics_reporter(&self) -> JoinHandle<()> {
        let metrics = self.metrics.clone();
        let interval = Duration::from_secs(3600); // 1 hour

        tokio::spawn(async move {
            let mut interval_timer = time::interval(interval);
            interval_timer.set_missed_tick_behavior(time::MissedTickBehavior::Skip);

            loop {
                interval_timer.tick().await;
                metrics.report();
            }
        })
    }

    /// Gracefully shuts down all tasks
    pub fn shutdown(self) {
        info!("Shutting down {} background tasks", self.handles.len());

        for handle in self.handles {
            handle.abort();
        }

        info!("All background tasks terminated");
    }
}
