use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Scheduler operational metrics.
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerMetrics {
    /// Size of the worker pool.
    pub workers: usize,
    /// Workers executing a kernel at snapshot time.
    pub active_workers: usize,
    /// Tasks ever submitted.
    pub tasks_submitted: u64,
    /// Tasks whose completion has been processed.
    pub tasks_completed: u64,
    /// Tasks whose kernel returned an error or panicked.
    pub tasks_faulted: u64,
    /// Executions by kernel name.
    pub tasks_executed: HashMap<String, u64>,
    /// Average kernel duration by kernel name.
    pub avg_task_duration: HashMap<String, Duration>,
    /// When the pool started.
    pub started_at: DateTime<Utc>,
    /// Last time a task completed.
    pub last_completion: Option<DateTime<Utc>>,
}

impl Default for SchedulerMetrics {
    fn default() -> Self {
        Self {
            workers: 0,
            active_workers: 0,
            tasks_submitted: 0,
            tasks_completed: 0,
            tasks_faulted: 0,
            tasks_executed: HashMap::new(),
            avg_task_duration: HashMap::new(),
            started_at: Utc::now(),
            last_completion: None,
        }
    }
}

impl SchedulerMetrics {
    /// Record a task execution.
    pub fn record_execution(&mut self, kernel: &str, duration: Duration, faulted: bool) {
        if faulted {
            self.tasks_faulted += 1;
        }
        let count = {
            let entry = self.tasks_executed.entry(kernel.to_string()).or_default();
            *entry += 1;
            *entry
        };
        self.last_completion = Some(Utc::now());

        let prev_avg = self
            .avg_task_duration
            .get(kernel)
            .copied()
            .unwrap_or_default();

        // Incremental mean: new_avg = prev_avg + (duration - prev_avg) / count
        let new_avg = if count == 1 {
            duration
        } else {
            let prev_nanos = prev_avg.as_nanos() as f64;
            let cur_nanos = duration.as_nanos() as f64;
            let avg_nanos = prev_nanos + (cur_nanos - prev_nanos) / count as f64;
            Duration::from_nanos(avg_nanos as u64)
        };

        self.avg_task_duration.insert(kernel.to_string(), new_avg);
    }

    /// Fraction of the pool busy at snapshot time.
    pub fn worker_utilization(&self) -> f64 {
        if self.workers == 0 {
            0.0
        } else {
            self.active_workers as f64 / self.workers as f64
        }
    }
}
