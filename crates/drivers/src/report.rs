use std::time::Duration;

use serde::Serialize;

/// Outcome of one benchmark run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub benchmark: String,
    pub tasks: usize,
    pub elapsed_ms: f64,
}

impl RunSummary {
    pub fn new(benchmark: impl Into<String>, tasks: usize, elapsed: Duration) -> Self {
        Self {
            benchmark: benchmark.into(),
            tasks,
            elapsed_ms: elapsed.as_secs_f64() * 1000.0,
        }
    }

    /// Tasks completed per second of wall time.
    pub fn throughput(&self) -> f64 {
        if self.elapsed_ms > 0.0 {
            self.tasks as f64 / (self.elapsed_ms / 1000.0)
        } else {
            0.0
        }
    }
}
