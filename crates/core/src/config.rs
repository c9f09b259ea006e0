use std::env;

use serde::{Deserialize, Serialize};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

fn env_usize(key: &str, default: usize) -> usize {
    env_opt(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Scheduler startup options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Number of worker threads. 0 = available parallelism.
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,
    /// Maximum number of distinct tiles a single task may declare. 0 = unbounded.
    #[serde(default = "default_max_operands")]
    pub max_operands: usize,
    /// Worker threads are named `{prefix}-{index}`.
    #[serde(default = "default_thread_name_prefix")]
    pub thread_name_prefix: String,
}

fn default_worker_threads() -> usize { 0 }
fn default_max_operands() -> usize { 3 }
fn default_thread_name_prefix() -> String { "tessera-worker".to_string() }

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            worker_threads: default_worker_threads(),
            max_operands: default_max_operands(),
            thread_name_prefix: default_thread_name_prefix(),
        }
    }
}

impl SchedulerConfig {
    /// Build config from environment variables, reading `.env` first.
    ///
    /// Recognized keys: `TESSERA_WORKERS`, `TESSERA_MAX_OPERANDS`,
    /// `TESSERA_THREAD_PREFIX`.
    pub fn from_env() -> Self {
        load_dotenv();
        Self {
            worker_threads: env_usize("TESSERA_WORKERS", default_worker_threads()),
            max_operands: env_usize("TESSERA_MAX_OPERANDS", default_max_operands()),
            thread_name_prefix: env_opt("TESSERA_THREAD_PREFIX")
                .unwrap_or_else(default_thread_name_prefix),
        }
    }

    /// Config with a fixed worker count and default everything else.
    pub fn with_workers(worker_threads: usize) -> Self {
        Self { worker_threads, ..Self::default() }
    }

    /// Resolve worker thread count (0 means use available parallelism).
    pub fn resolved_worker_threads(&self) -> usize {
        if self.worker_threads == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        } else {
            self.worker_threads
        }
    }

    /// Operand capacity, `None` when unbounded.
    pub fn operand_limit(&self) -> Option<usize> {
        (self.max_operands > 0).then_some(self.max_operands)
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!(
            "Scheduler config: workers={}, max_operands={}",
            self.resolved_worker_threads(),
            self.operand_limit()
                .map(|n| n.to_string())
                .unwrap_or_else(|| "unbounded".to_string())
        );
    }
}
