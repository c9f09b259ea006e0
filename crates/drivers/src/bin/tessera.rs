//! tessera: run the tiled LU, matrix multiplication and counter
//! benchmarks on the dependency-tracking scheduler.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing::info;

use tessera_drivers::{check, counter, lu, matmul, Matrix, RunSummary};
use tessera_scheduler::{Scheduler, SchedulerConfig};

/// Largest matrix order printed by `--print`.
const PRINT_LIMIT: usize = 16;

// ── CLI ─────────────────────────────────────────────────────────────

/// Tiled task-parallel linear algebra benchmarks.
#[derive(Parser, Debug)]
#[command(name = "tessera", version, about)]
struct Cli {
    /// Worker threads (0 = available parallelism).
    #[arg(long, short = 'w', env = "TESSERA_WORKERS", global = true)]
    workers: Option<usize>,

    /// Distinct tiles a task may declare (0 = unbounded).
    #[arg(long, env = "TESSERA_MAX_OPERANDS", global = true)]
    max_operands: Option<usize>,

    /// Print the run summary and scheduler metrics as JSON.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Tiled LU factorization without pivoting.
    Lu {
        /// Matrix order.
        #[arg(default_value_t = 8)]
        n: usize,
        /// Tile order, must divide the matrix order.
        #[arg(default_value_t = 4)]
        tile_size: usize,
        /// Validate the factors against the input.
        #[arg(long)]
        check: bool,
        /// Print the packed factors (small matrices only).
        #[arg(long)]
        print: bool,
    },
    /// Tiled matrix multiplication.
    Mm {
        #[arg(default_value_t = 8)]
        n: usize,
        #[arg(default_value_t = 4)]
        tile_size: usize,
        #[arg(long)]
        check: bool,
        #[arg(long)]
        print: bool,
    },
    /// Independent counting tasks.
    Counter {
        #[arg(default_value_t = 1000)]
        n_tasks: usize,
        /// Increments per task.
        #[arg(default_value_t = 1000)]
        n: u64,
    },
    /// Counting tasks with pseudo-random tile dependencies.
    CounterDeps {
        #[arg(default_value_t = 1000)]
        n_tasks: usize,
        #[arg(default_value_t = 1000)]
        n: u64,
    },
    /// LU task graph on a 32x30 grid with counting kernels.
    LuCounter {
        /// Number of factorizations.
        #[arg(default_value_t = 1)]
        n_repeat: usize,
        #[arg(default_value_t = 1000)]
        n: u64,
    },
    /// Matmul task graph with counting kernels.
    MmCounter {
        #[arg(long, default_value_t = 24)]
        n_tiles: usize,
        #[arg(default_value_t = 1)]
        n_repeat: usize,
        #[arg(default_value_t = 64)]
        n: u64,
    },
}

impl Cli {
    fn scheduler_config(&self) -> SchedulerConfig {
        let mut config = SchedulerConfig::from_env();
        if let Some(workers) = self.workers {
            config.worker_threads = workers;
        }
        if let Some(max) = self.max_operands {
            config.max_operands = max;
        }
        config
    }
}

fn print_matrix(name: &str, matrix: &Matrix) {
    if matrix.n() > PRINT_LIMIT {
        info!(n = matrix.n(), "{name} too large to print");
        return;
    }
    println!("{name}:\n{}", matrix.render());
}

fn run(scheduler: &Scheduler, command: Command) -> anyhow::Result<RunSummary> {
    let summary = match command {
        Command::Lu { n, tile_size, check: verify, print } => {
            let (summary, factors) = lu::run_lu(scheduler, n, tile_size)?;
            if print {
                print_matrix("LU", &factors);
            }
            if verify {
                check::check_lu_benchmark(&factors).context("LU check failed")?;
                info!("LU check passed");
            }
            summary
        }
        Command::Mm { n, tile_size, check: verify, print } => {
            let (summary, c) = matmul::run_mm(scheduler, n, tile_size)?;
            if print {
                print_matrix("C", &c);
            }
            if verify {
                let (a, b) = matmul::mm_inputs(n);
                check::check_matmul(&a, &b, &c, 0.0).context("matmul check failed")?;
                info!("matmul check passed");
            }
            summary
        }
        Command::Counter { n_tasks, n } => counter::run_counter(scheduler, n_tasks, n)?,
        Command::CounterDeps { n_tasks, n } => counter::run_counter_deps(scheduler, n_tasks, n)?,
        Command::LuCounter { n_repeat, n } => counter::run_lu_counter(scheduler, n_repeat, n)?,
        Command::MmCounter { n_tiles, n_repeat, n } => {
            if n_tiles == 0 {
                bail!("n_tiles must be positive");
            }
            counter::run_mm_counter(scheduler, n_tiles, n_repeat, n)?
        }
    };
    Ok(summary)
}

// ── Main ────────────────────────────────────────────────────────────

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tessera_core::config::load_dotenv();
    let cli = Cli::parse();
    let json = cli.json;
    let scheduler = Scheduler::new(cli.scheduler_config()).context("failed to start scheduler")?;

    let summary = run(&scheduler, cli.command)?;
    info!(
        benchmark = %summary.benchmark,
        tasks = summary.tasks,
        elapsed_ms = summary.elapsed_ms,
        tasks_per_sec = summary.throughput(),
        "run complete"
    );

    if json {
        let report = serde_json::json!({
            "summary": summary,
            "metrics": scheduler.metrics(),
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    }

    scheduler.shutdown()?;
    Ok(())
}
