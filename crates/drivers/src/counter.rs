//! Synthetic benchmarks: every task burns a fixed number of loop
//! iterations instead of doing numeric work, which isolates scheduling
//! overhead from kernel cost.

use std::hint::black_box;
use std::time::Instant;

use tessera_scheduler::{kernel_fn, Access, Kernel, Scheduler, TileHandle};
use tracing::info;

use crate::error::DriverError;
use crate::lu::{lu_plan, submit_plan};
use crate::matmul::mm_plan;
use crate::report::RunSummary;

/// Index bits per drawn handle: 1 << 7 = 128 handles.
pub const DATA_SHIFT: u32 = 7;
pub const N_DATA: usize = 1 << DATA_SHIFT;

/// Seed of the dependency generator.
pub const XORSHIFT_SEED: u64 = 0x92d6_8ca2;

/// Tile grid of the LU counter benchmark: 32 rows by 30 columns.
pub const LU_COUNTER_ROWS: usize = 32;
pub const LU_COUNTER_COLS: usize = 30;

/// Count to `n` without the loop being optimized away.
pub fn count(n: u64) {
    let mut c = 0u64;
    for i in 0..n {
        c = black_box(i);
    }
    black_box(c);
}

/// A kernel named `name` that counts to `n`.
pub fn counter_kernel(name: &'static str, n: u64) -> impl Kernel {
    kernel_fn(name, move || {
        count(n);
        Ok(())
    })
}

/// Xorshift generator (Marsaglia, 13/7/17 shifts).
#[derive(Debug, Clone)]
pub struct XorShift {
    state: u64,
}

impl Default for XorShift {
    fn default() -> Self {
        Self::new(XORSHIFT_SEED)
    }
}

impl XorShift {
    pub fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    pub fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        x
    }

    /// Three handle indices from the 7-bit fields of one draw.
    pub fn next_indices(&mut self) -> [usize; 3] {
        let x = self.next_u64();
        let mask = (N_DATA - 1) as u64;
        [
            (x & mask) as usize,
            ((x >> DATA_SHIFT) & mask) as usize,
            ((x >> (2 * DATA_SHIFT)) & mask) as usize,
        ]
    }
}

/// Accesses for three drawn indices. Distinct indices read the first two
/// and read-write the third; an index equal to an earlier one is dropped,
/// leaving one or two reads.
pub fn random_accesses(handles: &[TileHandle], [a, b, c]: [usize; 3]) -> Vec<Access> {
    let second = (b != a).then_some(b);
    let third = (c != a && c != b).then_some(c);
    let read = |i: usize| Access::read(handles[i]);
    match (second, third) {
        (None, None) => vec![read(a)],
        (Some(x), None) | (None, Some(x)) => vec![read(a), read(x)],
        (Some(b), Some(c)) => vec![read(a), read(b), Access::read_write(handles[c])],
    }
}

fn finish(
    scheduler: &Scheduler,
    name: &str,
    tasks: usize,
    start: Instant,
) -> Result<RunSummary, DriverError> {
    scheduler.drain()?;
    let summary = RunSummary::new(name, tasks, start.elapsed());
    info!(
        benchmark = name,
        tasks,
        elapsed_ms = summary.elapsed_ms,
        "benchmark finished"
    );
    Ok(summary)
}

/// `n_tasks` independent tasks with no declared tiles.
pub fn run_counter(scheduler: &Scheduler, n_tasks: usize, n: u64) -> Result<RunSummary, DriverError> {
    let start = Instant::now();
    let tasks = submit_plan(scheduler, 0..n_tasks, |_| {
        scheduler.submit(counter_kernel("counter", n), &[] as &[Access])
    })?;
    finish(scheduler, "counter", tasks, start)
}

/// `n_tasks` tasks over 128 handles with pseudo-random dependencies.
pub fn run_counter_deps(
    scheduler: &Scheduler,
    n_tasks: usize,
    n: u64,
) -> Result<RunSummary, DriverError> {
    let handles = scheduler.register_tiles(N_DATA);
    let mut rng = XorShift::default();

    let start = Instant::now();
    let tasks = submit_plan(scheduler, 0..n_tasks, |_| {
        let accesses = random_accesses(&handles, rng.next_indices());
        scheduler.submit(counter_kernel("counter_deps", n), &accesses)
    })?;
    let summary = finish(scheduler, "counter_deps", tasks, start)?;

    scheduler.unregister_tiles(&handles)?;
    Ok(summary)
}

/// The LU task graph on a 32 × 30 tile grid, repeated `n_repeat` times.
pub fn run_lu_counter(
    scheduler: &Scheduler,
    n_repeat: usize,
    n: u64,
) -> Result<RunSummary, DriverError> {
    let (rows, cols) = (LU_COUNTER_ROWS, LU_COUNTER_COLS);
    let grid = scheduler.register_tiles(rows * cols);
    let handle = |(row, col): (usize, usize)| grid[row + col * rows];
    let plan = lu_plan(rows, cols);

    let start = Instant::now();
    let ops = (0..n_repeat).flat_map(|_| plan.iter().copied());
    let tasks = submit_plan(scheduler, ops, |op| {
        scheduler.submit(counter_kernel(op.kernel_name(), n), &op.accesses(handle))
    })?;
    let summary = finish(scheduler, "lu_counter", tasks, start)?;

    scheduler.unregister_tiles(&grid)?;
    Ok(summary)
}

/// The matmul task graph on `n_tiles³` triples, repeated `n_repeat` times.
pub fn run_mm_counter(
    scheduler: &Scheduler,
    n_tiles: usize,
    n_repeat: usize,
    n: u64,
) -> Result<RunSummary, DriverError> {
    let a = scheduler.register_tiles(n_tiles * n_tiles);
    let b = scheduler.register_tiles(n_tiles * n_tiles);
    let c = scheduler.register_tiles(n_tiles * n_tiles);
    let at = |grid: &Vec<TileHandle>, row: usize, col: usize| grid[row + col * n_tiles];

    let start = Instant::now();
    let ops = (0..n_repeat).flat_map(|_| mm_plan(n_tiles));
    let tasks = submit_plan(scheduler, ops, |(i, j, k)| {
        scheduler.submit(
            counter_kernel("gemm_add", n),
            &[
                Access::read(at(&a, i, k)),
                Access::read(at(&b, k, j)),
                Access::read_write(at(&c, i, j)),
            ],
        )
    })?;
    let summary = finish(scheduler, "mm_counter", tasks, start)?;

    for grid in [&a, &b, &c] {
        scheduler.unregister_tiles(grid)?;
    }
    Ok(summary)
}
