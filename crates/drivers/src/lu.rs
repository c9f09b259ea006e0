//! Tiled LU factorization without pivoting.
//!
//! The task graph is built from an [`LuOp`] plan so the numeric driver and
//! the synthetic counter benchmark share one submission order.

use std::time::Instant;

use serde::Serialize;
use tessera_scheduler::{kernel_fn, Access, Scheduler, SchedulerError, TaskId, TileHandle};
use tracing::{info, warn};

use crate::error::DriverError;
use crate::kernels;
use crate::matrix::{Matrix, TiledMatrix};
use crate::report::RunSummary;

/// Tile coordinate as (row, col).
pub type Tile = (usize, usize);

/// One task of the tiled LU graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LuOp {
    /// Factor the diagonal tile in place.
    Factorize { pivot: Tile },
    /// Update a tile below the pivot.
    PanelUpdate { pivot: Tile, tile: Tile },
    /// Update a tile right of the pivot.
    TriangularSolve { pivot: Tile, tile: Tile },
    /// `c -= a · b` on the trailing submatrix.
    Gemm { a: Tile, b: Tile, c: Tile },
}

impl LuOp {
    pub fn kernel_name(&self) -> &'static str {
        match self {
            Self::Factorize { .. } => "factorize",
            Self::PanelUpdate { .. } => "panel_update",
            Self::TriangularSolve { .. } => "triangular_solve",
            Self::Gemm { .. } => "gemm_sub",
        }
    }

    /// Declared accesses, with `handle` mapping a tile to its handle.
    pub fn accesses(&self, handle: impl Fn(Tile) -> TileHandle) -> Vec<Access> {
        match *self {
            Self::Factorize { pivot } => vec![Access::read_write(handle(pivot))],
            Self::PanelUpdate { pivot, tile } | Self::TriangularSolve { pivot, tile } => {
                vec![Access::read(handle(pivot)), Access::read_write(handle(tile))]
            }
            Self::Gemm { a, b, c } => vec![
                Access::read(handle(a)),
                Access::read(handle(b)),
                Access::read_write(handle(c)),
            ],
        }
    }
}

/// Submission order of the LU graph over a `rows × cols` tile grid.
///
/// Runs `min(rows, cols)` diagonal steps. Each step factors the pivot, then
/// updates the panel column below it, the row to its right and finally the
/// trailing submatrix.
pub fn lu_plan(rows: usize, cols: usize) -> Vec<LuOp> {
    let steps = rows.min(cols);
    let mut plan = Vec::with_capacity(lu_task_count(rows, cols));
    for i in 0..steps {
        let pivot = (i, i);
        plan.push(LuOp::Factorize { pivot });
        for row in i + 1..rows {
            plan.push(LuOp::PanelUpdate { pivot, tile: (row, i) });
        }
        for col in i + 1..cols {
            plan.push(LuOp::TriangularSolve { pivot, tile: (i, col) });
        }
        for row in i + 1..rows {
            for col in i + 1..cols {
                plan.push(LuOp::Gemm {
                    a: (row, i),
                    b: (i, col),
                    c: (row, col),
                });
            }
        }
    }
    plan
}

/// Number of tasks in [`lu_plan`] for the same grid.
pub fn lu_task_count(rows: usize, cols: usize) -> usize {
    (0..rows.min(cols))
        .map(|i| {
            let below = rows - i - 1;
            let right = cols - i - 1;
            1 + below + right + below * right
        })
        .sum()
}

/// Submit every op of `plan`, building each kernel with `submit_op`.
///
/// On a rejected submission the already admitted tasks are drained before
/// the error is returned, so nothing is left running behind the caller.
pub(crate) fn submit_plan<I, T>(
    scheduler: &Scheduler,
    plan: I,
    mut submit_op: impl FnMut(T) -> Result<TaskId, SchedulerError>,
) -> Result<usize, DriverError>
where
    I: IntoIterator<Item = T>,
{
    let mut submitted = 0;
    for op in plan {
        if let Err(e) = submit_op(op) {
            warn!(error = %e, submitted, "submission rejected, draining admitted tasks");
            if let Err(drain_err) = scheduler.drain() {
                warn!(error = %drain_err, "drain after rejected submission failed");
            }
            return Err(e.into());
        }
        submitted += 1;
    }
    Ok(submitted)
}

/// Submit the tiled LU graph over `matrix` and wait for it.
///
/// Returns the number of tasks submitted. A kernel fault is reported as
/// [`DriverError::Scheduler`]; tiles written before the fault keep their
/// values.
pub fn lu_tiled(scheduler: &Scheduler, matrix: &TiledMatrix) -> Result<usize, DriverError> {
    let tiles = matrix.tiles();
    let plan = lu_plan(tiles, tiles);
    let handle = |(row, col): Tile| matrix.handle(row, col);

    let submitted = submit_plan(scheduler, plan, |op| {
        let accesses = op.accesses(handle);
        // SAFETY: each view's tile is declared in `accesses` with the mode it
        // is used with.
        match op {
            LuOp::Factorize { pivot } => {
                let t = unsafe { matrix.tile(pivot.0, pivot.1) };
                scheduler.submit(
                    kernel_fn(op.kernel_name(), move || kernels::factorize(&t)),
                    &accesses,
                )
            }
            LuOp::PanelUpdate { pivot, tile } => {
                let (p, t) = unsafe { (matrix.tile(pivot.0, pivot.1), matrix.tile(tile.0, tile.1)) };
                scheduler.submit(
                    kernel_fn(op.kernel_name(), move || kernels::panel_update(&p, &t)),
                    &accesses,
                )
            }
            LuOp::TriangularSolve { pivot, tile } => {
                let (p, t) = unsafe { (matrix.tile(pivot.0, pivot.1), matrix.tile(tile.0, tile.1)) };
                scheduler.submit(
                    kernel_fn(op.kernel_name(), move || kernels::triangular_solve(&p, &t)),
                    &accesses,
                )
            }
            LuOp::Gemm { a, b, c } => {
                let (a, b, c) = unsafe {
                    (matrix.tile(a.0, a.1), matrix.tile(b.0, b.1), matrix.tile(c.0, c.1))
                };
                scheduler.submit(
                    kernel_fn(op.kernel_name(), move || kernels::gemm_sub(&a, &b, &c)),
                    &accesses,
                )
            }
        }
    })?;

    scheduler.drain()?;
    Ok(submitted)
}

/// Factor `matrix` as a single task over the whole matrix.
pub fn lu_untiled(scheduler: &Scheduler, matrix: Matrix) -> Result<Matrix, DriverError> {
    let n = matrix.n();
    let tiled = TiledMatrix::new(scheduler, matrix, n)?;
    lu_tiled(scheduler, &tiled)?;
    tiled.release(scheduler)
}

/// Factor the `n × n` LU benchmark matrix with tiles of `tile_size`.
///
/// Returns the run summary and the packed factors.
pub fn run_lu(
    scheduler: &Scheduler,
    n: usize,
    tile_size: usize,
) -> Result<(RunSummary, Matrix), DriverError> {
    let tiled = TiledMatrix::new(scheduler, Matrix::lu_benchmark(n), tile_size)?;
    let start = Instant::now();
    let tasks = lu_tiled(scheduler, &tiled)?;
    let summary = RunSummary::new("lu", tasks, start.elapsed());
    info!(n, tile_size, tasks, elapsed_ms = summary.elapsed_ms, "LU factorization finished");
    Ok((summary, tiled.release(scheduler)?))
}
