//! Tiled matrix multiplication `C += A · B`.

use std::time::Instant;

use tessera_scheduler::{kernel_fn, Access, Scheduler};
use tracing::info;

use crate::error::DriverError;
use crate::kernels;
use crate::lu::submit_plan;
use crate::matrix::{Matrix, TiledMatrix};
use crate::report::RunSummary;

/// Tile triples `(i, j, k)` in submission order: for each C[i,j], the
/// k loop runs innermost, so the writes to one C tile are consecutive.
pub fn mm_plan(n_tiles: usize) -> impl Iterator<Item = (usize, usize, usize)> {
    (0..n_tiles).flat_map(move |i| {
        (0..n_tiles).flat_map(move |j| (0..n_tiles).map(move |k| (i, j, k)))
    })
}

/// Benchmark inputs: A = 2·I and B[i,j] = j + i·n, so C = 2·B.
pub fn mm_inputs(n: usize) -> (Matrix, Matrix) {
    let a = Matrix::from_fn(n, |row, col| if row == col { 2.0 } else { 0.0 });
    let b = Matrix::from_fn(n, |row, col| (col + row * n) as f64);
    (a, b)
}

fn ensure_same_tiling(a: &TiledMatrix, other: &TiledMatrix, name: &str) -> Result<(), DriverError> {
    if a.n() != other.n() || a.tile_size() != other.tile_size() {
        return Err(DriverError::TilingMismatch(format!(
            "A is {}x{} with tiles of {}, {name} is {}x{} with tiles of {}",
            a.n(),
            a.n(),
            a.tile_size(),
            other.n(),
            other.n(),
            other.tile_size()
        )));
    }
    Ok(())
}

/// Submit one `gemm_add` task per `(i, j, k)` and wait for them.
///
/// Each task reads A[i,k] and B[k,j] and read-writes C[i,j]. Returns the
/// number of tasks, `tiles³`.
pub fn matmul_tiled(
    scheduler: &Scheduler,
    a: &TiledMatrix,
    b: &TiledMatrix,
    c: &TiledMatrix,
) -> Result<usize, DriverError> {
    ensure_same_tiling(a, b, "B")?;
    ensure_same_tiling(a, c, "C")?;

    let submitted = submit_plan(scheduler, mm_plan(a.tiles()), |(i, j, k)| {
        let accesses = [
            Access::read(a.handle(i, k)),
            Access::read(b.handle(k, j)),
            Access::read_write(c.handle(i, j)),
        ];
        // SAFETY: the three tiles are declared above with matching modes.
        let (ta, tb, tc) = unsafe { (a.tile(i, k), b.tile(k, j), c.tile(i, j)) };
        scheduler.submit(
            kernel_fn("gemm_add", move || kernels::gemm_add(&ta, &tb, &tc)),
            &accesses,
        )
    })?;

    scheduler.drain()?;
    Ok(submitted)
}

/// Multiply the `n × n` benchmark inputs with tiles of `tile_size`.
///
/// Returns the run summary and C.
pub fn run_mm(
    scheduler: &Scheduler,
    n: usize,
    tile_size: usize,
) -> Result<(RunSummary, Matrix), DriverError> {
    let (a, b) = mm_inputs(n);
    let a = TiledMatrix::new(scheduler, a, tile_size)?;
    let b = TiledMatrix::new(scheduler, b, tile_size)?;
    let c = TiledMatrix::new(scheduler, Matrix::zeros(n), tile_size)?;

    let start = Instant::now();
    let tasks = matmul_tiled(scheduler, &a, &b, &c)?;
    let summary = RunSummary::new("mm", tasks, start.elapsed());
    info!(n, tile_size, tasks, elapsed_ms = summary.elapsed_ms, "matrix multiplication finished");

    a.release(scheduler)?;
    b.release(scheduler)?;
    Ok((summary, c.release(scheduler)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_covers_every_triple_once() {
        let plan: Vec<_> = mm_plan(3).collect();
        assert_eq!(plan.len(), 27);
        let mut sorted = plan.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted.len(), 27);
        assert_eq!(&plan[..3], &[(0, 0, 0), (0, 0, 1), (0, 0, 2)]);
    }

    #[test]
    fn inputs_double_b() {
        let (a, b) = mm_inputs(3);
        assert_eq!(a.get(1, 1), 2.0);
        assert_eq!(a.get(0, 1), 0.0);
        assert_eq!(b.get(1, 2), 5.0);
    }

    #[test]
    fn mismatched_tiling_rejected() {
        let scheduler = Scheduler::with_workers(1).unwrap();
        let a = TiledMatrix::new(&scheduler, Matrix::zeros(4), 2).unwrap();
        let b = TiledMatrix::new(&scheduler, Matrix::zeros(4), 4).unwrap();
        let c = TiledMatrix::new(&scheduler, Matrix::zeros(4), 2).unwrap();
        let err = matmul_tiled(&scheduler, &a, &b, &c).unwrap_err();
        assert!(matches!(err, DriverError::TilingMismatch(_)), "{err}");
        assert_eq!(scheduler.metrics().tasks_submitted, 0);
    }

    #[test]
    fn small_product_is_exact() {
        let scheduler = Scheduler::with_workers(2).unwrap();
        let (summary, c) = run_mm(&scheduler, 6, 2).unwrap();
        assert_eq!(summary.tasks, 27);
        let (_, b) = mm_inputs(6);
        for col in 0..6 {
            for row in 0..6 {
                assert_eq!(c.get(row, col), 2.0 * b.get(row, col));
            }
        }
        assert_eq!(scheduler.registered_tiles(), 0);
    }
}
