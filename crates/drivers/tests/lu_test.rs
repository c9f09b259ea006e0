//! End-to-end tests for the tiled LU driver.

use tessera_drivers::check::{check_lu_benchmark, compare, LU_EPSILON};
use tessera_drivers::lu::{lu_tiled, lu_untiled, run_lu};
use tessera_drivers::{DriverError, Matrix, TiledMatrix};
use tessera_scheduler::{Scheduler, SchedulerError};

#[test]
fn eight_by_eight_with_tiles_of_four() {
    let scheduler = Scheduler::with_workers(2).unwrap();
    let tiled = TiledMatrix::new(&scheduler, Matrix::lu_benchmark(8), 4).unwrap();
    assert_eq!(tiled.tiles(), 2);

    let tasks = lu_tiled(&scheduler, &tiled).unwrap();
    // factorize, panel update, triangular solve, gemm, then factorize again.
    assert_eq!(tasks, 5);

    let metrics = scheduler.metrics();
    assert_eq!(metrics.tasks_completed, 5);
    assert_eq!(metrics.tasks_executed["factorize"], 2);
    assert_eq!(metrics.tasks_executed["panel_update"], 1);
    assert_eq!(metrics.tasks_executed["triangular_solve"], 1);
    assert_eq!(metrics.tasks_executed["gemm_sub"], 1);

    let factors = tiled.release(&scheduler).unwrap();
    check_lu_benchmark(&factors).unwrap();
}

#[test]
fn tiled_matches_untiled() {
    let scheduler = Scheduler::with_workers(4).unwrap();
    let untiled = lu_untiled(&scheduler, Matrix::lu_benchmark(48)).unwrap();
    for tile_size in [4, 8, 16, 48] {
        let (summary, tiled) = run_lu(&scheduler, 48, tile_size).unwrap();
        assert!(summary.tasks > 0);
        compare(&tiled, &untiled, "LU", LU_EPSILON).unwrap();
    }
    check_lu_benchmark(&untiled).unwrap();
    assert_eq!(scheduler.registered_tiles(), 0);
}

#[test]
fn single_worker_baseline() {
    let scheduler = Scheduler::with_workers(1).unwrap();
    let (summary, factors) = run_lu(&scheduler, 32, 4).unwrap();
    // 8 × 8 grid: 1 + 4 + 9 + ... + 64
    assert_eq!(summary.tasks, (1..=8).map(|k| k * k).sum::<usize>());
    check_lu_benchmark(&factors).unwrap();
}

#[test]
fn zero_pivot_faults_at_drain() {
    let scheduler = Scheduler::with_workers(2).unwrap();
    let singular = Matrix::from_fn(8, |row, col| if row == 0 && col == 0 { 0.0 } else { 1.0 });
    let tiled = TiledMatrix::new(&scheduler, singular, 4).unwrap();

    let err = lu_tiled(&scheduler, &tiled).unwrap_err();
    match err {
        DriverError::Scheduler(SchedulerError::Kernel(fault)) => {
            assert_eq!(fault.kernel, "factorize");
            assert!(fault.message.contains("pivot 0"), "{}", fault.message);
        }
        other => panic!("unexpected error: {other}"),
    }

    // Bookkeeping completed: every task retired and the tiles can be released.
    assert_eq!(scheduler.outstanding(), 0);
    assert!(tiled.release(&scheduler).is_ok());
}

#[test]
fn capacity_of_two_rejects_gemm() {
    let config = tessera_scheduler::SchedulerConfig {
        worker_threads: 2,
        max_operands: 2,
        ..Default::default()
    };
    let scheduler = Scheduler::new(config).unwrap();
    let tiled = TiledMatrix::new(&scheduler, Matrix::lu_benchmark(8), 4).unwrap();

    let err = lu_tiled(&scheduler, &tiled).unwrap_err();
    assert!(matches!(
        err,
        DriverError::Scheduler(SchedulerError::TooManyOperands { count: 3, max: 2 })
    ));
    // The three tasks before the gemm were admitted and drained.
    assert_eq!(scheduler.metrics().tasks_completed, 3);
    assert_eq!(scheduler.outstanding(), 0);
}
