//! Result validation. Columns are checked in parallel on the rayon pool,
//! independent of the scheduler's workers.

use rayon::prelude::*;
use thiserror::Error;

use crate::matrix::Matrix;

/// Tolerance of the LU check.
pub const LU_EPSILON: f64 = 1.0e-10;

#[derive(Debug, Error, PartialEq)]
pub enum CheckError {
    #[error("{what}[{row}, {col}] = {got}, expected {expected}")]
    Mismatch {
        what: &'static str,
        row: usize,
        col: usize,
        got: f64,
        expected: f64,
    },

    #[error("dimension mismatch: {left} vs {right}")]
    Dimension { left: usize, right: usize },
}

fn same_order(a: &Matrix, b: &Matrix) -> Result<(), CheckError> {
    if a.n() != b.n() {
        return Err(CheckError::Dimension {
            left: a.n(),
            right: b.n(),
        });
    }
    Ok(())
}

/// First failing element in column-major order, if any.
fn first_mismatch<F>(n: usize, what: &'static str, epsilon: f64, column: F) -> Result<(), CheckError>
where
    F: Fn(usize) -> Vec<(f64, f64)> + Sync,
{
    let failure = (0..n).into_par_iter().find_map_first(|col| {
        column(col)
            .into_iter()
            .enumerate()
            .find(|(_, (got, expected))| (got - expected).abs() > epsilon)
            .map(|(row, (got, expected))| CheckError::Mismatch {
                what,
                row,
                col,
                got,
                expected,
            })
    });
    failure.map_or(Ok(()), Err)
}

/// Value of `(L · U)[row, col]` from packed factors: L strictly below the
/// diagonal with implied unit diagonal, U on and above it.
pub fn lu_product(factors: &Matrix, row: usize, col: usize) -> f64 {
    let inner: f64 = (0..row.min(col)).map(|k| factors.get(row, k) * factors.get(k, col)).sum();
    if row <= col {
        inner + factors.get(row, col)
    } else {
        inner + factors.get(row, col) * factors.get(col, col)
    }
}

/// Check that the packed `factors` multiply back to `original`.
pub fn check_lu(factors: &Matrix, original: &Matrix, epsilon: f64) -> Result<(), CheckError> {
    same_order(factors, original)?;
    let n = factors.n();
    first_mismatch(n, "LU", epsilon, |col| {
        (0..n)
            .map(|row| (lu_product(factors, row, col), original.get(row, col)))
            .collect()
    })
}

/// [`check_lu`] against the benchmark input of the same order.
pub fn check_lu_benchmark(factors: &Matrix) -> Result<(), CheckError> {
    check_lu(factors, &Matrix::lu_benchmark(factors.n()), LU_EPSILON)
}

/// Reference product `a · b`, one column per rayon task.
pub fn reference_product(a: &Matrix, b: &Matrix) -> Result<Matrix, CheckError> {
    same_order(a, b)?;
    let n = a.n();
    let columns: Vec<Vec<f64>> = (0..n)
        .into_par_iter()
        .map(|col| {
            (0..n)
                .map(|row| (0..n).map(|k| a.get(row, k) * b.get(k, col)).sum::<f64>())
                .collect()
        })
        .collect();
    Ok(Matrix::from_fn(n, |row, col| columns[col][row]))
}

/// Check `c` against the reference product of `a` and `b`.
pub fn check_matmul(a: &Matrix, b: &Matrix, c: &Matrix, epsilon: f64) -> Result<(), CheckError> {
    same_order(a, c)?;
    let expected = reference_product(a, b)?;
    compare(c, &expected, "C", epsilon)
}

/// Element-wise comparison of two matrices of the same order.
pub fn compare(
    got: &Matrix,
    expected: &Matrix,
    what: &'static str,
    epsilon: f64,
) -> Result<(), CheckError> {
    same_order(got, expected)?;
    first_mismatch(got.n(), what, epsilon, |col| {
        got.column(col)
            .iter()
            .copied()
            .zip(expected.column(col).iter().copied())
            .collect()
    })
}
