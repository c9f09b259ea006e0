//! Numeric tile kernels for LU factorization without pivoting and for
//! matrix multiplication.
//!
//! All kernels work on column-major [`TileView`]s of equal order.

use tessera_scheduler::KernelError;

use crate::matrix::TileView;

fn inverse_pivot(tile: &TileView, pivot: usize) -> Result<f64, KernelError> {
    let value = tile.get(pivot, pivot);
    if value == 0.0 || !value.is_finite() {
        return Err(KernelError::new(format!(
            "pivot {pivot} is {value}, cannot factor without pivoting"
        )));
    }
    Ok(1.0 / value)
}

/// In-place LU factorization of a diagonal tile. On return the strict lower
/// triangle holds L (unit diagonal implied) and the upper triangle holds U.
pub fn factorize(tile: &TileView) -> Result<(), KernelError> {
    let order = tile.order();
    for pivot in 0..order {
        let scale = inverse_pivot(tile, pivot)?;
        for row in pivot + 1..order {
            tile.update(row, pivot, |v| v * scale);
        }
        for col in pivot + 1..order {
            let u = tile.get(pivot, col);
            for row in pivot + 1..order {
                let l = tile.get(row, pivot);
                tile.update(row, col, |v| v - u * l);
            }
        }
    }
    Ok(())
}

/// Update a tile below a factored pivot tile: solve `X · U = tile` where U
/// is the upper triangle of `pivot_tile`.
pub fn panel_update(pivot_tile: &TileView, tile: &TileView) -> Result<(), KernelError> {
    let order = tile.order();
    for pivot in 0..order {
        let scale = inverse_pivot(pivot_tile, pivot)?;
        for row in 0..order {
            tile.update(row, pivot, |v| v * scale);
        }
        for col in pivot + 1..order {
            let u = pivot_tile.get(pivot, col);
            for row in 0..order {
                let x = tile.get(row, pivot);
                tile.update(row, col, |v| v - u * x);
            }
        }
    }
    Ok(())
}

/// Update a tile right of a factored pivot tile: solve `L · X = tile` where
/// L is the unit lower triangle of `pivot_tile`.
pub fn triangular_solve(pivot_tile: &TileView, tile: &TileView) -> Result<(), KernelError> {
    let order = tile.order();
    for row in 1..order {
        for col in 0..order {
            let sum: f64 = (0..row)
                .map(|k| pivot_tile.get(row, k) * tile.get(k, col))
                .sum();
            tile.update(row, col, |v| v - sum);
        }
    }
    Ok(())
}

fn product(a: &TileView, b: &TileView, row: usize, col: usize) -> f64 {
    (0..a.order()).map(|k| a.get(row, k) * b.get(k, col)).sum()
}

/// `c -= a · b`, the trailing-submatrix update of LU.
pub fn gemm_sub(a: &TileView, b: &TileView, c: &TileView) -> Result<(), KernelError> {
    let order = c.order();
    for col in 0..order {
        for row in 0..order {
            let sum = product(a, b, row, col);
            c.update(row, col, |v| v - sum);
        }
    }
    Ok(())
}

/// `c += a · b`, the accumulation step of matrix multiplication.
pub fn gemm_add(a: &TileView, b: &TileView, c: &TileView) -> Result<(), KernelError> {
    let order = c.order();
    for col in 0..order {
        for row in 0..order {
            let sum = product(a, b, row, col);
            c.update(row, col, |v| v + sum);
        }
    }
    Ok(())
}
