//! Tiled linear algebra drivers on top of the tessera scheduler.
//!
//! - `matrix`: column-major matrices and their tiled, handle-backed form
//! - `kernels`: numeric tile kernels (factorize, panel update, trsm, gemm)
//! - `lu` / `matmul`: task-graph builders for tiled LU and multiplication
//! - `counter`: synthetic compute-bound benchmarks over the same graphs
//! - `check`: result validation against reference computations

pub mod check;
pub mod counter;
pub mod error;
pub mod kernels;
pub mod lu;
pub mod matmul;
pub mod matrix;
pub mod report;

pub use error::DriverError;
pub use matrix::{Matrix, TileView, TiledMatrix};
pub use report::RunSummary;
