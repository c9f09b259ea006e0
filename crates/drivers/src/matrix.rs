use std::cell::UnsafeCell;
use std::fmt::Write as _;
use std::sync::Arc;

use tessera_scheduler::{Scheduler, SchedulerError, TaskState, TileHandle};

use crate::error::DriverError;

// ── Matrix ──────────────────────────────────────────────────────────

/// Dense square matrix stored column-major: element (row, col) lives at
/// `row + col * n`.
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    n: usize,
    data: Vec<f64>,
}

impl Matrix {
    pub fn zeros(n: usize) -> Self {
        Self {
            n,
            data: vec![0.0; n * n],
        }
    }

    pub fn from_fn(n: usize, mut f: impl FnMut(usize, usize) -> f64) -> Self {
        let mut data = Vec::with_capacity(n * n);
        for col in 0..n {
            for row in 0..n {
                data.push(f(row, col));
            }
        }
        Self { n, data }
    }

    /// LU benchmark input: 2 on the diagonal, 1 elsewhere. Diagonally
    /// dominant enough to factor without pivoting.
    pub fn lu_benchmark(n: usize) -> Self {
        Self::from_fn(n, |row, col| if row == col { 2.0 } else { 1.0 })
    }

    pub fn identity(n: usize) -> Self {
        Self::from_fn(n, |row, col| if row == col { 1.0 } else { 0.0 })
    }

    pub fn n(&self) -> usize {
        self.n
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[row + col * self.n]
    }

    #[inline]
    pub fn set(&mut self, row: usize, col: usize, value: f64) {
        self.data[row + col * self.n] = value;
    }

    /// Column-major storage.
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    /// Column `col` as a contiguous slice.
    pub fn column(&self, col: usize) -> &[f64] {
        &self.data[col * self.n..(col + 1) * self.n]
    }

    /// Tab-separated rows with two decimals, for debugging small matrices.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for row in 0..self.n {
            for col in 0..self.n {
                let _ = write!(out, "\t{:.2}", self.get(row, col));
            }
            out.push('\n');
        }
        out
    }
}

// ── Shared tile storage ─────────────────────────────────────────────

/// Matrix storage shared between the driver and in-flight kernels.
///
/// Elements sit in `UnsafeCell`s: concurrent access is only race-free
/// because tasks touching the same tile are ordered by their declared
/// accesses.
struct TileBuffer {
    n: usize,
    cells: Box<[UnsafeCell<f64>]>,
}

// SAFETY: writers to a tile are serialized against every other task that
// declares the tile, see `TiledMatrix::tile`.
unsafe impl Sync for TileBuffer {}

impl TileBuffer {
    fn snapshot(&self) -> Matrix {
        // SAFETY: callers check that no writer is in flight.
        let data = self.cells.iter().map(|c| unsafe { *c.get() }).collect();
        Matrix { n: self.n, data }
    }
}

/// View of one `order × order` tile inside a larger column-major matrix.
///
/// Keeps the underlying storage alive, so a kernel holding a view never
/// outlives the memory it works on.
#[derive(Clone)]
pub struct TileView {
    buffer: Arc<TileBuffer>,
    offset: usize,
    ld: usize,
    order: usize,
}

impl TileView {
    /// Tile order (rows = columns).
    pub fn order(&self) -> usize {
        self.order
    }

    /// Leading dimension of the enclosing matrix.
    pub fn ld(&self) -> usize {
        self.ld
    }

    #[inline]
    fn cell(&self, row: usize, col: usize) -> *mut f64 {
        debug_assert!(row < self.order && col < self.order);
        self.buffer.cells[self.offset + row + col * self.ld].get()
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f64 {
        // SAFETY: see `TiledMatrix::tile`.
        unsafe { *self.cell(row, col) }
    }

    #[inline]
    pub fn set(&self, row: usize, col: usize, value: f64) {
        // SAFETY: see `TiledMatrix::tile`.
        unsafe { *self.cell(row, col) = value }
    }

    #[inline]
    pub fn update(&self, row: usize, col: usize, f: impl FnOnce(f64) -> f64) {
        let cell = self.cell(row, col);
        // SAFETY: see `TiledMatrix::tile`.
        unsafe { *cell = f(*cell) }
    }
}

// ── TiledMatrix ─────────────────────────────────────────────────────

/// A matrix split into a `tiles × tiles` grid with one scheduler handle
/// per tile. Handles are indexed like the elements, column-major.
pub struct TiledMatrix {
    buffer: Arc<TileBuffer>,
    tile_size: usize,
    tiles: usize,
    handles: Vec<TileHandle>,
}

impl TiledMatrix {
    /// Split `matrix` into tiles of `tile_size` and register one handle per
    /// tile with `scheduler`.
    pub fn new(
        scheduler: &Scheduler,
        matrix: Matrix,
        tile_size: usize,
    ) -> Result<Self, DriverError> {
        let n = matrix.n;
        if tile_size == 0 || n == 0 || n % tile_size != 0 {
            return Err(DriverError::InvalidTiling { n, tile: tile_size });
        }
        let tiles = n / tile_size;
        let cells = matrix.data.into_iter().map(UnsafeCell::new).collect();
        Ok(Self {
            buffer: Arc::new(TileBuffer { n, cells }),
            tile_size,
            tiles,
            handles: scheduler.register_tiles(tiles * tiles),
        })
    }

    pub fn n(&self) -> usize {
        self.buffer.n
    }

    pub fn tile_size(&self) -> usize {
        self.tile_size
    }

    /// Tiles per row and per column.
    pub fn tiles(&self) -> usize {
        self.tiles
    }

    pub fn handle(&self, row: usize, col: usize) -> TileHandle {
        self.handles[row + col * self.tiles]
    }

    pub fn handles(&self) -> &[TileHandle] {
        &self.handles
    }

    /// View of tile (`row`, `col`).
    ///
    /// # Safety
    ///
    /// Every task that writes through the view must declare the tile's
    /// handle with a write mode, and every task that reads through it must
    /// declare at least a read, so the scheduler orders them. Views must
    /// not be used outside such tasks while any of them is in flight.
    pub unsafe fn tile(&self, row: usize, col: usize) -> TileView {
        assert!(row < self.tiles && col < self.tiles, "tile {row},{col} out of range");
        let n = self.buffer.n;
        TileView {
            buffer: Arc::clone(&self.buffer),
            offset: row * self.tile_size + col * self.tile_size * n,
            ld: n,
            order: self.tile_size,
        }
    }

    /// Copy out the current contents.
    ///
    /// Fails with [`DriverError::TilesBusy`] while a task writing one of the
    /// tiles has not completed.
    pub fn to_matrix(&self, scheduler: &Scheduler) -> Result<Matrix, DriverError> {
        self.ensure_idle(scheduler)?;
        Ok(self.buffer.snapshot())
    }

    /// Unregister the tile handles and hand back the matrix.
    pub fn release(self, scheduler: &Scheduler) -> Result<Matrix, DriverError> {
        self.ensure_idle(scheduler)?;
        scheduler.unregister_tiles(&self.handles)?;
        Ok(self.buffer.snapshot())
    }

    fn ensure_idle(&self, scheduler: &Scheduler) -> Result<(), DriverError> {
        for col in 0..self.tiles {
            for row in 0..self.tiles {
                let writer = scheduler
                    .handle_info(self.handle(row, col))
                    .ok_or(SchedulerError::UnknownHandle(self.handle(row, col)))?
                    .last_writer;
                let idle = writer.map_or(true, |task| {
                    scheduler.task_state(task) == Some(TaskState::Completed)
                });
                if !idle {
                    return Err(DriverError::TilesBusy { row, col });
                }
            }
        }
        Ok(())
    }
}
