use tessera_core::SchedulerError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("matrix order {n} is not a positive multiple of tile size {tile}")]
    InvalidTiling { n: usize, tile: usize },

    #[error("tiling mismatch: {0}")]
    TilingMismatch(String),

    #[error("tile {row},{col} still has a writer in flight")]
    TilesBusy { row: usize, col: usize },

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
}
