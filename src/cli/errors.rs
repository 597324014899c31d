use thiserror::Error;

/// Application-specific errors for the CLI
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Invalid raster argument: {value}. Expected PATH or PATH=MODEL")]
    InvalidRasterSpec { value: String },

    #[error("Cell size must be greater than 0, got: {size}")]
    InvalidCellSize { size: f64 },

    #[error("Selection count must be greater than 0")]
    ZeroCount,

    #[error(transparent)]
    Library(#[from] texchange::Error),
}
