//! Crate-level error type and `Result` alias for stable, structured error handling.
//! Converts underlying I/O, GDAL and JSON errors, and provides distinct fatal
//! variants for empty collections, band-name mismatches and export failures.
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("GDAL error: {0}")]
    Gdal(#[from] crate::io::GdalError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Image collection is empty: {label}")]
    EmptyCollection { label: String },

    #[error("Band '{band}' not found. Available: {available}")]
    MissingBand { band: String, available: String },

    #[error("Band schema mismatch: expected [{expected}], found [{found}]")]
    BandSchemaMismatch { expected: String, found: String },

    #[error("Grid mismatch: expected {expected}, found {found}")]
    GridMismatch { expected: String, found: String },

    #[error("Geographic CRS is not supported, scales are in metres: {crs}")]
    GeographicCrs { crs: String },

    #[error("Export of '{description}' failed: {reason}")]
    Export { description: String, reason: String },

    #[error("Invalid argument: {arg}={value}")]
    InvalidArgument { arg: &'static str, value: String },

    #[error("Processing error: {0}")]
    Processing(String),
}

impl Error {
    /// `GridMismatch` between two (rows, cols) shapes.
    pub fn shape_mismatch(expected: (usize, usize), found: (usize, usize)) -> Self {
        Error::GridMismatch {
            expected: format!("{}x{} pixels", expected.0, expected.1),
            found: format!("{}x{} pixels", found.0, found.1),
        }
    }

    pub fn export<E: std::fmt::Display>(description: &str, e: E) -> Self {
        Error::Export {
            description: description.to_string(),
            reason: e.to_string(),
        }
    }
}
