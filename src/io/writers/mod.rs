//! Output writers: Float32 GeoTIFF, JPEG previews with world files,
//! metadata embedding and JSON sidecars, and export targets.
pub mod export;
pub mod jpeg;
pub mod metadata;
pub mod tiff;
pub mod worldfile;

pub use export::{ExportTarget, LocalExport};
pub use metadata::ProductMetadata;
