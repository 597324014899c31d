//! I/O layer: GDAL-backed raster and vector reading, the local scene
//! catalog, and `writers` for GeoTIFF/JPEG outputs, metadata and export targets.
pub mod catalog;
pub use catalog::{CatalogEntry, SceneCatalog};

pub mod gdal;
pub use gdal::{GdalError, GdalImageReader, GdalMetadata, GdalSceneLoader};

pub mod vector;

pub mod writers;
