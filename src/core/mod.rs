//! Core building blocks: raster and AOI types, the lazy computation graph,
//! processing kernels, sensor profiles and post-processing. These are the
//! primitives consumed by the high-level `api` module.
pub mod aoi;
pub mod graph;
pub mod params;
pub mod post;
pub mod processing;
pub mod raster;
