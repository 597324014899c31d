//! Raster kernels of the change analysis: band math, masking, compositing,
//! GLCM texture, resampling, histograms and display rendering, plus the
//! plan builder that wires them into a graph.
pub mod composite;
pub mod histogram;
pub mod mask;
pub mod ops;
pub mod pipeline;
pub mod render;
pub mod resample;
pub mod texture;
