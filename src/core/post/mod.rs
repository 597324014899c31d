//! Post-processing of difference rasters: normalization, binarization,
//! isolated-pixel cleaning, validation grids, accuracy assessment and
//! building damage counts.
pub mod accuracy;
pub mod cleaning;
pub mod damage;
pub mod gridding;
pub mod normalize;
pub mod threshold;
