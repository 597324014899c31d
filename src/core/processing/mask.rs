//! Cloud, vegetation and reflectance-scale masking.
//!
//! Masks are boolean grids where `true` keeps the pixel. Applying a mask
//! sets rejected pixels to NaN in every band.
use ndarray::{Array2, Zip};
use tracing::debug;

use crate::core::processing::ops::{normalized_difference, scale};
use crate::core::raster::{Band, Image};
use crate::error::{Error, Result};

/// Keep pixels whose NDVI is strictly below `threshold`.
/// Pixels with masked NDVI are rejected.
pub fn vegetation_mask(image: &Image, nir: &str, red: &str, threshold: f64) -> Result<Array2<bool>> {
    let ndvi = normalized_difference(&image.band(nir)?.data, &image.band(red)?.data)?;
    Ok(ndvi.mapv(|v| v < threshold))
}

/// Keep pixels whose scene classification value is in `clear_classes`.
pub fn cloud_mask(image: &Image, scl_band: &str, clear_classes: &[u8]) -> Result<Array2<bool>> {
    let scl = &image.band(scl_band)?.data;
    Ok(scl.mapv(|v| v.is_finite() && v.fract() == 0.0 && clear_classes.iter().any(|&c| v == c as f64)))
}

/// Set pixels rejected by `mask` to NaN in every band.
pub fn apply_mask(image: &Image, mask: &Array2<bool>) -> Result<Image> {
    if let Ok(first) = image.first_band() {
        if first.shape() != mask.dim() {
            return Err(Error::shape_mismatch(first.shape(), mask.dim()));
        }
    }
    let masked = image.map_bands(|band| {
        let mut data = band.data.clone();
        Zip::from(&mut data).and(mask).for_each(|v, &keep| {
            if !keep {
                *v = f64::NAN;
            }
        });
        data
    });
    let kept = mask.iter().filter(|&&k| k).count();
    debug!("Mask keeps {} of {} pixels", kept, mask.len());
    Ok(masked)
}

/// Divide reflectance bands by `divisor`; bands named in `exempt` keep their values.
pub fn scale_reflectance(image: &Image, divisor: f64, exempt: &[String]) -> Image {
    image.map_bands(|band| {
        if exempt.iter().any(|e| *e == band.name) {
            band.data.clone()
        } else {
            scale(&band.data, divisor)
        }
    })
}

/// Add a normalized-difference band named `name` computed from `a` and `b`.
pub fn with_index_band(image: &Image, a: &str, b: &str, name: &str) -> Result<Image> {
    let index = normalized_difference(&image.band(a)?.data, &image.band(b)?.data)?;
    let mut out = image.clone();
    out.push_band(Band::new(name, index))?;
    Ok(out)
}
