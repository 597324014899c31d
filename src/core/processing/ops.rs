use ndarray::{Array2, Zip};

use crate::core::raster::{Image, ensure_same_georef, ensure_same_grid};
use crate::error::Result;

/// Normalized difference: (a - b) / (a + b).
/// NaN where either input is masked, 0 where a + b == 0.
pub fn normalized_difference(a: &Array2<f64>, b: &Array2<f64>) -> Result<Array2<f64>> {
    ensure_same_grid(a, b)?;
    let mut result = Array2::zeros(a.dim());
    Zip::from(a)
        .and(b)
        .and(&mut result)
        .par_for_each(|&a_val, &b_val, res| {
            *res = if a_val.is_nan() || b_val.is_nan() {
                f64::NAN
            } else {
                let sum = a_val + b_val;
                if sum == 0.0 { 0.0 } else { (a_val - b_val) / sum }
            };
        });
    Ok(result)
}

/// Element-wise |a - b|; NaN where either input is masked.
pub fn abs_difference(a: &Array2<f64>, b: &Array2<f64>) -> Result<Array2<f64>> {
    ensure_same_grid(a, b)?;
    let mut result = Array2::zeros(a.dim());
    Zip::from(a)
        .and(b)
        .and(&mut result)
        .par_for_each(|&a_val, &b_val, res| {
            *res = (a_val - b_val).abs();
        });
    Ok(result)
}

/// |a - b| of the first bands of two images on the same georeferenced grid.
/// The result keeps the name of `a`'s band.
pub fn image_abs_difference(a: &Image, b: &Image) -> Result<Image> {
    ensure_same_georef(a, b)?;
    let band = a.first_band()?;
    let diff = abs_difference(&band.data, &b.first_band()?.data)?;
    Ok(Image::single(band.name.clone(), diff, a.georef().clone()))
}

/// Element-wise division by a constant.
pub fn scale(band: &Array2<f64>, divisor: f64) -> Array2<f64> {
    band.mapv(|v| v / divisor)
}

/// Per-pixel mean of the valid values across `bands`; NaN where none is valid.
pub fn band_mean(bands: &[&Array2<f64>]) -> Result<Array2<f64>> {
    let Some(first) = bands.first() else {
        return Ok(Array2::zeros((0, 0)));
    };
    for band in &bands[1..] {
        ensure_same_grid(first, band)?;
    }
    let mut sum = Array2::<f64>::zeros(first.dim());
    let mut count = Array2::<u32>::zeros(first.dim());
    for band in bands {
        Zip::from(&mut sum)
            .and(&mut count)
            .and(*band)
            .for_each(|s, n, &v| {
                if v.is_finite() {
                    *s += v;
                    *n += 1;
                }
            });
    }
    Ok(Zip::from(&sum)
        .and(&count)
        .map_collect(|&s, &n| if n == 0 { f64::NAN } else { s / n as f64 }))
}
