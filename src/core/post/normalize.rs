use ndarray::Array2;
use tracing::info;

use crate::error::{Error, Result};

/// Minimum and maximum of the valid pixels, `None` if every pixel is masked.
pub fn value_range(band: &Array2<f64>) -> Option<(f64, f64)> {
    band.iter()
        .filter(|v| v.is_finite())
        .fold(None, |acc, &v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
}

/// Rescale valid pixels to [0, 1] with `(v - min) / (max - min)`.
pub fn min_max(band: &Array2<f64>) -> Result<Array2<f64>> {
    let (lo, hi) = value_range(band).ok_or_else(|| Error::EmptyCollection {
        label: "raster has no valid pixels to normalize".to_string(),
    })?;
    if hi <= lo {
        return Err(Error::Processing(format!(
            "cannot normalize a constant raster (value {lo})"
        )));
    }
    info!("Normalizing range [{}, {}]", lo, hi);
    let span = hi - lo;
    Ok(band.mapv(|v| if v.is_finite() { (v - lo) / span } else { f64::NAN }))
}
