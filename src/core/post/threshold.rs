use ndarray::Array2;
use tracing::debug;

/// Values at or below `threshold` become 0, values above become 1.
/// Masked pixels stay masked.
pub fn binarize(band: &Array2<f64>, threshold: f64) -> Array2<f64> {
    let out = band.mapv(|v| {
        if !v.is_finite() {
            f64::NAN
        } else if v > threshold {
            1.0
        } else {
            0.0
        }
    });
    debug!(
        "Binarized at {}: {} changed pixels",
        threshold,
        out.iter().filter(|&&v| v == 1.0).count()
    );
    out
}
