//! Gray-level co-occurrence (GLCM) texture statistics.
//!
//! Each band is first quantized to integer gray levels (reflectance x factor,
//! truncated). For every valid pixel a symmetric, normalized co-occurrence
//! matrix is built from the pixel pairs inside its (2r+1)^2 neighbourhood for
//! each of four offsets: 0°, 45°, 90° and 135°. The statistic is evaluated per
//! direction and averaged over the directions that produced at least one pair.
use ndarray::{Array2, Zip};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::processing::ops::band_mean;
use crate::core::raster::{Band, Image};
use crate::error::{Error, Result};
use crate::types::TextureStatistic;

/// Direction offsets (row, col): 0°, 45°, 90°, 135°.
const DIRECTIONS: [(isize, isize); 4] = [(0, 1), (-1, 1), (-1, 0), (-1, -1)];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlcmParams {
    /// Multiplier applied before truncation to integer levels
    pub quantization: f64,
    /// Largest gray level; quantized values are clamped into [0, max_level]
    pub max_level: u16,
    /// Neighbourhood radius in pixels
    pub radius: usize,
}

impl Default for GlcmParams {
    fn default() -> Self {
        Self {
            quantization: 64.0,
            max_level: 64,
            radius: 1,
        }
    }
}

/// Quantize reflectance to gray levels. Masked pixels stay `None`.
pub fn quantize(band: &Array2<f64>, factor: f64, max_level: u16) -> Array2<Option<u16>> {
    band.mapv(|v| {
        if v.is_finite() {
            Some((v * factor).trunc().clamp(0.0, max_level as f64) as u16)
        } else {
            None
        }
    })
}

/// Sparse symmetric co-occurrence counts.
#[derive(Debug, Default)]
struct Cooccurrence {
    entries: Vec<(u16, u16, f64)>,
    total: f64,
}

impl Cooccurrence {
    fn clear(&mut self) {
        self.entries.clear();
        self.total = 0.0;
    }

    fn bump(&mut self, i: u16, j: u16) {
        match self.entries.iter_mut().find(|(a, b, _)| *a == i && *b == j) {
            Some(entry) => entry.2 += 1.0,
            None => self.entries.push((i, j, 1.0)),
        }
        self.total += 1.0;
    }

    fn add_pair(&mut self, i: u16, j: u16) {
        self.bump(i, j);
        self.bump(j, i);
    }

    fn statistic(&self, statistic: TextureStatistic) -> f64 {
        let total = self.total;
        self.entries
            .iter()
            .map(|&(i, j, count)| {
                let p = count / total;
                let d = i as f64 - j as f64;
                match statistic {
                    TextureStatistic::Homogeneity => p / (1.0 + d * d),
                    TextureStatistic::Dissimilarity => p * d.abs(),
                    TextureStatistic::Contrast => p * d * d,
                    TextureStatistic::Asm => p * p,
                    TextureStatistic::Entropy => -p * p.ln(),
                }
            })
            .sum()
    }
}

fn pixel_texture(
    levels: &Array2<Option<u16>>,
    row: usize,
    col: usize,
    radius: usize,
    statistic: TextureStatistic,
    glcm: &mut Cooccurrence,
) -> f64 {
    let (rows, cols) = levels.dim();
    let r0 = row.saturating_sub(radius) as isize;
    let c0 = col.saturating_sub(radius) as isize;
    let r1 = (row + radius).min(rows - 1) as isize;
    let c1 = (col + radius).min(cols - 1) as isize;

    let mut sum = 0.0;
    let mut directions = 0usize;
    for &(dr, dc) in &DIRECTIONS {
        glcm.clear();
        for r in r0..=r1 {
            let r2 = r + dr;
            if r2 < r0 || r2 > r1 {
                continue;
            }
            for c in c0..=c1 {
                let c2 = c + dc;
                if c2 < c0 || c2 > c1 {
                    continue;
                }
                let a = levels[[r as usize, c as usize]];
                let b = levels[[r2 as usize, c2 as usize]];
                if let (Some(i), Some(j)) = (a, b) {
                    glcm.add_pair(i, j);
                }
            }
        }
        if glcm.total > 0.0 {
            sum += glcm.statistic(statistic);
            directions += 1;
        }
    }

    if directions == 0 {
        f64::NAN
    } else {
        sum / directions as f64
    }
}

/// Direction-averaged GLCM statistic for every pixel of a quantized band.
/// Masked pixels, and pixels without any valid neighbour pair, are NaN.
pub fn glcm_texture(
    levels: &Array2<Option<u16>>,
    statistic: TextureStatistic,
    radius: usize,
) -> Array2<f64> {
    let mut out = Array2::<f64>::from_elem(levels.dim(), f64::NAN);
    Zip::indexed(&mut out).par_for_each(|(row, col), o| {
        if levels[[row, col]].is_none() {
            return;
        }
        let mut glcm = Cooccurrence::default();
        *o = pixel_texture(levels, row, col, radius, statistic, &mut glcm);
    });
    out
}

/// Per-band texture images named `<band>_<suffix>`, e.g. `b4_idm`.
pub fn band_textures<S: AsRef<str>>(
    image: &Image,
    bands: &[S],
    statistic: TextureStatistic,
    params: &GlcmParams,
) -> Result<Image> {
    if params.radius == 0 {
        return Err(Error::InvalidArgument {
            arg: "glcm.radius",
            value: "0".to_string(),
        });
    }
    let mut out = Vec::with_capacity(bands.len());
    for name in bands {
        let name = name.as_ref();
        let levels = quantize(&image.band(name)?.data, params.quantization, params.max_level);
        let texture = glcm_texture(&levels, statistic, params.radius);
        debug!("GLCM {} computed for band {}", statistic, name);
        out.push(Band::new(format!("{}_{}", name, statistic.suffix()), texture));
    }
    Image::from_bands(out, image.georef().clone())
}

/// Cross-band mean of the per-band statistic, as a single band named
/// `combined_<statistic>`.
pub fn combined_metric<S: AsRef<str>>(
    image: &Image,
    bands: &[S],
    statistic: TextureStatistic,
    params: &GlcmParams,
) -> Result<Image> {
    if bands.is_empty() {
        return Err(Error::InvalidArgument {
            arg: "texture_bands",
            value: "empty".to_string(),
        });
    }
    let textures = band_textures(image, bands, statistic, params)?;
    let layers: Vec<&Array2<f64>> = textures.bands().iter().map(|b| &b.data).collect();
    let mean = band_mean(&layers)?;
    Ok(Image::single(
        statistic.combined_band_name(),
        mean,
        image.georef().clone(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::raster::GeoReference;
    use ndarray::array;

    fn stripes() -> Array2<Option<u16>> {
        Array2::from_shape_fn((3, 3), |(_, c)| Some((c % 2) as u16))
    }

    #[test]
    fn quantize_truncates_and_clamps() {
        let band = array![[0.015625, 0.5, 0.99, 1.2, -0.01, f64::NAN]];
        let q = quantize(&band, 64.0, 64);
        assert_eq!(q, array![[Some(1), Some(32), Some(63), Some(64), Some(0), None]]);
    }

    #[test]
    fn stripes_match_hand_computed_values() {
        let levels = stripes();
        let idm = glcm_texture(&levels, TextureStatistic::Homogeneity, 1);
        let diss = glcm_texture(&levels, TextureStatistic::Dissimilarity, 1);
        let contrast = glcm_texture(&levels, TextureStatistic::Contrast, 1);
        // 0°: 6 pairs |d|=1, 45°: 4 pairs |d|=1, 90°: 6 pairs d=0, 135°: 4 pairs |d|=1
        assert!((idm[[1, 1]] - 0.625).abs() < 1e-12);
        assert!((diss[[1, 1]] - 0.75).abs() < 1e-12);
        assert!((contrast[[1, 1]] - 0.75).abs() < 1e-12);
    }

    #[test]
    fn uniform_band_is_perfectly_homogeneous() {
        let levels = Array2::from_elem((4, 4), Some(7u16));
        let idm = glcm_texture(&levels, TextureStatistic::Homogeneity, 1);
        let contrast = glcm_texture(&levels, TextureStatistic::Contrast, 1);
        let asm = glcm_texture(&levels, TextureStatistic::Asm, 1);
        let ent = glcm_texture(&levels, TextureStatistic::Entropy, 1);
        assert!(idm.iter().all(|&v| (v - 1.0).abs() < 1e-12));
        assert!(contrast.iter().all(|&v| v == 0.0));
        assert!(asm.iter().all(|&v| (v - 1.0).abs() < 1e-12));
        assert!(ent.iter().all(|&v| v.abs() < 1e-12));
    }

    #[test]
    fn masked_pixels_and_isolated_pixels_are_nan() {
        let mut levels = Array2::from_elem((3, 3), None);
        levels[[1, 1]] = Some(3u16);
        levels[[0, 0]] = Some(3u16);
        let idm = glcm_texture(&levels, TextureStatistic::Homogeneity, 1);
        assert!(idm[[0, 1]].is_nan());
        // (0,0) and (1,1) form one 135° pair
        assert_eq!(idm[[1, 1]], 1.0);
        let isolated = Array2::from_shape_fn((3, 3), |(r, c)| (r == 1 && c == 1).then_some(5u16));
        assert!(glcm_texture(&isolated, TextureStatistic::Homogeneity, 1)[[1, 1]].is_nan());
    }

    #[test]
    fn statistics_stay_within_theoretical_bounds() {
        let levels = Array2::from_shape_fn((12, 12), |(r, c)| Some(((r * 7 + c * 3) % 65) as u16));
        let max = 64.0;
        for (stat, hi) in [
            (TextureStatistic::Homogeneity, 1.0),
            (TextureStatistic::Dissimilarity, max),
            (TextureStatistic::Contrast, max * max),
        ] {
            let t = glcm_texture(&levels, stat, 1);
            assert!(t.iter().all(|&v| (0.0..=hi).contains(&v)), "{stat} out of range");
        }
    }

    #[test]
    fn combined_metric_averages_bands() {
        let geo = GeoReference::default();
        let flat = Array2::from_elem((3, 3), 0.5);
        let striped = Array2::from_shape_fn((3, 3), |(_, c)| (c % 2) as f64 / 64.0);
        let image = Image::from_bands(
            vec![Band::new("b1", flat), Band::new("b2", striped)],
            geo,
        )
        .unwrap();
        let combined = combined_metric(
            &image,
            &["b1", "b2"],
            TextureStatistic::Homogeneity,
            &GlcmParams::default(),
        )
        .unwrap();
        let band = combined.band("combined_homogeneity").unwrap();
        assert!((band.data[[1, 1]] - (1.0 + 0.625) / 2.0).abs() < 1e-12);
    }
}
