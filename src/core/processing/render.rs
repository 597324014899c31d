use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::core::raster::Image;
use crate::error::{Error, Result};
use crate::types::Palette;

/// Display stretch for a single-band layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerStyle {
    pub min: f64,
    pub max: f64,
    pub palette: Palette,
}

/// Display stretch for a three-band true-colour composite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RgbStyle {
    pub bands: [String; 3],
    pub min: f64,
    pub max: f64,
}

/// Interleaved 8-bit RGB buffer, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct RgbRaster {
    pub cols: usize,
    pub rows: usize,
    pub data: Vec<u8>,
}

const NODATA_RGB: [u8; 3] = [0, 0, 0];

#[inline]
fn normalize(v: f64, min: f64, max: f64) -> f64 {
    if max > min {
        ((v - min) / (max - min)).clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Colour at position `t` in [0, 1] along evenly spaced stops.
pub fn evaluate_palette(palette: Palette, t: f64) -> [u8; 3] {
    let stops = palette.stops();
    if stops.len() == 1 {
        return stops[0];
    }
    let segments = (stops.len() - 1) as f64;
    let pos = t.clamp(0.0, 1.0) * segments;
    let idx = (pos.floor() as usize).min(stops.len() - 2);
    let frac = pos - idx as f64;
    let (a, b) = (stops[idx], stops[idx + 1]);
    let mut out = [0u8; 3];
    for k in 0..3 {
        out[k] = (a[k] as f64 + (b[k] as f64 - a[k] as f64) * frac).round() as u8;
    }
    out
}

pub fn render_palette(band: &Array2<f64>, style: &LayerStyle) -> RgbRaster {
    let (rows, cols) = band.dim();
    let mut data = Vec::with_capacity(rows * cols * 3);
    for &v in band.iter() {
        let rgb = if v.is_finite() {
            evaluate_palette(style.palette, normalize(v, style.min, style.max))
        } else {
            NODATA_RGB
        };
        data.extend_from_slice(&rgb);
    }
    RgbRaster { cols, rows, data }
}

/// Linear stretch of three bands into RGB. A pixel masked in any band is black.
pub fn render_rgb(image: &Image, style: &RgbStyle) -> Result<RgbRaster> {
    let r = &image.band(&style.bands[0])?.data;
    let g = &image.band(&style.bands[1])?.data;
    let b = &image.band(&style.bands[2])?.data;
    if r.dim() != g.dim() || r.dim() != b.dim() {
        return Err(Error::shape_mismatch(r.dim(), g.dim()));
    }
    let (rows, cols) = r.dim();
    let mut data = Vec::with_capacity(rows * cols * 3);
    for ((&rv, &gv), &bv) in r.iter().zip(g.iter()).zip(b.iter()) {
        if rv.is_finite() && gv.is_finite() && bv.is_finite() {
            for v in [rv, gv, bv] {
                data.push((normalize(v, style.min, style.max) * 255.0).round() as u8);
            }
        } else {
            data.extend_from_slice(&NODATA_RGB);
        }
    }
    Ok(RgbRaster { cols, rows, data })
}
