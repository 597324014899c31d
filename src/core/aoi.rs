//! Area of interest polygon in the imagery CRS.
//! Uses the GeoJSON Polygon layout: the first ring is the exterior,
//! further rings are holes. Containment follows the even-odd rule.
use ndarray::{Array2, s};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::raster::{Band, GeoReference, Image};
use crate::error::{Error, Result};

fn polygon_kind() -> String {
    "Polygon".to_string()
}

/// Even-odd point-in-polygon test over all rings of one polygon.
pub fn rings_contain(rings: &[Vec<[f64; 2]>], x: f64, y: f64) -> bool {
    let mut inside = false;
    for ring in rings {
        let n = ring.len();
        if n < 3 {
            continue;
        }
        let mut j = n - 1;
        for i in 0..n {
            let [xi, yi] = ring[i];
            let [xj, yj] = ring[j];
            if (yi > y) != (yj > y) && x < (xj - xi) * (y - yi) / (yj - yi) + xi {
                inside = !inside;
            }
            j = i;
        }
    }
    inside
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AreaOfInterest {
    #[serde(rename = "type", default = "polygon_kind")]
    pub kind: String,
    pub coordinates: Vec<Vec<[f64; 2]>>,
}

/// Pixel window (row, col, rows, cols) inside a raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelWindow {
    pub row: usize,
    pub col: usize,
    pub rows: usize,
    pub cols: usize,
}

impl AreaOfInterest {
    pub fn new(exterior: Vec<[f64; 2]>) -> Result<Self> {
        let aoi = AreaOfInterest {
            kind: polygon_kind(),
            coordinates: vec![exterior],
        };
        aoi.validate()?;
        Ok(aoi)
    }

    /// Axis-aligned rectangle.
    pub fn from_bounds(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Result<Self> {
        Self::new(vec![
            [min_x, min_y],
            [max_x, min_y],
            [max_x, max_y],
            [min_x, max_y],
            [min_x, min_y],
        ])
    }

    pub fn validate(&self) -> Result<()> {
        if self.kind != "Polygon" {
            return Err(Error::InvalidArgument {
                arg: "aoi.type",
                value: self.kind.clone(),
            });
        }
        match self.coordinates.first() {
            Some(ring) if ring.len() >= 3 => Ok(()),
            _ => Err(Error::InvalidArgument {
                arg: "aoi.coordinates",
                value: "exterior ring needs at least 3 vertices".to_string(),
            }),
        }
    }

    /// Parse a GeoJSON Polygon, a Feature wrapping one, or the first feature
    /// of a FeatureCollection.
    pub fn from_geojson_str(text: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(text)?;
        let geometry = match value.get("type").and_then(|t| t.as_str()) {
            Some("Feature") => value.get("geometry").cloned(),
            Some("FeatureCollection") => value
                .get("features")
                .and_then(|f| f.get(0))
                .and_then(|f| f.get("geometry"))
                .cloned(),
            _ => Some(value),
        }
        .ok_or_else(|| Error::InvalidArgument {
            arg: "aoi",
            value: "GeoJSON has no polygon geometry".to_string(),
        })?;
        let aoi: AreaOfInterest = serde_json::from_value(geometry)?;
        aoi.validate()?;
        Ok(aoi)
    }

    pub fn from_geojson_file(path: &std::path::Path) -> Result<Self> {
        Self::from_geojson_str(&std::fs::read_to_string(path)?)
    }

    pub fn exterior(&self) -> &[[f64; 2]] {
        self.coordinates.first().map(Vec::as_slice).unwrap_or(&[])
    }

    /// [min_x, min_y, max_x, max_y] of the exterior ring.
    pub fn bounds(&self) -> [f64; 4] {
        let mut b = [
            f64::INFINITY,
            f64::INFINITY,
            f64::NEG_INFINITY,
            f64::NEG_INFINITY,
        ];
        for &[x, y] in self.exterior() {
            b[0] = b[0].min(x);
            b[1] = b[1].min(y);
            b[2] = b[2].max(x);
            b[3] = b[3].max(y);
        }
        b
    }

    pub fn intersects_bounds(&self, other: [f64; 4]) -> bool {
        let b = self.bounds();
        b[0] <= other[2] && other[0] <= b[2] && b[1] <= other[3] && other[1] <= b[3]
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        rings_contain(&self.coordinates, x, y)
    }

    /// Pixel window covering the polygon bounds, clamped to the raster.
    pub fn pixel_window(&self, georef: &GeoReference, shape: (usize, usize)) -> Option<PixelWindow> {
        let [min_x, min_y, max_x, max_y] = self.bounds();
        let (r_a, c_a) = georef.world_to_pixel(min_x, max_y);
        let (r_b, c_b) = georef.world_to_pixel(max_x, min_y);
        let clamp = |v: f64, hi: usize| v.max(0.0).min(hi as f64) as usize;
        let row0 = clamp(r_a.min(r_b).floor(), shape.0);
        let row1 = clamp(r_a.max(r_b).ceil(), shape.0);
        let col0 = clamp(c_a.min(c_b).floor(), shape.1);
        let col1 = clamp(c_a.max(c_b).ceil(), shape.1);
        if row1 <= row0 || col1 <= col0 {
            return None;
        }
        Some(PixelWindow {
            row: row0,
            col: col0,
            rows: row1 - row0,
            cols: col1 - col0,
        })
    }

    /// `true` where the pixel centre falls inside the polygon.
    pub fn pixel_mask(&self, georef: &GeoReference, shape: (usize, usize)) -> Array2<bool> {
        Array2::from_shape_fn(shape, |(r, c)| {
            let (x, y) = georef.pixel_center(r, c);
            self.contains(x, y)
        })
    }

    /// Crop to the polygon bounds and mask pixels outside the polygon.
    pub fn clip(&self, image: &Image) -> Result<Image> {
        let window = self
            .pixel_window(image.georef(), image.shape())
            .ok_or_else(|| Error::Processing("AOI does not overlap the raster".to_string()))?;
        let georef = image.georef().offset(window.row, window.col);
        let inside = self.pixel_mask(&georef, (window.rows, window.cols));
        debug!(
            "Clipping to AOI window row={} col={} rows={} cols={}",
            window.row, window.col, window.rows, window.cols
        );

        let bands = image
            .bands()
            .iter()
            .map(|band| {
                let mut data = band
                    .data
                    .slice(s![
                        window.row..window.row + window.rows,
                        window.col..window.col + window.cols
                    ])
                    .to_owned();
                ndarray::Zip::from(&mut data).and(&inside).for_each(|v, &keep| {
                    if !keep {
                        *v = f64::NAN;
                    }
                });
                Band::new(band.name.clone(), data)
            })
            .collect();
        Image::from_bands(bands, georef)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle() -> AreaOfInterest {
        AreaOfInterest::new(vec![[0.0, 0.0], [10.0, 0.0], [0.0, 10.0], [0.0, 0.0]]).unwrap()
    }

    #[test]
    fn contains_uses_even_odd_rule_with_holes() {
        let mut aoi = AreaOfInterest::from_bounds(0.0, 0.0, 10.0, 10.0).unwrap();
        aoi.coordinates
            .push(vec![[4.0, 4.0], [6.0, 4.0], [6.0, 6.0], [4.0, 6.0], [4.0, 4.0]]);
        assert!(aoi.contains(1.0, 1.0));
        assert!(!aoi.contains(5.0, 5.0));
        assert!(!aoi.contains(11.0, 5.0));
    }

    #[test]
    fn clip_crops_to_bounds_and_masks_outside() {
        // 10x10 grid of 1 m pixels, origin (0, 10)
        let geo = GeoReference::new([0.0, 1.0, 0.0, 10.0, 0.0, -1.0], "");
        let img = Image::single("v", Array2::from_elem((10, 10), 1.0), geo);
        let aoi = AreaOfInterest::from_bounds(2.0, 2.0, 6.0, 5.0).unwrap();
        let clipped = aoi.clip(&img).unwrap();
        assert_eq!(clipped.shape(), (3, 4));
        assert_eq!(clipped.georef().geotransform[0], 2.0);
        assert_eq!(clipped.georef().geotransform[3], 5.0);
        assert_eq!(clipped.first_band().unwrap().valid_count(), 12);

        let tri = triangle();
        let clipped = tri.clip(&img).unwrap();
        let band = clipped.first_band().unwrap();
        // pixel centre (9.5, 9.5) lies beyond the hypotenuse
        assert!(band.data[[0, 9]].is_nan());
        assert_eq!(band.data[[9, 0]], 1.0);
    }

    #[test]
    fn clip_without_overlap_fails() {
        let geo = GeoReference::new([0.0, 1.0, 0.0, 10.0, 0.0, -1.0], "");
        let img = Image::single("v", Array2::zeros((10, 10)), geo);
        let aoi = AreaOfInterest::from_bounds(50.0, 50.0, 60.0, 60.0).unwrap();
        assert!(aoi.clip(&img).is_err());
    }

    #[test]
    fn deserializes_geojson_polygon() {
        let json = r#"{"type":"Polygon","coordinates":[[[0,0],[4,0],[4,4],[0,4],[0,0]]]}"#;
        let aoi: AreaOfInterest = serde_json::from_str(json).unwrap();
        assert_eq!(aoi.bounds(), [0.0, 0.0, 4.0, 4.0]);
    }

    #[test]
    fn feature_wrapped_polygon_is_accepted() {
        let json = r#"{"type":"Feature","properties":{},"geometry":{"type":"Polygon","coordinates":[[[1,1],[3,1],[3,3],[1,1]]]}}"#;
        assert_eq!(AreaOfInterest::from_geojson_str(json).unwrap().bounds(), [1.0, 1.0, 3.0, 3.0]);
        let point = r#"{"type":"Point","coordinates":[1,1]}"#;
        assert!(AreaOfInterest::from_geojson_str(point).is_err());
    }
}
