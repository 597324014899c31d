//! In-memory raster model: named `f64` bands sharing one grid and georeference.
//! Masked pixels are NaN throughout the crate.
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Affine geotransform plus projection, GDAL conventions
/// ([origin_x, pixel_width, rot_x, origin_y, rot_y, pixel_height]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoReference {
    pub geotransform: [f64; 6],
    pub projection: String,
}

impl Default for GeoReference {
    fn default() -> Self {
        Self {
            geotransform: [0.0, 1.0, 0.0, 0.0, 0.0, -1.0],
            projection: String::new(),
        }
    }
}

impl GeoReference {
    pub fn new(geotransform: [f64; 6], projection: impl Into<String>) -> Self {
        Self {
            geotransform,
            projection: projection.into(),
        }
    }

    /// Ground size of one pixel along x.
    pub fn pixel_size(&self) -> f64 {
        self.geotransform[1].abs()
    }

    /// Map coordinates of the centre of pixel (row, col).
    pub fn pixel_center(&self, row: usize, col: usize) -> (f64, f64) {
        let gt = &self.geotransform;
        let c = col as f64 + 0.5;
        let r = row as f64 + 0.5;
        (gt[0] + c * gt[1] + r * gt[2], gt[3] + c * gt[4] + r * gt[5])
    }

    /// Fractional (row, col) of a map coordinate. Rotation terms are ignored.
    pub fn world_to_pixel(&self, x: f64, y: f64) -> (f64, f64) {
        let gt = &self.geotransform;
        ((y - gt[3]) / gt[5], (x - gt[0]) / gt[1])
    }

    /// Georeference of a sub-window starting at (row, col).
    pub fn offset(&self, row: usize, col: usize) -> GeoReference {
        let gt = &self.geotransform;
        let mut shifted = *gt;
        shifted[0] = gt[0] + col as f64 * gt[1] + row as f64 * gt[2];
        shifted[3] = gt[3] + col as f64 * gt[4] + row as f64 * gt[5];
        GeoReference::new(shifted, self.projection.clone())
    }

    /// True when both describe the same lattice: equal projection and
    /// geotransform terms within a millionth of a pixel.
    pub fn same_grid(&self, other: &GeoReference) -> bool {
        let tol = 1e-6 * self.pixel_size().max(other.pixel_size());
        self.projection == other.projection
            && self
                .geotransform
                .iter()
                .zip(&other.geotransform)
                .all(|(a, b)| (a - b).abs() <= tol)
    }

    /// Axis-aligned with square-or-rectangular pixels and y decreasing downwards.
    pub fn is_north_up(&self) -> bool {
        let gt = &self.geotransform;
        gt[2] == 0.0 && gt[4] == 0.0 && gt[1] > 0.0 && gt[5] < 0.0
    }

    /// Human-readable grid summary for error messages.
    pub fn describe(&self, shape: (usize, usize)) -> String {
        let gt = &self.geotransform;
        let crs = if self.projection.is_empty() {
            "no CRS".to_string()
        } else {
            self.projection.chars().take(48).collect()
        };
        format!(
            "{}x{} pixels, origin ({}, {}), pixel {}x{}, {}",
            shape.0, shape.1, gt[0], gt[3], gt[1], gt[5], crs
        )
    }

    /// Same origin with pixel sizes multiplied by `factor`.
    pub fn rescaled(&self, factor: f64) -> GeoReference {
        let mut gt = self.geotransform;
        gt[1] *= factor;
        gt[2] *= factor;
        gt[4] *= factor;
        gt[5] *= factor;
        GeoReference::new(gt, self.projection.clone())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Band {
    pub name: String,
    pub data: Array2<f64>,
}

impl Band {
    pub fn new(name: impl Into<String>, data: Array2<f64>) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }

    pub fn shape(&self) -> (usize, usize) {
        self.data.dim()
    }

    pub fn valid_values(&self) -> impl Iterator<Item = f64> + '_ {
        self.data.iter().copied().filter(|v| v.is_finite())
    }

    pub fn valid_count(&self) -> usize {
        self.valid_values().count()
    }
}

/// Multi-band raster over one grid.
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    bands: Vec<Band>,
    georef: GeoReference,
}

impl Image {
    pub fn from_bands(bands: Vec<Band>, georef: GeoReference) -> Result<Self> {
        let mut image = Image {
            bands: Vec::with_capacity(bands.len()),
            georef,
        };
        for band in bands {
            image.push_band(band)?;
        }
        Ok(image)
    }

    pub fn single(name: impl Into<String>, data: Array2<f64>, georef: GeoReference) -> Self {
        Image {
            bands: vec![Band::new(name, data)],
            georef,
        }
    }

    pub fn georef(&self) -> &GeoReference {
        &self.georef
    }

    pub fn bands(&self) -> &[Band] {
        &self.bands
    }

    pub fn into_bands(self) -> (Vec<Band>, GeoReference) {
        (self.bands, self.georef)
    }

    pub fn shape(&self) -> (usize, usize) {
        self.bands.first().map(Band::shape).unwrap_or((0, 0))
    }

    pub fn band_names(&self) -> Vec<&str> {
        self.bands.iter().map(|b| b.name.as_str()).collect()
    }

    pub fn has_band(&self, name: &str) -> bool {
        self.bands.iter().any(|b| b.name == name)
    }

    pub fn band(&self, name: &str) -> Result<&Band> {
        self.bands
            .iter()
            .find(|b| b.name == name)
            .ok_or_else(|| Error::MissingBand {
                band: name.to_string(),
                available: self.band_names().join(","),
            })
    }

    pub fn first_band(&self) -> Result<&Band> {
        self.bands.first().ok_or_else(|| Error::MissingBand {
            band: "<first>".to_string(),
            available: String::new(),
        })
    }

    /// New image holding only `names`, in the given order.
    pub fn select<S: AsRef<str>>(&self, names: &[S]) -> Result<Image> {
        let bands = names
            .iter()
            .map(|n| self.band(n.as_ref()).cloned())
            .collect::<Result<Vec<_>>>()?;
        Ok(Image {
            bands,
            georef: self.georef.clone(),
        })
    }

    pub fn push_band(&mut self, band: Band) -> Result<()> {
        if let Some(first) = self.bands.first() {
            if first.shape() != band.shape() {
                return Err(Error::shape_mismatch(first.shape(), band.shape()));
            }
        }
        if self.has_band(&band.name) {
            return Err(Error::Processing(format!(
                "duplicate band name '{}'",
                band.name
            )));
        }
        self.bands.push(band);
        Ok(())
    }

    /// Apply `f` to every band's data, keeping names and georeference.
    pub fn map_bands<F>(&self, f: F) -> Image
    where
        F: Fn(&Band) -> Array2<f64>,
    {
        Image {
            bands: self
                .bands
                .iter()
                .map(|b| Band::new(b.name.clone(), f(b)))
                .collect(),
            georef: self.georef.clone(),
        }
    }

    pub fn with_georef(mut self, georef: GeoReference) -> Image {
        self.georef = georef;
        self
    }
}

/// Fails with `GridMismatch` unless both arrays have the same shape.
pub fn ensure_same_grid(a: &Array2<f64>, b: &Array2<f64>) -> Result<()> {
    if a.dim() != b.dim() {
        return Err(Error::shape_mismatch(a.dim(), b.dim()));
    }
    Ok(())
}

/// Fails with `GridMismatch` unless both images share shape and georeference.
pub fn ensure_same_georef(expected: &Image, found: &Image) -> Result<()> {
    if expected.shape() != found.shape() || !expected.georef().same_grid(found.georef()) {
        return Err(Error::GridMismatch {
            expected: expected.georef().describe(expected.shape()),
            found: found.georef().describe(found.shape()),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn select_preserves_requested_order() {
        let img = Image::from_bands(
            vec![
                Band::new("b1", array![[1.0]]),
                Band::new("b2", array![[2.0]]),
                Band::new("b3", array![[3.0]]),
            ],
            GeoReference::default(),
        )
        .unwrap();
        let sel = img.select(&["b3", "b1"]).unwrap();
        assert_eq!(sel.band_names(), vec!["b3", "b1"]);
    }

    #[test]
    fn missing_band_reports_available_names() {
        let img = Image::single("B4", array![[1.0]], GeoReference::default());
        match img.band("B8") {
            Err(Error::MissingBand { band, available }) => {
                assert_eq!(band, "B8");
                assert_eq!(available, "B4");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn push_band_rejects_different_shape() {
        let mut img = Image::single("a", Array2::zeros((2, 2)), GeoReference::default());
        let err = img.push_band(Band::new("b", Array2::zeros((3, 2)))).unwrap_err();
        assert!(matches!(err, Error::GridMismatch { .. }));
    }

    #[test]
    fn pixel_center_and_offset() {
        let geo = GeoReference::new([100.0, 10.0, 0.0, 500.0, 0.0, -10.0], "EPSG:32634");
        assert_eq!(geo.pixel_center(0, 0), (105.0, 495.0));
        let sub = geo.offset(2, 3);
        assert_eq!(sub.geotransform[0], 130.0);
        assert_eq!(sub.geotransform[3], 480.0);
        let (r, c) = geo.world_to_pixel(135.0, 475.0);
        assert!((r - 2.5).abs() < 1e-12 && (c - 3.5).abs() < 1e-12);
    }

    #[test]
    fn offset_origin_is_a_different_grid() {
        let geo = GeoReference::new([100.0, 10.0, 0.0, 500.0, 0.0, -10.0], "EPSG:32634");
        let a = Image::single("v", Array2::zeros((3, 3)), geo.clone());
        let b = Image::single("v", Array2::zeros((3, 3)), geo.offset(0, 1));
        match ensure_same_georef(&a, &b) {
            Err(Error::GridMismatch { expected, found }) => {
                assert!(expected.contains("origin (100, 500)"));
                assert!(found.contains("origin (110, 500)"));
            }
            other => panic!("unexpected: {other:?}"),
        }

        let reprojected = a.clone().with_georef(GeoReference::new(geo.geotransform, "EPSG:32635"));
        assert!(ensure_same_georef(&a, &reprojected).is_err());

        let mut nudged = geo.geotransform;
        nudged[0] += 1e-9;
        let same = a.clone().with_georef(GeoReference::new(nudged, "EPSG:32634"));
        assert!(ensure_same_georef(&a, &same).is_ok());
    }
}
