use gdal::spatial_ref::SpatialRef;
use gdal::{Dataset, Metadata, errors::GdalError as GdalCrateError};
use ndarray::Array2;
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

use crate::core::graph::{SceneLoader, SceneRef};
use crate::core::raster::{Band, GeoReference, Image};

/// Errors encountered when using GDAL reader
#[derive(Debug, Error)]
pub enum GdalError {
    #[error("GDAL error: {0}")]
    Gdal(#[from] GdalCrateError),
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
    #[error("Dimension mismatch: expected {0}x{1}, got {2}x{3}")]
    DimensionMismatch(usize, usize, usize, usize),
}

/// Metadata extracted from a GDAL-supported dataset
#[derive(Debug, Clone)]
pub struct GdalMetadata {
    /// Width (pixels) of the raster
    pub size_x: usize,
    /// Height (lines) of the raster
    pub size_y: usize,
    /// Number of raster bands
    pub bands: usize,
    /// Affine geotransform coefficients ([origin_x, pixel_width, rot_x, origin_y, rot_y, pixel_height])
    pub geotransform: [f64; 6],
    /// Projection as stored in the file (WKT)
    pub projection: String,
    /// EPSG code parsed from the projection, if any
    pub epsg: Option<String>,
    /// Band descriptions, empty strings where unset
    pub band_descriptions: Vec<String>,
    pub nodata: Vec<Option<f64>>,
    /// Dataset metadata items (domain "")
    pub metadata: HashMap<String, String>,
}

/// Reader for multi-band optical rasters via GDAL
pub struct GdalImageReader {
    pub dataset: Dataset,
    pub metadata: GdalMetadata,
}

// Helper to extract EPSG code from WKT authority tag
fn parse_epsg(wkt: &str) -> Option<String> {
    const KEY: &str = "AUTHORITY[\"EPSG\",\"";
    let idx = wkt.rfind(KEY)?;
    let start = idx + KEY.len();
    let end = wkt[start..].find('"')?;
    Some(format!("EPSG:{}", &wkt[start..start + end]))
}

/// Scales, cell sizes and GLCM windows are ground metres, so imagery in a
/// geographic (degree) CRS is refused. An empty projection is accepted as
/// an ungeoreferenced pixel grid.
pub fn ensure_projected_crs(projection: &str) -> crate::Result<()> {
    if projection.trim().is_empty() {
        return Ok(());
    }
    let srs = SpatialRef::from_definition(projection).map_err(GdalError::from)?;
    if srs.is_geographic() {
        let crs = parse_epsg(projection).unwrap_or_else(|| projection.chars().take(64).collect());
        return Err(crate::Error::GeographicCrs { crs });
    }
    Ok(())
}

impl GdalImageReader {
    /// Open a GDAL-supported dataset (GeoTIFF, JP2, ENVI, VRT, ...)
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, GdalError> {
        let dataset = Dataset::open(path.as_ref())?;
        let (size_x, size_y) = dataset.raster_size();
        let bands = dataset.raster_count() as usize;
        if bands == 0 {
            return Err(GdalError::UnsupportedFormat("No raster bands found".into()));
        }
        let geotransform = dataset
            .geo_transform()
            .unwrap_or([0.0, 1.0, 0.0, 0.0, 0.0, -1.0]);
        let projection = dataset.projection();
        let epsg = if projection.starts_with("EPSG:") {
            Some(projection.clone())
        } else {
            parse_epsg(&projection)
        };

        let mut band_descriptions = Vec::with_capacity(bands);
        let mut nodata = Vec::with_capacity(bands);
        for idx in 1..=bands {
            let band = dataset.rasterband(idx)?;
            band_descriptions.push(band.description().unwrap_or_default());
            nodata.push(band.no_data_value());
        }

        let mut metadata_map = HashMap::new();
        if let Some(entries) = dataset.metadata_domain("") {
            for entry in entries {
                if let Some((key, val)) = entry.split_once('=') {
                    metadata_map.insert(key.to_string(), val.to_string());
                }
            }
        }
        debug!(
            "Opened {} ({}x{}, {} bands)",
            path.as_ref().display(),
            size_x,
            size_y,
            bands
        );
        Ok(GdalImageReader {
            dataset,
            metadata: GdalMetadata {
                size_x: size_x as usize,
                size_y: size_y as usize,
                bands,
                geotransform,
                projection,
                epsg,
                band_descriptions,
                nodata,
                metadata: metadata_map,
            },
        })
    }

    /// Read a single band (1-based index) as f64 of shape (height, width).
    /// Nodata pixels become NaN.
    pub fn read_band(&self, index: usize) -> Result<Array2<f64>, GdalError> {
        if index == 0 || index > self.metadata.bands {
            return Err(GdalError::UnsupportedFormat(format!(
                "Band index {} out of range",
                index
            )));
        }
        let band = self.dataset.rasterband(index)?;
        let window = (self.metadata.size_x, self.metadata.size_y);
        let buf = band.read_as::<f64>((0, 0), window, window, None)?;
        let data_vec = buf.data().to_vec();
        let mut array = Array2::from_shape_vec((self.metadata.size_y, self.metadata.size_x), data_vec)
            .map_err(|_| {
                GdalError::DimensionMismatch(
                    self.metadata.size_x,
                    self.metadata.size_y,
                    buf.shape().0,
                    buf.shape().1,
                )
            })?;
        if let Some(nodata) = self.metadata.nodata[index - 1] {
            if !nodata.is_nan() {
                array.mapv_inplace(|v| if v == nodata { f64::NAN } else { v });
            }
        }
        Ok(array)
    }

    /// Band names: file descriptions when every band has one, otherwise
    /// `fallback` by position, otherwise `b1`, `b2`, ...
    pub fn band_names(&self, fallback: &[String]) -> Vec<String> {
        let described = self.metadata.band_descriptions.iter().all(|d| !d.is_empty());
        (0..self.metadata.bands)
            .map(|i| {
                if described {
                    self.metadata.band_descriptions[i].clone()
                } else if let Some(name) = fallback.get(i) {
                    name.clone()
                } else {
                    format!("b{}", i + 1)
                }
            })
            .collect()
    }

    pub fn georef(&self) -> GeoReference {
        GeoReference::new(self.metadata.geotransform, self.metadata.projection.clone())
    }

    /// Read every band into an [`Image`].
    pub fn read_image(&self, fallback_names: &[String]) -> crate::Result<Image> {
        let names = self.band_names(fallback_names);
        let mut bands = Vec::with_capacity(names.len());
        for (idx, name) in names.into_iter().enumerate() {
            bands.push(Band::new(name, self.read_band(idx + 1)?));
        }
        Image::from_bands(bands, self.georef())
    }
}

/// Loads scenes from disk and keeps only the bands the analysis needs, in a
/// fixed order, so that every scene of a collection shares one band schema.
#[derive(Debug, Clone)]
pub struct GdalSceneLoader {
    pub file_bands: Vec<String>,
    pub required_bands: Vec<String>,
}

impl GdalSceneLoader {
    pub fn new(file_bands: Vec<String>, required_bands: Vec<String>) -> Self {
        Self {
            file_bands,
            required_bands,
        }
    }
}

impl SceneLoader for GdalSceneLoader {
    fn load(&self, scene: &SceneRef) -> crate::Result<Image> {
        let reader = GdalImageReader::open(&scene.path)?;
        ensure_projected_crs(&reader.metadata.projection)?;
        let image = reader.read_image(&self.file_bands)?;
        debug!("Loaded scene {} bands {:?}", scene.id, image.band_names());
        image.select(&self.required_bands)
    }
}
