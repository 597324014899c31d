use chrono::Utc;
use gdal::{Dataset, Metadata};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::core::raster::GeoReference;

/// Provenance attached to every exported product: embedded as GeoTIFF
/// metadata items and written as JSON next to previews.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductMetadata {
    pub description: String,
    pub sensor: String,
    pub product: String,
    pub bands: Vec<String>,
    /// Ground units per pixel
    pub scale: f64,
    pub geotransform: [f64; 6],
    pub crs: String,
    pub created: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

impl ProductMetadata {
    pub fn new(description: &str, sensor: &str, product: &str, bands: Vec<String>, georef: &GeoReference) -> Self {
        Self {
            description: description.to_string(),
            sensor: sensor.to_string(),
            product: product.to_string(),
            bands,
            scale: georef.pixel_size(),
            geotransform: georef.geotransform,
            crs: georef.projection.clone(),
            created: Utc::now().to_rfc3339(),
            extra: BTreeMap::new(),
        }
    }

    pub fn with_item(mut self, key: &str, value: impl ToString) -> Self {
        self.extra.insert(key.to_string(), value.to_string());
        self
    }

    /// Flat upper-case items for the GeoTIFF default metadata domain.
    pub fn tiff_items(&self) -> BTreeMap<String, String> {
        let mut items = BTreeMap::new();
        items.insert("DESCRIPTION".to_string(), self.description.clone());
        items.insert("SENSOR".to_string(), self.sensor.clone());
        items.insert("PRODUCT".to_string(), self.product.clone());
        items.insert("BANDS".to_string(), self.bands.join(","));
        items.insert("SCALE".to_string(), self.scale.to_string());
        items.insert("CREATED".to_string(), self.created.clone());
        items.insert(
            "CONVERSION_TOOL".to_string(),
            format!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
        );
        for (k, v) in &self.extra {
            items.insert(k.to_ascii_uppercase(), v.clone());
        }
        items
    }
}

fn is_identity(gt: [f64; 6]) -> bool {
    gt[0] == 0.0 && gt[1] == 1.0 && gt[2] == 0.0 && gt[3] == 0.0 && gt[4] == 0.0 && gt[5].abs() == 1.0
}

/// Set georeferencing and metadata items on a GeoTIFF dataset. The
/// projection is only written together with a non-identity geotransform.
pub fn embed_tiff_metadata(
    ds: &mut Dataset,
    georef: &GeoReference,
    meta: &ProductMetadata,
) -> Result<(), Box<dyn std::error::Error>> {
    if !is_identity(georef.geotransform) {
        ds.set_geo_transform(&georef.geotransform)?;
        if !georef.projection.is_empty() {
            ds.set_projection(&georef.projection)?;
        }
    }
    ds.set_description(&meta.description)?;
    for (key, value) in meta.tiff_items() {
        ds.set_metadata_item(&key, &value, "")?;
    }
    Ok(())
}

/// Pretty-printed JSON written to `path`.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), Box<dyn std::error::Error>> {
    let json_string = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json_string)?;
    Ok(())
}

/// JSON sidecar next to an image (`<image>.json`).
pub fn write_metadata_sidecar(image: &Path, meta: &ProductMetadata) -> Result<PathBuf, Box<dyn std::error::Error>> {
    let sidecar_path = image.with_extension("json");
    write_json(&sidecar_path, meta)?;
    info!("Created metadata sidecar: {:?}", sidecar_path);
    Ok(sidecar_path)
}
