//! Polygon features (building footprints, camp outlines) read through the
//! GDAL vector API, and GeoJSON output of selected footprints.
use std::path::Path;

use gdal::Dataset;
use gdal::spatial_ref::SpatialRef;
use gdal::vector::LayerAccess;
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::core::post::damage::{Footprint, Ring};
use crate::error::{Error, Result};
use crate::io::gdal::GdalError;

fn ring(value: &Value) -> Option<Ring> {
    value
        .as_array()?
        .iter()
        .map(|pos| {
            let pos = pos.as_array()?;
            Some([pos.first()?.as_f64()?, pos.get(1)?.as_f64()?])
        })
        .collect()
}

fn polygon(value: &Value) -> Option<Vec<Ring>> {
    value.as_array()?.iter().map(ring).collect()
}

/// Polygons of a GeoJSON geometry. Z values are dropped; other geometry
/// types yield `None`.
pub fn polygons_from_geojson(geometry: &Value) -> Option<Vec<Vec<Ring>>> {
    let coordinates = geometry.get("coordinates")?;
    match geometry.get("type")?.as_str()? {
        "Polygon" => Some(vec![polygon(coordinates)?]),
        "MultiPolygon" => coordinates.as_array()?.iter().map(polygon).collect(),
        _ => None,
    }
}

/// Polygon features of the first layer of `path` (Shapefile, GeoJSON,
/// GeoPackage, ...) with the layer's CRS. Features are named from
/// `name_field` when given.
pub fn read_footprints(
    path: &Path,
    name_field: Option<&str>,
) -> Result<(Vec<Footprint>, Option<SpatialRef>)> {
    let dataset = Dataset::open(path).map_err(GdalError::from)?;
    let mut layer = dataset.layer(0).map_err(GdalError::from)?;
    let srs = layer.spatial_ref();

    let mut footprints = Vec::new();
    let mut skipped = 0usize;
    for (index, feature) in layer.features().enumerate() {
        let Some(geometry) = feature.geometry() else {
            skipped += 1;
            continue;
        };
        let json: Value = serde_json::from_str(&geometry.json().map_err(GdalError::from)?)?;
        let Some(polygons) = polygons_from_geojson(&json) else {
            skipped += 1;
            continue;
        };
        let name = match name_field {
            Some(field) => {
                let idx = feature.field_index(field).map_err(GdalError::from)?;
                feature.field_as_string(idx).map_err(GdalError::from)?
            }
            None => None,
        };
        footprints.push(Footprint {
            id: feature.fid().unwrap_or(index as u64),
            name,
            polygons,
        });
    }
    if skipped > 0 {
        warn!("{}: {} features without polygon geometry skipped", path.display(), skipped);
    }
    info!("Read {} polygon features from {}", footprints.len(), path.display());
    Ok((footprints, srs))
}

/// Fails unless the layer CRS matches the raster projection. Either side
/// being unknown is accepted.
pub fn ensure_same_crs(raster_projection: &str, layer: Option<&SpatialRef>, what: &'static str) -> Result<()> {
    let Some(layer) = layer else {
        return Ok(());
    };
    if raster_projection.trim().is_empty() {
        return Ok(());
    }
    let raster = SpatialRef::from_definition(raster_projection).map_err(GdalError::from)?;
    if raster != *layer {
        return Err(Error::InvalidArgument {
            arg: what,
            value: format!(
                "layer CRS {} differs from the raster CRS {}",
                layer.name().unwrap_or_default(),
                raster.name().unwrap_or_default()
            ),
        });
    }
    Ok(())
}

/// FeatureCollection of `footprints` with `damage = 1` on every feature.
pub fn damaged_feature_collection(footprints: &[&Footprint]) -> Value {
    let features: Vec<Value> = footprints
        .iter()
        .map(|f| {
            json!({
                "type": "Feature",
                "id": f.id,
                "properties": { "id": f.id, "name": f.name, "damage": 1 },
                "geometry": { "type": "MultiPolygon", "coordinates": f.polygons },
            })
        })
        .collect();
    json!({ "type": "FeatureCollection", "features": features })
}
