use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::core::raster::GeoReference;

/// World-file path for an image: `.jgw` for JPEG, `.pgw` for PNG, `.tfw` for
/// TIFF, `<first letter>w` for anything else and `.wld` without extension.
pub fn world_file_path(image: &Path) -> PathBuf {
    let ext = image
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();
    let world_ext = match ext.as_str() {
        "jpg" | "jpeg" => "jgw".to_string(),
        "png" => "pgw".to_string(),
        "tif" | "tiff" => "tfw".to_string(),
        "" => "wld".to_string(),
        other => format!("{}w", other.chars().next().unwrap_or('w')),
    };
    image.with_extension(world_ext)
}

/// Write a world file next to the image. World files use the pixel-centre
/// convention, so the origin is shifted by half a pixel.
pub fn write_world_file(image: &Path, georef: &GeoReference) -> Result<PathBuf, Box<dyn std::error::Error>> {
    let gt = georef.geotransform;
    let (a, d, b, e) = (gt[1], gt[4], gt[2], gt[5]);
    let c = gt[0] + 0.5 * a + 0.5 * b;
    let f = gt[3] + 0.5 * d + 0.5 * e;

    let path = world_file_path(image);
    let mut file = File::create(&path)?;
    for v in [a, d, b, e, c, f] {
        writeln!(file, "{:.12}", v)?;
    }
    Ok(path)
}

/// Write a `.prj` file with the projection, skipped when it is empty.
pub fn write_prj_file(image: &Path, projection: &str) -> Result<Option<PathBuf>, Box<dyn std::error::Error>> {
    if projection.is_empty() {
        return Ok(None);
    }
    let path = image.with_extension("prj");
    std::fs::write(&path, projection.as_bytes())?;
    Ok(Some(path))
}
