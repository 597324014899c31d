//! Export destinations. A product is named by its description string and
//! lands in `<root>/<folder>/<description>.<ext>`.
use std::path::{Path, PathBuf};

use tracing::info;

use crate::core::processing::render::RgbRaster;
use crate::core::raster::{GeoReference, Image};
use crate::error::{Error, Result};
use crate::io::writers::jpeg::write_rgb_jpeg;
use crate::io::writers::metadata::{ProductMetadata, embed_tiff_metadata, write_metadata_sidecar};
use crate::io::writers::tiff::write_float_tiff;
use crate::io::writers::worldfile::{write_prj_file, write_world_file};

pub trait ExportTarget {
    /// Float32 GeoTIFF of every band of `image`.
    fn export_raster(&self, image: &Image, meta: &ProductMetadata) -> Result<PathBuf>;

    /// JPEG preview with world file, `.prj` and JSON sidecar.
    fn export_preview(&self, rgb: &RgbRaster, meta: &ProductMetadata) -> Result<PathBuf>;

    /// Arbitrary text product (JSON report, SVG chart, CSV table).
    fn export_text(&self, file_name: &str, contents: &str) -> Result<PathBuf>;
}

/// Writes products to a folder on the local filesystem.
#[derive(Debug, Clone)]
pub struct LocalExport {
    root: PathBuf,
    folder: String,
}

impl LocalExport {
    pub fn new(root: impl Into<PathBuf>, folder: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            folder: folder.into(),
        }
    }

    pub fn dir(&self) -> PathBuf {
        self.root.join(&self.folder)
    }

    fn prepare(&self, description: &str, ext: &str) -> Result<PathBuf> {
        if description.is_empty() || description.contains(['/', '\\']) {
            return Err(Error::Export {
                description: description.to_string(),
                reason: "description must be a plain file name".to_string(),
            });
        }
        let dir = self.dir();
        std::fs::create_dir_all(&dir).map_err(|e| Error::export(description, e))?;
        Ok(dir.join(format!("{description}.{ext}")))
    }
}

impl ExportTarget for LocalExport {
    fn export_raster(&self, image: &Image, meta: &ProductMetadata) -> Result<PathBuf> {
        let path = self.prepare(&meta.description, "tif")?;
        let mut ds = write_float_tiff(&path, image).map_err(|e| Error::export(&meta.description, e))?;
        embed_tiff_metadata(&mut ds, image.georef(), meta)
            .map_err(|e| Error::export(&meta.description, e))?;
        info!("Exported {} ({}x{})", path.display(), image.shape().1, image.shape().0);
        Ok(path)
    }

    fn export_preview(&self, rgb: &RgbRaster, meta: &ProductMetadata) -> Result<PathBuf> {
        let path = self.prepare(&meta.description, "jpg")?;
        let georef = GeoReference::new(meta.geotransform, meta.crs.clone());
        let wrap = |e: Box<dyn std::error::Error>| Error::export(&meta.description, e);
        write_rgb_jpeg(&path, rgb).map_err(wrap)?;
        write_world_file(&path, &georef).map_err(wrap)?;
        write_prj_file(&path, &meta.crs).map_err(wrap)?;
        write_metadata_sidecar(&path, meta).map_err(wrap)?;
        info!("Exported preview {}", path.display());
        Ok(path)
    }

    fn export_text(&self, file_name: &str, contents: &str) -> Result<PathBuf> {
        if file_name.contains(['/', '\\']) {
            return Err(Error::Export {
                description: file_name.to_string(),
                reason: "file name must not contain path separators".to_string(),
            });
        }
        let stem = Path::new(file_name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(file_name);
        let ext = Path::new(file_name)
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or("txt");
        let path = self.prepare(stem, ext)?;
        std::fs::write(&path, contents).map_err(|e| Error::export(file_name, e))?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_products_land_in_the_export_folder() {
        let dir = tempfile::tempdir().unwrap();
        let target = LocalExport::new(dir.path(), "exports");
        let path = target.export_text("run_manifest.json", "{}").unwrap();
        assert_eq!(path, dir.path().join("exports").join("run_manifest.json"));
        assert_eq!(std::fs::read_to_string(path).unwrap(), "{}");
    }

    #[test]
    fn path_like_descriptions_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let target = LocalExport::new(dir.path(), "exports");
        let err = target.export_text("../escape.txt", "x").unwrap_err();
        assert!(matches!(err, Error::Export { .. }));
    }
}
