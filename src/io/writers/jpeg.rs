use jpeg_encoder::{ColorType, Encoder};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use crate::core::processing::render::RgbRaster;

const PREVIEW_QUALITY: u8 = 90;

pub fn write_rgb_jpeg(output: &Path, raster: &RgbRaster) -> Result<(), Box<dyn std::error::Error>> {
    let (cols, rows) = (u16::try_from(raster.cols)?, u16::try_from(raster.rows)?);
    if raster.data.len() != raster.cols * raster.rows * 3 {
        return Err(format!(
            "RGB buffer holds {} bytes, expected {}",
            raster.data.len(),
            raster.cols * raster.rows * 3
        )
        .into());
    }
    let file = File::create(output)?;
    let mut writer = BufWriter::new(file);
    let encoder = Encoder::new(&mut writer, PREVIEW_QUALITY);
    encoder.encode(&raster.data, cols, rows, ColorType::Rgb)?;
    Ok(())
}
