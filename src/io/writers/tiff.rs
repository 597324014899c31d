use gdal::raster::Buffer;
use gdal::{Dataset, DriverManager, Metadata};
use std::path::Path;

use crate::core::raster::Image;

/// Write every band of `image` as Float32 with NaN nodata and the band name
/// as its description. Georeferencing and metadata are left to the caller.
pub fn write_float_tiff(output: &Path, image: &Image) -> Result<Dataset, Box<dyn std::error::Error>> {
    let (rows, cols) = image.shape();
    let driver = DriverManager::get_driver_by_name("GTiff")?;
    let ds = driver.create_with_band_type::<f32, _>(output, cols, rows, image.bands().len())?;

    for (idx, band) in image.bands().iter().enumerate() {
        let mut handle = ds.rasterband(idx + 1)?;
        handle.set_no_data_value(Some(f64::NAN))?;
        handle.set_description(&band.name)?;
        let data: Vec<f32> = band.data.iter().map(|&v| v as f32).collect();
        let mut buf = Buffer::new((cols, rows), data);
        handle.write((0, 0), (cols, rows), &mut buf)?;
    }
    Ok(ds)
}
