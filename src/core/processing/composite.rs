//! Reduction of an image collection into a single composite image.
use ndarray::{Array2, Zip};
use tracing::info;

use crate::core::processing::ops::band_mean;
use crate::core::raster::{Band, Image, ensure_same_georef};
use crate::error::{Error, Result};
use crate::types::CompositeMethod;

/// Check that every image shares the first image's band names, shape and
/// georeference.
fn check_collection(images: &[Image], label: &str) -> Result<()> {
    let first = images.first().ok_or_else(|| Error::EmptyCollection {
        label: label.to_string(),
    })?;
    let names = first.band_names();
    for image in &images[1..] {
        if image.band_names() != names {
            return Err(Error::BandSchemaMismatch {
                expected: names.join(","),
                found: image.band_names().join(","),
            });
        }
        ensure_same_georef(first, image)?;
    }
    Ok(())
}

/// Per-band, per-pixel mean of the valid values across the collection.
pub fn mean_composite(images: &[Image], label: &str) -> Result<Image> {
    check_collection(images, label)?;
    let first = &images[0];
    let mut bands = Vec::with_capacity(first.bands().len());
    for (idx, band) in first.bands().iter().enumerate() {
        let layers: Vec<&Array2<f64>> = images.iter().map(|img| &img.bands()[idx].data).collect();
        bands.push(Band::new(band.name.clone(), band_mean(&layers)?));
    }
    info!("Mean composite of {} images ({})", images.len(), label);
    Image::from_bands(bands, first.georef().clone())
}

/// Later images overwrite earlier ones wherever the later pixel is valid.
pub fn mosaic(images: &[Image], label: &str) -> Result<Image> {
    check_collection(images, label)?;
    let first = &images[0];
    let mut bands = Vec::with_capacity(first.bands().len());
    for (idx, band) in first.bands().iter().enumerate() {
        let mut out = band.data.clone();
        for image in &images[1..] {
            Zip::from(&mut out)
                .and(&image.bands()[idx].data)
                .for_each(|o, &v| {
                    if v.is_finite() {
                        *o = v;
                    }
                });
        }
        bands.push(Band::new(band.name.clone(), out));
    }
    info!("Mosaic of {} images ({})", images.len(), label);
    Image::from_bands(bands, first.georef().clone())
}

pub fn composite(images: &[Image], method: CompositeMethod, label: &str) -> Result<Image> {
    match method {
        CompositeMethod::Mean => mean_composite(images, label),
        CompositeMethod::Mosaic => mosaic(images, label),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::raster::GeoReference;
    use ndarray::array;

    fn img(values: Array2<f64>) -> Image {
        Image::single("b1", values, GeoReference::default())
    }

    #[test]
    fn mean_skips_masked_pixels() {
        let c = vec![
            img(array![[1.0, f64::NAN]]),
            img(array![[3.0, 5.0]]),
            img(array![[5.0, f64::NAN]]),
        ];
        let m = mean_composite(&c, "pre").unwrap();
        assert_eq!(m.first_band().unwrap().data, array![[3.0, 5.0]]);
    }

    #[test]
    fn mosaic_puts_last_valid_pixel_on_top() {
        let c = vec![
            img(array![[1.0, 2.0, 3.0]]),
            img(array![[10.0, f64::NAN, 30.0]]),
            img(array![[f64::NAN, f64::NAN, 300.0]]),
        ];
        let m = mosaic(&c, "post").unwrap();
        assert_eq!(m.first_band().unwrap().data, array![[10.0, 2.0, 300.0]]);
    }

    #[test]
    fn empty_collection_is_an_error() {
        let err = mean_composite(&[], "pre-event").unwrap_err();
        assert!(matches!(err, Error::EmptyCollection { label } if label == "pre-event"));
    }

    #[test]
    fn schema_mismatch_is_an_error() {
        let a = img(array![[1.0]]);
        let b = Image::single("B2", array![[1.0]], GeoReference::default());
        assert!(matches!(
            mosaic(&[a, b], "x"),
            Err(Error::BandSchemaMismatch { .. })
        ));
    }

    #[test]
    fn shifted_scenes_are_not_stacked_pixel_by_pixel() {
        let geo = GeoReference::new([500.0, 3.0, 0.0, 900.0, 0.0, -3.0], "EPSG:32634");
        let a = Image::single("b1", array![[1.0, 2.0]], geo.clone());
        let b = Image::single("b1", array![[3.0, 4.0]], geo.offset(0, 1));
        for method in [CompositeMethod::Mean, CompositeMethod::Mosaic] {
            assert!(matches!(
                composite(&[a.clone(), b.clone()], method, "pre"),
                Err(Error::GridMismatch { .. })
            ));
        }
    }
}
