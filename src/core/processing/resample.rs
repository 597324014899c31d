use ndarray::Array2;
use tracing::{debug, warn};

use crate::core::raster::{GeoReference, Image};
use crate::error::{Error, Result};

/// Relative slack when snapping bounds onto the pixel lattice.
const SNAP_EPSILON: f64 = 1e-6;

/// Output grid dimensions when moving from `native` to `scale` ground units per pixel.
pub fn calculate_scaled_dimensions(rows: usize, cols: usize, native: f64, scale: f64) -> (usize, usize) {
    let factor = native / scale;
    let r = ((rows as f64) * factor).round().max(1.0) as usize;
    let c = ((cols as f64) * factor).round().max(1.0) as usize;
    (r, c)
}

/// Nearest-neighbour resample so that one pixel covers `scale` ground units.
/// The origin is kept; masked pixels stay masked.
pub fn resample_to_scale(image: &Image, scale: f64) -> Result<Image> {
    if !(scale.is_finite() && scale > 0.0) {
        return Err(Error::InvalidArgument {
            arg: "scale",
            value: scale.to_string(),
        });
    }
    let native = image.georef().pixel_size();
    if native <= 0.0 {
        warn!("Image has no pixel size; skipping resample to scale {}", scale);
        return Ok(image.clone());
    }
    if ((native - scale) / scale).abs() < 1e-9 {
        return Ok(image.clone());
    }

    let (rows, cols) = image.shape();
    let (out_rows, out_cols) = calculate_scaled_dimensions(rows, cols, native, scale);
    let step = scale / native;
    debug!(
        "Resampling {}x{} at {} to {}x{} at {}",
        cols, rows, native, out_cols, out_rows, scale
    );

    let src_index = |i: usize, limit: usize| (((i as f64 + 0.5) * step).floor() as usize).min(limit - 1);
    let georef = image.georef().rescaled(step);
    let resampled = image.map_bands(|band| {
        Array2::from_shape_fn((out_rows, out_cols), |(r, c)| {
            band.data[[src_index(r, rows), src_index(c, cols)]]
        })
    });
    Ok(resampled.with_georef(georef))
}

fn require_north_up(georef: &GeoReference) -> Result<()> {
    if georef.is_north_up() {
        Ok(())
    } else {
        Err(Error::InvalidArgument {
            arg: "geotransform",
            value: format!("{:?} is rotated or flipped", georef.geotransform),
        })
    }
}

/// Grid with `georef`'s pixel size and projection covering `bounds`
/// ([min_x, min_y, max_x, max_y]). Edges are snapped outwards to multiples of
/// the pixel size, so every scene at that resolution lands on the same lattice.
pub fn snapped_grid(georef: &GeoReference, bounds: [f64; 4]) -> Result<(GeoReference, (usize, usize))> {
    require_north_up(georef)?;
    let px = georef.geotransform[1];
    let py = -georef.geotransform[5];
    let [min_x, min_y, max_x, max_y] = bounds;
    if !(min_x < max_x && min_y < max_y) {
        return Err(Error::InvalidArgument {
            arg: "bounds",
            value: format!("{bounds:?}"),
        });
    }
    let x0 = (min_x / px + SNAP_EPSILON).floor() * px;
    let x1 = (max_x / px - SNAP_EPSILON).ceil() * px;
    let y0 = (min_y / py + SNAP_EPSILON).floor() * py;
    let y1 = (max_y / py - SNAP_EPSILON).ceil() * py;
    let cols = ((x1 - x0) / px).round().max(1.0) as usize;
    let rows = ((y1 - y0) / py).round().max(1.0) as usize;
    let grid = GeoReference::new([x0, px, 0.0, y1, 0.0, -py], georef.projection.clone());
    Ok((grid, (rows, cols)))
}

/// Nearest-neighbour warp of `image` onto `target` with `shape` (rows, cols).
/// Both grids must share the projection; target pixels outside the source are NaN.
pub fn warp_to_grid(image: &Image, target: &GeoReference, shape: (usize, usize)) -> Result<Image> {
    let source = image.georef();
    if image.shape() == shape && source.same_grid(target) {
        return Ok(image.clone());
    }
    if source.projection != target.projection {
        return Err(Error::GridMismatch {
            expected: target.describe(shape),
            found: source.describe(image.shape()),
        });
    }
    require_north_up(source)?;
    let (rows, cols) = image.shape();
    debug!(
        "Warping {}x{} onto {}",
        rows,
        cols,
        target.describe(shape)
    );

    let index = |v: f64, limit: usize| (v >= 0.0 && v < limit as f64).then(|| v.floor() as usize);
    let lookup: Vec<Option<(usize, usize)>> = (0..shape.0 * shape.1)
        .map(|i| {
            let (x, y) = target.pixel_center(i / shape.1, i % shape.1);
            let (r, c) = source.world_to_pixel(x, y);
            Some((index(r, rows)?, index(c, cols)?))
        })
        .collect();
    let warped = image.map_bands(|band| {
        Array2::from_shape_fn(shape, |(r, c)| match lookup[r * shape.1 + c] {
            Some(src) => band.data[src],
            None => f64::NAN,
        })
    });
    Ok(warped.with_georef(target.clone()))
}

/// Warp onto the lattice of [`snapped_grid`] over `bounds`.
pub fn warp_to_bounds(image: &Image, bounds: [f64; 4]) -> Result<Image> {
    let (grid, shape) = snapped_grid(image.georef(), bounds)?;
    warp_to_grid(image, &grid, shape)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::raster::GeoReference;

    #[test]
    fn downsample_picks_nearest_source_pixel() {
        let geo = GeoReference::new([0.0, 3.0, 0.0, 30.0, 0.0, -3.0], "");
        let data = Array2::from_shape_fn((10, 10), |(r, c)| (r * 10 + c) as f64);
        let img = Image::single("v", data, geo);
        let out = resample_to_scale(&img, 30.0).unwrap();
        assert_eq!(out.shape(), (1, 1));
        // centre of the single output pixel falls in source pixel (5, 5)
        assert_eq!(out.first_band().unwrap().data[[0, 0]], 55.0);
        assert_eq!(out.georef().geotransform[1], 30.0);
        assert_eq!(out.georef().geotransform[5], -30.0);
    }

    #[test]
    fn upsample_repeats_pixels() {
        let geo = GeoReference::new([0.0, 10.0, 0.0, 20.0, 0.0, -10.0], "");
        let img = Image::single("v", ndarray::array![[1.0, 2.0], [3.0, 4.0]], geo);
        let out = resample_to_scale(&img, 5.0).unwrap();
        assert_eq!(out.shape(), (4, 4));
        let d = &out.first_band().unwrap().data;
        assert_eq!(d[[0, 1]], 1.0);
        assert_eq!(d[[3, 2]], 4.0);
    }

    #[test]
    fn same_scale_is_identity() {
        let geo = GeoReference::new([0.0, 10.0, 0.0, 0.0, 0.0, -10.0], "");
        let img = Image::single("v", Array2::zeros((3, 3)), geo);
        assert_eq!(resample_to_scale(&img, 10.0).unwrap(), img);
    }

    #[test]
    fn snapped_grid_aligns_to_pixel_multiples() {
        let geo = GeoReference::new([1.0, 3.0, 0.0, 29.0, 0.0, -3.0], "EPSG:32634");
        let (grid, shape) = snapped_grid(&geo, [4.0, 5.0, 13.0, 20.0]).unwrap();
        assert_eq!(grid.geotransform, [3.0, 3.0, 0.0, 21.0, 0.0, -3.0]);
        assert_eq!(shape, (6, 4));
        assert_eq!(grid.projection, "EPSG:32634");

        // bounds already on the lattice are kept as they are
        let (_, exact) = snapped_grid(&geo, [0.0, 0.0, 27.0, 27.0]).unwrap();
        assert_eq!(exact, (9, 9));
    }

    #[test]
    fn offset_scenes_warp_onto_one_grid() {
        let aoi = [0.0, 0.0, 12.0, 6.0];
        // second scene starts one pixel further east
        let a = Image::single(
            "v",
            Array2::from_shape_fn((2, 4), |(r, c)| (r * 4 + c) as f64),
            GeoReference::new([0.0, 3.0, 0.0, 6.0, 0.0, -3.0], ""),
        );
        let b = Image::single(
            "v",
            Array2::from_shape_fn((2, 4), |(r, c)| (10 + r * 4 + c) as f64),
            GeoReference::new([3.0, 3.0, 0.0, 6.0, 0.0, -3.0], ""),
        );
        let wa = warp_to_bounds(&a, aoi).unwrap();
        let wb = warp_to_bounds(&b, aoi).unwrap();
        assert_eq!(wa, a);
        assert_eq!(wa.georef(), wb.georef());
        let d = &wb.first_band().unwrap().data;
        assert!(d[[0, 0]].is_nan());
        assert_eq!(d[[0, 1]], 10.0);
        assert_eq!(d[[1, 3]], 16.0);

        let mean = crate::core::processing::composite::mean_composite(&[wa, wb], "pre").unwrap();
        assert_eq!(mean.first_band().unwrap().data[[0, 0]], 0.0);
        assert_eq!(mean.first_band().unwrap().data[[0, 1]], 5.5);
    }

    #[test]
    fn warp_refuses_another_projection() {
        let img = Image::single(
            "v",
            Array2::zeros((2, 2)),
            GeoReference::new([0.0, 1.0, 0.0, 2.0, 0.0, -1.0], "EPSG:32634"),
        );
        let target = GeoReference::new([0.0, 1.0, 0.0, 2.0, 0.0, -1.0], "EPSG:32635");
        assert!(matches!(
            warp_to_grid(&img, &target, (2, 2)),
            Err(Error::GridMismatch { .. })
        ));
    }
}
