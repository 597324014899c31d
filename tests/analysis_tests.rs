//! End-to-end analysis on small in-memory collections with hand-computable
//! texture values.

use ndarray::Array2;
use texchange::core::raster::{Band, GeoReference, Image};
use texchange::{
    AreaOfInterest, Error, Sensor, SensorProfile, TextureStatistic, analyze_images,
};

// ============================================================================
// Helpers
// ============================================================================

/// 156.25 / 10000 * 64 == 1, so this reflectance quantizes to gray level 1.
const LEVEL_ONE: f64 = 156.25;

fn planet_scene(data: &Array2<f64>) -> Image {
    let bands = ["b1", "b2", "b3", "b4"]
        .iter()
        .map(|name| Band::new(*name, data.clone()))
        .collect();
    Image::from_bands(bands, GeoReference::default()).unwrap()
}

/// Alternating columns of level 1, 0, 1.
fn striped() -> Array2<f64> {
    Array2::from_shape_fn((3, 3), |(_, c)| if c % 2 == 0 { LEVEL_ONE } else { 0.0 })
}

fn uniform() -> Array2<f64> {
    Array2::from_elem((3, 3), LEVEL_ONE)
}

fn unit_aoi() -> AreaOfInterest {
    AreaOfInterest::from_bounds(0.0, -3.0, 3.0, 0.0).unwrap()
}

fn centre(image: &Image) -> f64 {
    image.first_band().unwrap().data[[1, 1]]
}

// ============================================================================
// PlanetScope
// ============================================================================

#[test]
fn hand_computed_homogeneity_difference() {
    let profile = SensorProfile::preset(Sensor::PlanetScope);
    let output = analyze_images(
        vec![planet_scene(&striped())],
        vec![planet_scene(&uniform())],
        &unit_aoi(),
        &profile,
    )
    .unwrap();

    // Centre window of the stripes: horizontal and both diagonal offsets pair
    // levels 1 and 0 (IDM 0.5), vertical pairs are equal (IDM 1).
    let hom = output.metric(TextureStatistic::Homogeneity).unwrap();
    assert!((centre(&hom.pre) - 0.625).abs() < 1e-12);
    assert!((centre(&hom.post) - 1.0).abs() < 1e-12);
    assert!((centre(&hom.difference) - 0.375).abs() < 1e-12);
    assert_eq!(
        hom.difference.band_names(),
        vec![TextureStatistic::Homogeneity.combined_band_name()]
    );

    let diss = output.metric(TextureStatistic::Dissimilarity).unwrap();
    assert!((centre(&diss.difference) - 0.75).abs() < 1e-12);

    let contrast = output.metric(TextureStatistic::Contrast).unwrap();
    assert!((centre(&contrast.difference) - 0.75).abs() < 1e-12);
}

#[test]
fn difference_is_symmetric_and_zero_for_identical_epochs() {
    let profile = SensorProfile::preset(Sensor::PlanetScope);
    let forward = analyze_images(
        vec![planet_scene(&striped())],
        vec![planet_scene(&uniform())],
        &unit_aoi(),
        &profile,
    )
    .unwrap();
    let backward = analyze_images(
        vec![planet_scene(&uniform())],
        vec![planet_scene(&striped())],
        &unit_aoi(),
        &profile,
    )
    .unwrap();
    for (f, b) in forward.metrics.iter().zip(&backward.metrics) {
        assert_eq!(f.difference.first_band().unwrap().data, b.difference.first_band().unwrap().data);
    }

    let same = analyze_images(
        vec![planet_scene(&striped())],
        vec![planet_scene(&striped())],
        &unit_aoi(),
        &profile,
    )
    .unwrap();
    for metric in &same.metrics {
        assert!(metric.difference.first_band().unwrap().valid_values().all(|v| v == 0.0));
    }
}

#[test]
fn vegetated_pixels_are_excluded_from_texture() {
    let profile = SensorProfile::preset(Sensor::PlanetScope);
    let mut scene = planet_scene(&uniform());
    // NDVI = (3000 - 500) / 3500 > 0.25 in the top-left pixel
    let (mut bands, georef) = scene.into_bands();
    bands[3].data[[0, 0]] = 3000.0;
    bands[2].data[[0, 0]] = 500.0;
    scene = Image::from_bands(bands, georef).unwrap();

    let output = analyze_images(
        vec![scene.clone()],
        vec![scene],
        &unit_aoi(),
        &profile,
    )
    .unwrap();
    assert!(output.pre_processed.band("b4").unwrap().data[[0, 0]].is_nan());
    let hom = output.metric(TextureStatistic::Homogeneity).unwrap();
    assert!(hom.difference.first_band().unwrap().data[[0, 0]].is_nan());
    assert_eq!(hom.difference.first_band().unwrap().data[[2, 2]], 0.0);
    // display composites are never masked
    assert_eq!(output.pre_display.band("b3").unwrap().data[[0, 0]], 500.0);
}

#[test]
fn mean_composite_averages_the_collection() {
    let profile = SensorProfile::preset(Sensor::PlanetScope);
    let low = planet_scene(&Array2::from_elem((3, 3), 100.0));
    let high = planet_scene(&Array2::from_elem((3, 3), 300.0));
    let output = analyze_images(vec![low, high], vec![planet_scene(&uniform())], &unit_aoi(), &profile).unwrap();
    assert_eq!(output.pre_display.band("b1").unwrap().data[[1, 1]], 200.0);
    assert!((output.pre_processed.band("b1").unwrap().data[[1, 1]] - 0.02).abs() < 1e-12);
}

#[test]
fn empty_collection_is_fatal() {
    let profile = SensorProfile::preset(Sensor::PlanetScope);
    let err = analyze_images(vec![], vec![planet_scene(&uniform())], &unit_aoi(), &profile).unwrap_err();
    assert!(matches!(err, Error::EmptyCollection { .. }));
}

// ============================================================================
// Sentinel-2
// ============================================================================

fn s2_scene(reflectance: f64, scl: Array2<f64>) -> Image {
    let mut bands: Vec<Band> = ["B2", "B3", "B4", "B8"]
        .iter()
        .map(|name| Band::new(*name, Array2::from_elem((3, 3), reflectance)))
        .collect();
    bands.push(Band::new("SCL", scl));
    Image::from_bands(bands, GeoReference::default()).unwrap()
}

#[test]
fn sentinel2_masks_clouds_and_adds_index_bands() {
    let profile = SensorProfile::preset(Sensor::Sentinel2);
    let mut scl = Array2::from_elem((3, 3), 4.0);
    scl[[0, 0]] = 9.0;
    let output = analyze_images(
        vec![s2_scene(800.0, scl)],
        vec![s2_scene(800.0, Array2::from_elem((3, 3), 5.0))],
        &unit_aoi(),
        &profile,
    )
    .unwrap();

    let pre = &output.pre_processed;
    assert!(pre.band("B4").unwrap().data[[0, 0]].is_nan());
    assert!((pre.band("B4").unwrap().data[[1, 1]] - 0.08).abs() < 1e-12);
    // SCL is carried unscaled
    assert_eq!(pre.band("SCL").unwrap().data[[1, 1]], 4.0);
    assert_eq!(pre.band("NDVI").unwrap().data[[1, 1]], 0.0);
    assert_eq!(pre.band("NDWI").unwrap().data[[1, 1]], 0.0);

    let statistics: Vec<_> = output.metrics.iter().map(|m| m.statistic).collect();
    assert_eq!(
        statistics,
        vec![TextureStatistic::Homogeneity, TextureStatistic::Dissimilarity]
    );
    let hom = output.metric(TextureStatistic::Homogeneity).unwrap();
    assert!(hom.difference.first_band().unwrap().data[[0, 0]].is_nan());
    assert_eq!(hom.difference.first_band().unwrap().data[[1, 1]], 0.0);
}

#[test]
fn sentinel2_mosaic_keeps_the_latest_scene_on_top() {
    let profile = SensorProfile::preset(Sensor::Sentinel2);
    let clear = || Array2::from_elem((3, 3), 4.0);
    let output = analyze_images(
        vec![s2_scene(500.0, clear()), s2_scene(700.0, clear())],
        vec![s2_scene(500.0, clear())],
        &unit_aoi(),
        &profile,
    )
    .unwrap();
    assert_eq!(output.pre_display.band("B4").unwrap().data[[1, 1]], 700.0);
}
