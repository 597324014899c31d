//! High-level, ergonomic library API: run a full change analysis from a
//! config (files in, exports out), analyze in-memory image collections, and
//! post-process exported difference rasters. Prefer these entrypoints over
//! the low-level processing modules when integrating texchange.
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::core::aoi::AreaOfInterest;
use crate::core::graph::{Backend, LocalBackend, SceneLoader, SceneRef};
use crate::core::params::{AnalysisParams, ExportParams, InputSpec, SensorProfile};
use crate::core::post::accuracy::{AccuracyReport, assess, write_reports_csv};
use crate::core::post::cleaning::remove_isolated;
use crate::core::post::damage::{CampDamage, Footprint, damage_per_camp, damaged_buildings};
use crate::core::post::gridding::{GridCell, fishnet, select_random};
use crate::core::post::normalize::{min_max, value_range};
use crate::core::post::threshold::binarize;
use crate::core::processing::histogram::{Histogram, HistogramChart, HistogramStats, compute_stats};
use crate::core::processing::pipeline::{
    AnalysisPlan, CollectionInput, NDVI_BAND, NDWI_BAND, build_plan,
};
use crate::core::processing::render::{RgbRaster, render_palette, render_rgb};
use crate::core::processing::resample::resample_to_scale;
use crate::core::raster::Image;
use crate::error::{Error, Result};
use crate::io::catalog::SceneCatalog;
use crate::io::gdal::{GdalImageReader, GdalSceneLoader, ensure_projected_crs};
use crate::io::vector::{damaged_feature_collection, ensure_same_crs, read_footprints};
use crate::io::writers::metadata::{ProductMetadata, embed_tiff_metadata, write_json};
use crate::io::writers::tiff::write_float_tiff;
use crate::io::writers::{ExportTarget, LocalExport};
use crate::types::TextureStatistic;

/// Pre, post and difference rasters of one texture statistic.
#[derive(Debug, Clone)]
pub struct TextureMetric {
    pub statistic: TextureStatistic,
    pub pre: Image,
    pub post: Image,
    pub difference: Image,
}

/// Every raster product of an analysis, clipped to the AOI at native resolution.
#[derive(Debug, Clone)]
pub struct AnalysisOutput {
    pub pre_display: Image,
    pub post_display: Image,
    pub pre_processed: Image,
    pub post_processed: Image,
    pub metrics: Vec<TextureMetric>,
}

impl AnalysisOutput {
    pub fn metric(&self, statistic: TextureStatistic) -> Option<&TextureMetric> {
        self.metrics.iter().find(|m| m.statistic == statistic)
    }
}

/// Loader for graphs built purely from in-memory images.
struct NoScenes;

impl SceneLoader for NoScenes {
    fn load(&self, scene: &SceneRef) -> Result<Image> {
        Err(Error::Processing(format!(
            "scene {} requested from an in-memory analysis",
            scene.id
        )))
    }
}

/// Evaluate every product node of `plan` with `backend`.
pub fn evaluate_plan<B: Backend>(plan: &AnalysisPlan, backend: &B) -> Result<AnalysisOutput> {
    let mut targets = vec![
        plan.pre_display,
        plan.post_display,
        plan.pre_processed,
        plan.post_processed,
    ];
    for m in &plan.metrics {
        targets.extend([m.pre, m.post, m.difference]);
    }
    let mut images = backend.evaluate(&plan.graph, &targets)?.into_iter();
    let mut next = || {
        images
            .next()
            .ok_or_else(|| Error::Processing("backend returned too few images".to_string()))
    };
    let pre_display = next()?;
    let post_display = next()?;
    let pre_processed = next()?;
    let post_processed = next()?;
    let mut metrics = Vec::with_capacity(plan.metrics.len());
    for m in &plan.metrics {
        metrics.push(TextureMetric {
            statistic: m.statistic,
            pre: next()?,
            post: next()?,
            difference: next()?,
        });
    }
    Ok(AnalysisOutput {
        pre_display,
        post_display,
        pre_processed,
        post_processed,
        metrics,
    })
}

/// Run the analysis on in-memory collections (no disk I/O).
pub fn analyze_images(
    pre: Vec<Image>,
    post: Vec<Image>,
    aoi: &AreaOfInterest,
    profile: &SensorProfile,
) -> Result<AnalysisOutput> {
    let plan = build_plan(
        profile,
        aoi,
        CollectionInput::Images(pre),
        CollectionInput::Images(post),
    )?;
    evaluate_plan(&plan, &LocalBackend::new(NoScenes))
}

/// Scenes of one collection: explicit captures or a catalog query.
pub fn resolve_input(spec: &InputSpec, aoi: &AreaOfInterest) -> Result<Vec<SceneRef>> {
    match spec {
        InputSpec::Captures { paths } => Ok(paths.iter().map(SceneRef::from_path).collect()),
        InputSpec::Archive {
            catalog,
            start,
            end,
        } => SceneCatalog::load(catalog)?.query(*start, *end, aoi),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub description: String,
    pub kind: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSummary {
    pub statistic: TextureStatistic,
    pub description: String,
    /// Difference statistics over the AOI at native resolution
    pub stats: Option<HistogramStats>,
    pub chart: Option<HistogramChart>,
}

/// Manifest of one run, also written as `run_manifest.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub sensor: String,
    pub started: DateTime<Utc>,
    pub finished: DateTime<Utc>,
    pub profile: SensorProfile,
    pub pre_scenes: Vec<SceneRef>,
    pub post_scenes: Vec<SceneRef>,
    pub products: Vec<ProductRecord>,
    pub metrics: Vec<MetricSummary>,
}

fn export_image<T: ExportTarget>(
    target: &T,
    profile: &SensorProfile,
    image: &Image,
    description: &str,
    product: &str,
    items: &[(&str, String)],
    records: &mut Vec<ProductRecord>,
) -> Result<()> {
    let resampled = resample_to_scale(image, profile.export_scale)?;
    let meta = items.iter().fold(
        ProductMetadata::new(
            description,
            &profile.sensor.to_string(),
            product,
            resampled.band_names().iter().map(|s| s.to_string()).collect(),
            resampled.georef(),
        ),
        |meta, (key, value)| meta.with_item(key, value),
    );
    let path = target.export_raster(&resampled, &meta)?;
    records.push(ProductRecord {
        description: description.to_string(),
        kind: "geotiff".to_string(),
        path,
    });
    Ok(())
}

/// JPEG dimensions are 16-bit; larger previews are skipped with a warning.
fn export_preview<T: ExportTarget>(
    target: &T,
    profile: &SensorProfile,
    rgb: &RgbRaster,
    image: &Image,
    description: &str,
    records: &mut Vec<ProductRecord>,
) -> Result<()> {
    let limit = u16::MAX as usize;
    if rgb.cols > limit || rgb.rows > limit {
        warn!(
            "Preview {} is {}x{} pixels, above the JPEG limit of {}; skipped",
            description, rgb.cols, rgb.rows, limit
        );
        return Ok(());
    }
    let meta = ProductMetadata::new(
        description,
        &profile.sensor.to_string(),
        "preview",
        image.band_names().iter().map(|s| s.to_string()).collect(),
        image.georef(),
    );
    let path = target.export_preview(rgb, &meta)?;
    records.push(ProductRecord {
        description: description.to_string(),
        kind: "preview".to_string(),
        path,
    });
    Ok(())
}

/// Histogram of a difference raster resampled to the histogram scale.
pub fn difference_histogram(
    profile: &SensorProfile,
    statistic: TextureStatistic,
    difference: &Image,
) -> Result<HistogramChart> {
    let spec = profile.histogram_spec(statistic);
    let sampled = resample_to_scale(difference, profile.histogram_scale)?;
    let histogram = Histogram::compute(
        &sampled.first_band()?.data,
        profile.max_buckets,
        spec.threshold,
    )?;
    Ok(HistogramChart::new(
        &spec.title,
        &spec.x_axis_title,
        &spec.color,
        histogram,
    ))
}

/// Export every product of `output` to `target` and describe them.
pub fn export_products<T: ExportTarget>(
    output: &AnalysisOutput,
    profile: &SensorProfile,
    target: &T,
    options: &ExportParams,
) -> Result<(Vec<ProductRecord>, Vec<MetricSummary>)> {
    ensure_projected_crs(&output.pre_processed.georef().projection)?;
    let mut records = Vec::new();
    let names = &profile.names;

    if let Some(name) = &names.pre_composite {
        export_image(target, profile, &output.pre_display, name, "composite", &[], &mut records)?;
    }
    if let Some(name) = &names.post_composite {
        export_image(target, profile, &output.post_display, name, "composite", &[], &mut records)?;
    }
    if let Some(name) = &names.pre_processed {
        export_image(target, profile, &output.pre_processed, name, "processed", &[], &mut records)?;
    }
    if let Some(name) = &names.post_processed {
        export_image(target, profile, &output.post_processed, name, "processed", &[], &mut records)?;
    }

    // previews are rendered at the export scale
    if options.previews {
        for (image, description) in [
            (&output.pre_display, "pre_event_rgb"),
            (&output.post_display, "post_event_rgb"),
        ] {
            let sampled = resample_to_scale(image, profile.export_scale)?;
            let rgb = render_rgb(&sampled, &profile.rgb_style)?;
            export_preview(target, profile, &rgb, &sampled, description, &mut records)?;
        }
        if profile.index_layers {
            for (image, side) in [
                (&output.pre_processed, "pre_event"),
                (&output.post_processed, "post_event"),
            ] {
                let sampled = resample_to_scale(image, profile.export_scale)?;
                for (band, style) in [
                    (NDVI_BAND, &profile.ndvi_style),
                    (NDWI_BAND, &profile.ndwi_style),
                ] {
                    let rgb = render_palette(&sampled.band(band)?.data, style);
                    let description = format!("{side}_{}", band.to_ascii_lowercase());
                    export_preview(target, profile, &rgb, &sampled, &description, &mut records)?;
                }
            }
        }
    }

    let mut summaries = Vec::with_capacity(output.metrics.len());
    for metric in &output.metrics {
        let description = names.difference(metric.statistic);
        export_image(
            target,
            profile,
            &metric.difference,
            &description,
            "difference",
            &[("statistic", metric.statistic.to_string())],
            &mut records,
        )?;
        let band = metric.difference.first_band()?;
        if options.previews {
            let sampled = resample_to_scale(&metric.difference, profile.export_scale)?;
            let rgb = render_palette(
                &sampled.first_band()?.data,
                &profile.difference_style(metric.statistic),
            );
            export_preview(
                target,
                profile,
                &rgb,
                &sampled,
                &format!("{description}_preview"),
                &mut records,
            )?;
        }

        let stats = compute_stats(&band.data);
        let chart = if options.histograms && stats.is_some() {
            let chart = difference_histogram(profile, metric.statistic, &metric.difference)?;
            let json = serde_json::to_string_pretty(&chart)?;
            let path = target.export_text(&format!("{description}_histogram.json"), &json)?;
            records.push(ProductRecord {
                description: format!("{description}_histogram"),
                kind: "histogram".to_string(),
                path,
            });
            let path = target.export_text(&format!("{description}_histogram.svg"), &chart.to_svg())?;
            records.push(ProductRecord {
                description: format!("{description}_histogram"),
                kind: "chart".to_string(),
                path,
            });
            Some(chart)
        } else {
            if stats.is_none() {
                warn!("{} has no valid pixels; histogram skipped", description);
            }
            None
        };
        summaries.push(MetricSummary {
            statistic: metric.statistic,
            description,
            stats,
            chart,
        });
    }
    Ok((records, summaries))
}

/// Resolve inputs, evaluate the analysis graph from files and export all
/// products to `<export.dir>/<export.folder>`.
pub fn run_analysis(params: &AnalysisParams) -> Result<RunReport> {
    let started = Utc::now();
    let profile = params.profile()?;
    params.aoi.validate()?;

    let pre_scenes = resolve_input(&params.pre, &params.aoi)?;
    let post_scenes = resolve_input(&params.post, &params.aoi)?;
    info!(
        "{} run: {} pre-event and {} post-event scenes",
        profile.sensor,
        pre_scenes.len(),
        post_scenes.len()
    );

    let plan = build_plan(
        &profile,
        &params.aoi,
        CollectionInput::Scenes(pre_scenes.clone()),
        CollectionInput::Scenes(post_scenes.clone()),
    )?;
    let backend = LocalBackend::new(GdalSceneLoader::new(
        profile.file_bands.clone(),
        profile.required_bands(),
    ));
    let output = evaluate_plan(&plan, &backend)?;

    let target = LocalExport::new(&params.export.dir, &params.export.folder);
    let (mut products, metrics) = export_products(&output, &profile, &target, &params.export)?;

    let mut report = RunReport {
        sensor: profile.sensor.to_string(),
        started,
        finished: Utc::now(),
        profile,
        pre_scenes,
        post_scenes,
        products: Vec::new(),
        metrics,
    };
    let manifest_path = target.dir().join("run_manifest.json");
    products.push(ProductRecord {
        description: "run_manifest".to_string(),
        kind: "manifest".to_string(),
        path: manifest_path,
    });
    report.products = products;
    target.export_text("run_manifest.json", &serde_json::to_string_pretty(&report)?)?;
    info!("Run finished with {} products", report.products.len());
    Ok(report)
}

/// First band of a raster file as a single-band image.
pub fn read_single_band(path: &Path) -> Result<Image> {
    let reader = GdalImageReader::open(path)?;
    let image = reader.read_image(&[])?;
    let band = image.first_band()?.clone();
    Ok(Image::single(band.name, band.data, image.georef().clone()))
}

/// Write a single-band product to an explicit path as Float32 GeoTIFF.
pub fn write_raster_file(path: &Path, image: &Image, product: &str) -> Result<()> {
    let description = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| product.to_string());
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let meta = ProductMetadata::new(
        &description,
        "",
        product,
        image.band_names().iter().map(|s| s.to_string()).collect(),
        image.georef(),
    );
    let mut ds = write_float_tiff(path, image).map_err(|e| Error::export(&description, e))?;
    embed_tiff_metadata(&mut ds, image.georef(), &meta).map_err(|e| Error::export(&description, e))?;
    info!("Wrote {}", path.display());
    Ok(())
}

/// Clip (optionally) and min-max normalize a raster. Returns the input range.
pub fn normalize_raster_file(input: &Path, output: &Path, aoi: Option<&AreaOfInterest>) -> Result<(f64, f64)> {
    let mut image = read_single_band(input)?;
    if let Some(aoi) = aoi {
        image = aoi.clip(&image)?;
    }
    let band = image.first_band()?;
    let range = value_range(&band.data).ok_or_else(|| Error::EmptyCollection {
        label: format!("{} has no valid pixels", input.display()),
    })?;
    let normalized = Image::single(band.name.clone(), min_max(&band.data)?, image.georef().clone());
    write_raster_file(output, &normalized, "normalized")?;
    Ok(range)
}

/// Binarize a raster at `threshold`. Returns the number of changed (1) pixels.
pub fn threshold_raster_file(input: &Path, output: &Path, threshold: f64) -> Result<usize> {
    let image = read_single_band(input)?;
    let band = image.first_band()?;
    let binary = binarize(&band.data, threshold);
    let changed = binary.iter().filter(|&&v| v == 1.0).count();
    write_raster_file(
        output,
        &Image::single(band.name.clone(), binary, image.georef().clone()),
        "binary",
    )?;
    Ok(changed)
}

/// Remove isolated pixels of `value`. Returns the number of pixels removed.
pub fn clean_raster_file(input: &Path, output: &Path, value: f64) -> Result<usize> {
    let image = read_single_band(input)?;
    let band = image.first_band()?;
    let (cleaned, removed) = remove_isolated(&band.data, value);
    write_raster_file(
        output,
        &Image::single(band.name.clone(), cleaned, image.georef().clone()),
        "cleaned",
    )?;
    Ok(removed)
}

/// Fishnet over the AOI, randomly subsampled, written as JSON.
pub fn generate_grid(
    aoi: &AreaOfInterest,
    cell_size: f64,
    count: usize,
    seed: Option<u64>,
    output: &Path,
) -> Result<Vec<GridCell>> {
    let cells = select_random(fishnet(aoi, cell_size)?, count, seed);
    write_json(output, &cells).map_err(|e| Error::export(&output.display().to_string(), e))?;
    info!("Wrote {} grid cells to {}", cells.len(), output.display());
    Ok(cells)
}

pub fn load_grid(path: &Path) -> Result<Vec<GridCell>> {
    Ok(serde_json::from_str(&std::fs::read_to_string(path)?)?)
}

/// Assess each (raster, model name) against the labelled grid and write the
/// results as CSV and, optionally, JSON.
pub fn assess_accuracy(
    grid: &Path,
    rasters: &[(PathBuf, String)],
    csv_output: &Path,
    json_output: Option<&Path>,
) -> Result<Vec<AccuracyReport>> {
    let cells = load_grid(grid)?;
    let mut reports = Vec::with_capacity(rasters.len());
    for (path, model) in rasters {
        let image = read_single_band(path)?;
        reports.push(assess(model, &cells, &image.first_band()?.data, image.georef())?);
    }
    write_reports_csv(std::fs::File::create(csv_output)?, &reports)?;
    info!("Wrote {} accuracy rows to {}", reports.len(), csv_output.display());
    if let Some(json) = json_output {
        write_json(json, &reports).map_err(|e| Error::export(&json.display().to_string(), e))?;
    }
    Ok(reports)
}

/// Outcome of a building damage assessment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DamageSummary {
    pub buildings: usize,
    pub damaged: Vec<Footprint>,
    pub camps: Vec<CampDamage>,
}

/// Mark buildings overlapped by change pixels (value 1) of a binary raster
/// and count them per camp. Writes the per-camp CSV and, optionally, the
/// damaged footprints as GeoJSON.
pub fn assess_damage(
    raster: &Path,
    buildings: &Path,
    camps: &Path,
    camp_field: &str,
    csv_output: &Path,
    footprints_output: Option<&Path>,
) -> Result<DamageSummary> {
    let image = read_single_band(raster)?;
    let projection = &image.georef().projection;
    let (building_features, building_srs) = read_footprints(buildings, None)?;
    ensure_same_crs(projection, building_srs.as_ref(), "buildings")?;
    let (camp_features, camp_srs) = read_footprints(camps, Some(camp_field))?;
    ensure_same_crs(projection, camp_srs.as_ref(), "camps")?;

    let damaged = damaged_buildings(&building_features, &image.first_band()?.data, image.georef(), 1.0)?;
    let per_camp = damage_per_camp(&damaged, &camp_features);

    let mut wtr = csv::Writer::from_path(csv_output)?;
    for row in &per_camp {
        wtr.serialize(row)?;
    }
    wtr.flush()?;
    info!("Wrote damage counts for {} camps to {}", per_camp.len(), csv_output.display());

    if let Some(path) = footprints_output {
        write_json(path, &damaged_feature_collection(&damaged))
            .map_err(|e| Error::export(&path.display().to_string(), e))?;
        info!("Wrote {} damaged footprints to {}", damaged.len(), path.display());
    }
    Ok(DamageSummary {
        buildings: building_features.len(),
        damaged: damaged.into_iter().cloned().collect(),
        camps: per_camp,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::raster::{Band, GeoReference};
    use crate::io::writers::metadata::ProductMetadata;
    use crate::types::Sensor;
    use ndarray::Array2;
    use std::cell::RefCell;

    /// Records what would be written without touching the filesystem.
    #[derive(Default)]
    struct RecordingTarget {
        written: RefCell<Vec<String>>,
        previews: RefCell<Vec<(String, usize, usize)>>,
    }

    impl ExportTarget for RecordingTarget {
        fn export_raster(&self, _image: &Image, meta: &ProductMetadata) -> Result<PathBuf> {
            self.written.borrow_mut().push(meta.description.clone());
            Ok(PathBuf::from(format!("{}.tif", meta.description)))
        }

        fn export_preview(&self, rgb: &RgbRaster, meta: &ProductMetadata) -> Result<PathBuf> {
            self.written.borrow_mut().push(meta.description.clone());
            self.previews
                .borrow_mut()
                .push((meta.description.clone(), rgb.cols, rgb.rows));
            Ok(PathBuf::from(format!("{}.jpg", meta.description)))
        }

        fn export_text(&self, file_name: &str, _contents: &str) -> Result<PathBuf> {
            self.written.borrow_mut().push(file_name.to_string());
            Ok(PathBuf::from(file_name))
        }
    }

    fn planet_output(projection: &str) -> AnalysisOutput {
        let profile = SensorProfile::preset(Sensor::PlanetScope);
        let georef = GeoReference::new([0.0, 3.0, 0.0, 24.0, 0.0, -3.0], projection);
        let scene = |value: f64| {
            let bands = ["b1", "b2", "b3", "b4"]
                .iter()
                .map(|name| Band::new(*name, Array2::from_elem((8, 8), value)))
                .collect();
            Image::from_bands(bands, georef.clone()).unwrap()
        };
        let aoi = AreaOfInterest::from_bounds(0.0, 0.0, 24.0, 24.0).unwrap();
        analyze_images(vec![scene(500.0)], vec![scene(700.0)], &aoi, &profile).unwrap()
    }

    #[test]
    fn previews_wider_than_a_jpeg_are_skipped() {
        let target = RecordingTarget::default();
        let profile = SensorProfile::preset(Sensor::Sentinel2);
        let image = Image::single("v", Array2::zeros((1, 2)), GeoReference::default());
        let rgb = RgbRaster {
            cols: 70_000,
            rows: 1,
            data: vec![0; 70_000 * 3],
        };
        let mut records = Vec::new();
        export_preview(&target, &profile, &rgb, &image, "wide", &mut records).unwrap();
        assert!(records.is_empty());
        assert!(target.written.borrow().is_empty());
    }

    #[test]
    fn previews_are_rendered_at_the_export_scale() {
        let output = planet_output("EPSG:32634");
        let mut profile = SensorProfile::preset(Sensor::PlanetScope);
        profile.export_scale = 6.0;
        let target = RecordingTarget::default();
        let options = ExportParams {
            histograms: false,
            ..ExportParams::default()
        };
        let (records, _) = export_products(&output, &profile, &target, &options).unwrap();
        let previews = target.previews.borrow();
        assert!(previews.iter().any(|(d, _, _)| d == "pre_event_rgb"));
        assert!(previews.iter().all(|(_, cols, rows)| (*cols, *rows) == (4, 4)));
        assert_eq!(
            records.iter().filter(|r| r.kind == "preview").count(),
            previews.len()
        );
    }

    #[test]
    fn degree_based_imagery_is_not_exported() {
        let output = planet_output("EPSG:4326");
        let profile = SensorProfile::preset(Sensor::PlanetScope);
        let target = RecordingTarget::default();
        let err = export_products(&output, &profile, &target, &ExportParams::default()).unwrap_err();
        assert!(matches!(err, Error::GeographicCrs { .. }));
        assert!(target.written.borrow().is_empty());
    }
}
