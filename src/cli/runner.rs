use std::path::PathBuf;

use tracing::info;
use tracing_subscriber::EnvFilter;

use texchange::api::{
    assess_accuracy, assess_damage, clean_raster_file, generate_grid, normalize_raster_file,
    run_analysis, threshold_raster_file,
};
use texchange::{AnalysisParams, AreaOfInterest};

use super::args::{
    AnalyzeArgs, AssessArgs, CleanArgs, CliArgs, Command, DamageArgs, GridArgs, NormalizeArgs,
    ThresholdArgs,
};
use super::errors::AppError;

fn init_logging(debug: bool) {
    let default = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// `PATH=MODEL`, or `PATH` with the file stem as model name.
fn parse_raster_spec(value: &str) -> Result<(PathBuf, String), AppError> {
    let (path, model) = match value.rsplit_once('=') {
        Some((path, model)) => (PathBuf::from(path), model.to_string()),
        None => {
            let path = PathBuf::from(value);
            let model = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            (path, model)
        }
    };
    if path.as_os_str().is_empty() || model.is_empty() {
        return Err(AppError::InvalidRasterSpec {
            value: value.to_string(),
        });
    }
    Ok((path, model))
}

fn analyze(args: AnalyzeArgs) -> Result<(), AppError> {
    let mut params = AnalysisParams::from_json_file(&args.config)?;
    if let Some(sensor) = args.sensor {
        params.sensor = sensor;
    }
    if let Some(dir) = args.export_dir {
        params.export.dir = dir;
    }
    if let Some(folder) = args.folder {
        params.export.folder = folder;
    }
    if args.no_previews {
        params.export.previews = false;
    }

    info!("Starting {} analysis from {:?}", params.sensor, args.config);
    let report = run_analysis(&params)?;
    for metric in &report.metrics {
        if let Some(stats) = &metric.stats {
            info!(
                "{}: min={:.4} max={:.4} mean={:.4} valid={}",
                metric.description, stats.min, stats.max, stats.mean, stats.count
            );
        }
    }
    info!("Exported {} products", report.products.len());
    Ok(())
}

fn normalize(args: NormalizeArgs) -> Result<(), AppError> {
    let aoi = args
        .aoi
        .as_deref()
        .map(AreaOfInterest::from_geojson_file)
        .transpose()?;
    let (min, max) = normalize_raster_file(&args.input, &args.output, aoi.as_ref())?;
    info!("Normalized {:?} from [{}, {}] -> {:?}", args.input, min, max, args.output);
    Ok(())
}

fn threshold(args: ThresholdArgs) -> Result<(), AppError> {
    let changed = threshold_raster_file(&args.input, &args.output, args.threshold)?;
    info!(
        "Thresholded {:?} at {}: {} change pixels -> {:?}",
        args.input, args.threshold, changed, args.output
    );
    Ok(())
}

fn clean(args: CleanArgs) -> Result<(), AppError> {
    let removed = clean_raster_file(&args.input, &args.output, args.value)?;
    info!("Removed {} isolated pixels -> {:?}", removed, args.output);
    Ok(())
}

fn grid(args: GridArgs) -> Result<(), AppError> {
    if !(args.cell_size > 0.0) {
        return Err(AppError::InvalidCellSize {
            size: args.cell_size,
        });
    }
    if args.count == 0 {
        return Err(AppError::ZeroCount);
    }
    let aoi = AreaOfInterest::from_geojson_file(&args.aoi)?;
    generate_grid(&aoi, args.cell_size, args.count, args.seed, &args.output)?;
    Ok(())
}

fn assess(args: AssessArgs) -> Result<(), AppError> {
    let rasters = args
        .rasters
        .iter()
        .map(|s| parse_raster_spec(s))
        .collect::<Result<Vec<_>, _>>()?;
    let reports = assess_accuracy(&args.grid, &rasters, &args.csv, args.json.as_deref())?;
    for r in &reports {
        info!(
            "{}: accuracy={:.3} kappa={}",
            r.model,
            r.overall_accuracy,
            r.kappa.map(|k| format!("{k:.3}")).unwrap_or_else(|| "n/a".to_string())
        );
    }
    info!("Wrote {:?}", args.csv);
    Ok(())
}

fn damage(args: DamageArgs) -> Result<(), AppError> {
    let summary = assess_damage(
        &args.input,
        &args.buildings,
        &args.camps,
        &args.camp_field,
        &args.csv,
        args.footprints.as_deref(),
    )?;
    info!(
        "{} of {} buildings damaged",
        summary.damaged.len(),
        summary.buildings
    );
    for camp in &summary.camps {
        info!("{}: {} damaged buildings", camp.camp, camp.damaged_buildings);
    }
    Ok(())
}

pub fn run(args: CliArgs) -> Result<(), Box<dyn std::error::Error>> {
    init_logging(args.log);
    match args.command {
        Command::Analyze(a) => analyze(a)?,
        Command::Normalize(a) => normalize(a)?,
        Command::Threshold(a) => threshold(a)?,
        Command::Clean(a) => clean(a)?,
        Command::Grid(a) => grid(a)?,
        Command::Assess(a) => assess(a)?,
        Command::Damage(a) => damage(a)?,
    }
    Ok(())
}
