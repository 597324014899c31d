use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use texchange::Sensor;

#[derive(Parser)]
#[command(name = "texchange", version, about = "Texture change analysis CLI")]
pub struct CliArgs {
    /// Enable debug logging (RUST_LOG overrides)
    #[arg(long, global = true, default_value_t = false)]
    pub log: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the full pre/post change analysis from a config file
    Analyze(AnalyzeArgs),
    /// Clip a difference raster to an AOI and min-max normalize it to [0, 1]
    Normalize(NormalizeArgs),
    /// Binarize a raster: values above the threshold become 1, others 0
    Threshold(ThresholdArgs),
    /// Remove isolated change pixels from a binary raster
    Clean(CleanArgs),
    /// Generate a fishnet over the AOI and randomly select validation cells
    Grid(GridArgs),
    /// Compare binary rasters with labelled grid cells
    Assess(AssessArgs),
    /// Count buildings overlapped by change pixels per camp
    Damage(DamageArgs),
}

#[derive(Args)]
pub struct AnalyzeArgs {
    /// Analysis config (JSON)
    #[arg(short, long)]
    pub config: PathBuf,

    /// Override the sensor named in the config
    #[arg(long, value_enum)]
    pub sensor: Option<Sensor>,

    /// Override the export directory
    #[arg(long)]
    pub export_dir: Option<PathBuf>,

    /// Override the export folder inside the export directory
    #[arg(long)]
    pub folder: Option<String>,

    /// Skip JPEG previews
    #[arg(long, default_value_t = false)]
    pub no_previews: bool,
}

#[derive(Args)]
pub struct NormalizeArgs {
    #[arg(short, long)]
    pub input: PathBuf,

    #[arg(short, long)]
    pub output: PathBuf,

    /// Optional AOI (GeoJSON Polygon or Feature) to clip to first
    #[arg(long)]
    pub aoi: Option<PathBuf>,
}

#[derive(Args)]
pub struct ThresholdArgs {
    #[arg(short, long)]
    pub input: PathBuf,

    #[arg(short, long)]
    pub output: PathBuf,

    #[arg(short, long)]
    pub threshold: f64,
}

#[derive(Args)]
pub struct CleanArgs {
    #[arg(short, long)]
    pub input: PathBuf,

    #[arg(short, long)]
    pub output: PathBuf,

    /// Pixel value treated as change
    #[arg(long, default_value_t = 1.0)]
    pub value: f64,
}

#[derive(Args)]
pub struct GridArgs {
    /// AOI (GeoJSON Polygon or Feature)
    #[arg(long)]
    pub aoi: PathBuf,

    /// Cell edge length in CRS units
    #[arg(long)]
    pub cell_size: f64,

    /// Number of cells to keep
    #[arg(long, default_value_t = 200)]
    pub count: usize,

    /// Seed for reproducible selection
    #[arg(long)]
    pub seed: Option<u64>,

    #[arg(short, long)]
    pub output: PathBuf,
}

#[derive(Args)]
pub struct AssessArgs {
    /// Grid JSON with `damage` labels (0 or 1)
    #[arg(long)]
    pub grid: PathBuf,

    /// Binary raster to assess, as PATH or PATH=MODEL (repeatable)
    #[arg(long = "raster", required = true)]
    pub rasters: Vec<String>,

    /// CSV report
    #[arg(long)]
    pub csv: PathBuf,

    /// Optional JSON report
    #[arg(long)]
    pub json: Option<PathBuf>,
}

#[derive(Args)]
pub struct DamageArgs {
    /// Binary change raster (1 = change)
    #[arg(short, long)]
    pub input: PathBuf,

    /// Building footprints (any OGR polygon layer)
    #[arg(long)]
    pub buildings: PathBuf,

    /// Camp outlines (any OGR polygon layer)
    #[arg(long)]
    pub camps: PathBuf,

    /// Camp attribute holding the camp name
    #[arg(long, default_value = "Name")]
    pub camp_field: String,

    /// Per-camp CSV report
    #[arg(long)]
    pub csv: PathBuf,

    /// Optional GeoJSON of the damaged footprints
    #[arg(long)]
    pub footprints: Option<PathBuf>,
}
