#![doc = r#"
texchange — GLCM texture change detection for PlanetScope and Sentinel-2.

This crate composites pre-event and post-event optical imagery over an area of
interest, masks vegetation (and clouds, for Sentinel-2), computes GLCM texture
statistics (homogeneity, dissimilarity, contrast) per band, averages them across
bands and differences the two epochs. Difference maps are exported as GeoTIFFs
with JPEG previews and histograms, and can be post-processed into binary change
maps that are validated against a labelled grid.

Stability
---------
The public library API is experimental in initial releases and may evolve.
Breaking changes can occur.

Requirements
------------
- GDAL development headers and runtime available on your system.
- Rust 2024 edition toolchain.

Quick start: run an analysis from a config file
-----------------------------------------------
```rust,no_run
use std::path::Path;
use texchange::{AnalysisParams, run_analysis};

fn main() -> texchange::Result<()> {
    let params = AnalysisParams::from_json_file(Path::new("configs/planetscope.json"))?;
    let report = run_analysis(&params)?;
    for product in &report.products {
        println!("{} -> {}", product.description, product.path.display());
    }
    Ok(())
}
```

Analyze in-memory images
------------------------
```rust
use ndarray::Array2;
use texchange::core::raster::{Band, GeoReference, Image};
use texchange::{AreaOfInterest, Sensor, SensorProfile, TextureStatistic, analyze_images};

fn scene(value: f64) -> Image {
    let bands = ["b1", "b2", "b3", "b4"]
        .iter()
        .map(|n| Band::new(*n, Array2::from_elem((8, 8), value)))
        .collect();
    Image::from_bands(bands, GeoReference::default()).unwrap()
}

let profile = SensorProfile::preset(Sensor::PlanetScope);
let aoi = AreaOfInterest::from_bounds(0.0, -8.0, 8.0, 0.0).unwrap();
let output = analyze_images(vec![scene(500.0)], vec![scene(500.0)], &aoi, &profile).unwrap();
let hom = output.metric(TextureStatistic::Homogeneity).unwrap();
assert!(hom.difference.first_band().unwrap().valid_values().all(|v| v == 0.0));
```

Post-processing
---------------
```rust,no_run
use std::path::{Path, PathBuf};
use texchange::api::{assess_accuracy, clean_raster_file, normalize_raster_file, threshold_raster_file};

fn main() -> texchange::Result<()> {
    normalize_raster_file(Path::new("hom_diff.tif"), Path::new("hom_norm.tif"), None)?;
    threshold_raster_file(Path::new("hom_norm.tif"), Path::new("hom_bin.tif"), 0.2)?;
    clean_raster_file(Path::new("hom_bin.tif"), Path::new("hom_clean.tif"), 1.0)?;
    let reports = assess_accuracy(
        Path::new("grid.json"),
        &[(PathBuf::from("hom_clean.tif"), "Homogeneity".to_string())],
        Path::new("accuracy.csv"),
        None,
    )?;
    println!("kappa = {:?}", reports[0].kappa);
    Ok(())
}
```

Error handling
--------------
All public functions return `texchange::Result<T>`; match on `texchange::Error` to handle
specific cases, e.g. empty collections or missing bands.

```rust,no_run
use std::path::Path;
use texchange::{AnalysisParams, Error, run_analysis};

fn main() {
    let params = match AnalysisParams::from_json_file(Path::new("run.json")) {
        Ok(p) => p,
        Err(e) => return eprintln!("bad config: {e}"),
    };
    match run_analysis(&params) {
        Ok(_) => {}
        Err(Error::EmptyCollection { label }) => eprintln!("nothing to composite: {label}"),
        Err(Error::MissingBand { band, .. }) => eprintln!("band {band} not in inputs"),
        Err(other) => eprintln!("Other error: {other}"),
    }
}
```

Useful modules
--------------
- [`api`] — high-level, ergonomic entry points.
- [`core`] — rasters, AOI, processing kernels, the lazy analysis graph and post-processing.
- [`types`] — enums and core types (e.g. `Sensor`, `TextureStatistic`, `Palette`).
- [`io`] — GDAL reader, scene catalog and writers.
- [`error`] — crate-level `Error` and `Result`.
"#]

// Core modules (public)
pub mod api;
pub mod core;
pub mod error;
pub mod io;
pub mod types;

// Curated public API surface
// Types
pub use core::aoi::AreaOfInterest;
pub use core::params::{AnalysisParams, ExportParams, InputSpec, ProfileOverrides, SensorProfile};
pub use error::{Error, Result};
pub use types::{CompositeMethod, MaskStage, Palette, Sensor, TextureStatistic};

// Graph
pub use core::graph::{Backend, Graph, LocalBackend, NodeId, Op, SceneLoader, SceneRef};

// Readers
pub use io::catalog::{CatalogEntry, SceneCatalog};
pub use io::gdal::{GdalError, GdalImageReader, GdalMetadata, GdalSceneLoader};

// Writers
pub use io::writers::{ExportTarget, LocalExport, ProductMetadata};

// High-level API re-exports
pub use api::{
    AnalysisOutput, RunReport, TextureMetric, analyze_images, evaluate_plan, export_products,
    resolve_input, run_analysis,
};
