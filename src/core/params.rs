use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::core::aoi::AreaOfInterest;
use crate::core::processing::render::{LayerStyle, RgbStyle};
use crate::core::processing::texture::GlcmParams;
use crate::error::{Error, Result};
use crate::types::{CompositeMethod, MaskStage, Palette, Sensor, TextureStatistic};

/// Histogram chart settings for one difference product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistogramSpec {
    pub statistic: TextureStatistic,
    pub title: String,
    pub x_axis_title: String,
    pub color: String,
    pub threshold: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DifferenceStyle {
    pub statistic: TextureStatistic,
    pub style: LayerStyle,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedProduct {
    pub statistic: TextureStatistic,
    pub name: String,
}

/// Export descriptions (file stems) of every raster product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportNames {
    /// Unmasked display composite (RGB bands only)
    pub pre_composite: Option<String>,
    pub post_composite: Option<String>,
    /// Masked, scaled composite with all bands and index layers
    pub pre_processed: Option<String>,
    pub post_processed: Option<String>,
    pub differences: Vec<NamedProduct>,
}

impl ExportNames {
    pub fn difference(&self, statistic: TextureStatistic) -> String {
        self.differences
            .iter()
            .find(|p| p.statistic == statistic)
            .map(|p| p.name.clone())
            .unwrap_or_else(|| format!("{}_Difference", statistic.label()))
    }
}

/// Sensor-specific calibration. Thresholds and quantization are kept per
/// sensor rather than unified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorProfile {
    pub sensor: Sensor,
    /// Band names by position in the input files, used when the files carry no band descriptions
    pub file_bands: Vec<String>,
    pub texture_bands: Vec<String>,
    pub nir_band: String,
    pub red_band: String,
    pub green_band: String,
    pub scl_band: Option<String>,
    pub clear_classes: Vec<u8>,
    pub vegetation_threshold: f64,
    pub reflectance_scale: f64,
    pub glcm: GlcmParams,
    pub statistics: Vec<TextureStatistic>,
    pub composite: CompositeMethod,
    pub mask_stage: MaskStage,
    /// Add NDVI and NDWI bands to the processed composites
    pub index_layers: bool,
    pub export_scale: f64,
    pub histogram_scale: f64,
    pub max_buckets: usize,
    pub histograms: Vec<HistogramSpec>,
    pub rgb_style: RgbStyle,
    pub difference_styles: Vec<DifferenceStyle>,
    pub ndvi_style: LayerStyle,
    pub ndwi_style: LayerStyle,
    pub names: ExportNames,
}

fn strings(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

fn bwr(statistic: TextureStatistic, max: f64) -> DifferenceStyle {
    DifferenceStyle {
        statistic,
        style: LayerStyle {
            min: 0.0,
            max,
            palette: Palette::BlueWhiteRed,
        },
    }
}

fn histogram(
    statistic: TextureStatistic,
    title: &str,
    x_axis_title: &str,
    color: &str,
    threshold: Option<f64>,
) -> HistogramSpec {
    HistogramSpec {
        statistic,
        title: title.to_string(),
        x_axis_title: x_axis_title.to_string(),
        color: color.to_string(),
        threshold,
    }
}

impl SensorProfile {
    pub fn preset(sensor: Sensor) -> Self {
        use TextureStatistic::{Contrast, Dissimilarity, Homogeneity};
        let ndvi_style = LayerStyle {
            min: 0.0,
            max: 1.0,
            palette: Palette::WhiteGreen,
        };
        let ndwi_style = LayerStyle {
            min: 0.0,
            max: 1.0,
            palette: Palette::BlueWhiteBrown,
        };
        match sensor {
            Sensor::PlanetScope => SensorProfile {
                sensor,
                file_bands: strings(&["b1", "b2", "b3", "b4"]),
                texture_bands: strings(&["b4", "b3", "b2", "b1"]),
                nir_band: "b4".into(),
                red_band: "b3".into(),
                green_band: "b2".into(),
                scl_band: None,
                clear_classes: vec![4, 5, 6],
                vegetation_threshold: 0.25,
                reflectance_scale: 10000.0,
                glcm: GlcmParams::default(),
                statistics: vec![Homogeneity, Dissimilarity, Contrast],
                composite: CompositeMethod::Mean,
                mask_stage: MaskStage::PerImage,
                index_layers: false,
                export_scale: 3.0,
                histogram_scale: 30.0,
                max_buckets: 50,
                histograms: vec![
                    histogram(
                        Homogeneity,
                        "Homogeneity Difference",
                        "Homogeneity Difference Value",
                        "blue",
                        Some(0.20),
                    ),
                    histogram(
                        Dissimilarity,
                        "Dissimilarity Difference",
                        "Dissimilarity Difference Value",
                        "red",
                        Some(0.35),
                    ),
                    histogram(
                        Contrast,
                        "Histogram of Contrast Difference",
                        "Contrast Difference",
                        "green",
                        None,
                    ),
                ],
                rgb_style: RgbStyle {
                    bands: ["b3".into(), "b2".into(), "b1".into()],
                    min: 0.0,
                    max: 4000.0,
                },
                difference_styles: vec![
                    bwr(Homogeneity, 0.25),
                    bwr(Dissimilarity, 0.5),
                    bwr(Contrast, 0.5),
                ],
                ndvi_style,
                ndwi_style,
                names: ExportNames {
                    pre_composite: Some("Al-Gineina_PreEvent_Averaged".into()),
                    post_composite: Some("Al-Gineina_PostEvent_Averaged".into()),
                    pre_processed: None,
                    post_processed: None,
                    differences: vec![
                        NamedProduct {
                            statistic: Homogeneity,
                            name: "Al-Gineina_Planet_Homogeneity".into(),
                        },
                        NamedProduct {
                            statistic: Dissimilarity,
                            name: "Al-Gineina_Planet_Dissimilarity".into(),
                        },
                        NamedProduct {
                            statistic: Contrast,
                            name: "Al-Gineina_Planet_Contrast".into(),
                        },
                    ],
                },
            },
            Sensor::Sentinel2 => SensorProfile {
                sensor,
                file_bands: strings(&["B2", "B3", "B4", "B8", "SCL"]),
                texture_bands: strings(&["B2", "B3", "B4", "B8"]),
                nir_band: "B8".into(),
                red_band: "B4".into(),
                green_band: "B3".into(),
                scl_band: Some("SCL".into()),
                clear_classes: vec![4, 5, 6],
                vegetation_threshold: 0.2,
                reflectance_scale: 10000.0,
                glcm: GlcmParams::default(),
                statistics: vec![Homogeneity, Dissimilarity],
                composite: CompositeMethod::Mosaic,
                mask_stage: MaskStage::Composite,
                index_layers: true,
                export_scale: 10.0,
                histogram_scale: 10.0,
                max_buckets: 50,
                histograms: vec![
                    histogram(
                        Homogeneity,
                        "Combined Homogeneity Difference",
                        "Value",
                        "blue",
                        None,
                    ),
                    histogram(
                        Dissimilarity,
                        "Combined Dissimilarity Difference",
                        "Value",
                        "red",
                        None,
                    ),
                ],
                rgb_style: RgbStyle {
                    bands: ["B4".into(), "B3".into(), "B2".into()],
                    min: 0.0,
                    max: 8000.0,
                },
                difference_styles: vec![bwr(Homogeneity, 0.25), bwr(Dissimilarity, 0.5)],
                ndvi_style,
                ndwi_style,
                names: ExportNames {
                    pre_composite: None,
                    post_composite: None,
                    pre_processed: Some("S2_PreEvent_Processed_Map_Algenina".into()),
                    post_processed: Some("S2_PostEvent_Processed_Map_Algenina".into()),
                    differences: vec![
                        NamedProduct {
                            statistic: Homogeneity,
                            name: "S2_Combined_Enhanced_Homogeneity_Difference_Map_Algenina"
                                .into(),
                        },
                        NamedProduct {
                            statistic: Dissimilarity,
                            name: "S2_Combined_Enhanced_Dissimilarity_Difference_Map_Algenina"
                                .into(),
                        },
                    ],
                },
            },
        }
    }

    pub fn difference_style(&self, statistic: TextureStatistic) -> LayerStyle {
        self.difference_styles
            .iter()
            .find(|s| s.statistic == statistic)
            .map(|s| s.style.clone())
            .unwrap_or(LayerStyle {
                min: 0.0,
                max: 0.5,
                palette: Palette::BlueWhiteRed,
            })
    }

    pub fn histogram_spec(&self, statistic: TextureStatistic) -> HistogramSpec {
        self.histograms
            .iter()
            .find(|h| h.statistic == statistic)
            .cloned()
            .unwrap_or_else(|| {
                let title = format!("{} Difference", statistic.label());
                histogram(statistic, &title, "Value", "black", None)
            })
    }

    /// Bands every input file must provide.
    pub fn required_bands(&self) -> Vec<String> {
        let mut bands = self.texture_bands.clone();
        for b in [&self.nir_band, &self.red_band, &self.green_band] {
            if !bands.contains(b) {
                bands.push(b.clone());
            }
        }
        if let Some(scl) = &self.scl_band {
            if !bands.contains(scl) {
                bands.push(scl.clone());
            }
        }
        for b in &self.rgb_style.bands {
            if !bands.contains(b) {
                bands.push(b.clone());
            }
        }
        bands
    }

    pub fn validate(&self) -> Result<()> {
        if self.texture_bands.is_empty() {
            return Err(Error::InvalidArgument {
                arg: "texture_bands",
                value: "empty".to_string(),
            });
        }
        if self.statistics.is_empty() {
            return Err(Error::InvalidArgument {
                arg: "statistics",
                value: "empty".to_string(),
            });
        }
        if !(self.reflectance_scale > 0.0) {
            return Err(Error::InvalidArgument {
                arg: "reflectance_scale",
                value: self.reflectance_scale.to_string(),
            });
        }
        if self.glcm.radius == 0 {
            return Err(Error::InvalidArgument {
                arg: "glcm.radius",
                value: "0".to_string(),
            });
        }
        if self.max_buckets == 0 {
            return Err(Error::InvalidArgument {
                arg: "max_buckets",
                value: "0".to_string(),
            });
        }
        for b in self.required_bands() {
            if !self.file_bands.contains(&b) {
                return Err(Error::MissingBand {
                    band: b,
                    available: self.file_bands.join(","),
                });
            }
        }
        Ok(())
    }
}

/// Optional patches applied on top of a sensor preset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileOverrides {
    pub file_bands: Option<Vec<String>>,
    pub texture_bands: Option<Vec<String>>,
    pub vegetation_threshold: Option<f64>,
    pub clear_classes: Option<Vec<u8>>,
    pub quantization: Option<f64>,
    pub max_level: Option<u16>,
    pub glcm_radius: Option<usize>,
    pub statistics: Option<Vec<TextureStatistic>>,
    pub composite: Option<CompositeMethod>,
    pub export_scale: Option<f64>,
    pub histogram_scale: Option<f64>,
    pub max_buckets: Option<usize>,
    pub histograms: Option<Vec<HistogramSpec>>,
    pub names: Option<ExportNames>,
}

impl ProfileOverrides {
    pub fn apply(&self, profile: &mut SensorProfile) {
        if let Some(v) = &self.file_bands {
            profile.file_bands = v.clone();
        }
        if let Some(v) = &self.texture_bands {
            profile.texture_bands = v.clone();
        }
        if let Some(v) = self.vegetation_threshold {
            profile.vegetation_threshold = v;
        }
        if let Some(v) = &self.clear_classes {
            profile.clear_classes = v.clone();
        }
        if let Some(v) = self.quantization {
            profile.glcm.quantization = v;
        }
        if let Some(v) = self.max_level {
            profile.glcm.max_level = v;
        }
        if let Some(v) = self.glcm_radius {
            profile.glcm.radius = v;
        }
        if let Some(v) = &self.statistics {
            profile.statistics = v.clone();
        }
        if let Some(v) = self.composite {
            profile.composite = v;
        }
        if let Some(v) = self.export_scale {
            profile.export_scale = v;
        }
        if let Some(v) = self.histogram_scale {
            profile.histogram_scale = v;
        }
        if let Some(v) = self.max_buckets {
            profile.max_buckets = v;
        }
        if let Some(v) = &self.histograms {
            profile.histograms = v.clone();
        }
        if let Some(v) = &self.names {
            profile.names = v.clone();
        }
    }
}

/// Source of one image collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InputSpec {
    /// Explicit list of captures
    Captures { paths: Vec<PathBuf> },
    /// Scenes from a local catalog acquired in [start, end) intersecting the AOI
    Archive {
        catalog: PathBuf,
        start: NaiveDate,
        end: NaiveDate,
    },
}

fn default_export_dir() -> PathBuf {
    PathBuf::from("exports")
}

fn default_folder() -> String {
    "texchange".to_string()
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportParams {
    #[serde(default = "default_export_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_folder")]
    pub folder: String,
    #[serde(default = "default_true")]
    pub previews: bool,
    #[serde(default = "default_true")]
    pub histograms: bool,
}

impl Default for ExportParams {
    fn default() -> Self {
        Self {
            dir: default_export_dir(),
            folder: default_folder(),
            previews: true,
            histograms: true,
        }
    }
}

/// One analysis run, suitable for config files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisParams {
    pub sensor: Sensor,
    #[serde(default)]
    pub overrides: ProfileOverrides,
    pub aoi: AreaOfInterest,
    pub pre: InputSpec,
    pub post: InputSpec,
    #[serde(default)]
    pub export: ExportParams,
}

impl AnalysisParams {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let params: AnalysisParams = serde_json::from_str(&text)?;
        params.aoi.validate()?;
        Ok(params)
    }

    /// Sensor preset with config overrides applied and validated.
    pub fn profile(&self) -> Result<SensorProfile> {
        let mut profile = SensorProfile::preset(self.sensor);
        self.overrides.apply(&mut profile);
        profile.validate()?;
        Ok(profile)
    }
}
