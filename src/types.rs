//! Shared types and enums used across texchange.
//! Includes `Sensor`, `TextureStatistic`, `CompositeMethod`, `MaskStage`
//! and the display `Palette` ramps.
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sensor {
    /// PlanetScope 4-band analytic (b1 blue, b2 green, b3 red, b4 NIR), 3 m
    #[value(name = "planetscope")]
    PlanetScope,
    /// Sentinel-2 L2A surface reflectance with SCL band, 10 m
    #[value(name = "sentinel2")]
    Sentinel2,
}

impl std::fmt::Display for Sensor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Sensor::PlanetScope => write!(f, "PlanetScope"),
            Sensor::Sentinel2 => write!(f, "Sentinel-2"),
        }
    }
}

/// GLCM texture statistic computed per band.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, ValueEnum, Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextureStatistic {
    /// Inverse difference moment: sum p / (1 + (i-j)^2)
    Homogeneity,
    /// sum p |i-j|
    Dissimilarity,
    /// sum p (i-j)^2
    Contrast,
    /// Angular second moment: sum p^2
    Asm,
    /// -sum p ln p
    Entropy,
}

impl TextureStatistic {
    /// Suffix of the per-band output, e.g. `b4_idm`.
    pub fn suffix(&self) -> &'static str {
        match self {
            TextureStatistic::Homogeneity => "idm",
            TextureStatistic::Dissimilarity => "diss",
            TextureStatistic::Contrast => "contrast",
            TextureStatistic::Asm => "asm",
            TextureStatistic::Entropy => "ent",
        }
    }

    /// Name of the cross-band averaged band.
    pub fn combined_band_name(&self) -> String {
        format!("combined_{}", self.label().to_ascii_lowercase())
    }

    pub fn label(&self) -> &'static str {
        match self {
            TextureStatistic::Homogeneity => "Homogeneity",
            TextureStatistic::Dissimilarity => "Dissimilarity",
            TextureStatistic::Contrast => "Contrast",
            TextureStatistic::Asm => "ASM",
            TextureStatistic::Entropy => "Entropy",
        }
    }
}

impl std::fmt::Display for TextureStatistic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// How an image collection is reduced to a single composite.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompositeMethod {
    Mean,
    Mosaic,
}

impl std::fmt::Display for CompositeMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompositeMethod::Mean => write!(f, "Mean"),
            CompositeMethod::Mosaic => write!(f, "Mosaic"),
        }
    }
}

/// Where masking happens relative to compositing.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaskStage {
    /// Mask and scale every capture, then composite
    PerImage,
    /// Composite raw captures, then mask and scale the composite
    Composite,
}

/// Display color ramp. Stops are evenly spaced between min and max.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Palette {
    /// blue -> white -> red
    BlueWhiteRed,
    /// white -> green
    WhiteGreen,
    /// blue -> white -> brown
    BlueWhiteBrown,
    /// black -> white
    Grayscale,
}

impl Palette {
    pub fn stops(&self) -> &'static [[u8; 3]] {
        const BLUE: [u8; 3] = [0, 0, 255];
        const WHITE: [u8; 3] = [255, 255, 255];
        const RED: [u8; 3] = [255, 0, 0];
        const GREEN: [u8; 3] = [0, 128, 0];
        const BROWN: [u8; 3] = [165, 42, 42];
        const BLACK: [u8; 3] = [0, 0, 0];
        match self {
            Palette::BlueWhiteRed => &[BLUE, WHITE, RED],
            Palette::WhiteGreen => &[WHITE, GREEN],
            Palette::BlueWhiteBrown => &[BLUE, WHITE, BROWN],
            Palette::Grayscale => &[BLACK, WHITE],
        }
    }
}

impl std::fmt::Display for Palette {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Palette::BlueWhiteRed => write!(f, "blue-white-red"),
            Palette::WhiteGreen => write!(f, "white-green"),
            Palette::BlueWhiteBrown => write!(f, "blue-white-brown"),
            Palette::Grayscale => write!(f, "grayscale"),
        }
    }
}
