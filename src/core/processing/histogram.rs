//! Value-frequency histograms of single-band rasters, with optional
//! decision-threshold annotation and a minimal SVG chart rendering.
use std::fmt::Write as _;

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Basic statistics over valid (finite) pixels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistogramStats {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std: f64,
}

/// Single pass: min/max and Welford mean/std.
pub fn compute_stats(data: &Array2<f64>) -> Option<HistogramStats> {
    let mut count: u64 = 0;
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    let mut mean = 0.0_f64;
    let mut m2 = 0.0_f64;

    for &v in data.iter().filter(|v| v.is_finite()) {
        count += 1;
        min = min.min(v);
        max = max.max(v);
        let delta = v - mean;
        mean += delta / count as f64;
        m2 += delta * (v - mean);
    }

    if count == 0 {
        return None;
    }
    Some(HistogramStats {
        count,
        min,
        max,
        mean,
        std: (m2 / count as f64).sqrt(),
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Histogram {
    /// Lower edge of the first bucket
    pub bucket_min: f64,
    pub bucket_width: f64,
    pub counts: Vec<u64>,
    pub stats: HistogramStats,
    pub threshold: Option<f64>,
    /// Number of values strictly above `threshold`
    pub above_threshold: Option<u64>,
}

impl Histogram {
    /// Equal-width buckets spanning [min, max] of the valid values.
    /// A constant band yields a single bucket.
    pub fn compute(data: &Array2<f64>, max_buckets: usize, threshold: Option<f64>) -> Result<Self> {
        if max_buckets == 0 {
            return Err(Error::InvalidArgument {
                arg: "max_buckets",
                value: "0".to_string(),
            });
        }
        let stats = compute_stats(data).ok_or_else(|| Error::EmptyCollection {
            label: "histogram input has no valid pixels".to_string(),
        })?;

        let span = stats.max - stats.min;
        let (buckets, width) = if span > 0.0 {
            (max_buckets, span / max_buckets as f64)
        } else {
            (1, 0.0)
        };
        let mut counts = vec![0u64; buckets];
        let mut above = 0u64;
        for &v in data.iter().filter(|v| v.is_finite()) {
            let idx = if width > 0.0 {
                (((v - stats.min) / width).floor() as usize).min(buckets - 1)
            } else {
                0
            };
            counts[idx] += 1;
            if threshold.is_some_and(|t| v > t) {
                above += 1;
            }
        }

        Ok(Histogram {
            bucket_min: stats.min,
            bucket_width: width,
            counts,
            stats,
            threshold,
            above_threshold: threshold.map(|_| above),
        })
    }
}

/// Chart presentation, kept with the data in the JSON report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistogramChart {
    pub title: String,
    pub x_axis_title: String,
    pub y_axis_title: String,
    pub color: String,
    pub histogram: Histogram,
}

impl HistogramChart {
    pub fn new(title: &str, x_axis_title: &str, color: &str, histogram: Histogram) -> Self {
        Self {
            title: title.to_string(),
            x_axis_title: x_axis_title.to_string(),
            y_axis_title: "Count".to_string(),
            color: color.to_string(),
            histogram,
        }
    }

    /// Bar chart with a dashed black line at the threshold, if any.
    pub fn to_svg(&self) -> String {
        const W: f64 = 640.0;
        const H: f64 = 400.0;
        const LEFT: f64 = 60.0;
        const RIGHT: f64 = 20.0;
        const TOP: f64 = 40.0;
        const BOTTOM: f64 = 50.0;
        let plot_w = W - LEFT - RIGHT;
        let plot_h = H - TOP - BOTTOM;

        let hist = &self.histogram;
        let max_count = hist.counts.iter().copied().max().unwrap_or(0).max(1) as f64;
        let lo = hist.bucket_min;
        let hi = lo + hist.bucket_width * hist.counts.len() as f64;
        let span = if hi > lo { hi - lo } else { 1.0 };
        let bar_w = plot_w / hist.counts.len() as f64;

        let mut svg = String::new();
        let _ = writeln!(
            svg,
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{W}" height="{H}" viewBox="0 0 {W} {H}">"#
        );
        let _ = writeln!(svg, r#"<rect width="{W}" height="{H}" fill="white"/>"#);
        let _ = writeln!(
            svg,
            r#"<text x="{}" y="24" text-anchor="middle" font-size="16">{}</text>"#,
            W / 2.0,
            escape(&self.title)
        );
        for (i, &count) in hist.counts.iter().enumerate() {
            let h = plot_h * count as f64 / max_count;
            let _ = writeln!(
                svg,
                r#"<rect x="{:.2}" y="{:.2}" width="{:.2}" height="{:.2}" fill="{}"/>"#,
                LEFT + i as f64 * bar_w,
                TOP + plot_h - h,
                bar_w.max(1.0),
                h,
                escape(&self.color)
            );
        }
        let _ = writeln!(
            svg,
            r#"<line x1="{LEFT}" y1="{y}" x2="{x2}" y2="{y}" stroke="black"/>"#,
            y = TOP + plot_h,
            x2 = LEFT + plot_w
        );
        let _ = writeln!(
            svg,
            r#"<line x1="{LEFT}" y1="{TOP}" x2="{LEFT}" y2="{y2}" stroke="black"/>"#,
            y2 = TOP + plot_h
        );
        if let Some(t) = hist.threshold {
            let x = LEFT + plot_w * ((t - lo) / span).clamp(0.0, 1.0);
            let _ = writeln!(
                svg,
                r#"<line x1="{x:.2}" y1="{TOP}" x2="{x:.2}" y2="{y2}" stroke="black" stroke-width="2" stroke-dasharray="2,2"/>"#,
                y2 = TOP + plot_h
            );
        }
        let _ = writeln!(
            svg,
            r#"<text x="{LEFT}" y="{y}" font-size="11">{lo:.4}</text>"#,
            y = TOP + plot_h + 16.0
        );
        let _ = writeln!(
            svg,
            r#"<text x="{x}" y="{y}" text-anchor="end" font-size="11">{hi:.4}</text>"#,
            x = LEFT + plot_w,
            y = TOP + plot_h + 16.0
        );
        let _ = writeln!(
            svg,
            r#"<text x="{x}" y="{y}" text-anchor="middle" font-size="13">{}</text>"#,
            escape(&self.x_axis_title),
            x = LEFT + plot_w / 2.0,
            y = H - 12.0
        );
        let _ = writeln!(
            svg,
            r#"<text x="16" y="{y}" transform="rotate(-90 16 {y})" text-anchor="middle" font-size="13">{}</text>"#,
            escape(&self.y_axis_title),
            y = TOP + plot_h / 2.0
        );
        svg.push_str("</svg>\n");
        svg
    }
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn buckets_cover_range_and_count_every_valid_value() {
        let data = array![[0.0, 0.1, 0.2, 0.3], [0.4, 0.5, f64::NAN, 1.0]];
        let h = Histogram::compute(&data, 50, Some(0.2)).unwrap();
        assert_eq!(h.counts.len(), 50);
        assert_eq!(h.counts.iter().sum::<u64>(), 7);
        assert_eq!(h.counts[0], 1);
        assert_eq!(h.counts[49], 1);
        assert_eq!(h.above_threshold, Some(4));
        assert_eq!(h.stats.count, 7);
        assert_eq!(h.stats.max, 1.0);
    }

    #[test]
    fn constant_band_has_single_bucket() {
        let data = Array2::from_elem((3, 3), 0.0);
        let h = Histogram::compute(&data, 50, None).unwrap();
        assert_eq!(h.counts, vec![9]);
        assert_eq!(h.above_threshold, None);
        assert_eq!(h.stats.std, 0.0);
    }

    #[test]
    fn empty_band_is_an_error() {
        let data = Array2::from_elem((2, 2), f64::NAN);
        assert!(matches!(
            Histogram::compute(&data, 50, None),
            Err(Error::EmptyCollection { .. })
        ));
    }

    #[test]
    fn svg_contains_threshold_line_only_when_requested() {
        let data = array![[0.0, 0.5, 1.0]];
        let with = HistogramChart::new(
            "Homogeneity Difference",
            "Homogeneity Difference Value",
            "blue",
            Histogram::compute(&data, 10, Some(0.2)).unwrap(),
        );
        assert!(with.to_svg().contains("stroke-dasharray"));
        let without = HistogramChart::new(
            "Histogram of Contrast Difference",
            "Contrast Difference",
            "green",
            Histogram::compute(&data, 10, None).unwrap(),
        );
        assert!(!without.to_svg().contains("stroke-dasharray"));
    }
}
