//! Accuracy of a binary change raster against labelled validation cells.
//!
//! A cell is predicted as changed when the maximum of the raster over the
//! pixels whose centres fall inside it equals 1.
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::core::post::gridding::GridCell;
use crate::core::raster::GeoReference;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub true_positive: u64,
    pub false_positive: u64,
    pub false_negative: u64,
    pub true_negative: u64,
}

impl ConfusionMatrix {
    pub fn record(&mut self, actual: bool, predicted: bool) {
        match (actual, predicted) {
            (true, true) => self.true_positive += 1,
            (false, true) => self.false_positive += 1,
            (true, false) => self.false_negative += 1,
            (false, false) => self.true_negative += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.true_positive + self.false_positive + self.false_negative + self.true_negative
    }
}

fn ratio(num: u64, den: u64) -> Option<f64> {
    (den > 0).then(|| num as f64 / den as f64)
}

/// Metrics that are undefined for the given matrix are `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccuracyReport {
    pub model: String,
    pub matrix: ConfusionMatrix,
    pub overall_accuracy: f64,
    pub precision: Option<f64>,
    pub recall: Option<f64>,
    pub f1_score: Option<f64>,
    pub specificity: Option<f64>,
    pub omission_error: Option<f64>,
    pub commission_error: Option<f64>,
    pub kappa: Option<f64>,
}

impl AccuracyReport {
    pub fn from_matrix(model: &str, m: ConfusionMatrix) -> Result<Self> {
        let total = m.total();
        if total == 0 {
            return Err(Error::EmptyCollection {
                label: format!("no labelled cells to assess {model}"),
            });
        }
        let (tp, fp, fnn, tn) = (
            m.true_positive,
            m.false_positive,
            m.false_negative,
            m.true_negative,
        );
        let n = total as f64;
        let overall_accuracy = (tp + tn) as f64 / n;
        let precision = ratio(tp, tp + fp);
        let recall = ratio(tp, tp + fnn);
        let f1_score = match (precision, recall) {
            (Some(p), Some(r)) if p + r > 0.0 => Some(2.0 * p * r / (p + r)),
            _ => None,
        };
        let expected = ((tp + fp) as f64 / n) * ((tp + fnn) as f64 / n)
            + ((tn + fp) as f64 / n) * ((tn + fnn) as f64 / n);
        let kappa = (expected < 1.0).then(|| (overall_accuracy - expected) / (1.0 - expected));

        Ok(Self {
            model: model.to_string(),
            matrix: m,
            overall_accuracy,
            precision,
            recall,
            f1_score,
            specificity: ratio(tn, tn + fp),
            omission_error: ratio(fnn, tp + fnn),
            commission_error: ratio(fp, tp + fp),
            kappa,
        })
    }
}

/// Maximum valid value over the pixels whose centres fall inside `cell`.
pub fn zonal_max(band: &Array2<f64>, georef: &GeoReference, cell: &GridCell) -> Option<f64> {
    let (rows, cols) = band.dim();
    let corners = [
        georef.world_to_pixel(cell.bounds[0], cell.bounds[1]),
        georef.world_to_pixel(cell.bounds[2], cell.bounds[3]),
    ];
    let (r_lo, r_hi) = (
        corners[0].0.min(corners[1].0).floor().max(0.0) as usize,
        (corners[0].0.max(corners[1].0).ceil().max(0.0) as usize).min(rows),
    );
    let (c_lo, c_hi) = (
        corners[0].1.min(corners[1].1).floor().max(0.0) as usize,
        (corners[0].1.max(corners[1].1).ceil().max(0.0) as usize).min(cols),
    );

    let mut max: Option<f64> = None;
    for r in r_lo..r_hi {
        for c in c_lo..c_hi {
            let v = band[[r, c]];
            if !v.is_finite() {
                continue;
            }
            let (x, y) = georef.pixel_center(r, c);
            if cell.contains(x, y) {
                max = Some(max.map_or(v, |m: f64| m.max(v)));
            }
        }
    }
    max
}

/// Predicted label per cell (1 when the zonal maximum is exactly 1).
pub fn predict(cells: &[GridCell], band: &Array2<f64>, georef: &GeoReference) -> Vec<u8> {
    cells
        .iter()
        .map(|cell| u8::from(zonal_max(band, georef, cell) == Some(1.0)))
        .collect()
}

/// Compare predictions with the cells' reference labels. Cells without a
/// label, or with a label other than 0/1, are skipped.
pub fn assess(
    model: &str,
    cells: &[GridCell],
    band: &Array2<f64>,
    georef: &GeoReference,
) -> Result<AccuracyReport> {
    let predicted = predict(cells, band, georef);
    let mut matrix = ConfusionMatrix::default();
    let mut skipped = 0usize;
    for (cell, &p) in cells.iter().zip(&predicted) {
        match cell.damage {
            Some(label @ (0 | 1)) => matrix.record(label == 1, p == 1),
            _ => skipped += 1,
        }
    }
    if skipped > 0 {
        debug!("{} cells without a usable label skipped", skipped);
    }
    let report = AccuracyReport::from_matrix(model, matrix)?;
    info!(
        "{}: OA {:.2}% over {} cells",
        model,
        report.overall_accuracy * 100.0,
        matrix.total()
    );
    Ok(report)
}

/// One CSV row. Undefined metrics are written as empty cells.
#[derive(Debug, Serialize)]
struct AccuracyRow<'a> {
    #[serde(rename = "Model")]
    model: &'a str,
    #[serde(rename = "True_Positive")]
    true_positive: u64,
    #[serde(rename = "False_Positive")]
    false_positive: u64,
    #[serde(rename = "False_Negative")]
    false_negative: u64,
    #[serde(rename = "True_Negative")]
    true_negative: u64,
    #[serde(rename = "Overall_Accuracy")]
    overall_accuracy: f64,
    #[serde(rename = "Precision")]
    precision: Option<f64>,
    #[serde(rename = "Recall")]
    recall: Option<f64>,
    #[serde(rename = "F1_Score")]
    f1_score: Option<f64>,
    #[serde(rename = "Specificity")]
    specificity: Option<f64>,
    #[serde(rename = "Omission_Error")]
    omission_error: Option<f64>,
    #[serde(rename = "Commission_Error")]
    commission_error: Option<f64>,
    #[serde(rename = "Kappa")]
    kappa: Option<f64>,
}

impl<'a> From<&'a AccuracyReport> for AccuracyRow<'a> {
    fn from(r: &'a AccuracyReport) -> Self {
        AccuracyRow {
            model: &r.model,
            true_positive: r.matrix.true_positive,
            false_positive: r.matrix.false_positive,
            false_negative: r.matrix.false_negative,
            true_negative: r.matrix.true_negative,
            overall_accuracy: r.overall_accuracy,
            precision: r.precision,
            recall: r.recall,
            f1_score: r.f1_score,
            specificity: r.specificity,
            omission_error: r.omission_error,
            commission_error: r.commission_error,
            kappa: r.kappa,
        }
    }
}

/// CSV table with a header and one row per report.
pub fn write_reports_csv<W: std::io::Write>(out: W, reports: &[AccuracyReport]) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(out);
    for report in reports {
        wtr.serialize(AccuracyRow::from(report))?;
    }
    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_match_hand_computation() {
        let m = ConfusionMatrix {
            true_positive: 40,
            false_positive: 10,
            false_negative: 20,
            true_negative: 30,
        };
        let r = AccuracyReport::from_matrix("PS_Hom", m).unwrap();
        assert!((r.overall_accuracy - 0.7).abs() < 1e-12);
        assert!((r.precision.unwrap() - 0.8).abs() < 1e-12);
        assert!((r.recall.unwrap() - 40.0 / 60.0).abs() < 1e-12);
        assert!((r.specificity.unwrap() - 0.75).abs() < 1e-12);
        assert!((r.omission_error.unwrap() - 20.0 / 60.0).abs() < 1e-12);
        assert!((r.commission_error.unwrap() - 0.2).abs() < 1e-12);
        // p_e = 0.5*0.6 + 0.4*0.5 = 0.5
        assert!((r.kappa.unwrap() - 0.4).abs() < 1e-12);
    }

    #[test]
    fn undefined_metrics_are_none() {
        let m = ConfusionMatrix {
            true_negative: 5,
            ..Default::default()
        };
        let r = AccuracyReport::from_matrix("none", m).unwrap();
        assert_eq!(r.overall_accuracy, 1.0);
        assert_eq!(r.precision, None);
        assert_eq!(r.recall, None);
        assert_eq!(r.f1_score, None);
        assert_eq!(r.kappa, None);
        assert!(AccuracyReport::from_matrix("empty", ConfusionMatrix::default()).is_err());
    }

    #[test]
    fn zonal_max_drives_prediction() {
        // 4x4 grid of 10 m pixels with origin (0, 40)
        let georef = GeoReference::new([0.0, 10.0, 0.0, 40.0, 0.0, -10.0], "");
        let mut band = Array2::zeros((4, 4));
        band[[0, 1]] = 1.0;
        let cells = vec![
            GridCell {
                id: 1,
                bounds: [0.0, 20.0, 20.0, 40.0],
                damage: Some(1),
            },
            GridCell {
                id: 2,
                bounds: [20.0, 20.0, 40.0, 40.0],
                damage: Some(1),
            },
            GridCell {
                id: 3,
                bounds: [0.0, 0.0, 20.0, 20.0],
                damage: Some(0),
            },
            GridCell {
                id: 4,
                bounds: [20.0, 0.0, 40.0, 20.0],
                damage: None,
            },
        ];
        assert_eq!(predict(&cells, &band, &georef), vec![1, 0, 0, 0]);
        let r = assess("test", &cells, &band, &georef).unwrap();
        assert_eq!(
            r.matrix,
            ConfusionMatrix {
                true_positive: 1,
                false_positive: 0,
                false_negative: 1,
                true_negative: 1,
            }
        );
        let mut csv = Vec::new();
        write_reports_csv(&mut csv, &[r]).unwrap();
        let csv = String::from_utf8(csv).unwrap();
        assert!(csv.starts_with("Model,True_Positive"));
        assert!(csv.lines().nth(1).unwrap().starts_with("test,1,0,1,1,"));
    }

    #[test]
    fn csv_quotes_model_names_and_leaves_undefined_metrics_empty() {
        let defined = AccuracyReport::from_matrix(
            "PS_Hom,cleaned",
            ConfusionMatrix {
                true_positive: 3,
                false_positive: 1,
                false_negative: 1,
                true_negative: 5,
            },
        )
        .unwrap();
        let undefined = AccuracyReport::from_matrix(
            "no \"change\"",
            ConfusionMatrix {
                true_negative: 4,
                ..Default::default()
            },
        )
        .unwrap();
        let mut buf = Vec::new();
        write_reports_csv(&mut buf, &[defined, undefined]).unwrap();

        let mut reader = csv::Reader::from_reader(buf.as_slice());
        let headers = reader.headers().unwrap().clone();
        assert_eq!(headers.len(), 13);
        assert_eq!(&headers[12], "Kappa");
        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.len() == headers.len()));
        assert_eq!(&rows[0][0], "PS_Hom,cleaned");
        assert_eq!(&rows[0][1], "3");
        assert_eq!(&rows[1][0], "no \"change\"");
        assert_eq!(&rows[1][6], "");
        assert_eq!(&rows[1][12], "");
    }
}
