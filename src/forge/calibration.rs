//! Calibration of forged consumption against measured totals.

use serde::{Deserialize, Serialize};

/// Mean factor above which the rules are reported as inflating consumption.
const INCREASE_THRESHOLD: f64 = 1.05;
/// Mean factor below which the rules are reported as deflating consumption.
const DECREASE_THRESHOLD: f64 = 0.95;

/// Qualitative direction of the calibration factors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationBias {
    Increase,
    Decrease,
    Balanced,
}

impl CalibrationBias {
    /// Classify a mean calibration factor.
    ///
    /// A factor above one means the synthetic totals came out low, i.e. the
    /// ground truth consumes more than the rules predicted.
    pub fn from_mean(mean: f64) -> Self {
        if mean > INCREASE_THRESHOLD {
            CalibrationBias::Increase
        } else if mean < DECREASE_THRESHOLD {
            CalibrationBias::Decrease
        } else {
            CalibrationBias::Balanced
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            CalibrationBias::Increase => "rules increase consumption",
            CalibrationBias::Decrease => "rules decrease consumption",
            CalibrationBias::Balanced => "balanced",
        }
    }
}

impl std::fmt::Display for CalibrationBias {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// A row whose calibration could not be applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationSkip {
    pub row_index: usize,
    pub hotel: String,
    pub reason: String,
}

/// Summary of the factors applied across a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactorSummary {
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
    pub bias: CalibrationBias,
    pub label: String,
}

/// Run-level calibration statistics.
///
/// `summary` is `None` when no row was calibrated.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CalibrationStats {
    pub rows_calibrated: usize,
    pub skipped: Vec<CalibrationSkip>,
    pub summary: Option<FactorSummary>,
}

impl CalibrationStats {
    pub fn applied(&self) -> bool {
        self.summary.is_some()
    }
}

/// Running sums of calibration factors.
#[derive(Debug, Clone, Default)]
pub struct CalibrationAccumulator {
    count: usize,
    sum: f64,
    sum_sq: f64,
    min: f64,
    max: f64,
    skipped: Vec<CalibrationSkip>,
}

impl CalibrationAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, factor: f64) {
        if self.count == 0 {
            self.min = factor;
            self.max = factor;
        } else {
            self.min = self.min.min(factor);
            self.max = self.max.max(factor);
        }
        self.count += 1;
        self.sum += factor;
        self.sum_sq += factor * factor;
    }

    pub fn skip(&mut self, skip: CalibrationSkip) {
        self.skipped.push(skip);
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn finish(self) -> CalibrationStats {
        let summary = (self.count > 0).then(|| {
            let n = self.count as f64;
            let mean = self.sum / n;
            // Rounding can push the variance slightly negative.
            let variance = (self.sum_sq / n - mean * mean).max(0.0);
            let bias = CalibrationBias::from_mean(mean);
            FactorSummary {
                mean,
                std: variance.sqrt(),
                min: self.min,
                max: self.max,
                bias,
                label: bias.label().to_string(),
            }
        });

        CalibrationStats {
            rows_calibrated: self.count,
            skipped: self.skipped,
            summary,
        }
    }
}

/// Factor that brings `synthetic` to `ground_truth`, or `None` when the
/// synthetic total is zero or either value is not finite.
pub fn calibration_factor(ground_truth: f64, synthetic: f64) -> Option<f64> {
    if synthetic == 0.0 || !synthetic.is_finite() || !ground_truth.is_finite() {
        None
    } else {
        Some(ground_truth / synthetic)
    }
}
