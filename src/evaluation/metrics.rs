//! Confusion-matrix metrics at a decision threshold

use crate::rounding::round_to;
use serde::{Deserialize, Serialize};

/// Confusion matrix plus derived rates, all rates rounded to 4 decimals.
///
/// Undefined ratios (zero denominator, empty input) are reported as 0.0.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub tp: usize,
    pub fp: usize,
    #[serde(rename = "fn")]
    pub fn_: usize,
    pub tn: usize,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub accuracy: f64,
}

impl MetricsSnapshot {
    pub fn total(&self) -> usize {
        self.tp + self.fp + self.fn_ + self.tn
    }

    /// fp / (fp + tn)
    pub fn false_positive_rate(&self) -> f64 {
        ratio(self.fp, self.fp + self.tn)
    }

    /// tp / (tp + fn)
    pub fn true_positive_rate(&self) -> f64 {
        ratio(self.tp, self.tp + self.fn_)
    }
}

pub(crate) fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

/// Classify `score > threshold` as fraud and compare against `labels`.
///
/// Pairs are taken positionally; if the slices differ in length only the
/// common prefix is counted.
pub fn evaluate(labels: &[bool], scores: &[f64], threshold: f64) -> MetricsSnapshot {
    let (mut tp, mut fp, mut fn_, mut tn) = (0, 0, 0, 0);
    for (&label, &score) in labels.iter().zip(scores) {
        match (score > threshold, label) {
            (true, true) => tp += 1,
            (true, false) => fp += 1,
            (false, true) => fn_ += 1,
            (false, false) => tn += 1,
        }
    }

    let precision = ratio(tp, tp + fp);
    let recall = ratio(tp, tp + fn_);
    let f1 = if precision + recall > 0.0 {
        2.0 * precision * recall / (precision + recall)
    } else {
        0.0
    };
    let accuracy = ratio(tp + tn, tp + fp + fn_ + tn);

    MetricsSnapshot {
        tp,
        fp,
        fn_,
        tn,
        precision: round_to(precision, 4),
        recall: round_to(recall, 4),
        f1: round_to(f1, 4),
        accuracy: round_to(accuracy, 4),
    }
}
