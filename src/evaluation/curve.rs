//! ROC / precision-recall threshold sweep

use super::metrics::evaluate;
use crate::rounding::round_to;
use serde::{Deserialize, Serialize};

/// Thresholds 0.00, 0.05, ..., 1.00.
pub const THRESHOLD_GRID_POINTS: usize = 21;

/// One point on the sweep.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RocPoint {
    pub threshold: f64,
    /// 3 decimals
    pub fpr: f64,
    /// 3 decimals
    pub tpr: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

fn threshold_grid() -> impl Iterator<Item = f64> {
    (0..THRESHOLD_GRID_POINTS).map(|i| round_to(i as f64 * 0.05, 2))
}

/// Metrics at every grid threshold, ascending.
pub fn sweep(labels: &[bool], scores: &[f64]) -> Vec<RocPoint> {
    threshold_grid()
        .map(|threshold| {
            let m = evaluate(labels, scores, threshold);
            RocPoint {
                threshold,
                fpr: round_to(m.false_positive_rate(), 3),
                tpr: round_to(m.true_positive_rate(), 3),
                precision: m.precision,
                recall: m.recall,
                f1: m.f1,
            }
        })
        .collect()
}
