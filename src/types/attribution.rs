//! Feature attribution outputs

use serde::{Deserialize, Serialize};

/// One feature's share of a single prediction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureContribution {
    /// Human-readable feature name
    pub feature: String,
    /// Unscaled feature value, 4 decimals
    pub raw_value: f64,
    /// Additive contribution to the model output
    pub contribution: f64,
}

/// Additive explanation of one transaction's prediction.
///
/// `base_value + Σ contribution` reproduces `output_value`. For the tree
/// ensemble this is exact and in log-odds space; for the neural net it is in
/// probability space and approximate when the coalition budget is sampled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributionRecord {
    pub base_value: f64,
    pub output_value: f64,
    /// Sorted by descending |contribution|
    pub features: Vec<FeatureContribution>,
}

impl AttributionRecord {
    /// Sum of all contributions.
    pub fn contribution_sum(&self) -> f64 {
        self.features.iter().map(|f| f.contribution).sum()
    }
}

/// Normalized global importance of one feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub feature: String,
    pub importance: f64,
}
