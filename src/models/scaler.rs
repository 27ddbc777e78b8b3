//! Standardization scaler fitted alongside the neural network

use crate::feature_extractor::{FeatureVector, FEATURE_COUNT};
use anyhow::{ensure, Context, Result};
use serde::Deserialize;
use std::path::Path;

/// Per-feature `(x - mean) / scale` transform.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StandardScaler {
    mean: Vec<f64>,
    scale: Vec<f64>,
}

impl StandardScaler {
    pub fn new(mean: Vec<f64>, scale: Vec<f64>) -> Result<Self> {
        ensure!(
            mean.len() == FEATURE_COUNT && scale.len() == FEATURE_COUNT,
            "scaler expects {} features, got mean={} scale={}",
            FEATURE_COUNT,
            mean.len(),
            scale.len()
        );
        Ok(Self { mean, scale })
    }

    /// Load `{"mean": [...], "scale": [...]}`.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read scaler from {:?}", path))?;
        let parsed: StandardScaler = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse scaler from {:?}", path))?;
        Self::new(parsed.mean, parsed.scale)
    }

    pub fn transform(&self, x: &FeatureVector) -> FeatureVector {
        let mut out = [0.0; FEATURE_COUNT];
        for f in 0..FEATURE_COUNT {
            // constant columns were fitted with scale 0
            let scale = if self.scale[f] == 0.0 { 1.0 } else { self.scale[f] };
            out[f] = (x[f] - self.mean[f]) / scale;
        }
        out
    }

    pub fn transform_batch(&self, rows: &[FeatureVector]) -> Vec<FeatureVector> {
        rows.iter().map(|r| self.transform(r)).collect()
    }
}
