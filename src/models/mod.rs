//! Risk-scoring backends
//!
//! Both backends implement [`ScoringBackend`]; callers only ever see the
//! trait object and never branch on the concrete model type.

pub mod loader;
pub mod neural_net;
pub mod scaler;
pub mod tree_ensemble;

pub use loader::{BackendLoader, ModelLoader, ModelRegistry};
pub use neural_net::{NeuralNet, Network, OnnxNetwork};
pub use scaler::StandardScaler;
pub use tree_ensemble::TreeEnsemble;

use crate::config::AttributionConfig;
use crate::feature_extractor::FeatureVector;
use crate::rounding::round_to;
use crate::types::attribution::FeatureImportance;
use crate::types::model::ModelKind;
use anyhow::Result;

/// Per-row additive attributions for a batch of inputs.
#[derive(Debug, Clone, PartialEq)]
pub struct Attributions {
    /// Expected model output over the reference distribution
    pub base_value: f64,
    /// One contribution row per input row
    pub contributions: Vec<FeatureVector>,
    /// Model output in the space the contributions explain
    pub outputs: Vec<f64>,
}

/// A model that scores feature rows and explains its scores.
pub trait ScoringBackend: Send + Sync {
    /// Which backend variant this is.
    fn kind(&self) -> ModelKind;

    /// Raw fraud probabilities, one per row.
    fn predict_proba(&self, rows: &[FeatureVector]) -> Result<Vec<f64>>;

    /// Additive feature attributions for every row.
    fn attribute(&self, rows: &[FeatureVector], settings: &AttributionConfig)
        -> Result<Attributions>;

    /// Split-gain importance, for backends trained with one.
    fn gain_importance(&self) -> Option<Vec<FeatureImportance>> {
        None
    }
}

/// Risk scores for a feature matrix: probabilities clamped to [0, 1] and
/// rounded to 3 decimals.
pub fn score(backend: &dyn ScoringBackend, rows: &[FeatureVector]) -> Result<Vec<f64>> {
    let probs = backend.predict_proba(rows)?;
    anyhow::ensure!(
        probs.len() == rows.len(),
        "{} returned {} scores for {} rows",
        backend.kind(),
        probs.len(),
        rows.len()
    );
    Ok(probs
        .into_iter()
        .map(|p| round_to(p.clamp(0.0, 1.0), 3))
        .collect())
}
