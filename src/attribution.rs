//! Global and per-transaction feature attribution.
//!
//! Attributions are computed once per backend over the whole session
//! evaluation set, so transaction indices line up with the cached session
//! dataset. The tree ensemble is explained exactly; the neural network is
//! explained by seeded KernelSHAP.

use crate::cache::PerModel;
use crate::config::AttributionConfig;
use crate::error::CoreError;
use crate::feature_extractor::{FeatureVector, FEATURE_COUNT, FEATURE_DISPLAY_NAMES};
use crate::models::{Attributions, ModelRegistry};
use crate::rounding::round_to;
use crate::session::{SessionCache, SessionDataset};
use crate::types::attribution::{AttributionRecord, FeatureContribution, FeatureImportance};
use crate::types::model::ModelKind;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// Attributions for one backend's evaluation set.
#[derive(Debug, Clone, PartialEq)]
pub struct ExplainedSet {
    pub model: ModelKind,
    pub dataset: Arc<SessionDataset>,
    pub attributions: Attributions,
    pub importance: Vec<FeatureImportance>,
}

impl ExplainedSet {
    pub fn len(&self) -> usize {
        self.attributions.contributions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributions.contributions.is_empty()
    }

    /// Attribution for row `index`, or `NotFound`.
    pub fn record(&self, index: usize) -> Result<AttributionRecord, CoreError> {
        let not_found = CoreError::NotFound {
            index,
            len: self.len(),
        };
        let phi = self.attributions.contributions.get(index).ok_or(not_found.clone())?;
        let x = self.dataset.features.get(index).ok_or(not_found.clone())?;
        let output = *self.attributions.outputs.get(index).ok_or(not_found)?;
        Ok(rank_contributions(self.attributions.base_value, output, x, phi))
    }
}

/// Column-wise mean |φ|, normalised to sum to 1 and sorted descending.
///
/// A set with no attribution mass yields all-zero importances. Ties keep
/// feature order.
pub fn global_importance(contributions: &[FeatureVector]) -> Vec<FeatureImportance> {
    let mut mean_abs = [0.0; FEATURE_COUNT];
    if !contributions.is_empty() {
        for row in contributions {
            for (acc, phi) in mean_abs.iter_mut().zip(row) {
                *acc += phi.abs();
            }
        }
        for acc in mean_abs.iter_mut() {
            *acc /= contributions.len() as f64;
        }
    }

    normalized_importance(&mean_abs)
}

/// Per-feature scores scaled to sum to 1, rounded to 4 decimals and sorted
/// descending. An all-zero input stays all zero; ties keep feature order.
pub fn normalized_importance(scores: &FeatureVector) -> Vec<FeatureImportance> {
    let total: f64 = scores.iter().sum();
    let total = if total == 0.0 { 1.0 } else { total };

    let mut importance: Vec<FeatureImportance> = FEATURE_DISPLAY_NAMES
        .iter()
        .zip(scores)
        .map(|(name, v)| FeatureImportance {
            feature: name.to_string(),
            importance: round_to(v / total, 4),
        })
        .collect();
    importance.sort_by(|a, b| b.importance.total_cmp(&a.importance));
    importance
}

/// One row's contributions sorted by descending |contribution|, ties in
/// feature order.
pub fn rank_contributions(
    base_value: f64,
    output_value: f64,
    x: &FeatureVector,
    phi: &FeatureVector,
) -> AttributionRecord {
    let mut features: Vec<FeatureContribution> = (0..FEATURE_COUNT)
        .map(|f| FeatureContribution {
            feature: FEATURE_DISPLAY_NAMES[f].to_string(),
            raw_value: round_to(x[f], 4),
            contribution: phi[f],
        })
        .collect();
    features.sort_by(|a, b| b.contribution.abs().total_cmp(&a.contribution.abs()));

    AttributionRecord {
        base_value,
        output_value,
        features,
    }
}

/// Cached attribution results per backend.
pub struct AttributionEngine {
    registry: Arc<ModelRegistry>,
    sessions: Arc<SessionCache>,
    settings: AttributionConfig,
    explained: PerModel<Result<Arc<ExplainedSet>, CoreError>>,
}

impl AttributionEngine {
    pub fn new(
        registry: Arc<ModelRegistry>,
        sessions: Arc<SessionCache>,
        settings: AttributionConfig,
    ) -> Self {
        Self {
            registry,
            sessions,
            settings,
            explained: PerModel::new(),
        }
    }

    /// Explain the whole evaluation set for `kind`, once.
    pub fn explained(&self, kind: ModelKind) -> Result<Arc<ExplainedSet>, CoreError> {
        self.explained
            .get_or_init(kind, || {
                let backend = self.registry.backend(kind)?;
                let dataset = self.sessions.get_dataset(kind)?;
                let start = Instant::now();

                let attributions = backend
                    .attribute(&dataset.features, &self.settings)
                    .map_err(|e| CoreError::inference(kind, &e))?;
                if attributions.contributions.len() != dataset.len()
                    || attributions.outputs.len() != dataset.len()
                {
                    return Err(CoreError::Inference {
                        model: kind,
                        message: format!(
                            "attributions cover {} rows, evaluation set has {}",
                            attributions.contributions.len(),
                            dataset.len()
                        ),
                    });
                }

                let importance = global_importance(&attributions.contributions);
                info!(
                    model = %kind,
                    rows = dataset.len(),
                    base_value = attributions.base_value,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Attributions computed"
                );

                Ok(Arc::new(ExplainedSet {
                    model: kind,
                    dataset,
                    attributions,
                    importance,
                }))
            })
            .clone()
    }

    pub fn global_importance(&self, kind: ModelKind) -> Result<Vec<FeatureImportance>, CoreError> {
        Ok(self.explained(kind)?.importance.clone())
    }

    pub fn transaction_attribution(
        &self,
        kind: ModelKind,
        index: usize,
    ) -> Result<AttributionRecord, CoreError> {
        self.explained(kind)?.record(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_importance_normalized_and_sorted() {
        let contributions = vec![
            [0.1, -0.4, 0.0, 0.2, 0.0, 0.05],
            [-0.3, 0.2, 0.0, -0.2, 0.1, 0.05],
        ];
        let importance = global_importance(&contributions);

        assert_eq!(importance.len(), FEATURE_COUNT);
        let total: f64 = importance.iter().map(|i| i.importance).sum();
        assert!((total - 1.0).abs() < 1e-3);
        for pair in importance.windows(2) {
            assert!(pair[0].importance >= pair[1].importance);
        }
        assert_eq!(importance[0].feature, "Time of Day");
    }

    #[test]
    fn test_importance_ties_keep_feature_order() {
        let contributions = vec![[0.5, 0.0, 0.0, 0.5, 0.0, 0.0]];
        let importance = global_importance(&contributions);
        assert_eq!(importance[0].feature, "Transaction Amount");
        assert_eq!(importance[1].feature, "Distance from Home");
        assert_eq!(importance[2].feature, "Time of Day");
    }

    #[test]
    fn test_importance_of_nothing_is_zero() {
        let importance = global_importance(&[]);
        assert!(importance.iter().all(|i| i.importance == 0.0));
        assert_eq!(importance[0].feature, "Transaction Amount");
    }

    #[test]
    fn test_rank_contributions() {
        let x = [123.45678, 3.0, 12.0, 4500.0, 9.0, 7.0];
        let phi = [0.2, -0.9, 1.3, 0.0, -0.2, 0.05];
        let record = rank_contributions(-2.0, -1.55, &x, &phi);

        let order: Vec<&str> = record.features.iter().map(|f| f.feature.as_str()).collect();
        assert_eq!(
            order,
            vec![
                "Velocity (txns/hr)",
                "Time of Day",
                "Transaction Amount",
                "Merchant Category",
                "City",
                "Distance from Home",
            ]
        );
        assert_eq!(record.features[2].raw_value, 123.4568);
        assert!((record.base_value + record.contribution_sum() - record.output_value).abs() < 1e-12);
    }
}
