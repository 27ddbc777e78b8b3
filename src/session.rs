//! Per-backend session dataset

use crate::cache::PerModel;
use crate::config::DatasetConfig;
use crate::error::CoreError;
use crate::feature_extractor::{FeatureExtractor, FeatureVector};
use crate::generator;
use crate::models::{self, ModelRegistry, ScoringBackend};
use crate::types::model::ModelKind;
use crate::types::transaction::{ScoredTransaction, TransactionRecord};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// Generated records scored by one backend.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionDataset {
    pub model: ModelKind,
    pub records: Vec<TransactionRecord>,
    pub features: Vec<FeatureVector>,
    /// Risk scores, 3 decimals, aligned with `records`
    pub scores: Vec<f64>,
    pub labels: Vec<bool>,
}

impl SessionDataset {
    /// Generate, featurize and score `count` records.
    pub fn build(backend: &dyn ScoringBackend, count: usize, seed: u64) -> Result<Self, CoreError> {
        let model = backend.kind();
        let records =
            generator::generate(count, seed).map_err(|e| CoreError::inference(model, &e))?;
        let features = FeatureExtractor::new().extract_batch(&records);
        let scores = models::score(backend, &features).map_err(|e| CoreError::inference(model, &e))?;
        let labels = records.iter().map(|r| r.is_fraud).collect();

        Ok(Self {
            model,
            records,
            features,
            scores,
            labels,
        })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records paired with their scores, flagged above `flag_threshold`.
    pub fn scored_transactions(&self, flag_threshold: f64) -> Vec<ScoredTransaction> {
        self.records
            .iter()
            .zip(&self.scores)
            .map(|(record, &score)| ScoredTransaction::new(record.clone(), score, flag_threshold))
            .collect()
    }
}

/// Memoized session datasets, one per backend.
pub struct SessionCache {
    registry: Arc<ModelRegistry>,
    settings: DatasetConfig,
    datasets: PerModel<Result<Arc<SessionDataset>, CoreError>>,
}

impl SessionCache {
    pub fn new(registry: Arc<ModelRegistry>, settings: DatasetConfig) -> Self {
        Self {
            registry,
            settings,
            datasets: PerModel::new(),
        }
    }

    pub fn settings(&self) -> &DatasetConfig {
        &self.settings
    }

    /// Dataset scored by `kind`, built on first access.
    pub fn get_dataset(&self, kind: ModelKind) -> Result<Arc<SessionDataset>, CoreError> {
        self.datasets
            .get_or_init(kind, || {
                let backend = self.registry.backend(kind)?;
                let start = Instant::now();
                let dataset =
                    SessionDataset::build(backend.as_ref(), self.settings.count, self.settings.seed)?;
                info!(
                    model = %kind,
                    records = dataset.len(),
                    fraud = dataset.labels.iter().filter(|&&l| l).count(),
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Session dataset ready"
                );
                Ok(Arc::new(dataset))
            })
            .clone()
    }
}
