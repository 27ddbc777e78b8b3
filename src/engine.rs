//! `RiskLab`: the scoring core behind one handle

use crate::attribution::AttributionEngine;
use crate::config::{AppConfig, AttributionConfig, DatasetConfig};
use crate::error::{CoreError, ErrorBody};
use crate::evaluation::{self, DatasetSummary, MetricsSnapshot, RocPoint};
use crate::models::{BackendLoader, ModelLoader, ModelRegistry};
use crate::session::{SessionCache, SessionDataset};
use crate::types::attribution::{AttributionRecord, FeatureImportance};
use crate::types::model::ModelKind;
use crate::types::transaction::ScoredTransaction;
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionList {
    pub transactions: Vec<ScoredTransaction>,
    pub total_fraud: usize,
}

/// Everything the comparison view shows for one backend.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelReport {
    pub metrics: MetricsSnapshot,
    pub roc: Vec<RocPoint>,
    pub feature_importance: Vec<FeatureImportance>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ReportEntry {
    Report(ModelReport),
    Failed { error: ErrorBody },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Comparison {
    pub threshold: f64,
    pub tree_ensemble: ReportEntry,
    pub neural_net: ReportEntry,
}

/// Shared scoring core. Cheap to share behind an `Arc`; all caches are
/// filled lazily on first use.
pub struct RiskLab {
    registry: Arc<ModelRegistry>,
    sessions: Arc<SessionCache>,
    attributions: AttributionEngine,
}

impl RiskLab {
    pub fn new(config: &AppConfig) -> Self {
        Self::with_loader(
            Box::new(ModelLoader::new(config.models.clone())),
            config.dataset.clone(),
            config.attribution.clone(),
        )
    }

    /// Core over a custom backend loader.
    pub fn with_loader(
        loader: Box<dyn BackendLoader>,
        dataset: DatasetConfig,
        attribution: AttributionConfig,
    ) -> Self {
        let registry = Arc::new(ModelRegistry::new(loader));
        let sessions = Arc::new(SessionCache::new(registry.clone(), dataset));
        let attributions = AttributionEngine::new(registry.clone(), sessions.clone(), attribution);
        Self {
            registry,
            sessions,
            attributions,
        }
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn dataset(&self, kind: ModelKind) -> Result<Arc<SessionDataset>, CoreError> {
        self.sessions.get_dataset(kind)
    }

    pub fn transactions(&self, kind: ModelKind) -> Result<TransactionList, CoreError> {
        let dataset = self.dataset(kind)?;
        Ok(TransactionList {
            transactions: dataset.scored_transactions(self.sessions.settings().flag_threshold),
            total_fraud: dataset.labels.iter().filter(|&&l| l).count(),
        })
    }

    pub fn evaluate(&self, kind: ModelKind, threshold: f64) -> Result<MetricsSnapshot, CoreError> {
        let dataset = self.dataset(kind)?;
        Ok(evaluation::evaluate(&dataset.labels, &dataset.scores, threshold))
    }

    pub fn roc(&self, kind: ModelKind) -> Result<Vec<RocPoint>, CoreError> {
        let dataset = self.dataset(kind)?;
        Ok(evaluation::sweep(&dataset.labels, &dataset.scores))
    }

    pub fn global_importance(&self, kind: ModelKind) -> Result<Vec<FeatureImportance>, CoreError> {
        self.attributions.global_importance(kind)
    }

    /// Split-gain importance of the tree ensemble; the network has none, so
    /// this does not depend on the selected backend.
    pub fn feature_importance(&self) -> Result<Vec<FeatureImportance>, CoreError> {
        let kind = ModelKind::TreeEnsemble;
        let backend = self.registry.backend(kind)?;
        backend.gain_importance().ok_or_else(|| {
            CoreError::inference(kind, &anyhow::anyhow!("model carries no split gain statistics"))
        })
    }

    pub fn transaction_attribution(
        &self,
        kind: ModelKind,
        index: usize,
    ) -> Result<AttributionRecord, CoreError> {
        self.attributions.transaction_attribution(kind, index)
    }

    pub fn summary(&self, kind: ModelKind) -> Result<DatasetSummary, CoreError> {
        let dataset = self.dataset(kind)?;
        let transactions = dataset.scored_transactions(self.sessions.settings().flag_threshold);
        Ok(evaluation::summarize(&transactions))
    }

    pub fn report(&self, kind: ModelKind, threshold: f64) -> Result<ModelReport, CoreError> {
        Ok(ModelReport {
            metrics: self.evaluate(kind, threshold)?,
            roc: self.roc(kind)?,
            feature_importance: self.global_importance(kind)?,
        })
    }

    /// Reports for both backends; a failing backend becomes an error entry.
    pub fn compare(&self, threshold: f64) -> Comparison {
        let entry = |kind: ModelKind| match self.report(kind, threshold) {
            Ok(report) => ReportEntry::Report(report),
            Err(e) => {
                warn!(model = %kind, error = %e, "Backend excluded from comparison");
                ReportEntry::Failed {
                    error: ErrorBody::from(&e),
                }
            }
        };

        Comparison {
            threshold,
            tree_ensemble: entry(ModelKind::TreeEnsemble),
            neural_net: entry(ModelKind::NeuralNet),
        }
    }
}
