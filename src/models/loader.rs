//! Backend artifact loading and the process-wide backend registry

use super::{NeuralNet, ScoringBackend, TreeEnsemble};
use crate::cache::PerModel;
use crate::config::ModelsConfig;
use crate::error::CoreError;
use crate::types::model::ModelKind;
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{error, info};

/// Produces a ready-to-use backend for one model kind.
pub trait BackendLoader: Send + Sync {
    fn load(&self, kind: ModelKind) -> Result<Arc<dyn ScoringBackend>>;
}

/// Loads both backends from the artifacts directory.
pub struct ModelLoader {
    config: ModelsConfig,
}

impl ModelLoader {
    pub fn new(config: ModelsConfig) -> Self {
        Self { config }
    }
}

impl BackendLoader for ModelLoader {
    fn load(&self, kind: ModelKind) -> Result<Arc<dyn ScoringBackend>> {
        match kind {
            ModelKind::TreeEnsemble => {
                let path = self.config.tree_model_path();
                info!(model = %kind, path = %path.display(), "Loading tree ensemble");
                let model = TreeEnsemble::load(&path)
                    .with_context(|| format!("loading {}", path.display()))?;
                info!(model = %kind, trees = model.trees().len(), "Model loaded successfully");
                Ok(Arc::new(model))
            }
            ModelKind::NeuralNet => {
                let model_path = self.config.neural_model_path();
                let scaler_path = self.config.scaler_path();
                info!(
                    model = %kind,
                    path = %model_path.display(),
                    scaler = %scaler_path.display(),
                    "Loading neural network"
                );
                let model = NeuralNet::load(&model_path, &scaler_path, self.config.onnx_threads)
                    .with_context(|| format!("loading {}", model_path.display()))?;
                info!(model = %kind, "Model loaded successfully");
                Ok(Arc::new(model))
            }
        }
    }
}

/// Lazily loaded backends, one per kind.
///
/// Each kind is loaded at most once per process, including when the load
/// fails: the error is stored and handed back to every later caller. A
/// failure for one kind leaves the other untouched.
pub struct ModelRegistry {
    loader: Box<dyn BackendLoader>,
    backends: PerModel<Result<Arc<dyn ScoringBackend>, CoreError>>,
}

impl ModelRegistry {
    pub fn new(loader: Box<dyn BackendLoader>) -> Self {
        Self {
            loader,
            backends: PerModel::new(),
        }
    }

    /// Registry reading artifacts from disk.
    pub fn from_config(config: &ModelsConfig) -> Self {
        Self::new(Box::new(ModelLoader::new(config.clone())))
    }

    pub fn backend(&self, kind: ModelKind) -> Result<Arc<dyn ScoringBackend>, CoreError> {
        self.backends
            .get_or_init(kind, || {
                self.loader.load(kind).map_err(|e| {
                    error!(model = %kind, error = %format!("{:#}", e), "Failed to load model");
                    CoreError::artifact(kind, &e)
                })
            })
            .clone()
    }

    /// Whether a load for `kind` has completed (successfully or not).
    pub fn is_resolved(&self, kind: ModelKind) -> bool {
        self.backends.get(kind).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AttributionConfig;
    use crate::feature_extractor::FeatureVector;
    use crate::models::Attributions;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Constant(ModelKind);

    impl ScoringBackend for Constant {
        fn kind(&self) -> ModelKind {
            self.0
        }

        fn predict_proba(&self, rows: &[FeatureVector]) -> Result<Vec<f64>> {
            Ok(vec![0.5; rows.len()])
        }

        fn attribute(&self, _: &[FeatureVector], _: &AttributionConfig) -> Result<Attributions> {
            anyhow::bail!("not used")
        }
    }

    /// Tree ensemble loads; the network artifact is "missing".
    struct HalfBroken {
        calls: Arc<AtomicUsize>,
    }

    impl BackendLoader for HalfBroken {
        fn load(&self, kind: ModelKind) -> Result<Arc<dyn ScoringBackend>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match kind {
                ModelKind::TreeEnsemble => Ok(Arc::new(Constant(kind))),
                ModelKind::NeuralNet => anyhow::bail!("nn_model.onnx: no such file"),
            }
        }
    }

    #[test]
    fn test_failure_isolated_and_memoized() {
        let calls = Arc::new(AtomicUsize::new(0));
        let registry = ModelRegistry::new(Box::new(HalfBroken {
            calls: calls.clone(),
        }));

        let first = registry.backend(ModelKind::NeuralNet);
        let second = registry.backend(ModelKind::NeuralNet);
        assert!(matches!(first, Err(CoreError::ArtifactLoad { .. })));
        assert_eq!(first.err(), second.err());

        let tree = registry.backend(ModelKind::TreeEnsemble).unwrap();
        assert_eq!(tree.kind(), ModelKind::TreeEnsemble);
        registry.backend(ModelKind::TreeEnsemble).unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_missing_artifacts_reported_per_backend() {
        let config = ModelsConfig {
            artifacts_dir: "/nonexistent/artifacts".to_string(),
            tree_model_file: "xgb_model.json".to_string(),
            neural_model_file: "nn_model.onnx".to_string(),
            scaler_file: "scaler.json".to_string(),
            onnx_threads: 1,
        };
        let registry = ModelRegistry::from_config(&config);

        assert!(!registry.is_resolved(ModelKind::TreeEnsemble));
        match registry.backend(ModelKind::TreeEnsemble) {
            Err(CoreError::ArtifactLoad { model, message }) => {
                assert_eq!(model, ModelKind::TreeEnsemble);
                assert!(message.contains("xgb_model.json"));
            }
            other => panic!("expected artifact error, got {:?}", other.err()),
        }
        assert!(registry.is_resolved(ModelKind::TreeEnsemble));
        assert!(!registry.is_resolved(ModelKind::NeuralNet));
    }
}
