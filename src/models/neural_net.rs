//! Feedforward neural-network backend.
//!
//! The network itself runs through ONNX Runtime; inputs are standardized
//! with the scaler fitted at training time before every forward pass.
//! Attributions come from KernelSHAP in the scaled feature space against a
//! k-means summary of the evaluation set.

use super::{Attributions, ScoringBackend, StandardScaler};
use crate::config::AttributionConfig;
use crate::explain::{summarize, KernelExplainer};
use crate::feature_extractor::{FeatureVector, FEATURE_COUNT};
use crate::types::model::ModelKind;
use anyhow::{anyhow, Context, Result};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Tensor;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info};

/// Batch forward pass over already-scaled rows, returning probabilities.
pub trait Network: Send + Sync {
    fn forward(&self, rows: &[FeatureVector]) -> Result<Vec<f64>>;
}

/// ONNX export of the trained network.
pub struct OnnxNetwork {
    /// `Session::run` needs exclusive access
    session: Mutex<Session>,
    input_name: String,
    output_name: String,
}

impl OnnxNetwork {
    /// Load an ONNX model file.
    pub fn load<P: AsRef<Path>>(path: P, threads: usize) -> Result<Self> {
        let path = path.as_ref();
        ort::init().commit()?;

        info!(path = %path.display(), threads = threads, "Loading ONNX network");

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(threads)?
            .commit_from_file(path)
            .context(format!("Failed to load network from {:?}", path))?;

        let input_name = session
            .inputs
            .first()
            .map(|i| i.name.clone())
            .unwrap_or_else(|| "input".to_string());

        let output_name = session
            .outputs
            .iter()
            .find(|o| o.name.contains("prob") || o.name.contains("output"))
            .map(|o| o.name.clone())
            .unwrap_or_else(|| {
                session
                    .outputs
                    .last()
                    .map(|o| o.name.clone())
                    .unwrap_or_else(|| "output_0".to_string())
            });

        info!(input = %input_name, output = %output_name, "Network loaded successfully");

        Ok(Self {
            session: Mutex::new(session),
            input_name,
            output_name,
        })
    }
}

impl Network for OnnxNetwork {
    fn forward(&self, rows: &[FeatureVector]) -> Result<Vec<f64>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let shape = vec![rows.len() as i64, FEATURE_COUNT as i64];
        let data: Vec<f32> = rows.iter().flatten().map(|&v| v as f32).collect();
        let input_tensor =
            Tensor::from_array((shape, data)).context("Failed to create input tensor")?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| anyhow!("Lock error: {}", e))?;
        let outputs = session.run(ort::inputs![&self.input_name => input_tensor])?;

        let output = outputs
            .get(self.output_name.as_str())
            .ok_or_else(|| anyhow!("network produced no '{}' output", self.output_name))?;
        let (shape, data) = output.try_extract_tensor::<f32>()?;

        // [n, 1] sigmoid output or [n, 2] class probabilities
        let dims: Vec<i64> = shape.iter().copied().collect();
        let cols = if dims.len() == 2 { dims[1].max(1) as usize } else { 1 };
        let probs = (0..rows.len())
            .map(|r| {
                let idx = if cols >= 2 { r * cols + 1 } else { r * cols };
                data.get(idx)
                    .map(|&p| p as f64)
                    .ok_or_else(|| anyhow!("output tensor too short for {} rows", rows.len()))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(probs)
    }
}

/// Scaler + network pair.
pub struct NeuralNet {
    network: Box<dyn Network>,
    scaler: StandardScaler,
}

impl NeuralNet {
    pub fn new(network: Box<dyn Network>, scaler: StandardScaler) -> Self {
        Self { network, scaler }
    }

    /// Load the ONNX network and its companion scaler.
    pub fn load<P: AsRef<Path>>(model_path: P, scaler_path: P, threads: usize) -> Result<Self> {
        let scaler = StandardScaler::load(scaler_path)?;
        let network = OnnxNetwork::load(model_path, threads)?;
        Ok(Self::new(Box::new(network), scaler))
    }
}

impl ScoringBackend for NeuralNet {
    fn kind(&self) -> ModelKind {
        ModelKind::NeuralNet
    }

    fn predict_proba(&self, rows: &[FeatureVector]) -> Result<Vec<f64>> {
        self.network.forward(&self.scaler.transform_batch(rows))
    }

    fn attribute(&self, rows: &[FeatureVector], settings: &AttributionConfig) -> Result<Attributions> {
        let scaled = self.scaler.transform_batch(rows);
        let background = summarize(&scaled, settings.background_size, settings.seed);
        debug!(
            background = background.len(),
            nsamples = settings.nsamples,
            "KernelSHAP background ready"
        );

        let explainer = KernelExplainer::new(
            |batch: &[FeatureVector]| self.network.forward(batch),
            &background,
            settings.nsamples,
        )?;

        let mut contributions = Vec::with_capacity(rows.len());
        let mut outputs = Vec::with_capacity(rows.len());
        for (i, x) in scaled.iter().enumerate() {
            // per-row stream so results do not depend on evaluation order
            let mut rng = StdRng::seed_from_u64(settings.seed ^ i as u64);
            let explanation = explainer
                .explain(x, &mut rng)
                .with_context(|| format!("explaining row {}", i))?;
            contributions.push(explanation.contributions);
            outputs.push(explanation.output);
        }

        Ok(Attributions {
            base_value: explainer.expected_value(),
            contributions,
            outputs,
        })
    }
}
