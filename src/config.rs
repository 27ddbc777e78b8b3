//! Configuration management for the risk lab service

use crate::explain::kernel_shap::MIN_COALITIONS;
use anyhow::{ensure, Context, Result};
use config::{Config, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub nats: NatsConfig,
    pub dataset: DatasetConfig,
    pub models: ModelsConfig,
    pub attribution: AttributionConfig,
    pub service: ServiceConfig,
    pub logging: LoggingConfig,
}

/// NATS connection configuration
#[derive(Debug, Clone, Deserialize)]
pub struct NatsConfig {
    /// NATS server URL
    pub url: String,
    /// Request subjects live under `<prefix>.<endpoint>`
    pub subject_prefix: String,
}

/// Session dataset parameters
#[derive(Debug, Clone, Deserialize)]
pub struct DatasetConfig {
    /// Number of generated transactions
    pub count: usize,
    /// Generator seed
    pub seed: u64,
    /// Transactions scoring above this are flagged in listings
    #[serde(default = "default_flag_threshold")]
    pub flag_threshold: f64,
}

fn default_flag_threshold() -> f64 {
    0.6
}

/// Model artifact locations
#[derive(Debug, Clone, Deserialize)]
pub struct ModelsConfig {
    /// Directory containing all artifacts
    pub artifacts_dir: String,
    /// XGBoost JSON model
    #[serde(default = "default_tree_model_file")]
    pub tree_model_file: String,
    /// ONNX export of the feedforward network
    #[serde(default = "default_neural_model_file")]
    pub neural_model_file: String,
    /// Standardization scaler for the network
    #[serde(default = "default_scaler_file")]
    pub scaler_file: String,
    /// Number of threads for ONNX inference (default: 1)
    #[serde(default = "default_onnx_threads")]
    pub onnx_threads: usize,
}

fn default_tree_model_file() -> String {
    "xgb_model.json".to_string()
}

fn default_neural_model_file() -> String {
    "nn_model.onnx".to_string()
}

fn default_scaler_file() -> String {
    "scaler.json".to_string()
}

fn default_onnx_threads() -> usize {
    1
}

impl ModelsConfig {
    pub fn tree_model_path(&self) -> PathBuf {
        Path::new(&self.artifacts_dir).join(&self.tree_model_file)
    }

    pub fn neural_model_path(&self) -> PathBuf {
        Path::new(&self.artifacts_dir).join(&self.neural_model_file)
    }

    pub fn scaler_path(&self) -> PathBuf {
        Path::new(&self.artifacts_dir).join(&self.scaler_file)
    }
}

/// Attribution parameters
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct AttributionConfig {
    /// k-means background size for KernelSHAP
    pub background_size: usize,
    /// Coalition evaluations per KernelSHAP explanation
    pub nsamples: usize,
    /// Seed for the background summary and coalition sampling
    pub seed: u64,
}

impl Default for AttributionConfig {
    fn default() -> Self {
        Self {
            background_size: 50,
            nsamples: 100,
            seed: 42,
        }
    }
}

/// Request-serving configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Maximum requests processed concurrently
    pub workers: usize,
    /// Seconds between metrics summaries (0 disables)
    #[serde(default = "default_report_interval")]
    pub report_interval_secs: u64,
}

fn default_report_interval() -> u64 {
    60
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (json, pretty)
    pub format: String,
}

impl AppConfig {
    /// Load configuration from file
    pub fn load() -> Result<Self> {
        Self::load_from_path("config/config.toml")
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()))
            .build()
            .context("Failed to build configuration")?;

        let config: Self = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the core cannot run with.
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.attribution.nsamples >= MIN_COALITIONS,
            "attribution.nsamples must be at least {}, got {}",
            MIN_COALITIONS,
            self.attribution.nsamples
        );
        ensure!(
            (0.0..=1.0).contains(&self.dataset.flag_threshold),
            "dataset.flag_threshold {} outside [0, 1]",
            self.dataset.flag_threshold
        );
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            nats: NatsConfig {
                url: "nats://localhost:4222".to_string(),
                subject_prefix: "fraud.api".to_string(),
            },
            dataset: DatasetConfig {
                count: 500,
                seed: 42,
                flag_threshold: default_flag_threshold(),
            },
            models: ModelsConfig {
                artifacts_dir: "artifacts".to_string(),
                tree_model_file: default_tree_model_file(),
                neural_model_file: default_neural_model_file(),
                scaler_file: default_scaler_file(),
                onnx_threads: 1,
            },
            attribution: AttributionConfig::default(),
            service: ServiceConfig {
                workers: 4,
                report_interval_secs: default_report_interval(),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        }
    }
}
