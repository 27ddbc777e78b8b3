//! Fraud Risk Lab Library
//!
//! Deterministic synthetic card transactions, two interchangeable fraud
//! scoring backends, threshold metrics and additive feature attributions,
//! served over NATS request/reply.

pub mod api;
pub mod attribution;
pub mod cache;
pub mod config;
pub mod consumer;
pub mod engine;
pub mod error;
pub mod evaluation;
pub mod explain;
pub mod feature_extractor;
pub mod generator;
pub mod models;
pub mod producer;
pub mod rounding;
pub mod service_metrics;
pub mod session;
pub mod types;

pub use attribution::AttributionEngine;
pub use config::AppConfig;
pub use engine::RiskLab;
pub use error::CoreError;
pub use evaluation::{evaluate, sweep};
pub use feature_extractor::FeatureExtractor;
pub use generator::generate as generate_dataset;
pub use models::{score, ScoringBackend};
pub use session::SessionCache;
pub use types::{
    AttributionRecord, FeatureImportance, ModelKind, ScoredTransaction, TransactionRecord,
};

/// Feature matrix for a batch of records.
pub fn extract_features(records: &[TransactionRecord]) -> Vec<feature_extractor::FeatureVector> {
    FeatureExtractor::new().extract_batch(records)
}
