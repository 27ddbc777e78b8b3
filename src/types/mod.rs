//! Type definitions shared across the scoring core

pub mod attribution;
pub mod model;
pub mod transaction;

pub use attribution::{AttributionRecord, FeatureContribution, FeatureImportance};
pub use model::ModelKind;
pub use transaction::{ScoredTransaction, TransactionRecord};
