//! Feature extraction for risk-model inference.
//!
//! Maps a transaction to the six numeric inputs both backends were trained
//! on. Column order here must match the order used when the model
//! artifacts were produced.

use crate::generator::{CITIES, MERCHANTS};
use crate::types::transaction::TransactionRecord;

/// Number of model input features.
pub const FEATURE_COUNT: usize = 6;

/// One row of model input, in [`FEATURE_NAMES`] order.
pub type FeatureVector = [f64; FEATURE_COUNT];

/// Column names as seen by the models.
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "amount",
    "hour",
    "velocity",
    "dist_from_home",
    "merchant_encoded",
    "city_encoded",
];

/// Column names as shown on the dashboard.
pub const FEATURE_DISPLAY_NAMES: [&str; FEATURE_COUNT] = [
    "Transaction Amount",
    "Time of Day",
    "Velocity (txns/hr)",
    "Distance from Home",
    "Merchant Category",
    "City",
];

/// Code assigned to a category missing from its vocabulary.
pub const UNKNOWN_CATEGORY: f64 = -1.0;

/// Ordinal encoder over a fixed vocabulary.
#[derive(Debug, Clone)]
pub struct OrdinalEncoder {
    categories: &'static [&'static str],
}

impl OrdinalEncoder {
    pub const fn new(categories: &'static [&'static str]) -> Self {
        Self { categories }
    }

    /// Vocabulary index of `value`, or [`UNKNOWN_CATEGORY`].
    pub fn encode(&self, value: &str) -> f64 {
        self.categories
            .iter()
            .position(|&c| c == value)
            .map(|i| i as f64)
            .unwrap_or(UNKNOWN_CATEGORY)
    }
}

/// Transforms transactions into model input rows.
pub struct FeatureExtractor {
    merchants: OrdinalEncoder,
    cities: OrdinalEncoder,
}

impl FeatureExtractor {
    /// Create an extractor over the generator's fixed vocabularies.
    pub fn new() -> Self {
        Self {
            merchants: OrdinalEncoder::new(&MERCHANTS),
            cities: OrdinalEncoder::new(&CITIES),
        }
    }

    /// Extract features from a single transaction.
    pub fn extract(&self, tx: &TransactionRecord) -> FeatureVector {
        [
            tx.amount,
            tx.hour as f64,
            tx.velocity as f64,
            tx.dist_from_home as f64,
            self.merchants.encode(&tx.merchant),
            self.cities.encode(&tx.city),
        ]
    }

    /// Extract the feature matrix for a batch, one row per record.
    pub fn extract_batch(&self, records: &[TransactionRecord]) -> Vec<FeatureVector> {
        records.iter().map(|tx| self.extract(tx)).collect()
    }

    pub fn feature_count(&self) -> usize {
        FEATURE_COUNT
    }

    pub fn feature_names(&self) -> &'static [&'static str] {
        &FEATURE_NAMES
    }
}

impl Default for FeatureExtractor {
    fn default() -> Self {
        Self::new()
    }
}
