//! Synthetic transaction records

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// One generated card transaction with its ground-truth label.
///
/// Records are produced by the generator in a fixed order and never
/// mutated afterwards; `id` is `TXN-NNNNN`, 1-based.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    /// Sequential identifier (`TXN-00001`, `TXN-00002`, ...)
    pub id: String,

    /// Amount in currency units, rounded to 2 decimals
    pub amount: f64,

    /// Merchant name from the fixed merchant vocabulary
    pub merchant: String,

    /// City name from the fixed city vocabulary
    pub city: String,

    /// Card network
    pub card_type: String,

    /// Hour of day (0-23)
    pub hour: u32,

    /// Recent transaction count for the card
    pub velocity: u32,

    /// Distance from the cardholder's home, rounded to whole units
    pub dist_from_home: u32,

    /// Ground truth
    pub is_fraud: bool,

    /// Wall-clock time inside the fixed generation window
    #[serde(rename = "date")]
    pub timestamp: NaiveDateTime,
}

/// A record together with the risk score one backend assigned to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoredTransaction {
    #[serde(flatten)]
    pub record: TransactionRecord,
    /// Fraud probability, 3 decimals
    pub risk_score: f64,
    /// `risk_score` above the dashboard flag threshold
    pub flagged: bool,
}

impl ScoredTransaction {
    pub fn new(record: TransactionRecord, risk_score: f64, flag_threshold: f64) -> Self {
        Self {
            record,
            risk_score,
            flagged: risk_score > flag_threshold,
        }
    }
}
