//! Aggregates for the dataset overview

use crate::types::transaction::ScoredTransaction;
use serde::{Deserialize, Serialize};

/// Amount bins as `(label, lower inclusive, upper exclusive)`.
pub const AMOUNT_BINS: [(&str, f64, f64); 6] = [
    ("$0-100", 0.0, 100.0),
    ("$100-500", 100.0, 500.0),
    ("$500-1K", 500.0, 1000.0),
    ("$1K-3K", 1000.0, 3000.0),
    ("$3K-5K", 3000.0, 5000.0),
    ("$5K+", 5000.0, f64::INFINITY),
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourBucket {
    /// `HH:00`
    pub hour: String,
    pub total: usize,
    pub fraud: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AmountBin {
    pub range: String,
    pub legit: usize,
    pub fraud: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetSummary {
    pub total: usize,
    pub total_fraud: usize,
    pub flagged: usize,
    /// 24 buckets, hour 0 first
    pub hourly: Vec<HourBucket>,
    pub amount_distribution: Vec<AmountBin>,
}

pub fn summarize(transactions: &[ScoredTransaction]) -> DatasetSummary {
    let mut hourly: Vec<HourBucket> = (0..24)
        .map(|h| HourBucket {
            hour: format!("{:02}:00", h),
            total: 0,
            fraud: 0,
        })
        .collect();
    let mut amount_distribution: Vec<AmountBin> = AMOUNT_BINS
        .iter()
        .map(|(label, _, _)| AmountBin {
            range: label.to_string(),
            legit: 0,
            fraud: 0,
        })
        .collect();

    for tx in transactions {
        let record = &tx.record;
        if let Some(bucket) = hourly.get_mut(record.hour as usize) {
            bucket.total += 1;
            if record.is_fraud {
                bucket.fraud += 1;
            }
        }

        let bin = AMOUNT_BINS
            .iter()
            .position(|&(_, lo, hi)| record.amount >= lo && record.amount < hi);
        if let Some(bin) = bin {
            let bin = &mut amount_distribution[bin];
            if record.is_fraud {
                bin.fraud += 1;
            } else {
                bin.legit += 1;
            }
        }
    }

    DatasetSummary {
        total: transactions.len(),
        total_fraud: transactions.iter().filter(|t| t.record.is_fraud).count(),
        flagged: transactions.iter().filter(|t| t.flagged).count(),
        hourly,
        amount_distribution,
    }
}
