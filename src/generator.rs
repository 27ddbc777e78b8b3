//! Deterministic synthetic transaction generator.
//!
//! A single seeded RNG is consumed in a fixed per-record draw order:
//! label, hour, amount, velocity, distance, merchant, city, card type, day,
//! minute. Fraudulent records skew towards night hours, large amounts, high
//! velocity, long distances and the tail of the merchant/city vocabularies.

use crate::rounding::round_to;
use crate::types::transaction::TransactionRecord;
use anyhow::{Context, Result};
use chrono::NaiveDate;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Base probability that a generated transaction is fraudulent.
pub const FRAUD_RATE: f64 = 0.08;

/// Merchant vocabulary. Order is load-bearing: it defines the categorical code.
pub const MERCHANTS: [&str; 12] = [
    "Amazon",
    "Walmart",
    "Target",
    "Starbucks",
    "Shell Gas",
    "Whole Foods",
    "Best Buy",
    "Home Depot",
    "Crypto Exchange",
    "Wire Transfer Co",
    "Offshore Electronics",
    "Gift Card Kiosk",
];

/// City vocabulary. Order is load-bearing: it defines the categorical code.
pub const CITIES: [&str; 10] = [
    "New York",
    "Los Angeles",
    "Chicago",
    "Houston",
    "Phoenix",
    "Miami",
    "Lagos",
    "Moscow",
    "Bucharest",
    "Shenzhen",
];

pub const CARD_TYPES: [&str; 4] = ["Visa", "Mastercard", "Amex", "Discover"];

/// Legitimate transactions only use this many leading merchants.
pub const LEGIT_MERCHANT_PREFIX: usize = 8;
/// Legitimate transactions only use this many leading cities.
pub const LEGIT_CITY_PREFIX: usize = 5;

const WINDOW_YEAR: i32 = 2026;
const WINDOW_MONTH: u32 = 2;
const WINDOW_LAST_DAY: u32 = 13;

/// Generator over an explicit, owned RNG.
pub struct TransactionGenerator {
    rng: StdRng,
    counter: usize,
}

impl TransactionGenerator {
    /// Create a generator seeded for reproducible output.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            counter: 0,
        }
    }

    /// Produce the next record in sequence.
    pub fn next_record(&mut self) -> Result<TransactionRecord> {
        self.counter += 1;
        let rng = &mut self.rng;

        let is_fraud = rng.gen::<f64>() < FRAUD_RATE;

        // Fraud skews towards 1am-5am
        let hour = if is_fraud && rng.gen::<f64>() < 0.6 {
            rng.gen_range(1..=5)
        } else {
            rng.gen_range(0..=23)
        };

        let amount = if is_fraud {
            if rng.gen::<f64>() < 0.5 {
                rng.gen::<f64>() * 8000.0 + 2000.0
            } else {
                rng.gen::<f64>() * 500.0 + 10.0
            }
        } else {
            rng.gen::<f64>() * 400.0 + 5.0
        };

        let velocity = if is_fraud {
            rng.gen_range(5..=19)
        } else {
            rng.gen_range(1..=4)
        };

        let dist_from_home = if is_fraud {
            rng.gen::<f64>() * 8000.0 + 500.0
        } else {
            rng.gen::<f64>() * 200.0
        };

        let merchants = if is_fraud {
            &MERCHANTS[..]
        } else {
            &MERCHANTS[..LEGIT_MERCHANT_PREFIX]
        };
        let merchant = merchants[rng.gen_range(0..merchants.len())];

        let cities = if is_fraud {
            &CITIES[..]
        } else {
            &CITIES[..LEGIT_CITY_PREFIX]
        };
        let city = cities[rng.gen_range(0..cities.len())];

        let card_type = CARD_TYPES[rng.gen_range(0..CARD_TYPES.len())];

        let day = rng.gen_range(1..=WINDOW_LAST_DAY);
        let minute = rng.gen_range(0..=59);

        let timestamp = NaiveDate::from_ymd_opt(WINDOW_YEAR, WINDOW_MONTH, day)
            .and_then(|date| date.and_hms_opt(hour, minute, 0))
            .with_context(|| {
                format!("invalid timestamp day={} hour={} minute={}", day, hour, minute)
            })?;

        Ok(TransactionRecord {
            id: format!("TXN-{:05}", self.counter),
            amount: round_to(amount, 2),
            merchant: merchant.to_string(),
            city: city.to_string(),
            card_type: card_type.to_string(),
            hour,
            velocity,
            dist_from_home: dist_from_home.round() as u32,
            is_fraud,
            timestamp,
        })
    }
}

/// Generate `count` records from `seed`. Identical inputs yield identical output.
pub fn generate(count: usize, seed: u64) -> Result<Vec<TransactionRecord>> {
    let mut generator = TransactionGenerator::new(seed);
    (0..count).map(|_| generator.next_record()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_ids_are_sequential_and_padded() {
        let records = generate(12, 7).unwrap();
        assert_eq!(records[0].id, "TXN-00001");
        assert_eq!(records[11].id, "TXN-00012");
    }

    #[test]
    fn test_same_seed_same_sequence() {
        assert_eq!(generate(200, 42).unwrap(), generate(200, 42).unwrap());
    }

    #[test]
    fn test_different_seed_different_sequence() {
        assert_ne!(generate(50, 1).unwrap(), generate(50, 2).unwrap());
    }

    #[test]
    fn test_prefix_is_stable() {
        let short = generate(10, 42).unwrap();
        let long = generate(100, 42).unwrap();
        assert_eq!(short[..], long[..10]);
    }

    #[test]
    fn test_field_ranges_by_label() {
        for tx in generate(2000, 3).unwrap() {
            assert!(tx.hour <= 23);
            assert_eq!(tx.timestamp.year(), 2026);
            assert_eq!(tx.timestamp.month(), 2);
            assert!((1..=13).contains(&tx.timestamp.day()));
            assert_eq!(tx.timestamp.hour(), tx.hour);
            assert!(CARD_TYPES.contains(&tx.card_type.as_str()));

            if tx.is_fraud {
                assert!((5..=19).contains(&tx.velocity));
                assert!((500..=8500).contains(&tx.dist_from_home));
                assert!(tx.amount >= 10.0 && tx.amount <= 10000.0);
                assert!(MERCHANTS.contains(&tx.merchant.as_str()));
                assert!(CITIES.contains(&tx.city.as_str()));
            } else {
                assert!((1..=4).contains(&tx.velocity));
                assert!(tx.dist_from_home <= 200);
                assert!(tx.amount >= 5.0 && tx.amount <= 405.0);
                assert!(MERCHANTS[..LEGIT_MERCHANT_PREFIX].contains(&tx.merchant.as_str()));
                assert!(CITIES[..LEGIT_CITY_PREFIX].contains(&tx.city.as_str()));
            }
        }
    }

    #[test]
    fn test_amount_has_two_decimals() {
        for tx in generate(300, 11).unwrap() {
            assert!(((tx.amount * 100.0).round() - tx.amount * 100.0).abs() < 1e-6);
        }
    }

    #[test]
    fn test_fraud_rate_is_roughly_base_rate() {
        let records = generate(5000, 42).unwrap();
        let rate = records.iter().filter(|t| t.is_fraud).count() as f64 / records.len() as f64;
        assert!(rate > 0.05 && rate < 0.11, "fraud rate {}", rate);
    }
}
