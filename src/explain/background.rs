//! Weighted k-means summary of a reference dataset.
//!
//! KernelSHAP evaluates the model once per background row per coalition, so
//! the full evaluation set is compressed to at most `k` weighted centroids.

use crate::feature_extractor::{FeatureVector, FEATURE_COUNT};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

const MAX_ITERATIONS: usize = 100;

/// Reference rows with weights summing to 1.
#[derive(Debug, Clone, PartialEq)]
pub struct Background {
    pub rows: Vec<FeatureVector>,
    pub weights: Vec<f64>,
}

impl Background {
    /// Every row weighted equally.
    pub fn uniform(rows: Vec<FeatureVector>) -> Self {
        let w = if rows.is_empty() { 0.0 } else { 1.0 / rows.len() as f64 };
        let weights = vec![w; rows.len()];
        Self { rows, weights }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Summarize `data` into at most `k` weighted centroids.
///
/// Uses seeded k-means++ initialisation and Lloyd iterations. Each centroid
/// coordinate is then snapped to the nearest value observed in that column
/// so categorical codes stay valid. Weights are cluster shares.
pub fn summarize(data: &[FeatureVector], k: usize, seed: u64) -> Background {
    if data.len() <= k || k == 0 {
        return Background::uniform(data.to_vec());
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut centers = init_plus_plus(data, k, &mut rng);
    let mut assignment = vec![usize::MAX; data.len()];

    for iteration in 0..MAX_ITERATIONS {
        let mut changed = false;
        for (i, row) in data.iter().enumerate() {
            let nearest = nearest_center(row, &centers);
            if assignment[i] != nearest {
                assignment[i] = nearest;
                changed = true;
            }
        }
        if !changed {
            debug!(iteration, "k-means converged");
            break;
        }

        let mut sums = vec![[0.0; FEATURE_COUNT]; centers.len()];
        let mut counts = vec![0usize; centers.len()];
        for (row, &c) in data.iter().zip(&assignment) {
            counts[c] += 1;
            for f in 0..FEATURE_COUNT {
                sums[c][f] += row[f];
            }
        }
        for (c, center) in centers.iter_mut().enumerate() {
            // empty clusters keep their previous position
            if counts[c] > 0 {
                for f in 0..FEATURE_COUNT {
                    center[f] = sums[c][f] / counts[c] as f64;
                }
            }
        }
    }

    let mut counts = vec![0usize; centers.len()];
    for &c in &assignment {
        counts[c] += 1;
    }

    let n = data.len() as f64;
    let (rows, weights) = centers
        .iter()
        .zip(&counts)
        .filter(|(_, &count)| count > 0)
        .map(|(center, &count)| (snap_to_observed(center, data), count as f64 / n))
        .unzip();

    Background { rows, weights }
}

fn init_plus_plus(data: &[FeatureVector], k: usize, rng: &mut StdRng) -> Vec<FeatureVector> {
    let mut centers = vec![data[rng.gen_range(0..data.len())]];
    let mut dist: Vec<f64> = data.iter().map(|row| sq_dist(row, &centers[0])).collect();

    while centers.len() < k {
        let total: f64 = dist.iter().sum();
        if total <= 0.0 {
            // fewer distinct points than clusters
            break;
        }
        let mut target = rng.gen::<f64>() * total;
        let mut chosen = dist.iter().rposition(|&d| d > 0.0).unwrap_or(data.len() - 1);
        for (i, d) in dist.iter().enumerate() {
            target -= d;
            if target <= 0.0 && *d > 0.0 {
                chosen = i;
                break;
            }
        }
        let center = data[chosen];
        for (d, row) in dist.iter_mut().zip(data) {
            *d = d.min(sq_dist(row, &center));
        }
        centers.push(center);
    }
    centers
}

fn nearest_center(row: &FeatureVector, centers: &[FeatureVector]) -> usize {
    let mut best = 0;
    let mut best_dist = f64::INFINITY;
    for (c, center) in centers.iter().enumerate() {
        let d = sq_dist(row, center);
        if d < best_dist {
            best = c;
            best_dist = d;
        }
    }
    best
}

fn snap_to_observed(center: &FeatureVector, data: &[FeatureVector]) -> FeatureVector {
    let mut snapped = *center;
    for f in 0..FEATURE_COUNT {
        let mut best = data[0][f];
        for row in data {
            if (row[f] - center[f]).abs() < (best - center[f]).abs() {
                best = row[f];
            }
        }
        snapped[f] = best;
    }
    snapped
}

fn sq_dist(a: &FeatureVector, b: &FeatureVector) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_blobs() -> Vec<FeatureVector> {
        let mut rows = Vec::new();
        for i in 0..30 {
            let jitter = (i % 5) as f64 * 0.1;
            rows.push([1.0 + jitter, 1.0, 0.0, 0.0, 0.0, 0.0]);
        }
        for i in 0..10 {
            let jitter = (i % 5) as f64 * 0.1;
            rows.push([50.0 + jitter, 9.0, 0.0, 0.0, 3.0, 0.0]);
        }
        rows
    }

    #[test]
    fn test_small_data_kept_as_is() {
        let data = vec![[1.0; 6], [2.0; 6]];
        let bg = summarize(&data, 50, 42);
        assert_eq!(bg.rows, data);
        assert_eq!(bg.weights, vec![0.5, 0.5]);
    }

    #[test]
    fn test_weights_sum_to_one() {
        let bg = summarize(&two_blobs(), 2, 42);
        assert_eq!(bg.len(), 2);
        assert!((bg.weights.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        let mut weights = bg.weights.clone();
        weights.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert!((weights[0] - 0.25).abs() < 1e-12);
        assert!((weights[1] - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_centroids_snap_to_observed_values() {
        let data = two_blobs();
        let bg = summarize(&data, 2, 7);
        for row in &bg.rows {
            for f in 0..FEATURE_COUNT {
                assert!(data.iter().any(|d| d[f] == row[f]));
            }
        }
    }

    #[test]
    fn test_deterministic_for_seed() {
        let data = two_blobs();
        assert_eq!(summarize(&data, 3, 11), summarize(&data, 3, 11));
    }

    #[test]
    fn test_identical_points_collapse() {
        let data = vec![[4.0; 6]; 20];
        let bg = summarize(&data, 5, 1);
        assert_eq!(bg.len(), 1);
        assert_eq!(bg.weights, vec![1.0]);
    }
}
