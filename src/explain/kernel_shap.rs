//! Model-agnostic KernelSHAP.
//!
//! Each explanation evaluates the model on coalitions of the input (present
//! features taken from `x`, absent ones from every background row) and fits
//! a Shapley-kernel weighted linear model to the averaged outputs. The
//! efficiency constraint `Σφ = f(x) - E[f]` is enforced exactly by
//! eliminating the last feature from the regression.

use super::background::Background;
use crate::feature_extractor::{FeatureVector, FEATURE_COUNT};
use anyhow::{bail, ensure, Result};
use rand::rngs::StdRng;
use rand::Rng;

/// Number of proper, non-empty coalitions of the feature set.
pub const FULL_COALITIONS: usize = (1 << FEATURE_COUNT) - 2;

/// Every single-feature coalition and its complement. Always evaluated, so
/// the regression design has full rank at any sample budget.
pub const MIN_COALITIONS: usize = 2 * FEATURE_COUNT;

/// Explanation of one input row.
#[derive(Debug, Clone, PartialEq)]
pub struct KernelExplanation {
    pub contributions: FeatureVector,
    /// Model output for the explained row
    pub output: f64,
}

/// KernelSHAP explainer over a batch prediction function.
pub struct KernelExplainer<'a, F> {
    model: F,
    background: &'a Background,
    nsamples: usize,
    expected_value: f64,
}

impl<'a, F> KernelExplainer<'a, F>
where
    F: Fn(&[FeatureVector]) -> Result<Vec<f64>>,
{
    /// Build an explainer; evaluates the model once over the background.
    pub fn new(model: F, background: &'a Background, nsamples: usize) -> Result<Self> {
        ensure!(!background.is_empty(), "background sample is empty");
        ensure!(
            nsamples >= MIN_COALITIONS,
            "need at least {} coalition samples, got {}",
            MIN_COALITIONS,
            nsamples
        );

        let outputs = model(&background.rows)?;
        ensure!(
            outputs.len() == background.len(),
            "model returned {} outputs for {} background rows",
            outputs.len(),
            background.len()
        );
        let expected_value = weighted_mean(&outputs, &background.weights);

        Ok(Self {
            model,
            background,
            nsamples,
            expected_value,
        })
    }

    /// Mean model output over the background.
    pub fn expected_value(&self) -> f64 {
        self.expected_value
    }

    /// Explain one row. `rng` is only drawn from when the sample budget is
    /// smaller than the full coalition space.
    pub fn explain(&self, x: &FeatureVector, rng: &mut StdRng) -> Result<KernelExplanation> {
        let output = match (self.model)(std::slice::from_ref(x))?.first() {
            Some(&v) => v,
            None => bail!("model returned no output"),
        };

        let coalitions = coalitions(self.nsamples, rng);
        let values = self.coalition_values(x, &coalitions)?;
        let contributions = self.solve(&coalitions, &values, output)?;

        Ok(KernelExplanation {
            contributions,
            output,
        })
    }

    /// Background-averaged model output for each coalition.
    fn coalition_values(&self, x: &FeatureVector, coalitions: &[(u32, f64)]) -> Result<Vec<f64>> {
        let bg = self.background;
        let mut batch = Vec::with_capacity(coalitions.len() * bg.len());
        for &(mask, _) in coalitions {
            for row in &bg.rows {
                let mut synth = *row;
                for f in 0..FEATURE_COUNT {
                    if mask & (1 << f) != 0 {
                        synth[f] = x[f];
                    }
                }
                batch.push(synth);
            }
        }

        let outputs = (self.model)(&batch)?;
        ensure!(
            outputs.len() == batch.len(),
            "model returned {} outputs for {} coalition rows",
            outputs.len(),
            batch.len()
        );
        Ok(outputs
            .chunks(bg.len())
            .map(|chunk| weighted_mean(chunk, &bg.weights))
            .collect())
    }

    fn solve(&self, coalitions: &[(u32, f64)], values: &[f64], output: f64) -> Result<FeatureVector> {
        const LAST: usize = FEATURE_COUNT - 1;
        let delta = output - self.expected_value;

        let mut gram = [[0.0; LAST]; LAST];
        let mut rhs = [0.0; LAST];
        for (&(mask, weight), &value) in coalitions.iter().zip(values) {
            let z = |f: usize| if mask & (1 << f) != 0 { 1.0 } else { 0.0 };
            let z_last = z(LAST);
            let y = value - self.expected_value - z_last * delta;
            let mut a = [0.0; LAST];
            for (f, slot) in a.iter_mut().enumerate() {
                *slot = z(f) - z_last;
            }
            for i in 0..LAST {
                rhs[i] += weight * a[i] * y;
                for j in 0..LAST {
                    gram[i][j] += weight * a[i] * a[j];
                }
            }
        }

        let beta = solve_linear(gram, rhs)?;
        let mut phi = [0.0; FEATURE_COUNT];
        phi[..LAST].copy_from_slice(&beta);
        phi[LAST] = delta - beta.iter().sum::<f64>();
        Ok(phi)
    }
}

/// Shapley kernel weight of a coalition of size `s` among `m` features.
pub fn shapley_kernel(m: usize, s: usize) -> f64 {
    (m - 1) as f64 / (binomial(m, s) * s as f64 * (m - s) as f64)
}

/// Coalition masks with regression weights. The full space is enumerated
/// when the budget allows. Otherwise sizes 1 and `m - 1` are enumerated
/// with their exact kernel weights and the rest of the budget is spent on
/// complementary pairs of the middle sizes, drawn in proportion to their
/// kernel mass and sharing that mass equally.
fn coalitions(nsamples: usize, rng: &mut StdRng) -> Vec<(u32, f64)> {
    let m = FEATURE_COUNT;
    let full = (1u32 << m) - 1;
    if nsamples >= FULL_COALITIONS {
        return (1u32..full)
            .map(|mask| (mask, shapley_kernel(m, mask.count_ones() as usize)))
            .collect();
    }

    let edge_weight = shapley_kernel(m, 1);
    let mut out = Vec::with_capacity(nsamples.max(MIN_COALITIONS));
    for f in 0..m {
        out.push((1u32 << f, edge_weight));
        out.push((full ^ (1u32 << f), edge_weight));
    }

    let pairs = nsamples.saturating_sub(MIN_COALITIONS) / 2;
    if pairs == 0 {
        return out;
    }

    // total kernel mass of each middle size s = 2..=m-2
    let size_mass: Vec<f64> = (2..m - 1).map(|s| (m - 1) as f64 / (s * (m - s)) as f64).collect();
    let total_mass: f64 = size_mass.iter().sum();
    let weight = total_mass / (2 * pairs) as f64;

    for _ in 0..pairs {
        let mut target = rng.gen::<f64>() * total_mass;
        let mut size = m - 2;
        for (i, mass) in size_mass.iter().enumerate() {
            target -= mass;
            if target <= 0.0 {
                size = i + 2;
                break;
            }
        }

        let mut order: Vec<usize> = (0..m).collect();
        let mut mask = 0u32;
        for i in 0..size {
            let j = rng.gen_range(i..m);
            order.swap(i, j);
            mask |= 1 << order[i];
        }
        out.push((mask, weight));
        out.push((full ^ mask, weight));
    }
    out
}

fn binomial(n: usize, k: usize) -> f64 {
    (0..k).fold(1.0, |acc, i| acc * (n - i) as f64 / (i + 1) as f64)
}

fn weighted_mean(values: &[f64], weights: &[f64]) -> f64 {
    values.iter().zip(weights).map(|(v, w)| v * w).sum()
}

/// Gaussian elimination with partial pivoting.
fn solve_linear<const N: usize>(mut a: [[f64; N]; N], mut b: [f64; N]) -> Result<[f64; N]> {
    for col in 0..N {
        let pivot = (col..N)
            .max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))
            .unwrap_or(col);
        if a[pivot][col].abs() < 1e-12 {
            bail!("coalition design is singular; increase the sample budget");
        }
        a.swap(col, pivot);
        b.swap(col, pivot);

        for row in col + 1..N {
            let factor = a[row][col] / a[col][col];
            for k in col..N {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = [0.0; N];
    for row in (0..N).rev() {
        let tail: f64 = (row + 1..N).map(|k| a[row][k] * x[k]).sum();
        x[row] = (b[row] - tail) / a[row][row];
    }
    Ok(x)
}
