//! Path-dependent TreeSHAP.
//!
//! Polynomial-time exact Shapley values for a single regression tree, where
//! absent features follow the training cover fractions down both branches.
//! The running path tracks, for every distinct feature split on so far, the
//! fraction of "zero" (feature absent) and "one" (feature present) paths and
//! the permutation weights of each subset size.

use crate::feature_extractor::FeatureVector;
use crate::models::tree_ensemble::Tree;

#[derive(Debug, Clone, Copy)]
struct PathElement {
    feature: Option<usize>,
    zero_fraction: f64,
    one_fraction: f64,
    pweight: f64,
}

/// Add this tree's SHAP values for `x` into `phi`.
///
/// Summed over the tree, the added values equal
/// `tree.predict(x) - tree.expected_value()`.
pub fn accumulate(tree: &Tree, x: &FeatureVector, phi: &mut FeatureVector) {
    recurse(tree, x, phi, 0, Vec::with_capacity(8), 1.0, 1.0, None);
}

#[allow(clippy::too_many_arguments)]
fn recurse(
    tree: &Tree,
    x: &FeatureVector,
    phi: &mut FeatureVector,
    idx: usize,
    mut path: Vec<PathElement>,
    zero_fraction: f64,
    one_fraction: f64,
    feature: Option<usize>,
) {
    extend(&mut path, zero_fraction, one_fraction, feature);
    let node = &tree.nodes[idx];

    if node.is_leaf() {
        for i in 1..path.len() {
            let weight = unwound_sum(&path, i);
            let el = path[i];
            if let Some(f) = el.feature {
                phi[f] += weight * (el.one_fraction - el.zero_fraction) * node.value;
            }
        }
        return;
    }

    let hot = tree.next_node(node, x);
    let cold = if hot == node.left as usize {
        node.right as usize
    } else {
        node.left as usize
    };
    let (left_frac, right_frac) = tree.child_fractions(node);
    let (hot_zero, cold_zero) = if hot == node.left as usize {
        (left_frac, right_frac)
    } else {
        (right_frac, left_frac)
    };

    // A feature split on twice keeps a single path entry
    let mut incoming_zero = 1.0;
    let mut incoming_one = 1.0;
    if let Some(k) = path.iter().position(|e| e.feature == Some(node.feature)) {
        incoming_zero = path[k].zero_fraction;
        incoming_one = path[k].one_fraction;
        unwind(&mut path, k);
    }

    recurse(
        tree,
        x,
        phi,
        hot,
        path.clone(),
        hot_zero * incoming_zero,
        incoming_one,
        Some(node.feature),
    );
    recurse(
        tree,
        x,
        phi,
        cold,
        path,
        cold_zero * incoming_zero,
        0.0,
        Some(node.feature),
    );
}

fn extend(path: &mut Vec<PathElement>, zero_fraction: f64, one_fraction: f64, feature: Option<usize>) {
    let depth = path.len();
    path.push(PathElement {
        feature,
        zero_fraction,
        one_fraction,
        pweight: if depth == 0 { 1.0 } else { 0.0 },
    });

    let denom = (depth + 1) as f64;
    for i in (0..depth).rev() {
        path[i + 1].pweight += one_fraction * path[i].pweight * (i + 1) as f64 / denom;
        path[i].pweight = zero_fraction * path[i].pweight * (depth - i) as f64 / denom;
    }
}

fn unwind(path: &mut Vec<PathElement>, path_index: usize) {
    let depth = path.len() - 1;
    let one_fraction = path[path_index].one_fraction;
    let zero_fraction = path[path_index].zero_fraction;
    let denom = (depth + 1) as f64;
    let mut next_one_portion = path[depth].pweight;

    for i in (0..depth).rev() {
        if one_fraction != 0.0 {
            let tmp = path[i].pweight;
            path[i].pweight = next_one_portion * denom / ((i + 1) as f64 * one_fraction);
            next_one_portion = tmp - path[i].pweight * zero_fraction * (depth - i) as f64 / denom;
        } else {
            path[i].pweight = path[i].pweight * denom / (zero_fraction * (depth - i) as f64);
        }
    }

    // pweights stay in place; only the split descriptors shift down
    for i in path_index..depth {
        path[i].feature = path[i + 1].feature;
        path[i].zero_fraction = path[i + 1].zero_fraction;
        path[i].one_fraction = path[i + 1].one_fraction;
    }
    path.pop();
}

/// Total permutation weight of the path with element `path_index` removed.
fn unwound_sum(path: &[PathElement], path_index: usize) -> f64 {
    let depth = path.len() - 1;
    let one_fraction = path[path_index].one_fraction;
    let zero_fraction = path[path_index].zero_fraction;
    let denom = (depth + 1) as f64;
    let mut next_one_portion = path[depth].pweight;
    let mut total = 0.0;

    for i in (0..depth).rev() {
        if one_fraction != 0.0 {
            let tmp = next_one_portion * denom / ((i + 1) as f64 * one_fraction);
            total += tmp;
            next_one_portion = path[i].pweight - tmp * zero_fraction * (depth - i) as f64 / denom;
        } else if zero_fraction != 0.0 {
            total += path[i].pweight / zero_fraction / ((depth - i) as f64 / denom);
        }
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature_extractor::FEATURE_COUNT;
    use crate::models::tree_ensemble::Node;

    /// E[f(x) | x_S] with absent features following cover fractions.
    fn conditional_expectation(tree: &Tree, idx: usize, x: &FeatureVector, present: u32) -> f64 {
        let node = &tree.nodes[idx];
        if node.is_leaf() {
            return node.value;
        }
        if present & (1 << node.feature) != 0 {
            return conditional_expectation(tree, tree.next_node(node, x), x, present);
        }
        let (fl, fr) = tree.child_fractions(node);
        fl * conditional_expectation(tree, node.left as usize, x, present)
            + fr * conditional_expectation(tree, node.right as usize, x, present)
    }

    /// Shapley values by enumerating every coalition.
    fn brute_force(tree: &Tree, x: &FeatureVector) -> FeatureVector {
        let m = FEATURE_COUNT;
        let factorial = |n: usize| (1..=n).product::<usize>() as f64;
        let mut phi = [0.0; FEATURE_COUNT];
        for i in 0..m {
            for subset in 0u32..(1 << m) {
                if subset & (1 << i) != 0 {
                    continue;
                }
                let s = subset.count_ones() as usize;
                let weight = factorial(s) * factorial(m - s - 1) / factorial(m);
                let with = conditional_expectation(tree, 0, x, subset | (1 << i));
                let without = conditional_expectation(tree, 0, x, subset);
                phi[i] += weight * (with - without);
            }
        }
        phi
    }

    /// Depth-3 tree that splits on feature 0 twice and on features 2 and 4.
    fn deep_tree() -> Tree {
        Tree::new(vec![
            Node::split(0, 500.0, 1, 2, 100.0),
            Node::split(2, 5.0, 3, 4, 70.0),
            Node::split(4, 7.5, 5, 6, 30.0),
            Node::leaf(-2.0, 60.0),
            Node::split(0, 100.0, 7, 8, 10.0),
            Node::leaf(0.5, 12.0),
            Node::leaf(3.0, 18.0),
            Node::leaf(-0.5, 4.0),
            Node::leaf(1.5, 6.0),
        ])
        .unwrap()
    }

    #[test]
    fn test_matches_brute_force_shapley() {
        let tree = deep_tree();
        let inputs = [
            [50.0, 3.0, 8.0, 10.0, 1.0, 2.0],
            [900.0, 2.0, 1.0, 4000.0, 9.0, 7.0],
            [250.0, 4.0, 2.0, 20.0, 3.0, 0.0],
            [600.0, 1.0, 12.0, 900.0, 5.0, 3.0],
        ];
        for x in &inputs {
            let mut phi = [0.0; FEATURE_COUNT];
            accumulate(&tree, x, &mut phi);
            let expected = brute_force(&tree, x);
            for f in 0..FEATURE_COUNT {
                assert!(
                    (phi[f] - expected[f]).abs() < 1e-9,
                    "feature {}: {} vs {}",
                    f,
                    phi[f],
                    expected[f]
                );
            }
        }
    }

    #[test]
    fn test_local_accuracy() {
        let tree = deep_tree();
        let x = [150.0, 0.0, 9.0, 0.0, 2.0, 0.0];
        let mut phi = [0.0; FEATURE_COUNT];
        accumulate(&tree, &x, &mut phi);
        let total: f64 = phi.iter().sum();
        assert!((tree.expected_value() + total - tree.predict(&x)).abs() < 1e-9);
    }

    #[test]
    fn test_unused_features_get_zero() {
        let tree = deep_tree();
        let mut phi = [0.0; FEATURE_COUNT];
        accumulate(&tree, &[10.0, 1.0, 1.0, 1.0, 1.0, 1.0], &mut phi);
        assert_eq!(phi[1], 0.0);
        assert_eq!(phi[3], 0.0);
        assert_eq!(phi[5], 0.0);
    }
}
