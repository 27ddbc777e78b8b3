//! Gradient-boosted tree ensemble backend.
//!
//! Reads XGBoost's native JSON model format directly so the tree structure
//! is available for exact TreeSHAP attribution. Inference sums leaf values
//! in log-odds space and applies the logistic link.

use super::{Attributions, ScoringBackend};
use crate::attribution::normalized_importance;
use crate::config::AttributionConfig;
use crate::explain::tree_shap;
use crate::feature_extractor::{FeatureVector, FEATURE_COUNT};
use crate::types::attribution::FeatureImportance;
use crate::types::model::ModelKind;
use anyhow::{bail, ensure, Context, Result};
use serde::Deserialize;
use std::path::Path;
use tracing::{info, warn};

/// Child index marking a leaf.
const LEAF: i32 = -1;

/// One node of a regression tree. Leaves carry `value`; splits send
/// `x[feature] < threshold` left, compared in single precision as XGBoost
/// does.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub left: i32,
    pub right: i32,
    pub feature: usize,
    pub threshold: f64,
    pub default_left: bool,
    /// Training hessian mass that reached this node
    pub cover: f64,
    /// Loss reduction of the split; zero on leaves
    pub gain: f64,
    pub value: f64,
}

impl Node {
    pub fn leaf(value: f64, cover: f64) -> Self {
        Self {
            left: LEAF,
            right: LEAF,
            feature: 0,
            threshold: 0.0,
            default_left: true,
            cover,
            gain: 0.0,
            value,
        }
    }

    pub fn split(feature: usize, threshold: f64, left: i32, right: i32, cover: f64) -> Self {
        Self {
            left,
            right,
            feature,
            threshold,
            default_left: true,
            cover,
            gain: 0.0,
            value: 0.0,
        }
    }

    pub fn with_gain(mut self, gain: f64) -> Self {
        self.gain = gain;
        self
    }

    pub fn is_leaf(&self) -> bool {
        self.left == LEAF
    }
}

/// A single regression tree; node 0 is the root.
#[derive(Debug, Clone, PartialEq)]
pub struct Tree {
    pub nodes: Vec<Node>,
}

impl Tree {
    pub fn new(nodes: Vec<Node>) -> Result<Self> {
        ensure!(!nodes.is_empty(), "tree has no nodes");
        for (i, node) in nodes.iter().enumerate() {
            if node.is_leaf() {
                continue;
            }
            ensure!(
                node.feature < FEATURE_COUNT,
                "node {} splits on feature {} (model expects {})",
                i,
                node.feature,
                FEATURE_COUNT
            );
            for child in [node.left, node.right] {
                ensure!(
                    child > i as i32 && (child as usize) < nodes.len(),
                    "node {} has invalid child {}",
                    i,
                    child
                );
            }
        }
        Ok(Self { nodes })
    }

    /// Child taken by `x` at split `node`.
    pub fn next_node(&self, node: &Node, x: &FeatureVector) -> usize {
        let value = x[node.feature];
        let go_left = if value.is_nan() {
            node.default_left
        } else {
            (value as f32) < (node.threshold as f32)
        };
        if go_left {
            node.left as usize
        } else {
            node.right as usize
        }
    }

    /// Fractions of the parent's cover that flow to the left and right child.
    pub fn child_fractions(&self, node: &Node) -> (f64, f64) {
        let left = self.nodes[node.left as usize].cover;
        let right = self.nodes[node.right as usize].cover;
        let total = left + right;
        if total > 0.0 {
            (left / total, right / total)
        } else {
            (0.5, 0.5)
        }
    }

    /// Leaf value reached by `x`.
    pub fn predict(&self, x: &FeatureVector) -> f64 {
        let mut idx = 0;
        loop {
            let node = &self.nodes[idx];
            if node.is_leaf() {
                return node.value;
            }
            idx = self.next_node(node, x);
        }
    }

    /// Cover-weighted mean leaf value.
    pub fn expected_value(&self) -> f64 {
        self.subtree_mean(0)
    }

    fn subtree_mean(&self, idx: usize) -> f64 {
        let node = &self.nodes[idx];
        if node.is_leaf() {
            return node.value;
        }
        let (fl, fr) = self.child_fractions(node);
        fl * self.subtree_mean(node.left as usize) + fr * self.subtree_mean(node.right as usize)
    }
}

/// Boosted ensemble of regression trees with a logistic link.
#[derive(Debug, Clone)]
pub struct TreeEnsemble {
    base_margin: f64,
    trees: Vec<Tree>,
}

impl TreeEnsemble {
    pub fn new(base_margin: f64, trees: Vec<Tree>) -> Self {
        Self { base_margin, trees }
    }

    /// Load an XGBoost JSON model file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read tree model from {:?}", path))?;
        let model = Self::from_json(&raw)
            .with_context(|| format!("Failed to parse tree model from {:?}", path))?;

        info!(
            path = %path.display(),
            trees = model.trees.len(),
            base_margin = model.base_margin,
            "Tree ensemble loaded"
        );
        Ok(model)
    }

    /// Parse the XGBoost JSON document.
    pub fn from_json(raw: &str) -> Result<Self> {
        let file: XgbModelFile = serde_json::from_str(raw).context("not an XGBoost JSON model")?;
        let learner = file.learner;

        let objective = learner
            .objective
            .map(|o| o.name)
            .unwrap_or_else(|| "binary:logistic".to_string());
        let base_score = parse_base_score(&learner.learner_model_param.base_score)?;
        let base_margin = match objective.as_str() {
            "binary:logistic" => logit(base_score),
            "binary:logitraw" => base_score,
            other => {
                warn!(objective = %other, "Unexpected objective, treating base_score as probability");
                logit(base_score)
            }
        };

        let trees = learner
            .gradient_booster
            .model
            .trees
            .into_iter()
            .enumerate()
            .map(|(i, t)| t.into_tree().with_context(|| format!("tree {}", i)))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self::new(base_margin, trees))
    }

    pub fn trees(&self) -> &[Tree] {
        &self.trees
    }

    pub fn base_margin(&self) -> f64 {
        self.base_margin
    }

    /// Raw log-odds output for one row.
    pub fn predict_margin(&self, x: &FeatureVector) -> f64 {
        self.base_margin + self.trees.iter().map(|t| t.predict(x)).sum::<f64>()
    }

    /// Expected log-odds output under the training cover distribution.
    pub fn expected_margin(&self) -> f64 {
        self.base_margin + self.trees.iter().map(Tree::expected_value).sum::<f64>()
    }

    /// Gain importance: each feature's total split gain divided by its
    /// split count, normalised to sum to 1.
    pub fn feature_importance(&self) -> Vec<FeatureImportance> {
        let mut total_gain = [0.0; FEATURE_COUNT];
        let mut splits = [0usize; FEATURE_COUNT];
        for node in self.trees.iter().flat_map(|t| &t.nodes) {
            if !node.is_leaf() {
                total_gain[node.feature] += node.gain;
                splits[node.feature] += 1;
            }
        }

        let mut mean_gain = [0.0; FEATURE_COUNT];
        for f in 0..FEATURE_COUNT {
            if splits[f] > 0 {
                mean_gain[f] = total_gain[f] / splits[f] as f64;
            }
        }
        normalized_importance(&mean_gain)
    }
}

impl ScoringBackend for TreeEnsemble {
    fn kind(&self) -> ModelKind {
        ModelKind::TreeEnsemble
    }

    fn predict_proba(&self, rows: &[FeatureVector]) -> Result<Vec<f64>> {
        Ok(rows.iter().map(|x| sigmoid(self.predict_margin(x))).collect())
    }

    /// Exact path-dependent TreeSHAP; `settings` has no effect on this backend.
    fn attribute(&self, rows: &[FeatureVector], _settings: &AttributionConfig) -> Result<Attributions> {
        let contributions = rows
            .iter()
            .map(|x| {
                let mut phi = [0.0; FEATURE_COUNT];
                for tree in &self.trees {
                    tree_shap::accumulate(tree, x, &mut phi);
                }
                phi
            })
            .collect();

        Ok(Attributions {
            base_value: self.expected_margin(),
            contributions,
            outputs: rows.iter().map(|x| self.predict_margin(x)).collect(),
        })
    }

    fn gain_importance(&self) -> Option<Vec<FeatureImportance>> {
        Some(self.feature_importance())
    }
}

pub fn sigmoid(margin: f64) -> f64 {
    1.0 / (1.0 + (-margin).exp())
}

fn logit(p: f64) -> f64 {
    let p = p.clamp(1e-16, 1.0 - 1e-16);
    (p / (1.0 - p)).ln()
}

/// `base_score` is a string, scalar (`"5E-1"`) or one-element array (`"[5E-1]"`).
fn parse_base_score(raw: &str) -> Result<f64> {
    let trimmed = raw.trim().trim_start_matches('[').trim_end_matches(']');
    let first = trimmed.split(',').next().unwrap_or_default().trim();
    first
        .parse::<f64>()
        .with_context(|| format!("invalid base_score {:?}", raw))
}

#[derive(Deserialize)]
struct XgbModelFile {
    learner: XgbLearner,
}

#[derive(Deserialize)]
struct XgbLearner {
    learner_model_param: XgbModelParam,
    gradient_booster: XgbBooster,
    #[serde(default)]
    objective: Option<XgbObjective>,
}

#[derive(Deserialize)]
struct XgbModelParam {
    base_score: String,
}

#[derive(Deserialize)]
struct XgbObjective {
    name: String,
}

#[derive(Deserialize)]
struct XgbBooster {
    model: XgbGbtree,
}

#[derive(Deserialize)]
struct XgbGbtree {
    trees: Vec<XgbTree>,
}

/// Older exports write `default_left` as 0/1, newer ones as booleans.
#[derive(Deserialize)]
#[serde(untagged)]
enum Flag {
    Bool(bool),
    Int(i64),
}

impl Flag {
    fn is_set(&self) -> bool {
        match self {
            Flag::Bool(b) => *b,
            Flag::Int(i) => *i != 0,
        }
    }
}

#[derive(Deserialize)]
struct XgbTree {
    left_children: Vec<i32>,
    right_children: Vec<i32>,
    split_indices: Vec<usize>,
    split_conditions: Vec<f64>,
    #[serde(default)]
    default_left: Vec<Flag>,
    sum_hessian: Vec<f64>,
    #[serde(default)]
    loss_changes: Vec<f64>,
}

impl XgbTree {
    fn into_tree(self) -> Result<Tree> {
        let n = self.left_children.len();
        if self.right_children.len() != n
            || self.split_indices.len() != n
            || self.split_conditions.len() != n
            || self.sum_hessian.len() != n
        {
            bail!("node arrays have inconsistent lengths");
        }

        let nodes = (0..n)
            .map(|i| {
                let default_left = self.default_left.get(i).map_or(true, Flag::is_set);
                if self.left_children[i] == LEAF {
                    // XGBoost stores leaf values in split_conditions
                    Node::leaf(self.split_conditions[i], self.sum_hessian[i])
                } else {
                    Node {
                        left: self.left_children[i],
                        right: self.right_children[i],
                        feature: self.split_indices[i],
                        threshold: self.split_conditions[i],
                        default_left,
                        cover: self.sum_hessian[i],
                        gain: self.loss_changes.get(i).copied().unwrap_or(0.0),
                        value: 0.0,
                    }
                }
            })
            .collect();

        Tree::new(nodes)
    }
}
