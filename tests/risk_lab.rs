use anyhow::Result;
use fraud_risk_lab::api::{self, Endpoint};
use fraud_risk_lab::config::{AppConfig, AttributionConfig, DatasetConfig};
use fraud_risk_lab::engine::{ReportEntry, RiskLab};
use fraud_risk_lab::feature_extractor::FeatureVector;
use fraud_risk_lab::models::tree_ensemble::sigmoid;
use fraud_risk_lab::models::{
    Attributions, BackendLoader, NeuralNet, Network, ScoringBackend, StandardScaler,
};
use fraud_risk_lab::{CoreError, ModelKind};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

/// Two trees: velocity then distance, and an amount stump.
const XGB_MODEL: &str = r#"{
  "learner": {
    "attributes": {},
    "feature_names": [],
    "feature_types": [],
    "gradient_booster": {
      "model": {
        "gbtree_model_param": {"num_parallel_tree": "1", "num_trees": "2"},
        "tree_info": [0, 0],
        "trees": [
          {
            "id": 0,
            "left_children": [1, -1, 3, -1, -1],
            "right_children": [2, -1, 4, -1, -1],
            "split_indices": [2, 0, 3, 0, 0],
            "split_conditions": [5.0, -1.2, 300.0, 0.3, 1.5],
            "default_left": [1, 0, 1, 0, 0],
            "sum_hessian": [100.0, 90.0, 10.0, 3.0, 7.0],
            "loss_changes": [50.0, 0.0, 4.0, 0.0, 0.0],
            "base_weights": [0.0, -1.2, 1.0, 0.3, 1.5],
            "parents": [2147483647, 0, 0, 2, 2]
          },
          {
            "id": 1,
            "left_children": [1, -1, -1],
            "right_children": [2, -1, -1],
            "split_indices": [0, 0, 0],
            "split_conditions": [1000.0, -0.2, 0.6],
            "default_left": [0, 0, 0],
            "sum_hessian": [100.0, 80.0, 20.0],
            "loss_changes": [10.0, 0.0, 0.0],
            "base_weights": [0.0, -0.2, 0.6],
            "parents": [2147483647, 0, 0]
          }
        ]
      },
      "name": "gbtree"
    },
    "learner_model_param": {
      "base_score": "[8E-2]",
      "num_class": "0",
      "num_feature": "6"
    },
    "objective": {"name": "binary:logistic", "reg_loss_param": {"scale_pos_weight": "1"}}
  },
  "version": [2, 1, 0]
}"#;

fn lab_over_artifacts(dir: &tempfile::TempDir) -> RiskLab {
    let mut config = AppConfig::default();
    config.models.artifacts_dir = dir.path().display().to_string();
    config.dataset.count = 200;
    RiskLab::new(&config)
}

fn artifacts_dir() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("xgb_model.json"), XGB_MODEL).unwrap();
    dir
}

#[test]
fn tree_attributions_conserve_score() {
    let dir = artifacts_dir();
    let lab = lab_over_artifacts(&dir);
    let dataset = lab.dataset(ModelKind::TreeEnsemble).unwrap();
    assert_eq!(dataset.len(), 200);

    for (i, &score) in dataset.scores.iter().enumerate() {
        let record = lab.transaction_attribution(ModelKind::TreeEnsemble, i).unwrap();
        let total = record.base_value + record.contribution_sum();
        assert!((total - record.output_value).abs() < 1e-6, "row {}", i);
        assert!((sigmoid(record.output_value) - score).abs() <= 5e-4 + 1e-12, "row {}", i);

        // sorted by magnitude
        for pair in record.features.windows(2) {
            assert!(pair[0].contribution.abs() >= pair[1].contribution.abs());
        }
        // features the trees never split on get nothing
        for f in &record.features {
            if f.feature == "Time of Day" || f.feature == "Merchant Category" || f.feature == "City" {
                assert_eq!(f.contribution, 0.0);
            }
        }
    }
}

#[test]
fn tree_global_importance_normalized() {
    let dir = artifacts_dir();
    let lab = lab_over_artifacts(&dir);
    let importance = lab.global_importance(ModelKind::TreeEnsemble).unwrap();

    assert_eq!(importance.len(), 6);
    let total: f64 = importance.iter().map(|i| i.importance).sum();
    assert!((total - 1.0).abs() < 1e-3);
    for pair in importance.windows(2) {
        assert!(pair[0].importance >= pair[1].importance);
    }
    assert_eq!(importance[0].feature, "Velocity (txns/hr)");
}

#[test]
fn gain_importance_ranks_split_features() {
    let dir = artifacts_dir();
    let lab = lab_over_artifacts(&dir);
    let importance = lab.feature_importance().unwrap();

    // mean gain per split: velocity 50, amount 10, distance 4
    let order: Vec<&str> = importance[..3].iter().map(|i| i.feature.as_str()).collect();
    assert_eq!(order, ["Velocity (txns/hr)", "Transaction Amount", "Distance from Home"]);
    assert!((importance[0].importance - 50.0 / 64.0).abs() < 1e-4);
    assert!((importance[2].importance - 0.0625).abs() < 1e-12);
    assert!(importance[3..].iter().all(|i| i.importance == 0.0));

    // served from the tree ensemble whichever backend is requested
    let envelope = api::handle(&lab, Endpoint::Features, br#"{"model": "tensorflow"}"#);
    assert!(envelope.ok);
    assert_eq!(envelope.data.unwrap()[0]["feature"], "Velocity (txns/hr)");
}

#[test]
fn missing_network_does_not_affect_tree() {
    let dir = artifacts_dir();
    let lab = lab_over_artifacts(&dir);

    let err = lab.evaluate(ModelKind::NeuralNet, 0.5).unwrap_err();
    assert!(matches!(err, CoreError::ArtifactLoad { model: ModelKind::NeuralNet, .. }));
    assert!(lab.evaluate(ModelKind::TreeEnsemble, 0.5).is_ok());

    let comparison = lab.compare(0.5);
    assert!(matches!(comparison.tree_ensemble, ReportEntry::Report(_)));
    assert!(matches!(comparison.neural_net, ReportEntry::Failed { .. }));
}

#[test]
fn api_errors_are_enveloped() {
    let dir = artifacts_dir();
    let lab = lab_over_artifacts(&dir);

    let envelope = api::handle(&lab, Endpoint::Roc, br#"{"model": "svm"}"#);
    assert!(!envelope.ok);
    assert_eq!(envelope.error.unwrap().kind, "unknown_model");

    let envelope = api::handle(&lab, Endpoint::ShapTransaction, br#"{"index": 10000}"#);
    assert_eq!(envelope.error.unwrap().kind, "not_found");

    let envelope = api::handle(&lab, Endpoint::ShapTransaction, b"{}");
    assert_eq!(envelope.error.unwrap().kind, "bad_request");

    let envelope = api::handle(&lab, Endpoint::Evaluate, br#"{"model": "xgboost", "threshold": 0.6}"#);
    assert!(envelope.ok);
    let data = envelope.data.unwrap();
    let counts: u64 = ["tp", "fp", "fn", "tn"]
        .iter()
        .map(|k| data[*k].as_u64().unwrap())
        .sum();
    assert_eq!(counts, 200);

    let envelope = api::handle(&lab, Endpoint::Transactions, b"");
    let data = envelope.data.unwrap();
    assert_eq!(data["transactions"].as_array().unwrap().len(), 200);
    assert_eq!(data["transactions"][0]["id"], "TXN-00001");
    assert!(data["transactions"][0]["riskScore"].is_number());
}

/// Logistic model on scaled velocity and distance.
struct Logistic;

impl Network for Logistic {
    fn forward(&self, rows: &[FeatureVector]) -> Result<Vec<f64>> {
        Ok(rows
            .iter()
            .map(|r| 1.0 / (1.0 + (-(1.2 * r[2] + 0.7 * r[3] - 1.5)).exp()))
            .collect())
    }
}

struct NetworkOnly;

impl BackendLoader for NetworkOnly {
    fn load(&self, kind: ModelKind) -> Result<Arc<dyn ScoringBackend>> {
        match kind {
            ModelKind::NeuralNet => {
                let scaler = StandardScaler::new(
                    vec![200.0, 12.0, 3.0, 300.0, 4.0, 3.0],
                    vec![300.0, 7.0, 3.0, 1500.0, 3.0, 0.0],
                )?;
                Ok(Arc::new(NeuralNet::new(Box::new(Logistic), scaler)))
            }
            ModelKind::TreeEnsemble => anyhow::bail!("xgb_model.json missing"),
        }
    }
}

#[test]
fn network_attributions_are_efficient_and_reproducible() {
    let settings = AttributionConfig {
        background_size: 10,
        nsamples: 100,
        seed: 42,
    };
    let dataset = DatasetConfig {
        count: 60,
        seed: 42,
        flag_threshold: 0.6,
    };
    let lab = RiskLab::with_loader(Box::new(NetworkOnly), dataset.clone(), settings.clone());
    let scores = lab.dataset(ModelKind::NeuralNet).unwrap().scores.clone();

    for (i, &score) in scores.iter().enumerate() {
        let record = lab.transaction_attribution(ModelKind::NeuralNet, i).unwrap();
        assert!((record.base_value + record.contribution_sum() - record.output_value).abs() < 1e-6);
        assert!((record.output_value - score).abs() <= 5e-4 + 1e-12);
    }

    let again = RiskLab::with_loader(Box::new(NetworkOnly), dataset, settings);
    assert_eq!(
        lab.transaction_attribution(ModelKind::NeuralNet, 17).unwrap(),
        again.transaction_attribution(ModelKind::NeuralNet, 17).unwrap()
    );
    assert_eq!(
        lab.global_importance(ModelKind::NeuralNet).unwrap(),
        again.global_importance(ModelKind::NeuralNet).unwrap()
    );
}

/// Constant scorer that counts its attribution runs.
struct Counted {
    attributions: Arc<AtomicUsize>,
}

impl ScoringBackend for Counted {
    fn kind(&self) -> ModelKind {
        ModelKind::TreeEnsemble
    }

    fn predict_proba(&self, rows: &[FeatureVector]) -> Result<Vec<f64>> {
        Ok(rows.iter().map(|r| r[2] / 20.0).collect())
    }

    fn attribute(&self, rows: &[FeatureVector], _: &AttributionConfig) -> Result<Attributions> {
        self.attributions.fetch_add(1, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(30));
        Ok(Attributions {
            base_value: 0.0,
            contributions: rows.iter().map(|r| [0.0, 0.0, r[2] / 20.0, 0.0, 0.0, 0.0]).collect(),
            outputs: self.predict_proba(rows)?,
        })
    }
}

struct SlowLoader {
    loads: Arc<AtomicUsize>,
    attributions: Arc<AtomicUsize>,
}

impl BackendLoader for SlowLoader {
    fn load(&self, _kind: ModelKind) -> Result<Arc<dyn ScoringBackend>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(30));
        Ok(Arc::new(Counted {
            attributions: self.attributions.clone(),
        }))
    }
}

#[test]
fn concurrent_first_access_computes_once() {
    let loads = Arc::new(AtomicUsize::new(0));
    let attributions = Arc::new(AtomicUsize::new(0));
    let lab = Arc::new(RiskLab::with_loader(
        Box::new(SlowLoader {
            loads: loads.clone(),
            attributions: attributions.clone(),
        }),
        DatasetConfig {
            count: 50,
            seed: 42,
            flag_threshold: 0.6,
        },
        AttributionConfig::default(),
    ));

    let barrier = Arc::new(Barrier::new(8));
    let handles: Vec<_> = (0..8)
        .map(|i| {
            let lab = lab.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                if i % 2 == 0 {
                    lab.global_importance(ModelKind::TreeEnsemble).unwrap()[0].feature.clone()
                } else {
                    lab.transaction_attribution(ModelKind::TreeEnsemble, i).unwrap().features[0]
                        .feature
                        .clone()
                }
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().unwrap(), "Velocity (txns/hr)");
    }
    assert_eq!(loads.load(Ordering::SeqCst), 1);
    assert_eq!(attributions.load(Ordering::SeqCst), 1);
}
