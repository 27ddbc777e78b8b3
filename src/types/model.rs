//! Backend selection token

use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The two interchangeable scoring backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ModelKind {
    /// Gradient-boosted tree ensemble (exact TreeSHAP attributions)
    TreeEnsemble,
    /// Feedforward network behind a standardization scaler (KernelSHAP)
    NeuralNet,
}

impl ModelKind {
    /// Every backend, in a fixed order.
    pub const ALL: [ModelKind; 2] = [ModelKind::TreeEnsemble, ModelKind::NeuralNet];

    /// Canonical token used on the wire.
    pub fn token(&self) -> &'static str {
        match self {
            ModelKind::TreeEnsemble => "treeEnsemble",
            ModelKind::NeuralNet => "neuralNet",
        }
    }
}

impl Default for ModelKind {
    fn default() -> Self {
        ModelKind::TreeEnsemble
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

impl FromStr for ModelKind {
    type Err = CoreError;

    /// Accepts the canonical tokens plus the dashboard's historical
    /// `xgboost` / `tensorflow` names.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "treeEnsemble" | "xgboost" => Ok(ModelKind::TreeEnsemble),
            "neuralNet" | "tensorflow" => Ok(ModelKind::NeuralNet),
            other => Err(CoreError::UnknownModel(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tokens_and_aliases() {
        assert_eq!("treeEnsemble".parse::<ModelKind>(), Ok(ModelKind::TreeEnsemble));
        assert_eq!("xgboost".parse::<ModelKind>(), Ok(ModelKind::TreeEnsemble));
        assert_eq!("neuralNet".parse::<ModelKind>(), Ok(ModelKind::NeuralNet));
        assert_eq!("tensorflow".parse::<ModelKind>(), Ok(ModelKind::NeuralNet));
    }

    #[test]
    fn test_unknown_token_rejected() {
        assert_eq!(
            "randomForest".parse::<ModelKind>(),
            Err(CoreError::UnknownModel("randomForest".to_string()))
        );
    }

    #[test]
    fn test_serde_uses_canonical_token() {
        let json = serde_json::to_string(&ModelKind::NeuralNet).unwrap();
        assert_eq!(json, "\"neuralNet\"");
    }
}
