//! Error taxonomy for the scoring core.
//!
//! Loader internals use `anyhow` with context; anything that crosses the
//! core boundary is flattened into a [`CoreError`]. The type is `Clone` so
//! a failed backend load can be stored in its cache cell and handed to every
//! later caller without re-running the load.

use crate::types::model::ModelKind;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors surfaced by the scoring core.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CoreError {
    /// The caller supplied a backend token that names no known model.
    #[error("unknown model '{0}' (expected treeEnsemble or neuralNet)")]
    UnknownModel(String),

    /// A model or scaler artifact is missing or unreadable.
    #[error("failed to load {model} artifacts: {message}")]
    ArtifactLoad { model: ModelKind, message: String },

    /// Inference or attribution failed after the artifacts loaded.
    #[error("{model} inference failed: {message}")]
    Inference { model: ModelKind, message: String },

    /// An attribution was requested for an index outside the evaluation set.
    #[error("transaction index {index} out of range (evaluation set has {len} rows)")]
    NotFound { index: usize, len: usize },
}

impl CoreError {
    /// Short machine-readable label used in service responses.
    pub fn kind(&self) -> &'static str {
        match self {
            CoreError::UnknownModel(_) => "unknown_model",
            CoreError::ArtifactLoad { .. } => "artifact_load",
            CoreError::Inference { .. } => "inference",
            CoreError::NotFound { .. } => "not_found",
        }
    }

    pub(crate) fn artifact(model: ModelKind, err: &anyhow::Error) -> Self {
        CoreError::ArtifactLoad {
            model,
            message: format!("{:#}", err),
        }
    }

    pub(crate) fn inference(model: ModelKind, err: &anyhow::Error) -> Self {
        CoreError::Inference {
            model,
            message: format!("{:#}", err),
        }
    }
}

/// Serializable form of a [`CoreError`] for responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub kind: String,
    pub message: String,
}

impl From<&CoreError> for ErrorBody {
    fn from(err: &CoreError) -> Self {
        Self {
            kind: err.kind().to_string(),
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(CoreError::UnknownModel("svm".into()).kind(), "unknown_model");
        assert_eq!(CoreError::NotFound { index: 9, len: 3 }.kind(), "not_found");
    }

    #[test]
    fn test_artifact_error_keeps_context_chain() {
        let err = anyhow::anyhow!("file not found").context("reading xgb_model.json");
        let core = CoreError::artifact(ModelKind::TreeEnsemble, &err);
        let msg = core.to_string();
        assert!(msg.contains("reading xgb_model.json"));
        assert!(msg.contains("file not found"));
    }

    #[test]
    fn test_error_body() {
        let body = ErrorBody::from(&CoreError::NotFound { index: 600, len: 500 });
        assert_eq!(body.kind, "not_found");
        assert!(body.message.contains("600"));
    }
}
