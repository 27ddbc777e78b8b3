//! Request decoding, dispatch to the core and response envelopes

use crate::engine::RiskLab;
use crate::error::{CoreError, ErrorBody};
use crate::types::model::ModelKind;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Threshold used when a request does not name one.
pub const DEFAULT_THRESHOLD: f64 = 0.5;

/// Request subjects, relative to the configured prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Transactions,
    Evaluate,
    Roc,
    Features,
    ShapGlobal,
    ShapTransaction,
    Summary,
    Compare,
}

impl Endpoint {
    pub const ALL: [Endpoint; 8] = [
        Endpoint::Transactions,
        Endpoint::Evaluate,
        Endpoint::Roc,
        Endpoint::Features,
        Endpoint::ShapGlobal,
        Endpoint::ShapTransaction,
        Endpoint::Summary,
        Endpoint::Compare,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Endpoint::Transactions => "transactions",
            Endpoint::Evaluate => "evaluate",
            Endpoint::Roc => "roc",
            Endpoint::Features => "features",
            Endpoint::ShapGlobal => "shap.global",
            Endpoint::ShapTransaction => "shap.transaction",
            Endpoint::Summary => "summary",
            Endpoint::Compare => "compare",
        }
    }

    pub fn subject(&self, prefix: &str) -> String {
        format!("{}.{}", prefix, self.name())
    }

    /// Endpoint addressed by a full subject under `prefix`.
    pub fn from_subject(prefix: &str, subject: &str) -> Option<Self> {
        let rest = subject.strip_prefix(prefix)?.strip_prefix('.')?;
        Self::ALL.into_iter().find(|e| e.name() == rest)
    }
}

/// Request body shared by every endpoint; unused fields are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
}

impl ApiRequest {
    /// An empty payload is an empty request.
    pub fn parse(payload: &[u8]) -> Result<Self, ApiError> {
        if payload.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        serde_json::from_slice(payload).map_err(|e| ApiError::BadRequest(e.to_string()))
    }

    pub fn model(&self) -> Result<ModelKind, ApiError> {
        match &self.model {
            Some(token) => Ok(token.parse()?),
            None => Ok(ModelKind::default()),
        }
    }

    pub fn threshold(&self) -> Result<f64, ApiError> {
        let threshold = self.threshold.unwrap_or(DEFAULT_THRESHOLD);
        if !(0.0..=1.0).contains(&threshold) {
            return Err(ApiError::BadRequest(format!(
                "threshold {} outside [0, 1]",
                threshold
            )));
        }
        Ok(threshold)
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("failed to encode response: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "bad_request",
            ApiError::Core(e) => e.kind(),
            ApiError::Encode(_) | ApiError::Internal(_) => "internal",
        }
    }
}

impl From<&ApiError> for ErrorBody {
    fn from(err: &ApiError) -> Self {
        Self {
            kind: err.kind().to_string(),
            message: err.to_string(),
        }
    }
}

/// `{ok: true, data}` or `{ok: false, error}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl Envelope {
    pub fn success(data: Value) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(err: &ApiError) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(ErrorBody::from(err)),
        }
    }
}

/// Run one request against the core.
pub fn dispatch(lab: &RiskLab, endpoint: Endpoint, request: &ApiRequest) -> Result<Value, ApiError> {
    let value = match endpoint {
        Endpoint::Transactions => serde_json::to_value(lab.transactions(request.model()?)?)?,
        Endpoint::Evaluate => {
            serde_json::to_value(lab.evaluate(request.model()?, request.threshold()?)?)?
        }
        Endpoint::Roc => serde_json::to_value(lab.roc(request.model()?)?)?,
        Endpoint::Features => serde_json::to_value(lab.feature_importance()?)?,
        Endpoint::ShapGlobal => serde_json::to_value(lab.global_importance(request.model()?)?)?,
        Endpoint::ShapTransaction => {
            let model = request.model()?;
            let index = request
                .index
                .ok_or_else(|| ApiError::BadRequest("missing transaction index".to_string()))?;
            serde_json::to_value(lab.transaction_attribution(model, index)?)?
        }
        Endpoint::Summary => serde_json::to_value(lab.summary(request.model()?)?)?,
        Endpoint::Compare => serde_json::to_value(lab.compare(request.threshold()?))?,
    };
    Ok(value)
}

/// Decode, dispatch and wrap; never fails.
pub fn handle(lab: &RiskLab, endpoint: Endpoint, payload: &[u8]) -> Envelope {
    match ApiRequest::parse(payload).and_then(|request| dispatch(lab, endpoint, &request)) {
        Ok(data) => Envelope::success(data),
        Err(e) => Envelope::failure(&e),
    }
}
