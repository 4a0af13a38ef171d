//! Unified error handling for the forecasting core.
//!
//! # Design Principles
//!
//! - **Declarative**: Each variant declares whether it is retried and how a
//!   batch item reports it
//! - **SoC**: Lower crates keep their own error types; conversion happens at
//!   this boundary

use history::HistoryError;
use ml::{EncodeError, ModelError};
use thiserror::Error;
use types::ModelKind;

/// Forecasting error type.
#[derive(Debug, Error)]
pub enum ForecastError {
    /// Caller input out of range or outside a fixed vocabulary. Never retried.
    #[error("validation error: {0}")]
    Validation(String),

    /// No artifact has been trained for this model. Never retried.
    #[error("no trained artifact for model '{0}'")]
    ArtifactNotFound(ModelKind),

    /// Storage I/O kept failing after the configured retries.
    #[error("transient storage error: {0}")]
    TransientStorage(String),

    /// Artifact bytes could not be decoded or failed validation.
    #[error("corrupt artifact for model '{model}': {reason}")]
    CorruptArtifact { model: ModelKind, reason: String },

    /// Encoder/regressor disagreement detected while serving.
    #[error("contract violation: {0}")]
    ContractViolation(String),

    #[error("history source error: {0}")]
    History(#[from] HistoryError),

    #[error("training failed: {0}")]
    Training(String),
}

impl ForecastError {
    /// Short machine-readable kind, used in batch failure entries.
    pub fn kind(&self) -> &'static str {
        match self {
            ForecastError::Validation(_) => "validation",
            ForecastError::ArtifactNotFound(_) => "artifact_not_found",
            ForecastError::TransientStorage(_) => "transient_storage",
            ForecastError::CorruptArtifact { .. } => "corrupt_artifact",
            ForecastError::ContractViolation(_) => "contract_violation",
            ForecastError::History(_) => "history",
            ForecastError::Training(_) => "training",
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, ForecastError::Validation(_))
    }
}

impl From<EncodeError> for ForecastError {
    fn from(err: EncodeError) -> Self {
        if err.is_validation() {
            ForecastError::Validation(err.to_string())
        } else {
            ForecastError::ContractViolation(err.to_string())
        }
    }
}

impl From<ModelError> for ForecastError {
    /// Serving-time model errors. Load-time failures are mapped to
    /// [`ForecastError::CorruptArtifact`] by the cache instead.
    fn from(err: ModelError) -> Self {
        match err {
            ModelError::Encode(e) => e.into(),
            ModelError::WidthMismatch { .. } | ModelError::NonFinite => {
                ForecastError::ContractViolation(err.to_string())
            }
            other => ForecastError::Training(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, ForecastError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_errors_split_by_cause() {
        let unknown = EncodeError::UnknownCategory {
            field: "sex",
            value: "X".into(),
        };
        assert!(ForecastError::from(unknown).is_validation());

        let schema = EncodeError::SchemaMismatch("v2".into());
        assert_eq!(ForecastError::from(schema).kind(), "contract_violation");
    }

    #[test]
    fn test_width_mismatch_is_contract_violation() {
        let err: ForecastError = ModelError::WidthMismatch {
            expected: 15,
            actual: 14,
        }
        .into();
        assert!(matches!(err, ForecastError::ContractViolation(_)));
    }
}
