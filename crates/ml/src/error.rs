//! Error types for encoding, fitting and artifact decoding.

use thiserror::Error;

/// Failures while turning a request into a feature vector.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EncodeError {
    /// A fixed-vocabulary column received a value outside its category list.
    #[error("unknown {field} '{value}'")]
    UnknownCategory { field: &'static str, value: String },

    #[error("month {0} outside 1..=12")]
    InvalidMonth(u32),

    /// The recorded column list or category schema differs from this build.
    #[error("encoder schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("cannot fit encoder: {0}")]
    Fit(String),
}

impl EncodeError {
    /// Whether the error is caused by the request rather than the artifact.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            EncodeError::UnknownCategory { .. } | EncodeError::InvalidMonth(_)
        )
    }
}

/// Failures while fitting, validating or evaluating a regressor.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("training set is empty")]
    EmptyTrainingSet,

    #[error("feature width mismatch: expected {expected}, got {actual}")]
    WidthMismatch { expected: usize, actual: usize },

    /// Normal equations could not be solved.
    #[error("singular system: {0}")]
    Singular(String),

    #[error("invalid model parameters: {0}")]
    InvalidParameters(String),

    #[error("unsupported artifact format version {found} (expected {expected})")]
    FormatVersion { found: u32, expected: u32 },

    #[error("model produced a non-finite estimate")]
    NonFinite,

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error("artifact (de)serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}
