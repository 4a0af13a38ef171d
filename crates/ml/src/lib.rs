//! Feature engineering, regressors and model artifacts for demand forecasting.
//!
//! # Architecture
//!
//! ```text
//! group series ──► TemporalFeatures ─┐
//!                                    ├─► EncoderState::transform ──► FeatureVector
//! request / row ──► EncoderInput ────┘                                    │
//!                                                                         ▼
//!                         ModelArtifact { encoder, regressor, metrics, thresholds }
//! ```
//!
//! Every [`ModelArtifact`] owns the encoder it was trained with; there is no
//! shared global encoder. Regressors form the closed [`Regressor`] enum.
//!
//! # Usage
//!
//! ```ignore
//! use ml::{ModelArtifact, TemporalFeatures, EncoderInput};
//!
//! let artifact = ModelArtifact::from_json_str(&json)?;
//! let temporal = TemporalFeatures::from_series(&series, request.period());
//! let encoded = artifact.encode(&EncoderInput::from(&request), &temporal)?;
//! let estimate = artifact.predict(&encoded.vector)?;
//! ```

pub mod artifact;
pub mod error;
pub mod features;
pub mod metrics;
pub mod models;

pub use artifact::{ARTIFACT_FORMAT_VERSION, ModelArtifact};
pub use error::{EncodeError, ModelError};
pub use features::{
    Encoded, EncoderInput, EncoderState, FeatureColumn, FeatureVector, N_FEATURES,
    TemporalFeatures,
};
pub use metrics::{EvaluationMetrics, evaluate};
pub use models::{Hyperparameters, Regressor};
