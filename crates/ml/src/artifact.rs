//! Persisted model artifact: regressor + owned encoder + evaluation.
//!
//! # JSON Format
//!
//! ```json
//! {
//!   "format_version": 1,
//!   "model_type": "random_forest",
//!   "regressor": { "model_type": "random_forest", "n_features": 15, ... },
//!   "encoder": { "schema_version": 1, "columns": ["year", ...], ... },
//!   "metrics": { "train": {...}, "test": {...} },
//!   "thresholds": { "low_upper": 4.0, "high_lower": 12.0 },
//!   "requires_scaling": false,
//!   "n_samples": 1200,
//!   "training_seconds": 3.2
//! }
//! ```
//!
//! Loading validates the whole artifact, so a value returned by
//! [`ModelArtifact::from_json_str`] is always internally consistent.

use serde::{Deserialize, Serialize};
use types::{DemandThresholds, ModelKind};

use crate::error::ModelError;
use crate::features::{Encoded, EncoderInput, EncoderState, TemporalFeatures};
use crate::metrics::EvaluationMetrics;
use crate::models::Regressor;

/// Bumped on incompatible layout changes.
pub const ARTIFACT_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub format_version: u32,
    pub model_type: ModelKind,
    pub regressor: Regressor,
    pub encoder: EncoderState,
    pub metrics: EvaluationMetrics,
    pub thresholds: DemandThresholds,
    pub requires_scaling: bool,
    pub n_samples: usize,
    pub training_seconds: f64,
}

impl ModelArtifact {
    pub fn to_json(&self) -> Result<String, ModelError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Decode and validate an artifact.
    pub fn from_json_str(json: &str) -> Result<Self, ModelError> {
        let artifact: Self = serde_json::from_str(json)?;
        artifact.validate()?;
        Ok(artifact)
    }

    pub fn from_json_slice(bytes: &[u8]) -> Result<Self, ModelError> {
        let artifact: Self = serde_json::from_slice(bytes)?;
        artifact.validate()?;
        Ok(artifact)
    }

    /// Cross-checks version, model family, scaling and feature width.
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.format_version != ARTIFACT_FORMAT_VERSION {
            return Err(ModelError::FormatVersion {
                found: self.format_version,
                expected: ARTIFACT_FORMAT_VERSION,
            });
        }
        if self.regressor.kind() != self.model_type {
            return Err(ModelError::InvalidParameters(format!(
                "artifact labelled {} holds a {} regressor",
                self.model_type,
                self.regressor.kind()
            )));
        }
        if self.requires_scaling != self.model_type.requires_scaling()
            || self.encoder.scaler.is_some() != self.requires_scaling
        {
            return Err(ModelError::InvalidParameters(format!(
                "scaling flags inconsistent for {}",
                self.model_type
            )));
        }
        self.encoder.check_schema()?;
        if self.regressor.n_features() != self.encoder.width() {
            return Err(ModelError::WidthMismatch {
                expected: self.encoder.width(),
                actual: self.regressor.n_features(),
            });
        }
        if self.thresholds.low_upper > self.thresholds.high_lower {
            return Err(ModelError::InvalidParameters(
                "demand thresholds are not ordered".into(),
            ));
        }
        self.regressor.validate()
    }

    /// Encode a request with this artifact's own encoder.
    pub fn encode(
        &self,
        input: &EncoderInput<'_>,
        temporal: &TemporalFeatures,
    ) -> Result<Encoded, ModelError> {
        Ok(self.encoder.transform(input, temporal)?)
    }

    /// Point estimate for an encoded vector, clamped to `>= 0` for families
    /// whose raw output can go negative.
    pub fn predict(&self, vector: &[f64]) -> Result<f64, ModelError> {
        let expected = self.regressor.n_features();
        if vector.len() != expected {
            return Err(ModelError::WidthMismatch {
                expected,
                actual: vector.len(),
            });
        }

        let raw = self.regressor.predict(vector);
        if !raw.is_finite() {
            return Err(ModelError::NonFinite);
        }
        Ok(if self.model_type.needs_clamp() {
            raw.max(0.0)
        } else {
            raw
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{FeatureVector, N_FEATURES};
    use crate::models::LinearRegression;
    use types::{Metrics, Period};

    fn input() -> EncoderInput<'static> {
        EncoderInput {
            period: Period::new(2024, 3),
            region: "LIMA",
            service_category: "GENERAL",
            insurance_plan: "GRATUITO",
            sex: "M",
            ipress_level: "II",
            age_group: "30-59",
        }
    }

    /// Linear artifact whose only non-zero coefficient is on `lag_1`.
    pub(crate) fn linear_artifact(intercept: f64, lag_weight: f64) -> ModelArtifact {
        let inputs = [input(), input()];
        let temporal = [
            TemporalFeatures {
                lag_1: 0.0,
                ..Default::default()
            },
            TemporalFeatures {
                lag_1: 10.0,
                ..Default::default()
            },
        ];
        let encoder = EncoderState::fit(&inputs, &[4.0, 8.0], &temporal, true).unwrap();
        let mut coefficients = vec![0.0; N_FEATURES];
        coefficients[5] = lag_weight;

        ModelArtifact {
            format_version: ARTIFACT_FORMAT_VERSION,
            model_type: ModelKind::Linear,
            regressor: Regressor::Linear(LinearRegression {
                intercept,
                coefficients,
            }),
            encoder,
            metrics: EvaluationMetrics {
                test: Metrics {
                    r2: 0.5,
                    rmse: 2.0,
                    mae: 1.5,
                },
                ..Default::default()
            },
            thresholds: DemandThresholds {
                low_upper: 3.0,
                high_lower: 9.0,
            },
            requires_scaling: true,
            n_samples: 2,
            training_seconds: 0.01,
        }
    }

    #[test]
    fn test_persist_then_load_predicts_identically() {
        let artifact = linear_artifact(6.0, 1.7);
        let encoded = artifact
            .encode(
                &input(),
                &TemporalFeatures {
                    lag_1: 7.0,
                    ..Default::default()
                },
            )
            .unwrap();

        let json = artifact.to_json().unwrap();
        let loaded = ModelArtifact::from_json_str(&json).unwrap();
        assert_eq!(loaded, artifact);
        assert_eq!(
            loaded.predict(&encoded.vector).unwrap().to_bits(),
            artifact.predict(&encoded.vector).unwrap().to_bits()
        );
    }

    #[test]
    fn test_linear_output_is_clamped() {
        let artifact = linear_artifact(-50.0, 0.0);
        let vector: FeatureVector = std::iter::repeat_n(0.0, N_FEATURES).collect();
        assert_eq!(artifact.predict(&vector).unwrap(), 0.0);
    }

    #[test]
    fn test_width_mismatch_is_rejected() {
        let artifact = linear_artifact(1.0, 0.0);
        let err = artifact.predict(&[1.0, 2.0]).unwrap_err();
        assert!(matches!(err, ModelError::WidthMismatch { .. }));
    }

    #[test]
    fn test_load_rejects_wrong_version_and_kind() {
        let mut artifact = linear_artifact(1.0, 0.0);
        artifact.format_version = 99;
        let json = serde_json::to_string(&artifact).unwrap();
        assert!(matches!(
            ModelArtifact::from_json_str(&json),
            Err(ModelError::FormatVersion { found: 99, .. })
        ));

        let mut artifact = linear_artifact(1.0, 0.0);
        artifact.model_type = ModelKind::Poisson;
        let json = serde_json::to_string(&artifact).unwrap();
        assert!(ModelArtifact::from_json_str(&json).is_err());
    }

    #[test]
    fn test_load_rejects_garbage() {
        assert!(matches!(
            ModelArtifact::from_json_str("{ not json"),
            Err(ModelError::Serialization(_))
        ));
    }
}
