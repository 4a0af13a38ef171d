//! Evaluation metrics recorded on every artifact.

use serde::{Deserialize, Serialize};
use types::Metrics;

/// Fit quality of one trained artifact.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct EvaluationMetrics {
    pub train: Metrics,
    pub test: Metrics,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cv_r2_mean: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cv_r2_std: Option<f64>,
    /// Poisson only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aic: Option<f64>,
    /// Poisson only (McFadden).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pseudo_r2: Option<f64>,
}

/// r2 / rmse / mae of `predicted` against `actual`. Empty input scores zero.
pub fn evaluate(actual: &[f64], predicted: &[f64]) -> Metrics {
    use series::stats::{mae, r2_score, rmse};

    Metrics {
        r2: r2_score(actual, predicted).unwrap_or(0.0),
        rmse: rmse(actual, predicted).unwrap_or(0.0),
        mae: mae(actual, predicted).unwrap_or(0.0),
    }
}
