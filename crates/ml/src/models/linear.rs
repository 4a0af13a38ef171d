//! Ordinary least squares with intercept.
//!
//! Fitted on standardized inputs through the normal equations (see
//! [`glm`](super::glm)). Raw
//! predictions are unconstrained; clamping to `>= 0` happens at the
//! artifact boundary.

use ndarray::Array1;
use serde::{Deserialize, Serialize};

use super::glm::{design_matrix, linear_predictor, weighted_least_squares};
use crate::error::ModelError;
use crate::features::FeatureVector;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearParams {
    /// Diagonal load keeping collinear columns solvable.
    pub ridge: f64,
}

impl Default for LinearParams {
    fn default() -> Self {
        Self { ridge: 1e-8 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearRegression {
    pub intercept: f64,
    pub coefficients: Vec<f64>,
}

impl LinearRegression {
    pub fn fit(x: &[FeatureVector], y: &[f64], params: &LinearParams) -> Result<Self, ModelError> {
        if x.is_empty() {
            return Err(ModelError::EmptyTrainingSet);
        }
        let design = design_matrix(x)?;
        let targets = Array1::from(y.to_vec());
        let beta = weighted_least_squares(&design, None, &targets, params.ridge)
            .ok_or_else(|| ModelError::Singular("least-squares normal equations".into()))?;

        Ok(Self {
            intercept: beta[0],
            coefficients: beta.iter().skip(1).copied().collect(),
        })
    }

    #[inline]
    pub fn predict(&self, features: &[f64]) -> f64 {
        linear_predictor(self.intercept, &self.coefficients, features)
    }

    pub fn n_features(&self) -> usize {
        self.coefficients.len()
    }
}
