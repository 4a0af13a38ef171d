//! Gradient boosting regressor with squared loss.
//!
//! # Prediction
//!
//! `init_value + learning_rate * Σ stage_tree(x)`
//!
//! # Fitting
//!
//! Starts from the target mean. Each stage fits a regression tree to the
//! current residuals on a subsample of rows drawn without replacement,
//! then adds its shrunken output to every row's running prediction.

use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::decision_tree::{RegressionTree, TreeParams};
use crate::error::ModelError;
use crate::features::FeatureVector;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoostingParams {
    pub n_estimators: usize,
    pub max_depth: usize,
    pub learning_rate: f64,
    /// Fraction of rows used by each stage, in `(0, 1]`.
    pub subsample: f64,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub seed: u64,
}

impl Default for BoostingParams {
    fn default() -> Self {
        Self {
            n_estimators: 150,
            max_depth: 6,
            learning_rate: 0.1,
            subsample: 0.8,
            min_samples_split: 20,
            min_samples_leaf: 10,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientBoosting {
    pub n_features: usize,
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub init_value: f64,
    pub stages: Vec<RegressionTree>,
}

impl GradientBoosting {
    pub fn fit(x: &[FeatureVector], y: &[f64], params: &BoostingParams) -> Result<Self, ModelError> {
        if x.is_empty() {
            return Err(ModelError::EmptyTrainingSet);
        }
        if !(params.learning_rate > 0.0 && params.learning_rate <= 1.0) {
            return Err(ModelError::InvalidParameters(format!(
                "Invalid learning_rate: {} (should be 0 < lr <= 1)",
                params.learning_rate
            )));
        }
        if !(params.subsample > 0.0 && params.subsample <= 1.0) {
            return Err(ModelError::InvalidParameters(format!(
                "Invalid subsample: {} (should be 0 < s <= 1)",
                params.subsample
            )));
        }

        let n = x.len();
        let init_value = series::mean(y).unwrap_or(0.0);
        let tree_params = TreeParams {
            max_depth: params.max_depth,
            min_samples_split: params.min_samples_split,
            min_samples_leaf: params.min_samples_leaf,
            max_features: None,
        };
        let sample_size = ((params.subsample * n as f64).ceil() as usize).clamp(1, n);
        let mut rng = StdRng::seed_from_u64(params.seed);

        let mut current = vec![init_value; n];
        let mut residuals = vec![0.0; n];
        let mut stages = Vec::with_capacity(params.n_estimators);

        for _ in 0..params.n_estimators {
            for i in 0..n {
                residuals[i] = y[i] - current[i];
            }
            let rows = if sample_size < n {
                rand::seq::index::sample(&mut rng, n, sample_size).into_vec()
            } else {
                (0..n).collect()
            };

            let tree = RegressionTree::fit(x, &residuals, rows, &tree_params, &mut rng);
            for (pred, row) in current.iter_mut().zip(x) {
                *pred += params.learning_rate * tree.predict(row);
            }
            stages.push(tree);
        }

        debug!(stages = stages.len(), rows = n, init_value, "Fitted gradient boosting");

        Ok(Self {
            n_features: x[0].len(),
            n_estimators: stages.len(),
            learning_rate: params.learning_rate,
            init_value,
            stages,
        })
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        if self.stages.len() != self.n_estimators {
            return Err(ModelError::InvalidParameters(format!(
                "n_estimators ({}) doesn't match stages count ({})",
                self.n_estimators,
                self.stages.len()
            )));
        }
        if !(self.learning_rate > 0.0 && self.learning_rate <= 1.0) {
            return Err(ModelError::InvalidParameters(format!(
                "Invalid learning_rate: {} (should be 0 < lr <= 1)",
                self.learning_rate
            )));
        }
        if !self.init_value.is_finite() {
            return Err(ModelError::InvalidParameters("init_value is not finite".into()));
        }
        self.stages
            .iter()
            .try_for_each(|t| t.validate(self.n_features))
    }

    /// Raw boosted score; may be negative.
    pub fn predict(&self, features: &[f64]) -> f64 {
        self.stages.iter().fold(self.init_value, |acc, tree| {
            acc + self.learning_rate * tree.predict(features)
        })
    }
}
