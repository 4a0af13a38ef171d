//! Random forest regressor: bootstrap-aggregated CART trees.
//!
//! # Prediction
//!
//! 1. Traverse each tree to its leaf value
//! 2. Average the leaf values across all trees
//!
//! # Fitting
//!
//! Tree `i` draws its bootstrap sample and per-split column subsets from
//! its own `StdRng` seeded with `seed + i`, so a fit is reproducible whether
//! trees are grown in parallel or not.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::decision_tree::{RegressionTree, TreeParams};
use crate::error::ModelError;
use crate::features::FeatureVector;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForestParams {
    pub n_trees: usize,
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_trees: 150,
            max_depth: 12,
            min_samples_split: 5,
            min_samples_leaf: 2,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    pub n_features: usize,
    pub n_estimators: usize,
    pub trees: Vec<RegressionTree>,
}

impl RandomForest {
    pub fn fit(
        x: &[FeatureVector],
        y: &[f64],
        params: &ForestParams,
        force_sequential: bool,
    ) -> Result<Self, ModelError> {
        if x.is_empty() {
            return Err(ModelError::EmptyTrainingSet);
        }
        if params.n_trees == 0 {
            return Err(ModelError::InvalidParameters("forest needs at least one tree".into()));
        }

        let n = x.len();
        let n_features = x[0].len();
        let tree_params = TreeParams {
            max_depth: params.max_depth,
            min_samples_split: params.min_samples_split,
            min_samples_leaf: params.min_samples_leaf,
            max_features: Some(((n_features as f64).sqrt() as usize).max(1)),
        };

        let trees = parallel::map_range(
            params.n_trees,
            |i| {
                let mut rng = StdRng::seed_from_u64(params.seed.wrapping_add(i as u64));
                let bootstrap: Vec<usize> = (0..n).map(|_| rng.random_range(0..n)).collect();
                RegressionTree::fit(x, y, bootstrap, &tree_params, &mut rng)
            },
            force_sequential,
        );

        debug!(
            trees = trees.len(),
            rows = n,
            max_depth = trees.iter().map(RegressionTree::depth).max().unwrap_or(0),
            "Fitted random forest"
        );

        Ok(Self {
            n_features,
            n_estimators: trees.len(),
            trees,
        })
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        if self.trees.is_empty() {
            return Err(ModelError::InvalidParameters("random forest has no trees".into()));
        }
        if self.trees.len() != self.n_estimators {
            return Err(ModelError::InvalidParameters(format!(
                "n_estimators ({}) doesn't match trees count ({})",
                self.n_estimators,
                self.trees.len()
            )));
        }
        self.trees.iter().try_for_each(|t| t.validate(self.n_features))
    }

    pub fn predict(&self, features: &[f64]) -> f64 {
        if self.trees.is_empty() {
            return 0.0;
        }
        let sum: f64 = self.trees.iter().map(|t| t.predict(features)).sum();
        sum / self.trees.len() as f64
    }
}
