//! Regressor families and their fitting entry point.
//!
//! The set is closed: [`Regressor`] is an enum tagged by `model_type`, one
//! variant per [`ModelKind`]. Capability questions (scaling, clamping) are
//! answered by [`ModelKind`] itself.

mod decision_tree;
mod gradient_boosted;
pub mod glm;
mod linear;
mod poisson;
mod random_forest;

use serde::{Deserialize, Serialize};
use types::ModelKind;

use crate::error::ModelError;
use crate::features::FeatureVector;

pub use decision_tree::{RegressionNode, RegressionTree, TreeParams};
pub use gradient_boosted::{BoostingParams, GradientBoosting};
pub use linear::{LinearParams, LinearRegression};
pub use poisson::{PoissonFit, PoissonParams, PoissonRegression};
pub use random_forest::{ForestParams, RandomForest};

/// Per-family hyper-parameters.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Hyperparameters {
    pub linear: LinearParams,
    pub poisson: PoissonParams,
    pub random_forest: ForestParams,
    pub gradient_boosting: BoostingParams,
}

/// A trained regressor of one of the four families.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model_type", rename_all = "snake_case")]
pub enum Regressor {
    Linear(LinearRegression),
    Poisson(PoissonRegression),
    RandomForest(RandomForest),
    GradientBoosting(GradientBoosting),
}

impl Regressor {
    /// Fit a regressor of `kind` on an already-encoded matrix.
    pub fn fit(
        kind: ModelKind,
        x: &[FeatureVector],
        y: &[f64],
        params: &Hyperparameters,
        force_sequential: bool,
    ) -> Result<Self, ModelError> {
        if x.len() != y.len() {
            return Err(ModelError::WidthMismatch {
                expected: x.len(),
                actual: y.len(),
            });
        }
        Ok(match kind {
            ModelKind::Linear => Regressor::Linear(LinearRegression::fit(x, y, &params.linear)?),
            ModelKind::Poisson => Regressor::Poisson(PoissonRegression::fit(x, y, &params.poisson)?),
            ModelKind::RandomForest => Regressor::RandomForest(RandomForest::fit(
                x,
                y,
                &params.random_forest,
                force_sequential,
            )?),
            ModelKind::GradientBoosting => Regressor::GradientBoosting(GradientBoosting::fit(
                x,
                y,
                &params.gradient_boosting,
            )?),
        })
    }

    pub fn kind(&self) -> ModelKind {
        match self {
            Regressor::Linear(_) => ModelKind::Linear,
            Regressor::Poisson(_) => ModelKind::Poisson,
            Regressor::RandomForest(_) => ModelKind::RandomForest,
            Regressor::GradientBoosting(_) => ModelKind::GradientBoosting,
        }
    }

    /// Width of the vectors this regressor was fitted on.
    pub fn n_features(&self) -> usize {
        match self {
            Regressor::Linear(m) => m.n_features(),
            Regressor::Poisson(m) => m.n_features(),
            Regressor::RandomForest(m) => m.n_features,
            Regressor::GradientBoosting(m) => m.n_features,
        }
    }

    /// Raw model output, before any clamping.
    pub fn predict(&self, features: &[f64]) -> f64 {
        match self {
            Regressor::Linear(m) => m.predict(features),
            Regressor::Poisson(m) => m.predict(features),
            Regressor::RandomForest(m) => m.predict(features),
            Regressor::GradientBoosting(m) => m.predict(features),
        }
    }

    /// Structural checks for parameters loaded from storage.
    pub fn validate(&self) -> Result<(), ModelError> {
        let finite = |values: &[f64]| values.iter().all(|v| v.is_finite());
        match self {
            Regressor::Linear(m) => {
                if !m.intercept.is_finite() || !finite(&m.coefficients) {
                    return Err(ModelError::InvalidParameters(
                        "linear coefficients are not finite".into(),
                    ));
                }
                Ok(())
            }
            Regressor::Poisson(m) => {
                if !m.intercept.is_finite() || !finite(&m.coefficients) {
                    return Err(ModelError::InvalidParameters(
                        "poisson coefficients are not finite".into(),
                    ));
                }
                Ok(())
            }
            Regressor::RandomForest(m) => m.validate(),
            Regressor::GradientBoosting(m) => m.validate(),
        }
    }
}
