//! Poisson GLM with log link, fitted by iteratively reweighted least squares.
//!
//! # Fitting
//!
//! Starting from `β = [ln ȳ, 0, ...]`, each iteration solves the weighted
//! normal equations with working response `z = η + (y - μ) / μ` and weights
//! `w = μ`, where `μ = exp(η)`. Iteration stops when the relative deviance
//! change drops below `tol` or after `max_iter` rounds.
//!
//! `η` is clamped to `[-30, 30]` during fitting and prediction so `exp`
//! never overflows. Estimates are `exp(η)` and therefore never negative.

use ndarray::{Array1, Zip};
use serde::{Deserialize, Serialize};

use super::glm::{design_matrix, linear_predictor, weighted_least_squares};
use crate::error::ModelError;
use crate::features::FeatureVector;

const ETA_BOUND: f64 = 30.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoissonParams {
    pub max_iter: usize,
    pub tol: f64,
    pub ridge: f64,
}

impl Default for PoissonParams {
    fn default() -> Self {
        Self {
            max_iter: 100,
            tol: 1e-8,
            ridge: 1e-8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoissonRegression {
    pub intercept: f64,
    pub coefficients: Vec<f64>,
    pub iterations: usize,
    pub converged: bool,
}

/// Likelihood-based fit statistics on a dataset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoissonFit {
    pub log_likelihood: f64,
    pub null_log_likelihood: f64,
    pub aic: f64,
    /// McFadden pseudo-R²: `1 - ll / ll_null`.
    pub pseudo_r2: f64,
}

impl PoissonRegression {
    pub fn fit(x: &[FeatureVector], y: &[f64], params: &PoissonParams) -> Result<Self, ModelError> {
        if x.is_empty() {
            return Err(ModelError::EmptyTrainingSet);
        }
        if y.iter().any(|v| *v < 0.0 || !v.is_finite()) {
            return Err(ModelError::InvalidParameters(
                "poisson targets must be finite and non-negative".into(),
            ));
        }
        let mean_y = series::mean(y).unwrap_or(0.0);
        if mean_y <= 0.0 {
            return Err(ModelError::InvalidParameters(
                "poisson targets must have a positive mean".into(),
            ));
        }

        let design = design_matrix(x)?;
        let targets = Array1::from(y.to_vec());
        let mut model = Self {
            intercept: mean_y.ln(),
            coefficients: vec![0.0; design.ncols() - 1],
            iterations: 0,
            converged: false,
        };
        let mut previous_deviance = f64::INFINITY;

        for iteration in 1..=params.max_iter {
            let beta = model.beta();
            let eta = design.dot(&beta).mapv(|e| e.clamp(-ETA_BOUND, ETA_BOUND));
            let weights = eta.mapv(f64::exp);
            let working = Zip::from(&eta)
                .and(&weights)
                .and(&targets)
                .map_collect(|&e, &mu, &yi| e + (yi - mu) / mu);

            let beta = weighted_least_squares(&design, Some(&weights), &working, params.ridge)
                .ok_or_else(|| {
                    ModelError::Singular(format!("poisson IRLS iteration {iteration}"))
                })?;
            model.intercept = beta[0];
            for (c, b) in model.coefficients.iter_mut().zip(beta.iter().skip(1)) {
                *c = *b;
            }
            model.iterations = iteration;

            let deviance = model.deviance(x, y);
            if (previous_deviance - deviance).abs() / (deviance.abs() + 0.1) < params.tol {
                model.converged = true;
                break;
            }
            previous_deviance = deviance;
        }

        Ok(model)
    }

    /// `[intercept, coefficients...]` as one vector.
    fn beta(&self) -> Array1<f64> {
        std::iter::once(self.intercept)
            .chain(self.coefficients.iter().copied())
            .collect()
    }

    #[inline]
    fn eta(&self, features: &[f64]) -> f64 {
        linear_predictor(self.intercept, &self.coefficients, features).clamp(-ETA_BOUND, ETA_BOUND)
    }

    /// Expected count `exp(η)`.
    #[inline]
    pub fn predict(&self, features: &[f64]) -> f64 {
        self.eta(features).exp()
    }

    pub fn n_features(&self) -> usize {
        self.coefficients.len()
    }

    /// Poisson deviance `2 Σ [y ln(y/μ) - (y - μ)]`.
    pub fn deviance(&self, x: &[FeatureVector], y: &[f64]) -> f64 {
        x.iter()
            .zip(y)
            .map(|(row, &yi)| {
                let mu = self.predict(row);
                let term = if yi > 0.0 { yi * (yi / mu).ln() } else { 0.0 };
                2.0 * (term - (yi - mu))
            })
            .sum()
    }

    /// Log-likelihood, AIC and McFadden pseudo-R² of this model on `(x, y)`.
    pub fn goodness_of_fit(&self, x: &[FeatureVector], y: &[f64]) -> Option<PoissonFit> {
        let mean_y = series::mean(y)?;
        if mean_y <= 0.0 {
            return None;
        }
        let log_likelihood: f64 = x
            .iter()
            .zip(y)
            .map(|(row, &yi)| poisson_log_pmf(yi, self.predict(row)))
            .sum();
        let null_log_likelihood: f64 = y.iter().map(|&yi| poisson_log_pmf(yi, mean_y)).sum();

        let k = (self.coefficients.len() + 1) as f64;
        let aic = 2.0 * k - 2.0 * log_likelihood;
        let pseudo_r2 = if null_log_likelihood != 0.0 {
            1.0 - log_likelihood / null_log_likelihood
        } else {
            0.0
        };

        (aic.is_finite() && pseudo_r2.is_finite()).then_some(PoissonFit {
            log_likelihood,
            null_log_likelihood,
            aic,
            pseudo_r2,
        })
    }
}

#[inline]
fn poisson_log_pmf(y: f64, mu: f64) -> f64 {
    y * mu.ln() - mu - ln_factorial(y)
}

/// `ln(k!)` for non-negative (possibly non-integral) `k`, via `ln Γ(k + 1)`.
pub(crate) fn ln_factorial(k: f64) -> f64 {
    ln_gamma(k + 1.0)
}

/// Lanczos approximation (g = 7, n = 9), valid for `x >= 0.5`.
fn ln_gamma(x: f64) -> f64 {
    const G: f64 = 7.0;
    const COEF: [f64; 9] = [
        0.999_999_999_999_809_9,
        676.520_368_121_885_1,
        -1_259.139_216_722_402_8,
        771.323_428_777_653_1,
        -176.615_029_162_140_6,
        12.507_343_278_686_905,
        -0.138_571_095_265_720_12,
        9.984_369_578_019_572e-6,
        1.505_632_735_149_311_6e-7,
    ];

    let x = x - 1.0;
    let t = x + G + 0.5;
    let series = COEF
        .iter()
        .enumerate()
        .skip(1)
        .fold(COEF[0], |acc, (i, c)| acc + c / (x + i as f64));
    0.5 * (2.0 * std::f64::consts::PI).ln() + (x + 0.5) * t.ln() - t + series.ln()
}
