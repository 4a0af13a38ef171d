//! Weighted least-squares core shared by the linear and Poisson fits.
//!
//! The design matrix carries a leading intercept column. Each solve builds
//! `Xᵀ W X + λI` (intercept unpenalized) and `Xᵀ W z` with ndarray, then
//! factors the `p × p` system by Cholesky.

use nalgebra::{DMatrix, DVector};
use ndarray::{Array1, Array2, Axis};

use crate::error::ModelError;
use crate::features::FeatureVector;

/// Squared Cholesky pivots below this fraction of the largest diagonal entry
/// are treated as rank deficiency.
const RANK_TOL: f64 = 1e-14;

/// `[1 | X]` for rows of equal width.
pub fn design_matrix(rows: &[FeatureVector]) -> Result<Array2<f64>, ModelError> {
    let width = rows.first().map_or(0, |r| r.len());
    if let Some(bad) = rows.iter().find(|r| r.len() != width) {
        return Err(ModelError::WidthMismatch {
            expected: width,
            actual: bad.len(),
        });
    }
    Ok(Array2::from_shape_fn((rows.len(), width + 1), |(i, j)| {
        if j == 0 { 1.0 } else { rows[i][j - 1] }
    }))
}

/// Solve the (optionally weighted) ridge normal equations for `β`.
///
/// Returns `None` when the system is numerically rank deficient.
pub fn weighted_least_squares(
    x: &Array2<f64>,
    weights: Option<&Array1<f64>>,
    z: &Array1<f64>,
    ridge: f64,
) -> Option<Array1<f64>> {
    let p = x.ncols();
    let xtw = match weights {
        Some(w) => (x * &w.view().insert_axis(Axis(1))).reversed_axes(),
        None => x.t().to_owned(),
    };
    let mut gram = xtw.dot(x);
    let rhs = xtw.dot(z);
    for j in 1..p {
        gram[[j, j]] += ridge;
    }

    let scale = gram.diag().iter().copied().fold(0.0, f64::max);
    let a = DMatrix::from_fn(p, p, |i, j| gram[[i, j]]);
    let b = DVector::from_iterator(p, rhs.iter().copied());

    let chol = a.cholesky()?;
    if chol
        .l_dirty()
        .diagonal()
        .iter()
        .any(|d| d * d <= RANK_TOL * scale)
    {
        return None;
    }
    let beta = chol.solve(&b);
    beta.iter()
        .all(|v| v.is_finite())
        .then(|| beta.iter().copied().collect())
}

/// `intercept + Σ coefficients[i] * features[i]`.
#[inline]
pub fn linear_predictor(intercept: f64, coefficients: &[f64], features: &[f64]) -> f64 {
    intercept
        + coefficients
            .iter()
            .zip(features)
            .map(|(c, x)| c * x)
            .sum::<f64>()
}
