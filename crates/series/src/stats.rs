//! Statistical utilities over `f64` slices.
//!
//! Used for target-encoding means, batch summaries, tertile demand
//! thresholds and model evaluation.

/// Calculate the mean of a slice of values.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Population variance. A single observation has zero variance.
pub fn variance(values: &[f64]) -> Option<f64> {
    let mean_val = mean(values)?;
    let sum_sq: f64 = values.iter().map(|v| (v - mean_val).powi(2)).sum();
    Some(sum_sq / values.len() as f64)
}

/// Population standard deviation (matches numpy's default `ddof=0`).
pub fn std_dev(values: &[f64]) -> Option<f64> {
    variance(values).map(|v| v.sqrt())
}

/// Minimum and maximum of a slice.
pub fn min_max(values: &[f64]) -> Option<(f64, f64)> {
    let first = *values.first()?;
    Some(
        values
            .iter()
            .skip(1)
            .fold((first, first), |(lo, hi), &v| (lo.min(v), hi.max(v))),
    )
}

/// Calculate percentile value from a sorted slice.
/// Percentile should be between 0.0 and 1.0 (linear interpolation).
pub fn percentile(sorted_values: &[f64], pct: f64) -> Option<f64> {
    if sorted_values.is_empty() || !(0.0..=1.0).contains(&pct) {
        return None;
    }

    let n = sorted_values.len();
    if n == 1 {
        return Some(sorted_values[0]);
    }

    let idx = pct * (n - 1) as f64;
    let lower = idx.floor() as usize;
    let upper = idx.ceil() as usize;
    let frac = idx - lower as f64;

    if upper >= n {
        Some(sorted_values[n - 1])
    } else {
        Some(sorted_values[lower] * (1.0 - frac) + sorted_values[upper] * frac)
    }
}

/// First and second tertile cut points of an unsorted slice.
pub fn tertiles(values: &[f64]) -> Option<(f64, f64)> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let low = percentile(&sorted, 1.0 / 3.0)?;
    let high = percentile(&sorted, 2.0 / 3.0)?;
    Some((low, high))
}

/// Coefficient of determination. Returns 0.0 for a constant target.
pub fn r2_score(actual: &[f64], predicted: &[f64]) -> Option<f64> {
    if actual.len() != predicted.len() {
        return None;
    }
    let mean_y = mean(actual)?;
    let ss_tot: f64 = actual.iter().map(|y| (y - mean_y).powi(2)).sum();
    let ss_res: f64 = actual
        .iter()
        .zip(predicted)
        .map(|(y, p)| (y - p).powi(2))
        .sum();
    if ss_tot == 0.0 {
        return Some(0.0);
    }
    Some(1.0 - ss_res / ss_tot)
}

/// Root mean squared error.
pub fn rmse(actual: &[f64], predicted: &[f64]) -> Option<f64> {
    if actual.len() != predicted.len() || actual.is_empty() {
        return None;
    }
    let mse = actual
        .iter()
        .zip(predicted)
        .map(|(y, p)| (y - p).powi(2))
        .sum::<f64>()
        / actual.len() as f64;
    Some(mse.sqrt())
}

/// Mean absolute error.
pub fn mae(actual: &[f64], predicted: &[f64]) -> Option<f64> {
    if actual.len() != predicted.len() || actual.is_empty() {
        return None;
    }
    Some(
        actual
            .iter()
            .zip(predicted)
            .map(|(y, p)| (y - p).abs())
            .sum::<f64>()
            / actual.len() as f64,
    )
}
