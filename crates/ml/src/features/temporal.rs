//! Lag and rolling-window features per group series.
//!
//! Both entry points consume a group series sorted ascending by period and
//! only ever look at periods strictly before the one being described:
//!
//! - [`TemporalFeatures::from_series`] answers a single request.
//! - [`sweep`] walks a whole series once for training, producing the same
//!   values [`TemporalFeatures::from_series`] would for every period.
//!
//! A group with nothing before the target is a *cold start*: all three
//! features are `0.0` and [`TemporalFeatures::cold_start`] is set.

use serde::{Deserialize, Serialize};
use series::RollingWindow;
use types::Period;

/// Short rolling window, in observed periods.
pub const SHORT_WINDOW: usize = 3;
/// Long rolling window, in observed periods.
pub const LONG_WINDOW: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TemporalFeatures {
    pub lag_1: f64,
    pub rolling_mean_3: f64,
    pub rolling_mean_6: f64,
    pub cold_start: bool,
}

impl TemporalFeatures {
    pub const COLD_START: Self = Self {
        lag_1: 0.0,
        rolling_mean_3: 0.0,
        rolling_mean_6: 0.0,
        cold_start: true,
    };

    /// Features for `target` from a series sorted ascending by period.
    ///
    /// Points at or after `target` are ignored, so callers may pass the
    /// full series.
    pub fn from_series(series: &[(Period, f64)], target: Period) -> Self {
        let end = series.partition_point(|(period, _)| *period < target);
        let prior = &series[..end];
        let Some(&(_, lag_1)) = prior.last() else {
            return Self::COLD_START;
        };

        Self {
            lag_1: sanitize(lag_1),
            rolling_mean_3: trailing_mean(prior, SHORT_WINDOW),
            rolling_mean_6: trailing_mean(prior, LONG_WINDOW),
            cold_start: false,
        }
    }

    fn from_windows(short: &RollingWindow, long: &RollingWindow) -> Self {
        match short.last() {
            None => Self::COLD_START,
            Some(lag_1) => Self {
                lag_1: sanitize(lag_1),
                rolling_mean_3: sanitize(short.mean().unwrap_or(0.0)),
                rolling_mean_6: sanitize(long.mean().unwrap_or(0.0)),
                cold_start: false,
            },
        }
    }
}

/// Features for every point of a sorted series, in one pass.
///
/// `result[i]` describes `series[i].0` using `series[..i]` only.
pub fn sweep(series: &[(Period, f64)]) -> Vec<TemporalFeatures> {
    let mut short = RollingWindow::new(SHORT_WINDOW);
    let mut long = RollingWindow::new(LONG_WINDOW);

    series
        .iter()
        .map(|&(_, value)| {
            let features = TemporalFeatures::from_windows(&short, &long);
            short.push(value);
            long.push(value);
            features
        })
        .collect()
}

fn trailing_mean(prior: &[(Period, f64)], window: usize) -> f64 {
    let tail = &prior[prior.len().saturating_sub(window)..];
    if tail.is_empty() {
        return 0.0;
    }
    sanitize(tail.iter().map(|(_, v)| v).sum::<f64>() / tail.len() as f64)
}

#[inline]
fn sanitize(value: f64) -> f64 {
    if value.is_finite() { value } else { 0.0 }
}
