//! Numeric series utilities for demand forecasting.
//!
//! # Modules
//!
//! - [`stats`] - Descriptive statistics and goodness-of-fit measures
//! - [`rolling`] - Trailing windows for lag / rolling-mean features
//! - [`normal`] - Standard normal quantiles for confidence bands
//!
//! All computations use `f64`. Functions that need at least one observation
//! return `Option` instead of NaN.

pub mod normal;
pub mod rolling;
pub mod stats;

pub use normal::z_score;
pub use rolling::RollingWindow;
pub use stats::{mean, percentile, std_dev, tertiles};
