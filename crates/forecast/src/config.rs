//! Central configuration for serving and training.
//!
//! Plain structs with `Default`; the CLI maps its arguments onto them.

use std::path::PathBuf;
use std::time::Duration;

use ml::Hyperparameters;
use types::{MAX_BATCH_ITEMS, ModelKind, PeriodRange};

/// Serving-side configuration.
#[derive(Debug, Clone)]
pub struct ForecastConfig {
    // ─────────────────────────────────────────────────────────────────────────
    // Artifacts
    // ─────────────────────────────────────────────────────────────────────────
    /// Directory holding `demand_<model>.json` artifacts.
    pub artifact_dir: PathBuf,
    /// Model used when neither the request nor the batch names one.
    pub default_model: ModelKind,

    // ─────────────────────────────────────────────────────────────────────────
    // Request validation
    // ─────────────────────────────────────────────────────────────────────────
    /// Inclusive supported year range.
    pub min_year: i32,
    pub max_year: i32,
    /// Largest accepted batch.
    pub max_batch_size: usize,

    // ─────────────────────────────────────────────────────────────────────────
    // Output
    // ─────────────────────────────────────────────────────────────────────────
    /// Confidence level of the reported interval, in (0, 1).
    pub confidence_level: f64,

    // ─────────────────────────────────────────────────────────────────────────
    // Cache / execution
    // ─────────────────────────────────────────────────────────────────────────
    /// Storage read attempts per load before surfacing a transient error.
    pub cache_max_attempts: u32,
    /// Backoff before the second attempt; doubles after each failure.
    pub cache_base_backoff: Duration,
    /// Run batch items sequentially even with the `parallel` feature.
    pub force_sequential: bool,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            artifact_dir: PathBuf::from("models"),
            default_model: ModelKind::RandomForest,
            min_year: 2020,
            max_year: 2030,
            max_batch_size: MAX_BATCH_ITEMS,
            confidence_level: 0.95,
            cache_max_attempts: 3,
            cache_base_backoff: Duration::from_millis(50),
            force_sequential: false,
        }
    }
}

/// Training-side configuration.
#[derive(Debug, Clone)]
pub struct TrainingConfig {
    /// Fraction of rows held out for testing.
    pub test_fraction: f64,
    /// Seed for the train/test shuffle and cross-validation folds.
    pub seed: u64,
    /// Cross-validation folds on the train split (0 or 1 disables it).
    pub cv_folds: usize,
    /// Skip cross-validation when the train split is larger than this.
    pub cv_max_rows: usize,
    /// Restrict history to this range; `None` uses everything.
    pub period_range: Option<PeriodRange>,
    /// Down-sampling of large histories, drawn from `seed` before cleaning.
    pub sample_rows: SampleRows,
    pub hyperparameters: Hyperparameters,
    /// Grow forest trees sequentially even with the `parallel` feature.
    pub force_sequential: bool,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            test_fraction: 0.2,
            seed: 42,
            cv_folds: 5,
            cv_max_rows: 500_000,
            period_range: None,
            sample_rows: SampleRows::Auto,
            hyperparameters: Hyperparameters::default(),
            force_sequential: false,
        }
    }
}

/// How many historical rows training draws before cleaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SampleRows {
    /// Every row.
    All,
    /// At most this many rows.
    Fixed(usize),
    /// 800 000 rows above 2 000 000, 500 000 above 1 000 000, else all.
    #[default]
    Auto,
}

impl SampleRows {
    /// Sample size for a history of `total` rows; `None` keeps every row.
    pub fn target(&self, total: usize) -> Option<usize> {
        let size = match self {
            SampleRows::All => return None,
            SampleRows::Fixed(n) => *n,
            SampleRows::Auto if total > 2_000_000 => 800_000,
            SampleRows::Auto if total > 1_000_000 => 500_000,
            SampleRows::Auto => return None,
        };
        (size < total).then_some(size)
    }
}
