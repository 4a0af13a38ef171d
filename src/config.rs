//! Command-line arguments and their mapping onto library configuration.
//!
//! Every flag has an environment fallback so containerized deployments can
//! configure the binary without a wrapper script.

use std::path::PathBuf;

use clap::Args;
use forecast::{ForecastConfig, SampleRows, TrainingConfig};
use types::{ModelKind, Period, PeriodRange};

/// Options shared by every subcommand.
#[derive(Args, Debug, Clone)]
pub struct CommonArgs {
    /// Directory holding model artifacts
    #[arg(long, env = "FORECAST_ARTIFACT_DIR", default_value = "models")]
    pub artifact_dir: PathBuf,

    /// SQLite database with historical attentions
    #[arg(long, env = "FORECAST_HISTORY_DB", default_value = "data/history.db")]
    pub history_db: PathBuf,

    /// Model used when a request names none
    #[arg(long, env = "FORECAST_DEFAULT_MODEL", default_value = "random_forest")]
    pub default_model: ModelKind,

    /// Confidence level of prediction intervals
    #[arg(long, env = "FORECAST_CONFIDENCE_LEVEL", default_value_t = 0.95)]
    pub confidence_level: f64,

    /// Disable rayon for batch prediction and forest fitting (profiling)
    #[arg(long, env = "FORECAST_SEQUENTIAL")]
    pub sequential: bool,
}

impl CommonArgs {
    pub fn forecast_config(&self) -> ForecastConfig {
        ForecastConfig {
            artifact_dir: self.artifact_dir.clone(),
            default_model: self.default_model,
            confidence_level: self.confidence_level,
            force_sequential: self.sequential,
            ..Default::default()
        }
    }
}

/// Training knobs; unset values keep the library defaults.
#[derive(Args, Debug, Clone)]
pub struct TrainArgs {
    /// Train only this model type (default: all four)
    #[arg(long)]
    pub model: Option<ModelKind>,

    /// Fraction of rows held out for testing
    #[arg(long, env = "FORECAST_TEST_FRACTION")]
    pub test_fraction: Option<f64>,

    /// Seed for the split, folds and ensembles
    #[arg(long, env = "FORECAST_SEED")]
    pub seed: Option<u64>,

    /// Cross-validation folds (0 disables)
    #[arg(long, env = "FORECAST_CV_FOLDS")]
    pub cv_folds: Option<usize>,

    /// Rows drawn from large histories (0 = all; default: by history size)
    #[arg(long, env = "FORECAST_SAMPLE_ROWS")]
    pub sample_rows: Option<usize>,

    /// First year of history to use
    #[arg(long)]
    pub from_year: Option<i32>,

    /// Last year of history to use
    #[arg(long)]
    pub to_year: Option<i32>,

    /// Trees in the random forest
    #[arg(long, env = "FORECAST_RF_TREES")]
    pub forest_trees: Option<usize>,

    /// Boosting stages
    #[arg(long, env = "FORECAST_GB_STAGES")]
    pub boosting_stages: Option<usize>,
}

impl TrainArgs {
    pub fn training_config(&self, common: &CommonArgs) -> TrainingConfig {
        let mut config = TrainingConfig {
            force_sequential: common.sequential,
            ..Default::default()
        };

        if let Some(fraction) = self.test_fraction {
            config.test_fraction = fraction;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
            config.hyperparameters.random_forest.seed = seed;
            config.hyperparameters.gradient_boosting.seed = seed;
        }
        if let Some(folds) = self.cv_folds {
            config.cv_folds = folds;
        }
        match self.sample_rows {
            Some(0) => config.sample_rows = SampleRows::All,
            Some(n) => config.sample_rows = SampleRows::Fixed(n),
            None => {}
        }
        if let Some(n) = self.forest_trees {
            config.hyperparameters.random_forest.n_trees = n;
        }
        if let Some(n) = self.boosting_stages {
            config.hyperparameters.gradient_boosting.n_estimators = n;
        }

        config.period_range = match (self.from_year, self.to_year) {
            (None, None) => None,
            (from, to) => Some(PeriodRange {
                start: Period::new(from.unwrap_or(i32::MIN / 12), 1),
                end: Period::new(to.unwrap_or(i32::MAX / 12), 12),
            }),
        };
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        common: CommonArgs,
        #[command(flatten)]
        train: TrainArgs,
    }

    #[test]
    fn test_defaults_match_library() {
        let h = Harness::parse_from(["demand-forecast"]);
        let config = h.train.training_config(&h.common);
        assert_eq!(config.seed, TrainingConfig::default().seed);
        assert!(config.period_range.is_none());
        assert_eq!(config.sample_rows, SampleRows::Auto);
        assert_eq!(h.common.forecast_config().default_model, ModelKind::RandomForest);
    }

    #[test]
    fn test_overrides_flow_into_configs() {
        let h = Harness::parse_from([
            "demand-forecast",
            "--default-model",
            "poisson",
            "--seed",
            "7",
            "--from-year",
            "2021",
            "--forest-trees",
            "10",
            "--sample-rows",
            "0",
        ]);
        let config = h.train.training_config(&h.common);
        assert_eq!(h.common.forecast_config().default_model, ModelKind::Poisson);
        assert_eq!(config.seed, 7);
        assert_eq!(config.hyperparameters.random_forest.seed, 7);
        assert_eq!(config.hyperparameters.random_forest.n_trees, 10);
        assert_eq!(config.sample_rows, SampleRows::All);
        let range = config.period_range.unwrap();
        assert_eq!(range.start, Period::new(2021, 1));
        assert!(range.contains(Period::new(2030, 6)));
    }
}
