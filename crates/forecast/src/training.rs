//! Offline training procedure.
//!
//! # Steps
//!
//! 1. Load history (optionally restricted to a period range), seeded
//!    down-sampling of very large histories
//! 2. Clean rows: non-positive counts, bad months, unknown fixed categories
//! 3. Temporal features per row from one sweep over each group series, as
//!    read from the history source
//! 4. Seeded shuffle-split into train / test
//! 5. Per model: fit encoder on train only, fit regressor, evaluate,
//!    optional k-fold CV, tertile thresholds, atomic save
//!
//! Training never talks to a live cache. Serving picks up new artifacts
//! after `invalidate_all`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use history::HistorySource;
use ml::{
    ARTIFACT_FORMAT_VERSION, EncoderInput, EncoderState, EvaluationMetrics, FeatureVector,
    ModelArtifact, Regressor, TemporalFeatures, evaluate,
};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::{SliceRandom, index};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use types::{DemandThresholds, GroupKey, HistoricalRow, ModelKind, Period};

use crate::config::TrainingConfig;
use crate::error::{ForecastError, Result};
use crate::store::ArtifactStore;

/// Name of the cross-model comparison blob written by [`Trainer::train_all`].
pub const COMPARATIVE_REPORT: &str = "comparative_metrics.json";

// =============================================================================
// Reports
// =============================================================================

/// Rows dropped while cleaning, by reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CleaningStats {
    /// History size before sampling, when a sample was drawn.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sampled_from: Option<usize>,
    /// Rows entering cleaning.
    pub total: usize,
    pub kept: usize,
    pub non_positive_count: usize,
    pub invalid_period: usize,
    pub unknown_category: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    pub model_type: ModelKind,
    pub name: String,
    pub metrics: EvaluationMetrics,
    pub thresholds: DemandThresholds,
    pub n_samples: usize,
    pub n_train: usize,
    pub n_test: usize,
    pub training_seconds: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedModel {
    pub model_type: ModelKind,
    pub error: String,
}

/// Contents of `comparative_metrics.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparativeReport {
    pub cleaning: CleaningStats,
    pub models: Vec<TrainingReport>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed: Vec<FailedModel>,
    /// Highest test r2 among trained models.
    pub best_model: Option<ModelKind>,
}

// =============================================================================
// Prepared data
// =============================================================================

/// Cleaned rows with their temporal features and the train/test split.
#[derive(Debug, Clone)]
pub struct TrainingSet {
    pub rows: Vec<HistoricalRow>,
    pub temporal: Vec<TemporalFeatures>,
    pub train: Vec<usize>,
    pub test: Vec<usize>,
    pub cleaning: CleaningStats,
}

impl TrainingSet {
    fn fold(&self, indices: &[usize]) -> Fold<'_> {
        Fold {
            inputs: indices
                .iter()
                .map(|&i| EncoderInput::from(&self.rows[i]))
                .collect(),
            targets: indices.iter().map(|&i| self.rows[i].count).collect(),
            temporal: indices.iter().map(|&i| self.temporal[i]).collect(),
        }
    }
}

/// Parallel slices for a subset of rows.
struct Fold<'a> {
    inputs: Vec<EncoderInput<'a>>,
    targets: Vec<f64>,
    temporal: Vec<TemporalFeatures>,
}

/// Encoder and regressor fitted on one fold.
struct Fitted {
    encoder: EncoderState,
    regressor: Regressor,
    train_matrix: Vec<FeatureVector>,
}

// =============================================================================
// Trainer
// =============================================================================

pub struct Trainer {
    config: TrainingConfig,
    history: Arc<dyn HistorySource>,
    store: Arc<dyn ArtifactStore>,
}

impl Trainer {
    pub fn new(
        config: TrainingConfig,
        history: Arc<dyn HistorySource>,
        store: Arc<dyn ArtifactStore>,
    ) -> Self {
        Self {
            config,
            history,
            store,
        }
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Train one model type and persist its artifact.
    pub fn train(&self, kind: ModelKind) -> Result<TrainingReport> {
        let set = self.prepare()?;
        let artifact = self.fit_artifact(kind, &set)?;
        self.save(&artifact)?;
        Ok(report_for(&artifact, &set))
    }

    /// Train every model type on one shared split and write the comparative
    /// report. Fails only if no model could be trained.
    pub fn train_all(&self) -> Result<ComparativeReport> {
        let set = self.prepare()?;
        let mut models = Vec::new();
        let mut failed = Vec::new();

        for kind in ModelKind::ALL {
            match self
                .fit_artifact(kind, &set)
                .and_then(|artifact| self.save(&artifact).map(|_| artifact))
            {
                Ok(artifact) => models.push(report_for(&artifact, &set)),
                Err(err) => {
                    warn!(model = %kind, error = %err, "Model training failed");
                    failed.push(FailedModel {
                        model_type: kind,
                        error: err.to_string(),
                    });
                }
            }
        }

        if models.is_empty() {
            return Err(ForecastError::Training(format!(
                "all {} model types failed",
                failed.len()
            )));
        }

        let best_model = models
            .iter()
            .max_by(|a, b| a.metrics.test.r2.total_cmp(&b.metrics.test.r2))
            .map(|r| r.model_type);
        let report = ComparativeReport {
            cleaning: set.cleaning,
            models,
            failed,
            best_model,
        };

        let json = serde_json::to_vec_pretty(&report)
            .map_err(|e| ForecastError::Training(format!("report serialization: {e}")))?;
        self.store
            .save_blob(COMPARATIVE_REPORT, &json)
            .map_err(|e| ForecastError::TransientStorage(e.to_string()))?;

        if let Some(best) = best_model {
            info!(best = %best, "Comparative metrics written");
        }
        Ok(report)
    }

    /// Load, clean, featurize and split history.
    pub fn prepare(&self) -> Result<TrainingSet> {
        let raw = self.history.rows(self.config.period_range)?;
        let available = raw.len();
        let raw = self.sample(raw);
        let (rows, mut cleaning) = clean(raw);
        if cleaning.total < available {
            cleaning.sampled_from = Some(available);
        }
        info!(
            total = cleaning.total,
            kept = cleaning.kept,
            non_positive = cleaning.non_positive_count,
            invalid_period = cleaning.invalid_period,
            unknown_category = cleaning.unknown_category,
            "Cleaned historical rows"
        );
        if rows.is_empty() {
            return Err(ForecastError::Training("no usable historical rows".into()));
        }

        let temporal = self.temporal_features(&rows)?;
        let (train, test) = self.split(rows.len())?;

        Ok(TrainingSet {
            rows,
            temporal,
            train,
            test,
            cleaning,
        })
    }

    /// Fit, evaluate and package one model type.
    pub fn fit_artifact(&self, kind: ModelKind, set: &TrainingSet) -> Result<ModelArtifact> {
        let started = Instant::now();
        info!(model = %kind, train = set.train.len(), test = set.test.len(), "Training model");

        let train = set.fold(&set.train);
        let fitted = self.fit_fold(kind, &train)?;

        let (low_upper, high_lower) = series::tertiles(&train.targets)
            .ok_or_else(|| ForecastError::Training("no finite training targets".into()))?;

        let mut artifact = ModelArtifact {
            format_version: ARTIFACT_FORMAT_VERSION,
            model_type: kind,
            regressor: fitted.regressor,
            encoder: fitted.encoder,
            metrics: EvaluationMetrics::default(),
            thresholds: DemandThresholds {
                low_upper,
                high_lower,
            },
            requires_scaling: kind.requires_scaling(),
            n_samples: set.rows.len(),
            training_seconds: 0.0,
        };

        let train_pred = predict_matrix(&artifact, &fitted.train_matrix)?;
        artifact.metrics.train = evaluate(&train.targets, &train_pred);

        let test = set.fold(&set.test);
        let test_matrix = artifact.encoder.transform_all(&test.inputs, &test.temporal)?;
        let test_pred = predict_matrix(&artifact, &test_matrix)?;
        artifact.metrics.test = if test.targets.is_empty() {
            artifact.metrics.train
        } else {
            evaluate(&test.targets, &test_pred)
        };

        if let Some((mean, std)) = self.cross_validate(kind, set) {
            artifact.metrics.cv_r2_mean = Some(mean);
            artifact.metrics.cv_r2_std = Some(std);
        }

        if let Regressor::Poisson(model) = &artifact.regressor {
            if let Some(fit) = model.goodness_of_fit(&fitted.train_matrix, &train.targets) {
                artifact.metrics.aic = Some(fit.aic);
                artifact.metrics.pseudo_r2 = Some(fit.pseudo_r2);
            }
        }

        artifact.training_seconds = started.elapsed().as_secs_f64();
        artifact
            .validate()
            .map_err(|e| ForecastError::Training(format!("trained artifact invalid: {e}")))?;

        info!(
            model = %kind,
            train_r2 = artifact.metrics.train.r2,
            test_r2 = artifact.metrics.test.r2,
            test_rmse = artifact.metrics.test.rmse,
            test_mae = artifact.metrics.test.mae,
            seconds = artifact.training_seconds,
            "Model trained"
        );
        Ok(artifact)
    }

    fn fit_fold(&self, kind: ModelKind, fold: &Fold<'_>) -> Result<Fitted> {
        let encoder = EncoderState::fit(
            &fold.inputs,
            &fold.targets,
            &fold.temporal,
            kind.requires_scaling(),
        )
        .map_err(|e| ForecastError::Training(e.to_string()))?;
        let train_matrix = encoder.transform_all(&fold.inputs, &fold.temporal)?;
        let regressor = Regressor::fit(
            kind,
            &train_matrix,
            &fold.targets,
            &self.config.hyperparameters,
            self.config.force_sequential,
        )
        .map_err(|e| ForecastError::Training(format!("{kind}: {e}")))?;

        Ok(Fitted {
            encoder,
            regressor,
            train_matrix,
        })
    }

    /// k-fold r2 (mean, population std) on the train split, re-fitting the
    /// encoder per fold. `None` when disabled, too large or a fold fails.
    fn cross_validate(&self, kind: ModelKind, set: &TrainingSet) -> Option<(f64, f64)> {
        let k = self.config.cv_folds;
        let n = set.train.len();
        if k < 2 || n < k || n > self.config.cv_max_rows {
            return None;
        }

        let mut order = set.train.clone();
        order.shuffle(&mut StdRng::seed_from_u64(self.config.seed.wrapping_add(1)));

        let mut scores = Vec::with_capacity(k);
        for fold_idx in 0..k {
            let start = fold_idx * n / k;
            let end = (fold_idx + 1) * n / k;
            let holdout = &order[start..end];
            let rest: Vec<usize> = order[..start]
                .iter()
                .chain(&order[end..])
                .copied()
                .collect();

            let score = self.fit_fold(kind, &set.fold(&rest)).and_then(|fitted| {
                let valid = set.fold(holdout);
                let matrix = fitted.encoder.transform_all(&valid.inputs, &valid.temporal)?;
                let predicted: Vec<f64> = matrix
                    .iter()
                    .map(|row| clamp_for(kind, fitted.regressor.predict(row)))
                    .collect();
                Ok(evaluate(&valid.targets, &predicted).r2)
            });

            match score {
                Ok(r2) => scores.push(r2),
                Err(err) => {
                    warn!(model = %kind, fold = fold_idx, error = %err, "Cross-validation skipped");
                    return None;
                }
            }
        }

        Some((series::mean(&scores)?, series::std_dev(&scores)?))
    }

    /// Temporal features for every row, swept over the same group series
    /// [`HistorySource::series`] hands the predictor at serving time.
    ///
    /// Rows dropped by cleaning or outside `period_range` still count toward
    /// a group's series, exactly as they do when serving.
    fn temporal_features(&self, rows: &[HistoricalRow]) -> Result<Vec<TemporalFeatures>> {
        let mut groups: HashMap<GroupKey, Vec<usize>> = HashMap::new();
        for (i, row) in rows.iter().enumerate() {
            groups.entry(row.group_key()).or_default().push(i);
        }

        let mut temporal = vec![TemporalFeatures::COLD_START; rows.len()];
        for (key, indices) in &groups {
            let Some(latest) = indices.iter().map(|&i| rows[i].period()).max() else {
                continue;
            };
            let series = self
                .history
                .series(key, Period::from_index(latest.index() + 1))?;
            let swept = ml::features::sweep(&series);

            for &i in indices {
                let period = rows[i].period();
                temporal[i] = match series.binary_search_by(|(p, _)| p.cmp(&period)) {
                    Ok(pos) => swept[pos],
                    Err(_) => TemporalFeatures::from_series(&series, period),
                };
            }
        }
        Ok(temporal)
    }

    /// Seeded subset of `rows` per `sample_rows`, in the original order.
    fn sample(&self, rows: Vec<HistoricalRow>) -> Vec<HistoricalRow> {
        let Some(size) = self.config.sample_rows.target(rows.len()) else {
            return rows;
        };
        info!(sample = size, total = rows.len(), "Sampling history");

        let mut rng = StdRng::seed_from_u64(self.config.seed.wrapping_add(2));
        let mut picked = index::sample(&mut rng, rows.len(), size).into_vec();
        picked.sort_unstable();

        let mut keep = vec![false; rows.len()];
        for i in picked {
            keep[i] = true;
        }
        rows.into_iter()
            .zip(keep)
            .filter_map(|(row, keep)| keep.then_some(row))
            .collect()
    }

    /// Seeded shuffle of `0..n`, first `n_test` indices held out.
    fn split(&self, n: usize) -> Result<(Vec<usize>, Vec<usize>)> {
        let fraction = self.config.test_fraction;
        if !(0.0..1.0).contains(&fraction) {
            return Err(ForecastError::Training(format!(
                "test fraction {fraction} outside [0, 1)"
            )));
        }

        let mut order: Vec<usize> = (0..n).collect();
        order.shuffle(&mut StdRng::seed_from_u64(self.config.seed));
        let n_test = ((n as f64 * fraction).round() as usize).min(n.saturating_sub(1));
        let train = order.split_off(n_test);
        Ok((train, order))
    }

    fn save(&self, artifact: &ModelArtifact) -> Result<()> {
        let json = artifact
            .to_json()
            .map_err(|e| ForecastError::Training(format!("artifact serialization: {e}")))?;
        self.store
            .save(artifact.model_type, json.as_bytes())
            .map_err(|e| ForecastError::TransientStorage(e.to_string()))?;
        info!(model = %artifact.model_type, bytes = json.len(), "Artifact saved");
        Ok(())
    }
}

fn report_for(artifact: &ModelArtifact, set: &TrainingSet) -> TrainingReport {
    TrainingReport {
        model_type: artifact.model_type,
        name: artifact.model_type.display_name().to_string(),
        metrics: artifact.metrics,
        thresholds: artifact.thresholds,
        n_samples: artifact.n_samples,
        n_train: set.train.len(),
        n_test: set.test.len(),
        training_seconds: artifact.training_seconds,
    }
}

#[inline]
fn clamp_for(kind: ModelKind, raw: f64) -> f64 {
    if kind.needs_clamp() { raw.max(0.0) } else { raw }
}

fn predict_matrix(artifact: &ModelArtifact, matrix: &[FeatureVector]) -> Result<Vec<f64>> {
    matrix
        .iter()
        .map(|row| artifact.predict(row).map_err(ForecastError::from))
        .collect()
}

/// Drop rows that cannot be trained on.
fn clean(rows: Vec<HistoricalRow>) -> (Vec<HistoricalRow>, CleaningStats) {
    let mut stats = CleaningStats {
        total: rows.len(),
        ..Default::default()
    };
    let kept: Vec<HistoricalRow> = rows
        .into_iter()
        .filter(|row| {
            if !(row.count.is_finite() && row.count > 0.0) {
                stats.non_positive_count += 1;
                false
            } else if !row.period().has_valid_month() {
                stats.invalid_period += 1;
                false
            } else if !EncoderInput::from(row).is_encodable() {
                stats.unknown_category += 1;
                false
            } else {
                true
            }
        })
        .collect();
    stats.kept = kept.len();
    (kept, stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(year: i32, month: u32, sex: &str, ipress: &str, count: f64) -> HistoricalRow {
        HistoricalRow {
            year,
            month,
            region: "LIMA".into(),
            sex: sex.into(),
            age_group: "18-29".into(),
            service_category: "GENERAL".into(),
            insurance_plan: "GRATUITO".into(),
            ipress_level: ipress.into(),
            count,
        }
    }

    #[test]
    fn test_clean_counts_reasons() {
        let (kept, stats) = clean(vec![
            row(2024, 1, "F", "I", 3.0),
            row(2024, 1, "F", "I", 0.0),
            row(2024, 13, "F", "I", 3.0),
            row(2024, 1, "X", "I", 3.0),
            row(2024, 1, "F", "IV", 3.0),
        ]);
        assert_eq!(kept.len(), 1);
        assert_eq!(
            stats,
            CleaningStats {
                sampled_from: None,
                total: 5,
                kept: 1,
                non_positive_count: 1,
                invalid_period: 1,
                unknown_category: 2,
            }
        );
    }

    #[test]
    fn test_temporal_features_share_group_period() {
        let rows = vec![
            row(2024, 1, "F", "I", 4.0),
            row(2024, 1, "F", "II", 6.0),
            row(2024, 2, "F", "I", 1.0),
            // Dropped by cleaning, still part of the group series.
            row(2024, 2, "F", "IV", 100.0),
            row(2024, 3, "F", "I", 2.0),
        ];
        let trainer = Trainer::new(
            TrainingConfig::default(),
            Arc::new(history::InMemoryHistory::new(rows.clone())),
            Arc::new(crate::store::MemoryStore::new()),
        );

        let (kept, _) = clean(rows);
        let temporal = trainer.temporal_features(&kept).unwrap();
        assert_eq!(kept.len(), 4);
        assert!(temporal[0].cold_start && temporal[1].cold_start);
        assert_eq!(temporal[2].lag_1, 10.0);
        assert_eq!(temporal[3].lag_1, 101.0);
        assert_eq!(temporal[3].rolling_mean_3, 55.5);
    }
}
