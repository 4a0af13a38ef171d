//! Single and batch prediction.
//!
//! # Pipeline (per request)
//!
//! ```text
//! validate ─► resolve model ─► cache.get ─► history.series ─► TemporalFeatures
//!          ─► artifact.encode ─► artifact.predict ─► level + interval
//! ```
//!
//! Model resolution order: the request's `model_type`, then the batch's,
//! then [`ForecastConfig::default_model`].

use std::sync::Arc;

use history::HistorySource;
use ml::{EncoderInput, TemporalFeatures};
use series::stats;
use tracing::{debug, info};
use types::{
    BatchItem, BatchRequest, BatchResult, BatchSummary, ConfidenceInterval, ModelCatalog,
    ModelInfo, ModelKind, ModelStatus, PredictionRequest, PredictionResult,
};

use crate::cache::{ModelCache, RetryPolicy};
use crate::config::ForecastConfig;
use crate::error::{ForecastError, Result};
use crate::store::DirectoryStore;

pub struct PredictorService {
    config: ForecastConfig,
    cache: Arc<ModelCache>,
    history: Arc<dyn HistorySource>,
    /// Critical value for `config.confidence_level`.
    z: f64,
}

impl PredictorService {
    pub fn new(
        config: ForecastConfig,
        cache: Arc<ModelCache>,
        history: Arc<dyn HistorySource>,
    ) -> Result<Self> {
        let z = series::z_score(config.confidence_level).ok_or_else(|| {
            ForecastError::Validation(format!(
                "confidence level {} outside (0, 1)",
                config.confidence_level
            ))
        })?;
        if config.min_year > config.max_year {
            return Err(ForecastError::Validation(format!(
                "year range {}..={} is empty",
                config.min_year, config.max_year
            )));
        }

        Ok(Self {
            config,
            cache,
            history,
            z,
        })
    }

    /// Service reading artifacts from `config.artifact_dir`.
    pub fn from_config(config: ForecastConfig, history: Arc<dyn HistorySource>) -> Result<Self> {
        let store = Arc::new(DirectoryStore::new(&config.artifact_dir));
        let cache = Arc::new(ModelCache::new(
            store,
            RetryPolicy {
                max_attempts: config.cache_max_attempts,
                base_backoff: config.cache_base_backoff,
            },
        ));
        Self::new(config, cache, history)
    }

    pub fn config(&self) -> &ForecastConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<ModelCache> {
        &self.cache
    }

    pub fn predict_one(&self, request: &PredictionRequest) -> Result<PredictionResult> {
        self.predict_with(request, None)
    }

    pub fn predict_batch(&self, batch: &BatchRequest) -> Result<BatchResult> {
        let total = batch.items.len();
        if total == 0 || total > self.config.max_batch_size {
            return Err(ForecastError::Validation(format!(
                "batch size {total} outside 1..={}",
                self.config.max_batch_size
            )));
        }
        let model_used = batch.model_type.unwrap_or(self.config.default_model);

        let items = parallel::map_range(
            total,
            |index| match self.predict_with(&batch.items[index], Some(model_used)) {
                Ok(result) => BatchItem::Success { index, result },
                Err(err) => BatchItem::Failure {
                    index,
                    kind: err.kind().to_string(),
                    message: err.to_string(),
                },
            },
            self.config.force_sequential,
        );

        let estimates: Vec<f64> = items
            .iter()
            .filter_map(|item| item.result().map(|r| r.point_estimate))
            .collect();
        let summary = summarize(&estimates);
        let total_succeeded = estimates.len();
        let total_failed = total - total_succeeded;

        info!(
            model = %model_used,
            total,
            succeeded = total_succeeded,
            failed = total_failed,
            "Batch prediction complete"
        );

        Ok(BatchResult {
            model_used,
            items,
            summary,
            total,
            total_succeeded,
            total_failed,
        })
    }

    /// Availability and test metrics of every model type.
    pub fn model_catalog(&self) -> ModelCatalog {
        let models: Vec<ModelInfo> = ModelKind::ALL
            .into_iter()
            .map(|kind| {
                let (status, metrics, message) = match self.cache.get(kind) {
                    Ok(artifact) => (ModelStatus::Available, Some(artifact.metrics.test), None),
                    Err(ForecastError::ArtifactNotFound(_)) => (ModelStatus::NotFound, None, None),
                    Err(err) => (ModelStatus::Error, None, Some(err.to_string())),
                };
                ModelInfo {
                    model_type: kind,
                    name: kind.display_name().to_string(),
                    status,
                    metrics,
                    message,
                }
            })
            .collect();

        let recommended = models
            .iter()
            .filter_map(|m| m.metrics.map(|metrics| (m.model_type, metrics.r2)))
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map_or(ModelKind::RandomForest, |(kind, _)| kind);

        ModelCatalog {
            models,
            recommended,
        }
    }

    pub fn invalidate_cache(&self) {
        self.cache.invalidate_all();
    }

    fn validate(&self, request: &PredictionRequest) -> Result<()> {
        let (min_year, max_year) = (self.config.min_year, self.config.max_year);
        if !(min_year..=max_year).contains(&request.year) {
            return Err(ForecastError::Validation(format!(
                "year {} outside {min_year}..={max_year}",
                request.year
            )));
        }
        if !request.period().has_valid_month() {
            return Err(ForecastError::Validation(format!(
                "month {} outside 1..=12",
                request.month
            )));
        }
        for (field, value) in [
            ("region", &request.region),
            ("age_group", &request.age_group),
            ("sex", &request.sex),
            ("insurance_plan", &request.insurance_plan),
        ] {
            if value.trim().is_empty() {
                return Err(ForecastError::Validation(format!("{field} is empty")));
            }
        }
        Ok(())
    }

    fn predict_with(
        &self,
        request: &PredictionRequest,
        batch_model: Option<ModelKind>,
    ) -> Result<PredictionResult> {
        self.validate(request)?;
        let kind = request
            .model_type
            .or(batch_model)
            .unwrap_or(self.config.default_model);
        let artifact = self.cache.get(kind)?;

        let period = request.period();
        let series = self.history.series(&request.group_key(), period)?;
        let temporal = TemporalFeatures::from_series(&series, period);

        let encoded = artifact.encode(&EncoderInput::from(request), &temporal)?;
        let point_estimate = artifact.predict(&encoded.vector)?;

        if !encoded.fallbacks.is_empty() || temporal.cold_start {
            debug!(
                model = %kind,
                fallbacks = ?encoded.fallbacks,
                cold_start = temporal.cold_start,
                "Prediction used imputed inputs"
            );
        }

        let half_width = self.z * artifact.metrics.test.rmse;
        Ok(PredictionResult {
            point_estimate,
            rounded_estimate: point_estimate.round() as u64,
            demand_level: artifact.thresholds.classify(point_estimate),
            confidence_interval: ConfidenceInterval {
                lower: (point_estimate - half_width).max(0.0),
                upper: point_estimate + half_width,
                level: self.config.confidence_level,
            },
            model_used: kind,
            metrics_snapshot: artifact.metrics.test,
            fallbacks: encoded.fallbacks.iter().map(|f| f.to_string()).collect(),
            cold_start: temporal.cold_start,
        })
    }
}

/// Summary over successful estimates; `None` when there are none.
fn summarize(estimates: &[f64]) -> Option<BatchSummary> {
    let (min, max) = stats::min_max(estimates)?;
    Some(BatchSummary {
        mean: stats::mean(estimates)?,
        min,
        max,
        std_dev: stats::std_dev(estimates)?,
    })
}
