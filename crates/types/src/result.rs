//! Outbound result types: predictions, batches and the model catalog.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ModelKind;

/// Goodness-of-fit snapshot for one evaluation fold.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Metrics {
    pub r2: f64,
    pub rmse: f64,
    pub mae: f64,
}

/// Coarse demand classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DemandLevel {
    Low,
    Medium,
    High,
}

impl fmt::Display for DemandLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DemandLevel::Low => "LOW",
            DemandLevel::Medium => "MEDIUM",
            DemandLevel::High => "HIGH",
        };
        f.write_str(s)
    }
}

/// Tertile cut points of the training outcomes, recorded per artifact.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DemandThresholds {
    /// Estimates strictly below this are LOW.
    pub low_upper: f64,
    /// Estimates above this are HIGH.
    pub high_lower: f64,
}

impl DemandThresholds {
    pub fn classify(&self, estimate: f64) -> DemandLevel {
        if estimate < self.low_upper {
            DemandLevel::Low
        } else if estimate <= self.high_lower {
            DemandLevel::Medium
        } else {
            DemandLevel::High
        }
    }
}

/// Symmetric band around the point estimate, lower bound floored at zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceInterval {
    pub lower: f64,
    pub upper: f64,
    /// Confidence level in (0, 1), e.g. 0.95.
    pub level: f64,
}

/// Outcome of a single prediction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub point_estimate: f64,
    pub rounded_estimate: u64,
    pub demand_level: DemandLevel,
    pub confidence_interval: ConfidenceInterval,
    pub model_used: ModelKind,
    pub metrics_snapshot: Metrics,
    /// Target-encoded columns that fell back to the global training mean.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fallbacks: Vec<String>,
    /// The request's group had no observation before the target period.
    #[serde(default)]
    pub cold_start: bool,
}

/// One entry of a batch: a result or a failure marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BatchItem {
    Success {
        index: usize,
        result: PredictionResult,
    },
    Failure {
        index: usize,
        kind: String,
        message: String,
    },
}

impl BatchItem {
    pub fn index(&self) -> usize {
        match self {
            BatchItem::Success { index, .. } | BatchItem::Failure { index, .. } => *index,
        }
    }

    pub fn result(&self) -> Option<&PredictionResult> {
        match self {
            BatchItem::Success { result, .. } => Some(result),
            BatchItem::Failure { .. } => None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, BatchItem::Success { .. })
    }
}

/// Aggregate statistics over the successful items of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    /// Population standard deviation.
    pub std_dev: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchResult {
    pub model_used: ModelKind,
    pub items: Vec<BatchItem>,
    /// `None` when no item succeeded.
    pub summary: Option<BatchSummary>,
    pub total: usize,
    pub total_succeeded: usize,
    pub total_failed: usize,
}

/// Availability of a persisted model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelStatus {
    Available,
    NotFound,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub model_type: ModelKind,
    pub name: String,
    pub status: ModelStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<Metrics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelCatalog {
    pub models: Vec<ModelInfo>,
    pub recommended: ModelKind,
}
