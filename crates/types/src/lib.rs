//! Core types for the demand forecasting workspace.
//!
//! This crate provides the shared data types used across history access,
//! feature engineering, training and prediction: periods, group keys,
//! historical rows, inbound requests and outbound results.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

mod result;

pub use result::{
    BatchItem, BatchResult, BatchSummary, ConfidenceInterval, DemandLevel, DemandThresholds,
    Metrics, ModelCatalog, ModelInfo, ModelStatus, PredictionResult,
};

// =============================================================================
// Constants
// =============================================================================

/// IPRESS level assumed when a request omits it.
pub const DEFAULT_IPRESS_LEVEL: &str = "I";

/// Service category assumed when a request or row omits it.
pub const DEFAULT_SERVICE_CATEGORY: &str = "GENERAL";

/// Upper bound on batch size accepted by the inbound surface.
pub const MAX_BATCH_ITEMS: usize = 100;

// =============================================================================
// Period
// =============================================================================

/// A calendar month. Ordered by `(year, month)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Period {
    pub year: i32,
    pub month: u32,
}

impl Period {
    pub fn new(year: i32, month: u32) -> Self {
        Self { year, month }
    }

    /// Monotone month index: `year * 12 + (month - 1)`.
    #[inline]
    pub fn index(&self) -> i64 {
        self.year as i64 * 12 + (self.month as i64 - 1)
    }

    /// Inverse of [`Period::index`].
    pub fn from_index(index: i64) -> Self {
        Self {
            year: index.div_euclid(12) as i32,
            month: (index.rem_euclid(12) + 1) as u32,
        }
    }

    #[inline]
    pub fn has_valid_month(&self) -> bool {
        (1..=12).contains(&self.month)
    }

    /// Quarter of the year (1-4).
    pub fn quarter(&self) -> u32 {
        (self.month.saturating_sub(1)) / 3 + 1
    }

    /// Semester of the year (1-2).
    pub fn semester(&self) -> u32 {
        if self.month <= 6 { 1 } else { 2 }
    }

    /// Months with typically higher attention demand (summer and winter peaks).
    pub fn is_high_season(&self) -> bool {
        matches!(self.month, 1 | 2 | 6 | 7 | 8 | 12)
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// Inclusive range of periods used for history queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodRange {
    pub start: Period,
    pub end: Period,
}

impl PeriodRange {
    pub fn contains(&self, period: Period) -> bool {
        period >= self.start && period <= self.end
    }
}

// =============================================================================
// Text normalization
// =============================================================================

/// Trim and upper-case a categorical value.
pub fn normalize_text(value: &str) -> String {
    value.trim().to_uppercase()
}

/// Normalize the accepted sex spellings to `M` / `F`.
///
/// Returns `None` for anything outside `M`, `F`, `MASCULINO`, `FEMENINO`.
pub fn normalize_sex(value: &str) -> Option<&'static str> {
    match normalize_text(value).as_str() {
        "M" | "MASCULINO" => Some("M"),
        "F" | "FEMENINO" => Some("F"),
        _ => None,
    }
}

fn normalize_sex_lossy(value: &str) -> String {
    normalize_sex(value)
        .map(str::to_string)
        .unwrap_or_else(|| normalize_text(value))
}

// =============================================================================
// Model kind
// =============================================================================

/// Closed set of regressor families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    Linear,
    Poisson,
    #[default]
    RandomForest,
    GradientBoosting,
}

impl ModelKind {
    /// Every model kind, in slot order.
    pub const ALL: [ModelKind; 4] = [
        ModelKind::Linear,
        ModelKind::Poisson,
        ModelKind::RandomForest,
        ModelKind::GradientBoosting,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelKind::Linear => "linear",
            ModelKind::Poisson => "poisson",
            ModelKind::RandomForest => "random_forest",
            ModelKind::GradientBoosting => "gradient_boosting",
        }
    }

    /// Human-readable family name for reports.
    pub fn display_name(&self) -> &'static str {
        match self {
            ModelKind::Linear => "Linear Regression (baseline)",
            ModelKind::Poisson => "Poisson GLM",
            ModelKind::RandomForest => "Random Forest Regressor",
            ModelKind::GradientBoosting => "Gradient Boosting Regressor",
        }
    }

    /// Whether the model consumes standardized inputs.
    ///
    /// Tree ensembles split on raw values; the GLMs are fitted on
    /// standardized columns.
    pub fn requires_scaling(&self) -> bool {
        matches!(self, ModelKind::Linear | ModelKind::Poisson)
    }

    /// Whether raw predictions can be negative and must be clamped.
    pub fn needs_clamp(&self) -> bool {
        matches!(self, ModelKind::Linear | ModelKind::GradientBoosting)
    }

    /// Position of this kind in [`ModelKind::ALL`].
    #[inline]
    pub fn slot(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for model names outside the closed set.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown model type '{0}' (expected linear, poisson, random_forest or gradient_boosting)")]
pub struct UnknownModelKind(pub String);

impl FromStr for ModelKind {
    type Err = UnknownModelKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "linear" => Ok(ModelKind::Linear),
            "poisson" => Ok(ModelKind::Poisson),
            "random_forest" => Ok(ModelKind::RandomForest),
            "gradient_boosting" => Ok(ModelKind::GradientBoosting),
            other => Err(UnknownModelKind(other.to_string())),
        }
    }
}

// =============================================================================
// Grouping key and historical rows
// =============================================================================

/// Series grouping key for temporal features.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupKey {
    pub region: String,
    pub sex: String,
    pub age_group: String,
    pub service_category: String,
    pub insurance_plan: String,
}

impl GroupKey {
    /// Build a normalized key. Sex spellings collapse to `M` / `F`.
    pub fn new(
        region: &str,
        sex: &str,
        age_group: &str,
        service_category: &str,
        insurance_plan: &str,
    ) -> Self {
        Self {
            region: normalize_text(region),
            sex: normalize_sex_lossy(sex),
            age_group: normalize_text(age_group),
            service_category: normalize_text(service_category),
            insurance_plan: normalize_text(insurance_plan),
        }
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}/{}",
            self.region, self.sex, self.age_group, self.service_category, self.insurance_plan
        )
    }
}

/// One aggregated historical record from the analytics store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalRow {
    pub year: i32,
    pub month: u32,
    pub region: String,
    pub sex: String,
    pub age_group: String,
    #[serde(default = "default_service_category")]
    pub service_category: String,
    pub insurance_plan: String,
    #[serde(default = "default_ipress_level")]
    pub ipress_level: String,
    pub count: f64,
}

impl HistoricalRow {
    #[inline]
    pub fn period(&self) -> Period {
        Period::new(self.year, self.month)
    }

    pub fn group_key(&self) -> GroupKey {
        GroupKey::new(
            &self.region,
            &self.sex,
            &self.age_group,
            &self.service_category,
            &self.insurance_plan,
        )
    }
}

fn default_service_category() -> String {
    DEFAULT_SERVICE_CATEGORY.to_string()
}

fn default_ipress_level() -> String {
    DEFAULT_IPRESS_LEVEL.to_string()
}

// =============================================================================
// Inbound requests
// =============================================================================

/// A single demand prediction request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRequest {
    pub year: i32,
    pub month: u32,
    pub region: String,
    pub age_group: String,
    pub sex: String,
    #[serde(default)]
    pub ipress_level: Option<String>,
    #[serde(default)]
    pub service_category: Option<String>,
    pub insurance_plan: String,
    #[serde(default)]
    pub model_type: Option<ModelKind>,
}

impl PredictionRequest {
    #[inline]
    pub fn period(&self) -> Period {
        Period::new(self.year, self.month)
    }

    pub fn ipress_level_or_default(&self) -> &str {
        self.ipress_level.as_deref().unwrap_or(DEFAULT_IPRESS_LEVEL)
    }

    pub fn service_category_or_default(&self) -> &str {
        self.service_category
            .as_deref()
            .unwrap_or(DEFAULT_SERVICE_CATEGORY)
    }

    pub fn group_key(&self) -> GroupKey {
        GroupKey::new(
            &self.region,
            &self.sex,
            &self.age_group,
            self.service_category_or_default(),
            &self.insurance_plan,
        )
    }
}

/// Batch wrapper: `1 <= items.len() <= MAX_BATCH_ITEMS`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchRequest {
    pub items: Vec<PredictionRequest>,
    #[serde(default)]
    pub model_type: Option<ModelKind>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_period_ordering_and_index() {
        let a = Period::new(2024, 12);
        let b = Period::new(2025, 1);
        assert!(a < b);
        assert_eq!(b.index() - a.index(), 1);
        assert_eq!(Period::from_index(a.index()), a);
        assert_eq!(Period::from_index(b.index()), b);
    }

    #[test]
    fn test_period_calendar_features() {
        let june = Period::new(2025, 6);
        assert_eq!(june.quarter(), 2);
        assert_eq!(june.semester(), 1);
        assert!(june.is_high_season());

        let october = Period::new(2025, 10);
        assert_eq!(october.quarter(), 4);
        assert_eq!(october.semester(), 2);
        assert!(!october.is_high_season());
    }

    #[test]
    fn test_model_kind_round_trip_names() {
        for kind in ModelKind::ALL {
            assert_eq!(kind.as_str().parse::<ModelKind>().unwrap(), kind);
            assert_eq!(ModelKind::ALL[kind.slot()], kind);
        }
        assert!("svm".parse::<ModelKind>().is_err());
    }

    #[test]
    fn test_model_kind_capabilities() {
        assert!(ModelKind::Linear.requires_scaling());
        assert!(!ModelKind::RandomForest.requires_scaling());
        assert!(!ModelKind::GradientBoosting.requires_scaling());
        assert!(ModelKind::Linear.needs_clamp());
        assert!(!ModelKind::Poisson.needs_clamp());
    }

    #[test]
    fn test_sex_normalization() {
        assert_eq!(normalize_sex(" femenino "), Some("F"));
        assert_eq!(normalize_sex("m"), Some("M"));
        assert_eq!(normalize_sex("X"), None);
    }

    #[test]
    fn test_group_key_normalizes_fields() {
        let a = GroupKey::new("lima ", "FEMENINO", "18-29", "general", "sis gratuito");
        let b = GroupKey::new("LIMA", "f", "18-29", "GENERAL", "SIS GRATUITO");
        assert_eq!(a, b);
    }

    #[test]
    fn test_request_defaults_from_json() {
        let json = r#"{
            "year": 2025, "month": 6, "region": "LIMA", "age_group": "18-29",
            "sex": "F", "insurance_plan": "GRATUITO", "model_type": "random_forest"
        }"#;
        let req: PredictionRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.ipress_level_or_default(), "I");
        assert_eq!(req.service_category_or_default(), "GENERAL");
        assert_eq!(req.model_type, Some(ModelKind::RandomForest));
        assert_eq!(req.group_key().sex, "F");
    }
}
