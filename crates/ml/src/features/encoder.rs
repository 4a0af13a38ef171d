//! Stateful request-to-vector encoder.
//!
//! The encoder is fitted once on the training fold and then frozen inside the
//! artifact that owns it. Columns are emitted in the order recorded in
//! [`EncoderState::columns`]:
//!
//! ```text
//! calendar:   year, month, quarter, semester, high_season
//! temporal:   lag_1, rolling_mean_3, rolling_mean_6
//! target-enc: region, service_category, insurance_plan
//! ordinal:    sex, ipress_level, age_group, age_category
//! ```
//!
//! Target-encoded columns fall back to the global training mean for values
//! never seen in training; the fallback is reported, not raised. Ordinal
//! columns have fixed category lists and reject anything else.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use types::{HistoricalRow, Period, PredictionRequest, normalize_sex, normalize_text};

use super::temporal::TemporalFeatures;
use crate::error::EncodeError;

/// Feature vector: inline storage covers the full column set.
pub type FeatureVector = SmallVec<[f64; 16]>;

/// Bumped whenever a category list or the column set changes.
pub const CATEGORY_SCHEMA_VERSION: u32 = 1;

pub const SEX_CATEGORIES: [&str; 2] = ["M", "F"];
pub const IPRESS_LEVELS: [&str; 3] = ["I", "II", "III"];
pub const AGE_GROUPS: [&str; 8] = [
    "00-04", "05-11", "12-17", "18-29", "30-59", "60+", "60-69", "70+",
];
pub const AGE_CATEGORIES: [&str; 4] = ["INFANCIA", "ADOLESCENCIA", "ADULTOS", "ADULTOS_MAYORES"];

/// Life-stage category of an age group.
pub fn age_category(age_group: &str) -> Option<&'static str> {
    match age_group {
        "00-04" | "05-11" => Some("INFANCIA"),
        "12-17" => Some("ADOLESCENCIA"),
        "18-29" | "30-59" => Some("ADULTOS"),
        "60+" | "60-69" | "70+" => Some("ADULTOS_MAYORES"),
        _ => None,
    }
}

// =============================================================================
// Columns
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureColumn {
    Year,
    Month,
    Quarter,
    Semester,
    HighSeason,
    #[serde(rename = "lag_1")]
    Lag1,
    #[serde(rename = "rolling_mean_3")]
    RollingMean3,
    #[serde(rename = "rolling_mean_6")]
    RollingMean6,
    Region,
    ServiceCategory,
    InsurancePlan,
    Sex,
    IpressLevel,
    AgeGroup,
    AgeCategory,
}

impl FeatureColumn {
    /// Canonical column order.
    pub const ALL: [FeatureColumn; 15] = [
        FeatureColumn::Year,
        FeatureColumn::Month,
        FeatureColumn::Quarter,
        FeatureColumn::Semester,
        FeatureColumn::HighSeason,
        FeatureColumn::Lag1,
        FeatureColumn::RollingMean3,
        FeatureColumn::RollingMean6,
        FeatureColumn::Region,
        FeatureColumn::ServiceCategory,
        FeatureColumn::InsurancePlan,
        FeatureColumn::Sex,
        FeatureColumn::IpressLevel,
        FeatureColumn::AgeGroup,
        FeatureColumn::AgeCategory,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            FeatureColumn::Year => "year",
            FeatureColumn::Month => "month",
            FeatureColumn::Quarter => "quarter",
            FeatureColumn::Semester => "semester",
            FeatureColumn::HighSeason => "high_season",
            FeatureColumn::Lag1 => "lag_1",
            FeatureColumn::RollingMean3 => "rolling_mean_3",
            FeatureColumn::RollingMean6 => "rolling_mean_6",
            FeatureColumn::Region => "region",
            FeatureColumn::ServiceCategory => "service_category",
            FeatureColumn::InsurancePlan => "insurance_plan",
            FeatureColumn::Sex => "sex",
            FeatureColumn::IpressLevel => "ipress_level",
            FeatureColumn::AgeGroup => "age_group",
            FeatureColumn::AgeCategory => "age_category",
        }
    }
}

/// Number of columns emitted by the current schema.
pub const N_FEATURES: usize = FeatureColumn::ALL.len();

// =============================================================================
// Input
// =============================================================================

/// Borrowed view of the categorical and calendar fields the encoder reads.
#[derive(Debug, Clone, Copy)]
pub struct EncoderInput<'a> {
    pub period: Period,
    pub region: &'a str,
    pub service_category: &'a str,
    pub insurance_plan: &'a str,
    pub sex: &'a str,
    pub ipress_level: &'a str,
    pub age_group: &'a str,
}

impl<'a> From<&'a PredictionRequest> for EncoderInput<'a> {
    fn from(req: &'a PredictionRequest) -> Self {
        Self {
            period: req.period(),
            region: &req.region,
            service_category: req.service_category_or_default(),
            insurance_plan: &req.insurance_plan,
            sex: &req.sex,
            ipress_level: req.ipress_level_or_default(),
            age_group: &req.age_group,
        }
    }
}

impl<'a> From<&'a HistoricalRow> for EncoderInput<'a> {
    fn from(row: &'a HistoricalRow) -> Self {
        Self {
            period: row.period(),
            region: &row.region,
            service_category: &row.service_category,
            insurance_plan: &row.insurance_plan,
            sex: &row.sex,
            ipress_level: &row.ipress_level,
            age_group: &row.age_group,
        }
    }
}

/// Normalized fields plus ordinal codes, resolved once per input.
struct Resolved {
    region: String,
    service_category: String,
    insurance_plan: String,
    sex: f64,
    ipress_level: f64,
    age_group: f64,
    age_category: f64,
}

fn ordinal(categories: &[&str], field: &'static str, value: &str) -> Result<f64, EncodeError> {
    categories
        .iter()
        .position(|c| *c == value)
        .map(|i| i as f64)
        .ok_or_else(|| EncodeError::UnknownCategory {
            field,
            value: value.to_string(),
        })
}

impl EncoderInput<'_> {
    fn resolve(&self) -> Result<Resolved, EncodeError> {
        if !self.period.has_valid_month() {
            return Err(EncodeError::InvalidMonth(self.period.month));
        }

        let sex = normalize_sex(self.sex).ok_or_else(|| EncodeError::UnknownCategory {
            field: "sex",
            value: self.sex.trim().to_string(),
        })?;
        let ipress = normalize_text(self.ipress_level);
        let age_group = normalize_text(self.age_group);
        let stage = age_category(&age_group).ok_or_else(|| EncodeError::UnknownCategory {
            field: "age_group",
            value: age_group.clone(),
        })?;

        Ok(Resolved {
            region: normalize_text(self.region),
            service_category: normalize_text(self.service_category),
            insurance_plan: normalize_text(self.insurance_plan),
            sex: ordinal(&SEX_CATEGORIES, "sex", sex)?,
            ipress_level: ordinal(&IPRESS_LEVELS, "ipress_level", &ipress)?,
            age_group: ordinal(&AGE_GROUPS, "age_group", &age_group)?,
            age_category: ordinal(&AGE_CATEGORIES, "age_category", stage)?,
        })
    }

    /// Whether every fixed-vocabulary field is recognized.
    pub fn is_encodable(&self) -> bool {
        self.resolve().is_ok()
    }
}

// =============================================================================
// Scaler
// =============================================================================

/// Per-column standardization, fitted on training vectors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    pub mean: Vec<f64>,
    /// Population standard deviation; zero-variance columns store 1.0.
    pub scale: Vec<f64>,
}

impl StandardScaler {
    pub fn fit(rows: &[FeatureVector], width: usize) -> Self {
        let n = rows.len().max(1) as f64;
        let mut mean = vec![0.0; width];
        for row in rows {
            for (m, v) in mean.iter_mut().zip(row.iter()) {
                *m += v;
            }
        }
        mean.iter_mut().for_each(|m| *m /= n);

        let mut scale = vec![0.0; width];
        for row in rows {
            for ((s, v), m) in scale.iter_mut().zip(row.iter()).zip(&mean) {
                *s += (v - m).powi(2);
            }
        }
        scale.iter_mut().for_each(|s| {
            let sd = (*s / n).sqrt();
            *s = if sd > 0.0 && sd.is_finite() { sd } else { 1.0 };
        });

        Self { mean, scale }
    }

    #[inline]
    pub fn apply(&self, values: &mut [f64]) {
        for ((v, m), s) in values.iter_mut().zip(&self.mean).zip(&self.scale) {
            *v = (*v - m) / s;
        }
    }
}

// =============================================================================
// Encoder state
// =============================================================================

/// A transformed request plus the target-encoded columns that fell back.
#[derive(Debug, Clone, PartialEq)]
pub struct Encoded {
    pub vector: FeatureVector,
    pub fallbacks: Vec<&'static str>,
}

/// Fitted encoder. Immutable once built; owned by one artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncoderState {
    pub schema_version: u32,
    pub columns: Vec<FeatureColumn>,
    /// Mean training target, used for unseen target-encoded categories.
    pub global_mean: f64,
    pub region: BTreeMap<String, f64>,
    pub service_category: BTreeMap<String, f64>,
    pub insurance_plan: BTreeMap<String, f64>,
    /// Present only when the owning model consumes standardized inputs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scaler: Option<StandardScaler>,
}

fn target_means(keys: impl Iterator<Item = String>, targets: &[f64]) -> BTreeMap<String, f64> {
    let mut acc: HashMap<String, (f64, usize)> = HashMap::new();
    for (key, y) in keys.zip(targets) {
        let slot = acc.entry(key).or_insert((0.0, 0));
        slot.0 += y;
        slot.1 += 1;
    }
    acc.into_iter()
        .map(|(k, (sum, n))| (k, sum / n as f64))
        .collect()
}

impl EncoderState {
    /// Fit target encodings (and the scaler when requested) on training rows.
    ///
    /// `inputs`, `targets` and `temporal` are parallel slices.
    pub fn fit(
        inputs: &[EncoderInput<'_>],
        targets: &[f64],
        temporal: &[TemporalFeatures],
        requires_scaling: bool,
    ) -> Result<Self, EncodeError> {
        if inputs.is_empty() {
            return Err(EncodeError::Fit("no training rows".into()));
        }
        if inputs.len() != targets.len() || inputs.len() != temporal.len() {
            return Err(EncodeError::Fit(format!(
                "length mismatch: {} inputs, {} targets, {} temporal rows",
                inputs.len(),
                targets.len(),
                temporal.len()
            )));
        }

        let global_mean = series::mean(targets).unwrap_or(0.0);
        let mut state = Self {
            schema_version: CATEGORY_SCHEMA_VERSION,
            columns: FeatureColumn::ALL.to_vec(),
            global_mean,
            region: target_means(inputs.iter().map(|i| normalize_text(i.region)), targets),
            service_category: target_means(
                inputs.iter().map(|i| normalize_text(i.service_category)),
                targets,
            ),
            insurance_plan: target_means(
                inputs.iter().map(|i| normalize_text(i.insurance_plan)),
                targets,
            ),
            scaler: None,
        };

        if requires_scaling {
            let raw = inputs
                .iter()
                .zip(temporal)
                .map(|(input, t)| state.encode_raw(input, t).map(|e| e.vector))
                .collect::<Result<Vec<_>, _>>()?;
            state.scaler = Some(StandardScaler::fit(&raw, state.columns.len()));
        }

        Ok(state)
    }

    /// Number of columns produced by [`EncoderState::transform`].
    #[inline]
    pub fn width(&self) -> usize {
        self.columns.len()
    }

    /// Reject encoders recorded under a different column set or category
    /// schema.
    pub fn check_schema(&self) -> Result<(), EncodeError> {
        if self.schema_version != CATEGORY_SCHEMA_VERSION {
            return Err(EncodeError::SchemaMismatch(format!(
                "category schema v{} (this build reads v{})",
                self.schema_version, CATEGORY_SCHEMA_VERSION
            )));
        }
        if self.columns.as_slice() != FeatureColumn::ALL.as_slice() {
            return Err(EncodeError::SchemaMismatch(format!(
                "recorded {} columns do not match the {} canonical columns",
                self.columns.len(),
                N_FEATURES
            )));
        }
        if let Some(scaler) = &self.scaler {
            if scaler.mean.len() != self.width() || scaler.scale.len() != self.width() {
                return Err(EncodeError::SchemaMismatch(format!(
                    "scaler width {} differs from column count {}",
                    scaler.mean.len(),
                    self.width()
                )));
            }
        }
        Ok(())
    }

    /// Encode one input into a model-ready vector.
    pub fn transform(
        &self,
        input: &EncoderInput<'_>,
        temporal: &TemporalFeatures,
    ) -> Result<Encoded, EncodeError> {
        self.check_schema()?;
        let mut encoded = self.encode_raw(input, temporal)?;
        if let Some(scaler) = &self.scaler {
            scaler.apply(&mut encoded.vector);
        }
        Ok(encoded)
    }

    /// Encode many inputs, dropping fallback bookkeeping.
    pub fn transform_all(
        &self,
        inputs: &[EncoderInput<'_>],
        temporal: &[TemporalFeatures],
    ) -> Result<Vec<FeatureVector>, EncodeError> {
        inputs
            .iter()
            .zip(temporal)
            .map(|(input, t)| self.transform(input, t).map(|e| e.vector))
            .collect()
    }

    fn encode_raw(
        &self,
        input: &EncoderInput<'_>,
        temporal: &TemporalFeatures,
    ) -> Result<Encoded, EncodeError> {
        let resolved = input.resolve()?;
        let period = input.period;
        let mut fallbacks = Vec::new();
        let mut target = |table: &BTreeMap<String, f64>, key: &str, column: FeatureColumn| {
            table.get(key).copied().unwrap_or_else(|| {
                fallbacks.push(column.name());
                self.global_mean
            })
        };

        let mut vector = FeatureVector::with_capacity(self.columns.len());
        for column in &self.columns {
            let value = match column {
                FeatureColumn::Year => period.year as f64,
                FeatureColumn::Month => period.month as f64,
                FeatureColumn::Quarter => period.quarter() as f64,
                FeatureColumn::Semester => period.semester() as f64,
                FeatureColumn::HighSeason => {
                    if period.is_high_season() {
                        1.0
                    } else {
                        0.0
                    }
                }
                FeatureColumn::Lag1 => temporal.lag_1,
                FeatureColumn::RollingMean3 => temporal.rolling_mean_3,
                FeatureColumn::RollingMean6 => temporal.rolling_mean_6,
                FeatureColumn::Region => target(&self.region, &resolved.region, *column),
                FeatureColumn::ServiceCategory => {
                    target(&self.service_category, &resolved.service_category, *column)
                }
                FeatureColumn::InsurancePlan => {
                    target(&self.insurance_plan, &resolved.insurance_plan, *column)
                }
                FeatureColumn::Sex => resolved.sex,
                FeatureColumn::IpressLevel => resolved.ipress_level,
                FeatureColumn::AgeGroup => resolved.age_group,
                FeatureColumn::AgeCategory => resolved.age_category,
            };
            vector.push(value);
        }

        Ok(Encoded { vector, fallbacks })
    }
}
