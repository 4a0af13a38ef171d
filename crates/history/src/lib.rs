//! Historical attention aggregates, read-only.
//!
//! **SoC:** this crate only answers range and group queries over history.
//! It never writes on behalf of the forecasting core; the import helpers on
//! [`SqliteHistory`] exist for operators loading a snapshot.
//!
//! A group's *series* is one value per period: the sum of the counts of all
//! rows sharing that [`GroupKey`] and period (rows for different IPRESS
//! levels collapse into the same point).

mod memory;
mod sqlite;

use std::collections::HashMap;

use thiserror::Error;
use types::{GroupKey, HistoricalRow, Period, PeriodRange};

pub use memory::InMemoryHistory;
pub use sqlite::{SqliteHistory, init_schema};

/// One period of a group series, ascending by period.
pub type SeriesPoint = (Period, f64);

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("invalid historical row: {0}")]
    InvalidRow(String),
}

/// Read-only access to historical aggregates.
///
/// Implementors must be `Send + Sync`: the predictor shares one source
/// across concurrent requests.
pub trait HistorySource: Send + Sync {
    /// Series of `key` restricted to periods strictly before `before`,
    /// ascending by period.
    fn series(&self, key: &GroupKey, before: Period)
    -> Result<Vec<SeriesPoint>, HistoryError>;

    /// All rows (optionally within `range`), ordered by period.
    fn rows(&self, range: Option<PeriodRange>) -> Result<Vec<HistoricalRow>, HistoryError>;
}

/// Collapse rows into per-group series, each sorted ascending by period.
pub fn aggregate_series(rows: &[HistoricalRow]) -> HashMap<GroupKey, Vec<SeriesPoint>> {
    let mut sums: HashMap<GroupKey, HashMap<Period, f64>> = HashMap::new();
    for row in rows {
        *sums
            .entry(row.group_key())
            .or_default()
            .entry(row.period())
            .or_insert(0.0) += row.count;
    }

    sums.into_iter()
        .map(|(key, by_period)| {
            let mut series: Vec<SeriesPoint> = by_period.into_iter().collect();
            series.sort_by_key(|(period, _)| *period);
            (key, series)
        })
        .collect()
}

#[cfg(test)]
pub(crate) mod fixtures {
    use types::HistoricalRow;

    pub fn row(year: i32, month: u32, region: &str, ipress: &str, count: f64) -> HistoricalRow {
        HistoricalRow {
            year,
            month,
            region: region.to_string(),
            sex: "F".to_string(),
            age_group: "18-29".to_string(),
            service_category: "GENERAL".to_string(),
            insurance_plan: "GRATUITO".to_string(),
            ipress_level: ipress.to_string(),
            count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::row;
    use super::*;

    #[test]
    fn test_aggregate_sums_same_period_across_ipress_levels() {
        let rows = vec![
            row(2024, 2, "LIMA", "I", 4.0),
            row(2024, 1, "LIMA", "I", 10.0),
            row(2024, 1, "LIMA", "II", 5.0),
            row(2024, 1, "CUSCO", "I", 7.0),
        ];
        let series = aggregate_series(&rows);
        assert_eq!(series.len(), 2);

        let lima = &series[&rows[0].group_key()];
        assert_eq!(
            lima,
            &vec![(Period::new(2024, 1), 15.0), (Period::new(2024, 2), 4.0)]
        );
    }
}
