//! In-memory history source backed by a per-group index.

use std::collections::HashMap;

use types::{GroupKey, HistoricalRow, Period, PeriodRange};

use crate::{HistoryError, HistorySource, SeriesPoint, aggregate_series};

/// Immutable snapshot of history held in memory.
///
/// Built once; series lookups are a hash lookup plus a binary search.
#[derive(Debug, Clone, Default)]
pub struct InMemoryHistory {
    /// Rows ordered by period.
    rows: Vec<HistoricalRow>,
    /// Per-group series, ascending by period.
    index: HashMap<GroupKey, Vec<SeriesPoint>>,
}

impl InMemoryHistory {
    pub fn new(mut rows: Vec<HistoricalRow>) -> Self {
        rows.sort_by_key(|r| r.period());
        let index = aggregate_series(&rows);
        Self { rows, index }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn group_count(&self) -> usize {
        self.index.len()
    }
}

impl HistorySource for InMemoryHistory {
    fn series(
        &self,
        key: &GroupKey,
        before: Period,
    ) -> Result<Vec<SeriesPoint>, HistoryError> {
        let Some(series) = self.index.get(key) else {
            return Ok(Vec::new());
        };
        let end = series.partition_point(|(period, _)| *period < before);
        Ok(series[..end].to_vec())
    }

    fn rows(&self, range: Option<PeriodRange>) -> Result<Vec<HistoricalRow>, HistoryError> {
        Ok(match range {
            None => self.rows.clone(),
            Some(range) => self
                .rows
                .iter()
                .filter(|r| range.contains(r.period()))
                .cloned()
                .collect(),
        })
    }
}
