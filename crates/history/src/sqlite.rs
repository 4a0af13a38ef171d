//! SQLite-backed history source.
//!
//! Rows live in a single `attentions` table. Categorical columns are stored
//! normalized so group lookups are plain equality matches.

use std::path::Path;

use parking_lot::Mutex;
use rusqlite::{Connection, Row, params};
use tracing::info;
use types::{GroupKey, HistoricalRow, Period, PeriodRange, normalize_text};

use crate::{HistoryError, HistorySource, SeriesPoint};

const SELECT_ROWS: &str = "SELECT year, month, region, sex, age_group, service_category,
            insurance_plan, ipress_level, count
     FROM attentions";

/// Initialize database with schema
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS attentions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            year INTEGER NOT NULL,
            month INTEGER NOT NULL,
            region TEXT NOT NULL,
            sex TEXT NOT NULL,
            age_group TEXT NOT NULL,
            service_category TEXT NOT NULL,
            insurance_plan TEXT NOT NULL,
            ipress_level TEXT NOT NULL,
            count REAL NOT NULL
        )",
        [],
    )?;

    // Group series lookups
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attentions_group ON attentions(
            region, sex, age_group, service_category, insurance_plan, year, month
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attentions_period ON attentions(year, month)",
        [],
    )?;

    Ok(())
}

/// History source over a SQLite database.
pub struct SqliteHistory {
    conn: Mutex<Connection>,
}

impl SqliteHistory {
    /// Open (or create) a database file and ensure the schema exists.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, HistoryError> {
        let conn = Connection::open(path)?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self, HistoryError> {
        let conn = Connection::open_in_memory()?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Append rows in one transaction. Returns the number inserted.
    pub fn insert_rows(&self, rows: &[HistoricalRow]) -> Result<usize, HistoryError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO attentions (year, month, region, sex, age_group,
                    service_category, insurance_plan, ipress_level, count)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            )?;
            for row in rows {
                if !row.period().has_valid_month() {
                    return Err(HistoryError::InvalidRow(format!(
                        "month {} outside 1..=12",
                        row.month
                    )));
                }
                let key = row.group_key();
                stmt.execute(params![
                    row.year,
                    row.month,
                    key.region,
                    key.sex,
                    key.age_group,
                    key.service_category,
                    key.insurance_plan,
                    normalize_text(&row.ipress_level),
                    row.count,
                ])?;
            }
        }
        tx.commit()?;

        info!(rows = rows.len(), "Imported historical rows");
        Ok(rows.len())
    }

    pub fn row_count(&self) -> Result<usize, HistoryError> {
        let conn = self.conn.lock();
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM attentions", [], |r| r.get(0))?;
        Ok(n as usize)
    }
}

fn map_row(row: &Row<'_>) -> rusqlite::Result<HistoricalRow> {
    Ok(HistoricalRow {
        year: row.get(0)?,
        month: row.get(1)?,
        region: row.get(2)?,
        sex: row.get(3)?,
        age_group: row.get(4)?,
        service_category: row.get(5)?,
        insurance_plan: row.get(6)?,
        ipress_level: row.get(7)?,
        count: row.get(8)?,
    })
}

impl HistorySource for SqliteHistory {
    fn series(&self, key: &GroupKey, before: Period) -> Result<Vec<SeriesPoint>, HistoryError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT year, month, SUM(count)
             FROM attentions
             WHERE region = ?1 AND sex = ?2 AND age_group = ?3
               AND service_category = ?4 AND insurance_plan = ?5
               AND (year * 12 + month - 1) < ?6
             GROUP BY year, month
             ORDER BY year, month",
        )?;
        let points = stmt
            .query_map(
                params![
                    key.region,
                    key.sex,
                    key.age_group,
                    key.service_category,
                    key.insurance_plan,
                    before.index(),
                ],
                |r| {
                    let year: i32 = r.get(0)?;
                    let month: u32 = r.get(1)?;
                    let total: f64 = r.get(2)?;
                    Ok((Period::new(year, month), total))
                },
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(points)
    }

    fn rows(&self, range: Option<PeriodRange>) -> Result<Vec<HistoricalRow>, HistoryError> {
        let conn = self.conn.lock();
        let rows = match range {
            None => {
                let mut stmt = conn.prepare(&format!("{SELECT_ROWS} ORDER BY year, month, id"))?;
                stmt.query_map([], map_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?
            }
            Some(range) => {
                let mut stmt = conn.prepare(&format!(
                    "{SELECT_ROWS}
                     WHERE (year * 12 + month - 1) BETWEEN ?1 AND ?2
                     ORDER BY year, month, id"
                ))?;
                stmt.query_map(params![range.start.index(), range.end.index()], map_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?
            }
        };
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::row;

    fn seeded() -> SqliteHistory {
        let history = SqliteHistory::open_in_memory().unwrap();
        history
            .insert_rows(&[
                row(2024, 1, "LIMA", "I", 10.0),
                row(2024, 1, "LIMA", "II", 5.0),
                row(2024, 2, "LIMA", "I", 20.0),
                row(2024, 3, "LIMA", "I", 30.0),
                row(2024, 2, "CUSCO", "I", 8.0),
            ])
            .unwrap();
        history
    }

    #[test]
    fn test_init_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        init_schema(&conn).unwrap();
    }

    #[test]
    fn test_series_sums_and_excludes_target() {
        let history = seeded();
        let key = row(2024, 1, "lima ", "I", 0.0).group_key();

        let series = history.series(&key, Period::new(2024, 3)).unwrap();
        assert_eq!(
            series,
            vec![(Period::new(2024, 1), 15.0), (Period::new(2024, 2), 20.0)]
        );
    }

    #[test]
    fn test_rows_with_range() {
        let history = seeded();
        assert_eq!(history.row_count().unwrap(), 5);

        let range = PeriodRange {
            start: Period::new(2024, 2),
            end: Period::new(2024, 2),
        };
        let rows = history.rows(Some(range)).unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.month == 2));
    }

    #[test]
    fn test_insert_rejects_invalid_month() {
        let history = SqliteHistory::open_in_memory().unwrap();
        let err = history.insert_rows(&[row(2024, 13, "LIMA", "I", 1.0)]);
        assert!(matches!(err, Err(HistoryError::InvalidRow(_))));
        assert_eq!(history.row_count().unwrap(), 0);
    }
}
