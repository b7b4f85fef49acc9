use crate::dataset::Dataset;
use crate::frequency::Frequency;
use crate::metadata::{Currency, SeriesMetadata, SeriesType};
use crate::time_series::{select_columns, ColumnSelection, DataProvider, DataProviderError, DateRange};
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::debug;

/// Series store backed by SQLite.
///
/// A stored table is a set of metadata rows (one per series) plus one value
/// row per series and date. The schema is created when the store is opened.
#[derive(Debug)]
pub struct SqliteDataProvider {
    conn: Connection,
}

fn sql_error(e: rusqlite::Error) -> DataProviderError {
    DataProviderError::Other(format!("SQL error: {}", e))
}

impl SqliteDataProvider {
    /// Opens (or creates) the database file at `db_path`.
    ///
    /// # Errors
    /// Fails when the file cannot be opened or the schema cannot be created.
    pub fn new<P: AsRef<Path>>(db_path: P) -> SqliteResult<Self> {
        let conn = Connection::open(db_path)?;
        let provider = SqliteDataProvider { conn };
        provider.ensure_schema()?;
        Ok(provider)
    }

    /// Opens a private in-memory database.
    pub fn new_in_memory() -> SqliteResult<Self> {
        let conn = Connection::open_in_memory()?;
        let provider = SqliteDataProvider { conn };
        provider.ensure_schema()?;
        Ok(provider)
    }

    /// Creates the two series tables and their index when missing.
    fn ensure_schema(&self) -> SqliteResult<()> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS series_metadata (
                table_name TEXT NOT NULL,
                column_name TEXT NOT NULL,
                position INTEGER NOT NULL,
                area TEXT NOT NULL,
                frequency TEXT,
                currency TEXT NOT NULL,
                inflation_adjustment TEXT NOT NULL,
                unit TEXT NOT NULL,
                seasonal_adjustment TEXT NOT NULL,
                series_type TEXT NOT NULL,
                cumulative_periods INTEGER NOT NULL,
                PRIMARY KEY (table_name, column_name)
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS series_values (
                table_name TEXT NOT NULL,
                column_name TEXT NOT NULL,
                date TEXT NOT NULL,
                value REAL,
                PRIMARY KEY (table_name, column_name, date)
            )",
            [],
        )?;

        // Range scans always filter by table first
        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_series_values_table_date ON series_values(table_name, date)",
            [],
        )?;

        Ok(())
    }

    /// Whether SQLite itself has a table called `table_name`.
    #[cfg(test)]
    fn table_exists(&self, table_name: &str) -> SqliteResult<bool> {
        let mut stmt = self
            .conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' AND name=?1")?;
        let exists = stmt.exists([table_name])?;
        Ok(exists)
    }

    /// Underlying connection, for ad hoc queries.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Replaces the stored contents of `table` with `dataset`.
    ///
    /// Runs in one transaction; missing values are stored as NULL so the
    /// full index survives a round trip.
    pub fn store(&self, table: &str, dataset: &Dataset) -> Result<(), DataProviderError> {
        let tx = self.conn.unchecked_transaction().map_err(sql_error)?;

        tx.execute("DELETE FROM series_values WHERE table_name = ?1", [table])
            .map_err(sql_error)?;
        tx.execute("DELETE FROM series_metadata WHERE table_name = ?1", [table])
            .map_err(sql_error)?;

        {
            let mut meta_stmt = tx
                .prepare(
                    "INSERT INTO series_metadata (table_name, column_name, position, area, frequency,
                        currency, inflation_adjustment, unit, seasonal_adjustment, series_type,
                        cumulative_periods)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                )
                .map_err(sql_error)?;
            let mut value_stmt = tx
                .prepare(
                    "INSERT INTO series_values (table_name, column_name, date, value)
                     VALUES (?1, ?2, ?3, ?4)",
                )
                .map_err(sql_error)?;

            for (position, (values, meta)) in
                dataset.columns().iter().zip(dataset.metadata()).enumerate()
            {
                meta_stmt
                    .execute(params![
                        table,
                        meta.name,
                        position as i64,
                        meta.area,
                        meta.frequency.map(|f| f.code()),
                        meta.currency.code(),
                        meta.inflation_adjustment,
                        meta.unit,
                        meta.seasonal_adjustment,
                        meta.series_type.label(),
                        meta.cumulative_periods as i64,
                    ])
                    .map_err(sql_error)?;

                for (date, value) in dataset.index().iter().zip(values) {
                    let stored = if value.is_nan() { None } else { Some(*value) };
                    value_stmt
                        .execute(params![table, meta.name, date, stored])
                        .map_err(sql_error)?;
                }
            }
        }

        tx.commit().map_err(sql_error)?;
        debug!(
            table = table,
            series = dataset.width(),
            rows = dataset.len(),
            "SqliteDataProvider: stored table"
        );
        Ok(())
    }

    fn read_metadata(&self, table: &str) -> Result<Vec<SeriesMetadata>, DataProviderError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT column_name, area, frequency, currency, inflation_adjustment, unit,
                        seasonal_adjustment, series_type, cumulative_periods
                 FROM series_metadata
                 WHERE table_name = ?1
                 ORDER BY position",
            )
            .map_err(sql_error)?;

        let rows = stmt
            .query_map([table], |row| {
                let frequency: Option<String> = row.get(2)?;
                let currency: String = row.get(3)?;
                let series_type: String = row.get(7)?;
                let cumulative: i64 = row.get(8)?;
                Ok(SeriesMetadata {
                    name: row.get(0)?,
                    area: row.get(1)?,
                    frequency: frequency.as_deref().and_then(Frequency::from_code),
                    currency: Currency::from_code(&currency),
                    inflation_adjustment: row.get(4)?,
                    unit: row.get(5)?,
                    seasonal_adjustment: row.get(6)?,
                    series_type: SeriesType::from_label(&series_type),
                    cumulative_periods: cumulative.max(1) as u32,
                })
            })
            .map_err(sql_error)?;

        let mut metadata = Vec::new();
        for row_result in rows {
            match row_result {
                Ok(meta) => metadata.push(meta),
                Err(e) => {
                    return Err(DataProviderError::Malformed(format!(
                        "Row parsing error: {}",
                        e
                    )))
                }
            }
        }
        Ok(metadata)
    }
}

impl DataProvider for SqliteDataProvider {
    fn read(
        &self,
        table: &str,
        columns: &ColumnSelection,
        range: &DateRange,
    ) -> Result<Dataset, DataProviderError> {
        // Validate date range
        if !range.is_valid() {
            return Err(DataProviderError::InvalidDateRange);
        }

        let metadata = self.read_metadata(table)?;
        if metadata.is_empty() {
            return Err(DataProviderError::TableNotFound(table.to_string()));
        }

        let positions: HashMap<&str, usize> = metadata
            .iter()
            .enumerate()
            .map(|(position, meta)| (meta.name.as_str(), position))
            .collect();

        // Open bounds compare against dates no series can hold
        let start = range
            .start
            .unwrap_or(NaiveDate::from_ymd_opt(1, 1, 1).unwrap_or(NaiveDate::MIN));
        let end = range
            .end
            .unwrap_or(NaiveDate::from_ymd_opt(9999, 12, 31).unwrap_or(NaiveDate::MAX));

        let mut stmt = self
            .conn
            .prepare(
                "SELECT column_name, date, value FROM series_values
                 WHERE table_name = ?1
                 AND date >= ?2
                 AND date <= ?3
                 ORDER BY date",
            )
            .map_err(sql_error)?;

        let rows = stmt
            .query_map(params![table, start, end], |row| {
                let column: String = row.get(0)?;
                let date: NaiveDate = row.get(1)?;
                let value: Option<f64> = row.get(2)?;
                Ok((column, date, value))
            })
            .map_err(sql_error)?;

        let mut by_date: BTreeMap<NaiveDate, Vec<f64>> = BTreeMap::new();
        for row_result in rows {
            let (column, date, value) = row_result
                .map_err(|e| DataProviderError::Malformed(format!("Row parsing error: {}", e)))?;
            let position = positions.get(column.as_str()).copied().ok_or_else(|| {
                DataProviderError::Malformed(format!("value row for unknown series '{}'", column))
            })?;
            let row = by_date
                .entry(date)
                .or_insert_with(|| vec![f64::NAN; metadata.len()]);
            row[position] = value.unwrap_or(f64::NAN);
        }

        let index: Vec<NaiveDate> = by_date.keys().copied().collect();
        let mut values = vec![Vec::with_capacity(index.len()); metadata.len()];
        for row in by_date.values() {
            for (column, value) in row.iter().enumerate() {
                values[column].push(*value);
            }
        }

        let full = Dataset::new(index, values, metadata)
            .map_err(|e| DataProviderError::Malformed(e.to_string()))?;
        select_columns(table, &full, columns)
    }

    fn tables(&self) -> Result<Vec<String>, DataProviderError> {
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT table_name FROM series_metadata ORDER BY table_name")
            .map_err(sql_error)?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(sql_error)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(sql_error)?;
        Ok(names)
    }
}

impl SqliteDataProvider {
    /// Number of series stored for `table`, or `None` when it is unknown.
    pub fn series_count(&self, table: &str) -> Result<Option<usize>, DataProviderError> {
        let count: Option<i64> = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM series_metadata WHERE table_name = ?1 HAVING COUNT(*) > 0",
                [table],
                |row| row.get(0),
            )
            .optional()
            .map_err(sql_error)?;
        Ok(count.map(|count| count as usize))
    }
}
