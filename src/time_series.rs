use crate::dataset::Dataset;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Date bounds for querying or trimming series. Either end may be open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    /// First date kept, inclusive
    pub start: Option<NaiveDate>,
    /// Last date kept, inclusive
    pub end: Option<NaiveDate>,
}

impl DateRange {
    /// Creates a DateRange bounded on both ends.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        DateRange {
            start: Some(start),
            end: Some(end),
        }
    }

    /// A range with no bounds.
    pub fn unbounded() -> Self {
        DateRange::default()
    }

    pub fn from_bounds(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        DateRange { start, end }
    }

    pub fn is_valid(&self) -> bool {
        match (self.start, self.end) {
            (Some(start), Some(end)) => start <= end,
            _ => true,
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start.map_or(true, |start| date >= start) && self.end.map_or(true, |end| date <= end)
    }
}

/// Which columns of a stored table to read.
///
/// Serialised as `"*"` for every column or as a list of names.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "ColumnSpec", into = "ColumnSpec")]
pub enum ColumnSelection {
    /// Every column, in stored order.
    #[default]
    All,
    /// The named columns, in the order given.
    Named(Vec<String>),
}

impl ColumnSelection {
    pub fn named<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ColumnSelection::Named(names.into_iter().map(Into::into).collect())
    }

    /// "*" anywhere in the list selects every column.
    pub fn normalized(&self) -> ColumnSelection {
        match self {
            ColumnSelection::Named(names) if names.iter().any(|name| name == "*") => {
                ColumnSelection::All
            }
            other => other.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum ColumnSpec {
    One(String),
    Many(Vec<String>),
}

impl From<ColumnSpec> for ColumnSelection {
    fn from(spec: ColumnSpec) -> Self {
        match spec {
            ColumnSpec::One(name) => ColumnSelection::Named(vec![name]).normalized(),
            ColumnSpec::Many(names) => ColumnSelection::Named(names).normalized(),
        }
    }
}

impl From<ColumnSelection> for ColumnSpec {
    fn from(selection: ColumnSelection) -> Self {
        match selection {
            ColumnSelection::All => ColumnSpec::One("*".to_string()),
            ColumnSelection::Named(names) => ColumnSpec::Many(names),
        }
    }
}

/// Read access to stored series tables.
///
/// The pipeline reads both the series a user selected and the reference
/// series it needs (exchange rates, prices, GDP) through this trait.
/// [`InMemoryDataProvider`] backs tests; `SqliteDataProvider` backs the CLI.
pub trait DataProvider {
    /// Reads columns of a stored table, restricted to `range`.
    ///
    /// # Errors
    /// Returns an error if the table or a requested column does not exist,
    /// the range is inverted, or the store cannot be read.
    fn read(
        &self,
        table: &str,
        columns: &ColumnSelection,
        range: &DateRange,
    ) -> Result<Dataset, DataProviderError>;

    /// Names of every stored table.
    fn tables(&self) -> Result<Vec<String>, DataProviderError>;
}

/// Failures reading from a [`DataProvider`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DataProviderError {
    #[error("table not found: {0}")]
    TableNotFound(String),
    #[error("column '{column}' not found in table '{table}'")]
    ColumnNotFound { table: String, column: String },
    /// Start date after end date
    #[error("invalid date range")]
    InvalidDateRange,
    #[error("stored data is malformed: {0}")]
    Malformed(String),
    #[error("{0}")]
    Other(String),
}

/// Whole tables held in memory, keyed by table name.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDataProvider {
    tables: HashMap<String, Dataset>,
}

impl InMemoryDataProvider {
    pub fn new() -> Self {
        InMemoryDataProvider {
            tables: HashMap::new(),
        }
    }

    /// Adds (or replaces) a table.
    pub fn add_table(&mut self, name: impl Into<String>, dataset: Dataset) {
        self.tables.insert(name.into(), dataset);
    }
}

/// Picks columns out of `dataset` by name, in the requested order.
pub(crate) fn select_columns(
    table: &str,
    dataset: &Dataset,
    columns: &ColumnSelection,
) -> Result<Dataset, DataProviderError> {
    let names = match columns.normalized() {
        ColumnSelection::All => return Ok(dataset.clone()),
        ColumnSelection::Named(names) => names,
    };

    let mut values = Vec::with_capacity(names.len());
    let mut metadata = Vec::with_capacity(names.len());
    for name in &names {
        let position = dataset
            .metadata()
            .iter()
            .position(|meta| &meta.name == name)
            .ok_or_else(|| DataProviderError::ColumnNotFound {
                table: table.to_string(),
                column: name.clone(),
            })?;
        values.push(dataset.columns()[position].clone());
        metadata.push(dataset.metadata()[position].clone());
    }

    Dataset::new(dataset.index().to_vec(), values, metadata)
        .map_err(|e| DataProviderError::Malformed(e.to_string()))
}

impl DataProvider for InMemoryDataProvider {
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

        let stored = self
            .tables
            .get(table)
            .ok_or_else(|| DataProviderError::TableNotFound(table.to_string()))?;

        let selected = select_columns(table, stored, columns)?;
        Ok(selected.slice(range))
    }

    fn tables(&self) -> Result<Vec<String>, DataProviderError> {
        let mut names: Vec<String> = self.tables.keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}
