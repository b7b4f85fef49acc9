//! Transformation functions applied by pipeline steps.
//!
//! Every function takes a [`Dataset`] plus its parameters and returns a new
//! dataset; inputs are never mutated. Conversions that need reference series
//! (exchange rate, prices, GDP) read them through a [`ReferenceSource`].

pub mod change;
pub mod convert;
pub mod decompose;
pub mod primitives;
pub mod rebase;
pub mod resample;
pub mod rolling;
pub mod windows;

pub use change::{chg_diff, ChangeOperation, ChangePeriod};
pub use convert::{convert_gdp, convert_real, convert_usd};
pub use decompose::{decompose, Component, DecomposeMethod};
pub use rebase::rebase;
pub use resample::{interpolate_linear, resample, ResampleOperation};
pub use rolling::{rolling, RollingOperation};

use crate::config::{ReferenceTables, X13Config};
use crate::dataset::{Dataset, DatasetError};
use crate::frequency::Frequency;
use crate::time_series::{ColumnSelection, DataProvider, DataProviderError, DateRange};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Errors raised by transformation functions.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransformError {
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("{operation} does not support frequency {}", .frequency.map_or("unknown", |f| f.code()))]
    UnsupportedFrequency {
        operation: &'static str,
        frequency: Option<Frequency>,
    },
    #[error("series '{series}' cannot be converted: {reason}")]
    Precondition { series: String, reason: String },
    #[error("reference value unavailable: {0}")]
    MissingReference(String),
    #[error("series '{series}' has no periods in common with the {reference} reference")]
    NoOverlap { series: String, reference: String },
    #[error("decomposition failed: {0}")]
    DecompositionFailed(String),
    #[error("reference data: {0}")]
    Reference(#[from] DataProviderError),
    #[error(transparent)]
    Dataset(#[from] DatasetError),
}

/// What a conversion does when a column does not meet its preconditions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorPolicy {
    /// Fail the step.
    #[default]
    Raise,
    /// Leave the column untouched and log a warning.
    Ignore,
}

/// Supplies the reference series the conversion steps divide by.
pub trait ReferenceSource {
    /// Exchange rates: column 0 is the period average, column 1 the end of
    /// period rate.
    fn exchange_rate(&self) -> Result<Dataset, TransformError>;

    /// Consumer price index, one column.
    fn consumer_prices(&self) -> Result<Dataset, TransformError>;

    /// Quarterly nominal GDP: column 0 in local currency, column 1 in USD.
    fn gdp(&self) -> Result<Dataset, TransformError>;
}

/// Reads reference series from a [`DataProvider`] using configured table
/// and column names.
pub struct ProviderReferences<'a> {
    provider: &'a dyn DataProvider,
    tables: &'a ReferenceTables,
}

impl<'a> ProviderReferences<'a> {
    pub fn new(provider: &'a dyn DataProvider, tables: &'a ReferenceTables) -> Self {
        ProviderReferences { provider, tables }
    }

    fn fetch(&self, table: &str, columns: &[&str]) -> Result<Dataset, TransformError> {
        debug!(table = table, columns = ?columns, "ProviderReferences: fetching reference");
        let selection = ColumnSelection::named(columns.iter().copied());
        Ok(self
            .provider
            .read(table, &selection, &DateRange::unbounded())?)
    }
}

impl ReferenceSource for ProviderReferences<'_> {
    fn exchange_rate(&self) -> Result<Dataset, TransformError> {
        self.fetch(
            &self.tables.exchange_rate_table,
            &[
                &self.tables.exchange_rate_average,
                &self.tables.exchange_rate_end,
            ],
        )
    }

    fn consumer_prices(&self) -> Result<Dataset, TransformError> {
        self.fetch(&self.tables.cpi_table, &[&self.tables.cpi_column])
    }

    fn gdp(&self) -> Result<Dataset, TransformError> {
        self.fetch(
            &self.tables.gdp_table,
            &[&self.tables.gdp_local_column, &self.tables.gdp_usd_column],
        )
    }
}

/// Collaborators a step may need beyond its own parameters.
#[derive(Clone, Copy)]
pub struct TransformContext<'a> {
    pub references: &'a dyn ReferenceSource,
    pub x13: &'a X13Config,
}

impl<'a> TransformContext<'a> {
    pub fn new(references: &'a dyn ReferenceSource, x13: &'a X13Config) -> Self {
        TransformContext { references, x13 }
    }
}

/// Frequency of a dataset: inferred from the index when it has enough rows,
/// otherwise taken from the column metadata when every column agrees.
pub fn frequency_of(dataset: &Dataset) -> Option<Frequency> {
    if dataset.len() >= 3 {
        return dataset.frequency();
    }
    let mut tagged = dataset.metadata().iter().map(|meta| meta.frequency);
    let first = tagged.next()??;
    if tagged.all(|frequency| frequency == Some(first)) {
        Some(first)
    } else {
        None
    }
}
