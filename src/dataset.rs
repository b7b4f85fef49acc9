//! Time-indexed table of series sharing one date index.
//!
//! Values and metadata travel side by side: `columns[i]` holds the values of
//! the series described by `metadata[i]`. Missing observations are `NaN`.

use crate::frequency::Frequency;
use crate::metadata::SeriesMetadata;
use crate::time_series::DateRange;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

/// Errors raised when a dataset would violate its shape invariants.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DatasetError {
    #[error("index is not strictly increasing at position {0}")]
    UnsortedIndex(usize),
    #[error("column {column} has {actual} values, index has {expected}")]
    LengthMismatch {
        column: usize,
        expected: usize,
        actual: usize,
    },
    #[error("{columns} columns but {metadata} metadata records")]
    MetadataMismatch { columns: usize, metadata: usize },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "DatasetRecord", into = "DatasetRecord")]
pub struct Dataset {
    index: Vec<NaiveDate>,
    columns: Vec<Vec<f64>>,
    metadata: Vec<SeriesMetadata>,
}

impl Dataset {
    /// Builds a dataset after checking the index is strictly increasing and
    /// every column lines up with it and with a metadata record.
    pub fn new(
        index: Vec<NaiveDate>,
        columns: Vec<Vec<f64>>,
        metadata: Vec<SeriesMetadata>,
    ) -> Result<Self, DatasetError> {
        if let Some(position) = index.windows(2).position(|pair| pair[0] >= pair[1]) {
            return Err(DatasetError::UnsortedIndex(position + 1));
        }
        if columns.len() != metadata.len() {
            return Err(DatasetError::MetadataMismatch {
                columns: columns.len(),
                metadata: metadata.len(),
            });
        }
        if let Some((column, values)) = columns
            .iter()
            .enumerate()
            .find(|(_, values)| values.len() != index.len())
        {
            return Err(DatasetError::LengthMismatch {
                column,
                expected: index.len(),
                actual: values.len(),
            });
        }
        Ok(Dataset {
            index,
            columns,
            metadata,
        })
    }

    /// Convenience constructor for a single series.
    pub fn from_series(
        index: Vec<NaiveDate>,
        values: Vec<f64>,
        metadata: SeriesMetadata,
    ) -> Result<Self, DatasetError> {
        Dataset::new(index, vec![values], vec![metadata])
    }

    pub fn empty() -> Self {
        Dataset {
            index: Vec::new(),
            columns: Vec::new(),
            metadata: Vec::new(),
        }
    }

    pub fn index(&self) -> &[NaiveDate] {
        &self.index
    }

    pub fn columns(&self) -> &[Vec<f64>] {
        &self.columns
    }

    pub fn column(&self, position: usize) -> Option<&[f64]> {
        self.columns.get(position).map(|values| values.as_slice())
    }

    pub fn metadata(&self) -> &[SeriesMetadata] {
        &self.metadata
    }

    /// Mutable access to the metadata records. The slice cannot change the
    /// number of records, so the shape invariant holds.
    pub fn metadata_mut(&mut self) -> &mut [SeriesMetadata] {
        &mut self.metadata
    }

    pub fn names(&self) -> Vec<&str> {
        self.metadata.iter().map(|meta| meta.name.as_str()).collect()
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Number of series.
    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn frequency(&self) -> Option<Frequency> {
        Frequency::infer(&self.index)
    }

    pub fn into_parts(self) -> (Vec<NaiveDate>, Vec<Vec<f64>>, Vec<SeriesMetadata>) {
        (self.index, self.columns, self.metadata)
    }

    /// Row position of `date`, if present.
    pub fn position(&self, date: NaiveDate) -> Option<usize> {
        self.index.binary_search(&date).ok()
    }

    /// Row position whose date is closest to `date`; ties go to the earlier row.
    pub fn nearest_position(&self, date: NaiveDate) -> Option<usize> {
        match self.index.binary_search(&date) {
            Ok(position) => Some(position),
            Err(0) if self.index.is_empty() => None,
            Err(0) => Some(0),
            Err(insert) if insert == self.index.len() => Some(insert - 1),
            Err(insert) => {
                let before = (date - self.index[insert - 1]).num_days();
                let after = (self.index[insert] - date).num_days();
                if after < before {
                    Some(insert)
                } else {
                    Some(insert - 1)
                }
            }
        }
    }

    /// Applies `transform` to every column, keeping the index.
    ///
    /// The closure must return a column of the same length as the index.
    pub fn map_columns<F, E>(&self, mut transform: F) -> Result<Dataset, E>
    where
        F: FnMut(&[f64], &SeriesMetadata) -> Result<(Vec<f64>, SeriesMetadata), E>,
    {
        let mut columns = Vec::with_capacity(self.columns.len());
        let mut metadata = Vec::with_capacity(self.metadata.len());
        for (values, meta) in self.columns.iter().zip(&self.metadata) {
            let (new_values, new_meta) = transform(values, meta)?;
            debug_assert_eq!(new_values.len(), self.index.len());
            columns.push(new_values);
            metadata.push(new_meta);
        }
        Ok(Dataset {
            index: self.index.clone(),
            columns,
            metadata,
        })
    }

    /// Keeps only the rows inside `range`.
    pub fn slice(&self, range: &DateRange) -> Dataset {
        let keep: Vec<usize> = (0..self.index.len())
            .filter(|&row| range.contains(self.index[row]))
            .collect();
        self.select_rows(&keep)
    }

    /// Drops rows where every column is missing.
    pub fn drop_empty_rows(&self) -> Dataset {
        let keep: Vec<usize> = (0..self.index.len())
            .filter(|&row| self.columns.iter().any(|values| !values[row].is_nan()))
            .collect();
        self.select_rows(&keep)
    }

    fn select_rows(&self, rows: &[usize]) -> Dataset {
        Dataset {
            index: rows.iter().map(|&row| self.index[row]).collect(),
            columns: self
                .columns
                .iter()
                .map(|values| rows.iter().map(|&row| values[row]).collect())
                .collect(),
            metadata: self.metadata.clone(),
        }
    }

    /// Column-wise concatenation over the union of all indexes. Dates absent
    /// from a dataset become missing values in its columns.
    pub fn outer_join(datasets: &[Dataset]) -> Dataset {
        let index: Vec<NaiveDate> = datasets
            .iter()
            .flat_map(|dataset| dataset.index.iter().copied())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let mut columns = Vec::new();
        let mut metadata = Vec::new();
        for dataset in datasets {
            let rows: Vec<Option<usize>> = index
                .iter()
                .map(|date| dataset.position(*date))
                .collect();
            for (values, meta) in dataset.columns.iter().zip(&dataset.metadata) {
                columns.push(
                    rows.iter()
                        .map(|row| row.map_or(f64::NAN, |row| values[row]))
                        .collect(),
                );
                metadata.push(meta.clone());
            }
        }

        Dataset {
            index,
            columns,
            metadata,
        }
    }
}

fn same_value(left: f64, right: f64) -> bool {
    left.to_bits() == right.to_bits() || (left.is_nan() && right.is_nan())
}

/// Datasets compare equal when index, metadata and every value match, with
/// missing values equal to each other.
impl PartialEq for Dataset {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
            && self.metadata == other.metadata
            && self.columns.len() == other.columns.len()
            && self.columns.iter().zip(&other.columns).all(|(left, right)| {
                left.len() == right.len()
                    && left.iter().zip(right).all(|(a, b)| same_value(*a, *b))
            })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DatasetRecord {
    index: Vec<NaiveDate>,
    series: Vec<SeriesRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SeriesRecord {
    metadata: SeriesMetadata,
    values: Vec<Option<f64>>,
}

impl From<Dataset> for DatasetRecord {
    fn from(dataset: Dataset) -> Self {
        let series = dataset
            .columns
            .into_iter()
            .zip(dataset.metadata)
            .map(|(values, metadata)| SeriesRecord {
                metadata,
                values: values
                    .into_iter()
                    .map(|value| if value.is_nan() { None } else { Some(value) })
                    .collect(),
            })
            .collect();
        DatasetRecord {
            index: dataset.index,
            series,
        }
    }
}

impl TryFrom<DatasetRecord> for Dataset {
    type Error = DatasetError;

    fn try_from(record: DatasetRecord) -> Result<Self, Self::Error> {
        let (columns, metadata) = record
            .series
            .into_iter()
            .map(|series| {
                let values = series
                    .values
                    .into_iter()
                    .map(|value| value.unwrap_or(f64::NAN))
                    .collect::<Vec<f64>>();
                (values, series.metadata)
            })
            .unzip();
        Dataset::new(record.index, columns, metadata)
    }
}
