//! Combining datasets of different native frequencies into one table.
//!
//! The common frequency is the first entry of
//! [`RECONCILE_PREFERENCE`](crate::frequency::RECONCILE_PREFERENCE) present
//! among the inputs, so annual data wins over quarterly regardless of how
//! many series each has. Every other column is aggregated to it with a rule
//! picked from its series type and unit.

use crate::dataset::{Dataset, DatasetError};
use crate::frequency::{Frequency, RECONCILE_PREFERENCE};
use crate::metadata::{SeriesMetadata, SeriesType};
use crate::transform::{frequency_of, resample, ResampleOperation, TransformError};
use serde::Serialize;
use std::collections::HashSet;
use thiserror::Error;
use tracing::{debug, trace};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ReconcileError {
    #[error("cannot move series '{series}' to {target}: {source}")]
    Resample {
        series: String,
        target: Frequency,
        #[source]
        source: TransformError,
    },
    #[error(transparent)]
    Dataset(#[from] DatasetError),
}

/// The combined table and the frequency its columns were aligned to.
/// `target` is `None` when no alignment was possible or needed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reconciliation {
    pub dataset: Dataset,
    pub target: Option<Frequency>,
}

/// Aggregation used to bring a column to a coarser frequency.
///
/// Stocks keep the last observation. Flows are summed unless their unit is
/// already a ratio, percentage, index or change, which are averaged.
pub fn aggregation_for(meta: &SeriesMetadata) -> ResampleOperation {
    match meta.series_type {
        SeriesType::Stock => ResampleOperation::Last,
        SeriesType::Flujo if !meta.is_ratio_unit() => ResampleOperation::Sum,
        _ => ResampleOperation::Mean,
    }
}

/// Common target for a set of detected frequencies, if any is listed in
/// the preference order.
pub fn common_frequency(frequencies: &[Option<Frequency>]) -> Option<Frequency> {
    RECONCILE_PREFERENCE
        .iter()
        .copied()
        .find(|preferred| frequencies.contains(&Some(*preferred)))
}

/// Aligns `datasets` on one index.
///
/// Datasets without rows do not take part in frequency detection. When
/// every remaining dataset has the same frequency, or any of them has none,
/// the columns are joined as they are.
pub fn reconcile(datasets: &[Dataset]) -> Result<Reconciliation, ReconcileError> {
    let frequencies: Vec<Option<Frequency>> = datasets
        .iter()
        .filter(|dataset| !dataset.is_empty())
        .map(frequency_of)
        .collect();
    debug!(datasets = datasets.len(), frequencies = ?frequencies, "reconcile: detected frequencies");

    let combined = match frequencies.first() {
        None => Reconciliation {
            dataset: Dataset::outer_join(datasets),
            target: None,
        },
        Some(first) if frequencies.iter().all(|frequency| frequency == first) => Reconciliation {
            dataset: Dataset::outer_join(datasets),
            target: *first,
        },
        Some(_) if frequencies.contains(&None) => {
            debug!("reconcile: irregular index present, joining without resampling");
            Reconciliation {
                dataset: Dataset::outer_join(datasets),
                target: None,
            }
        }
        Some(_) => match common_frequency(&frequencies) {
            Some(target) => Reconciliation {
                dataset: align(datasets, target)?,
                target: Some(target),
            },
            None => Reconciliation {
                dataset: Dataset::outer_join(datasets),
                target: None,
            },
        },
    };

    let (index, columns, mut metadata) = combined.dataset.into_parts();
    let names: Vec<String> = metadata.iter().map(|meta| meta.name.clone()).collect();
    for (meta, name) in metadata.iter_mut().zip(unique_names(&names)) {
        meta.name = name;
    }
    Ok(Reconciliation {
        dataset: Dataset::new(index, columns, metadata)?,
        target: combined.target,
    })
}

fn align(datasets: &[Dataset], target: Frequency) -> Result<Dataset, ReconcileError> {
    let mut aligned = Vec::with_capacity(datasets.len());
    for dataset in datasets {
        if dataset.is_empty() || frequency_of(dataset) == Some(target) {
            aligned.push(dataset.clone());
            continue;
        }
        for (values, meta) in dataset.columns().iter().zip(dataset.metadata()) {
            let column = Dataset::from_series(dataset.index().to_vec(), values.clone(), meta.clone())?;
            let operation = aggregation_for(meta);
            trace!(series = %meta.name, ?operation, target = %target, "reconcile: resampling column");
            let resampled =
                resample(&column, target, operation).map_err(|source| ReconcileError::Resample {
                    series: meta.name.clone(),
                    target,
                    source,
                })?;
            aligned.push(resampled);
        }
    }
    Ok(Dataset::outer_join(&aligned))
}

/// Renames repeated names in order: the first occurrence keeps its name,
/// later ones get ` (1)`, ` (2)`, ... skipping any name already taken.
pub fn unique_names(names: &[String]) -> Vec<String> {
    let mut used: HashSet<String> = HashSet::new();
    names
        .iter()
        .map(|name| {
            let mut candidate = name.clone();
            let mut counter = 1;
            while used.contains(&candidate) {
                candidate = format!("{} ({})", name, counter);
                counter += 1;
            }
            used.insert(candidate.clone());
            candidate
        })
        .collect()
}
