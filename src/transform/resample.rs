//! Frequency conversion.

use super::primitives::{fill_interior_linear, last_valid, mean_valid, sum_valid};
use super::{frequency_of, TransformError};
use crate::dataset::Dataset;
use crate::frequency::Frequency;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{trace, warn};

/// How values are combined (or spread) when changing frequency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResampleOperation {
    Sum,
    #[serde(alias = "average")]
    Mean,
    #[serde(alias = "end")]
    Last,
    /// Each finer period takes the value of the coarser period containing it.
    Upsample,
}

impl ResampleOperation {
    fn aggregate(&self, bucket: &[f64]) -> f64 {
        match self {
            ResampleOperation::Sum => sum_valid(bucket),
            ResampleOperation::Mean => mean_valid(bucket),
            ResampleOperation::Last | ResampleOperation::Upsample => last_valid(bucket),
        }
    }
}

/// Converts `dataset` to `target`.
///
/// Aggregations bucket rows by target period; buckets with no data between
/// the first and last are missing. `Upsample` requires a known source
/// frequency coarser than `target`.
pub fn resample(
    dataset: &Dataset,
    target: Frequency,
    operation: ResampleOperation,
) -> Result<Dataset, TransformError> {
    let source = frequency_of(dataset);
    match (operation, source) {
        (ResampleOperation::Upsample, None) => Err(TransformError::UnsupportedFrequency {
            operation: "upsample",
            frequency: None,
        }),
        (ResampleOperation::Upsample, Some(source)) if target.is_coarser_than(source) => {
            Err(TransformError::InvalidParameter(format!(
                "cannot upsample from {} to coarser frequency {}",
                source, target
            )))
        }
        (ResampleOperation::Upsample, Some(source)) => Ok(upsample(dataset, source, target)),
        (_, Some(source)) if source.is_coarser_than(target) => {
            Err(TransformError::InvalidParameter(format!(
                "cannot aggregate from {} to finer frequency {}; use upsample",
                source, target
            )))
        }
        _ => Ok(downsample(dataset, target, operation)),
    }
}

fn downsample(dataset: &Dataset, target: Frequency, operation: ResampleOperation) -> Dataset {
    let (Some(&first), Some(&last)) = (dataset.index().first(), dataset.index().last()) else {
        return retag(Vec::new(), vec![Vec::new(); dataset.width()], dataset, target);
    };

    let grid = target.grid(first, last);
    let slots: HashMap<NaiveDate, usize> = grid
        .iter()
        .enumerate()
        .map(|(slot, label)| (*label, slot))
        .collect();
    let row_slots: Vec<usize> = dataset
        .index()
        .iter()
        .map(|date| slots.get(&target.period_end(*date)).copied().unwrap_or(0))
        .collect();

    if operation == ResampleOperation::Sum {
        for meta in dataset.metadata().iter().filter(|meta| meta.cumulative_periods > 1) {
            warn!(
                series = %meta.name,
                cumulative_periods = meta.cumulative_periods,
                "resample: summing a series already accumulated over several periods"
            );
        }
    }

    let columns = dataset
        .columns()
        .iter()
        .map(|values| {
            let mut buckets: Vec<Vec<f64>> = vec![Vec::new(); grid.len()];
            for (value, slot) in values.iter().zip(&row_slots) {
                buckets[*slot].push(*value);
            }
            buckets
                .iter()
                .map(|bucket| operation.aggregate(bucket))
                .collect()
        })
        .collect();

    trace!(rows = dataset.len(), buckets = grid.len(), target = %target, "resample: aggregated");
    retag(grid, columns, dataset, target)
}

fn upsample(dataset: &Dataset, source: Frequency, target: Frequency) -> Dataset {
    let (Some(&first), Some(&last)) = (dataset.index().first(), dataset.index().last()) else {
        return retag(Vec::new(), vec![Vec::new(); dataset.width()], dataset, target);
    };

    let rows: HashMap<NaiveDate, usize> = dataset
        .index()
        .iter()
        .enumerate()
        .map(|(row, date)| (source.period_end(*date), row))
        .collect();
    let span_end = source.period_end(last);
    let grid: Vec<NaiveDate> = target
        .grid(source.period_start(first), span_end)
        .into_iter()
        .filter(|label| *label <= span_end)
        .collect();
    let grid_rows: Vec<Option<usize>> = grid
        .iter()
        .map(|label| rows.get(&source.period_end(*label)).copied())
        .collect();

    let columns = dataset
        .columns()
        .iter()
        .map(|values| {
            grid_rows
                .iter()
                .map(|row| row.map_or(f64::NAN, |row| values[row]))
                .collect()
        })
        .collect();

    retag(grid, columns, dataset, target)
}

/// Moves `dataset` to the finer `target` frequency, placing each value at
/// the target period containing its date and interpolating linearly by
/// position in between. Values before the first or after the last
/// observation stay missing.
pub fn interpolate_linear(dataset: &Dataset, target: Frequency) -> Result<Dataset, TransformError> {
    let (Some(&first), Some(&last)) = (dataset.index().first(), dataset.index().last()) else {
        return Ok(retag(Vec::new(), vec![Vec::new(); dataset.width()], dataset, target));
    };
    if let Some(source) = frequency_of(dataset) {
        if target.is_coarser_than(source) {
            return Err(TransformError::InvalidParameter(format!(
                "cannot interpolate from {} to coarser frequency {}",
                source, target
            )));
        }
    }

    let grid = target.grid(first, last);
    let slots: HashMap<NaiveDate, usize> = grid
        .iter()
        .enumerate()
        .map(|(slot, label)| (*label, slot))
        .collect();

    let columns = dataset
        .columns()
        .iter()
        .map(|values| {
            let mut column = vec![f64::NAN; grid.len()];
            for (date, value) in dataset.index().iter().zip(values) {
                if let Some(slot) = slots.get(&target.period_end(*date)) {
                    column[*slot] = *value;
                }
            }
            fill_interior_linear(&mut column);
            column
        })
        .collect();

    Ok(retag(grid, columns, dataset, target))
}

fn retag(
    index: Vec<NaiveDate>,
    columns: Vec<Vec<f64>>,
    dataset: &Dataset,
    target: Frequency,
) -> Dataset {
    let metadata = dataset
        .metadata()
        .iter()
        .map(|meta| {
            let mut meta = meta.clone();
            meta.frequency = Some(target);
            meta
        })
        .collect();
    // Grid labels are strictly increasing and every column is built from them
    Dataset::new(index, columns, metadata).unwrap_or_else(|_| Dataset::empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{SeriesMetadata, SeriesType};
    use crate::transform::testing::*;

    #[test]
    fn test_monthly_to_annual_sum_and_mean() {
        let dataset = monthly("flow", vec![100.0; 24], SeriesType::Flujo);
        let annual_sum = resample(&dataset, Frequency::Annual, ResampleOperation::Sum).unwrap();
        assert_eq!(annual_sum.index(), &[d(2020, 12, 31), d(2021, 12, 31)]);
        assert_eq!(annual_sum.column(0).unwrap(), &[1200.0, 1200.0]);
        assert_eq!(annual_sum.metadata()[0].frequency, Some(Frequency::Annual));

        let annual_mean = resample(&dataset, Frequency::Annual, ResampleOperation::Mean).unwrap();
        assert_eq!(annual_mean.column(0).unwrap(), &[100.0, 100.0]);
    }

    #[test]
    fn test_last_takes_final_observation_of_each_period() {
        let values: Vec<f64> = (1..=6).map(f64::from).collect();
        let dataset = monthly("stock", values, SeriesType::Stock);
        let quarterly = resample(&dataset, Frequency::Quarterly, ResampleOperation::Last).unwrap();
        assert_eq!(quarterly.index(), &[d(2020, 3, 31), d(2020, 6, 30)]);
        assert_eq!(quarterly.column(0).unwrap(), &[3.0, 6.0]);
    }

    #[test]
    fn test_empty_buckets_are_missing() {
        let dataset = Dataset::from_series(
            vec![d(2018, 6, 30), d(2020, 6, 30)],
            vec![1.0, 2.0],
            SeriesMetadata::new("a", "x", SeriesType::Flujo),
        )
        .unwrap();
        let annual = resample(&dataset, Frequency::Annual, ResampleOperation::Sum).unwrap();
        assert_eq!(annual.len(), 3);
        assert!(annual.column(0).unwrap()[1].is_nan());
    }

    #[test]
    fn test_monthly_weekly_monthly_round_trip() {
        let values = vec![5.0, 7.0, 11.0, 13.0, 17.0, 19.0];
        let dataset = monthly("stock", values.clone(), SeriesType::Stock);

        let weekly = resample(&dataset, Frequency::Weekly, ResampleOperation::Upsample).unwrap();
        assert!(weekly.column(0).unwrap().iter().all(|v| !v.is_nan()));

        let back = resample(&weekly, Frequency::Monthly, ResampleOperation::Last).unwrap();
        assert_eq!(back.index(), dataset.index());
        assert_eq!(back.column(0).unwrap(), values.as_slice());
    }

    #[test]
    fn test_direction_mismatches_are_rejected() {
        let dataset = monthly("a", vec![1.0, 2.0, 3.0], SeriesType::Flujo);
        assert!(matches!(
            resample(&dataset, Frequency::Weekly, ResampleOperation::Sum),
            Err(TransformError::InvalidParameter(_))
        ));
        assert!(matches!(
            resample(&dataset, Frequency::Annual, ResampleOperation::Upsample),
            Err(TransformError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_quarterly_interpolates_to_monthly() {
        let dataset = Dataset::from_series(
            quarter_ends(2020, 3),
            vec![30.0, 60.0, 90.0],
            SeriesMetadata::new("gdp", "Millones", SeriesType::Flujo),
        )
        .unwrap();
        let monthly = interpolate_linear(&dataset, Frequency::Monthly).unwrap();
        assert_eq!(monthly.index().first(), Some(&d(2020, 3, 31)));
        assert_eq!(monthly.len(), 7);
        assert_close(
            monthly.column(0).unwrap(),
            &[30.0, 40.0, 50.0, 60.0, 70.0, 80.0, 90.0],
            1e-9,
        );
    }

    #[test]
    fn test_empty_dataset_resamples_to_empty() {
        let dataset = monthly("a", vec![], SeriesType::Flujo);
        let result = resample(&dataset, Frequency::Annual, ResampleOperation::Sum).unwrap();
        assert!(result.is_empty());
        assert_eq!(result.width(), 1);
    }
}
