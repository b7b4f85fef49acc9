use super::primitives::{mean_valid, ratio};
use super::{frequency_of, TransformError};
use crate::dataset::Dataset;
use crate::frequency::Frequency;
use crate::time_series::DateRange;
use chrono::NaiveDate;
use tracing::debug;

/// Rescales every column so the reference period equals `base`.
///
/// Without `end` the reference is the row for the period containing
/// `start`, or the nearest row when that period is absent. With `end`, it
/// is the mean over every period from the one containing `start` through
/// the one containing `end` (monthly periods for sub-monthly data). The
/// unit records the period actually used, e.g. `2010-01=100` or
/// `2010-01_2010-12=100`.
pub fn rebase(
    dataset: &Dataset,
    start: NaiveDate,
    end: Option<NaiveDate>,
    base: f64,
) -> Result<Dataset, TransformError> {
    if let Some(end) = end {
        if end < start {
            return Err(TransformError::InvalidParameter(format!(
                "rebase end {} is before start {}",
                end, start
            )));
        }
    }

    let frequency = frequency_of(dataset);
    let (rows, unit) = match end {
        Some(end) => {
            let period = match frequency {
                Some(frequency) if frequency.is_coarser_than(Frequency::Monthly) => frequency,
                _ => Frequency::Monthly,
            };
            let (from, to) = (period.period_start(start), period.period_end(end));
            let range = DateRange::from_bounds(Some(from), Some(to));
            let rows: Vec<usize> = (0..dataset.len())
                .filter(|&row| range.contains(dataset.index()[row]))
                .collect();
            (rows, base_unit(from, Some(to), base))
        }
        None => {
            let row = frequency
                .and_then(|frequency| dataset.position(frequency.period_end(start)))
                .or_else(|| dataset.nearest_position(start));
            let used = row.map_or(start, |row| dataset.index()[row]);
            (row.into_iter().collect(), base_unit(used, None, base))
        }
    };

    dataset.map_columns(|values, meta| {
        let reference = mean_valid(&rows.iter().map(|&row| values[row]).collect::<Vec<_>>());
        if reference.is_nan() || reference == 0.0 {
            return Err(TransformError::MissingReference(format!(
                "no usable base value for '{}' in {}",
                meta.name, unit
            )));
        }
        debug!(series = %meta.name, reference, "rebase: reference value");

        let rebased = values.iter().map(|v| ratio(*v, reference) * base).collect();
        let mut meta = meta.clone();
        meta.unit = unit.clone();
        Ok((rebased, meta))
    })
}

fn base_unit(start: NaiveDate, end: Option<NaiveDate>, base: f64) -> String {
    let base = if base.fract() == 0.0 {
        format!("{}", base as i64)
    } else {
        base.to_string()
    };
    match end {
        Some(end) => format!("{}_{}={}", start.format("%Y-%m"), end.format("%Y-%m"), base),
        None => format!("{}={}", start.format("%Y-%m"), base),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::SeriesType;
    use crate::transform::testing::*;

    #[test]
    fn test_single_date_rebase_uses_nearest_observation() {
        let dataset = monthly("idx", vec![50.0, 100.0, 200.0], SeriesType::Unspecified);
        let result = rebase(&dataset, d(2020, 2, 15), None, 100.0).unwrap();
        assert_close(result.column(0).unwrap(), &[50.0, 100.0, 200.0], 1e-12);
        assert_eq!(result.metadata()[0].unit, "2020-02=100");
    }

    #[test]
    fn test_range_rebase_uses_average() {
        let dataset = monthly("idx", vec![10.0, 30.0, 40.0], SeriesType::Unspecified);
        let result = rebase(&dataset, d(2020, 1, 1), Some(d(2020, 2, 29)), 1.0).unwrap();
        assert_close(result.column(0).unwrap(), &[0.5, 1.5, 2.0], 1e-12);
        assert_eq!(result.metadata()[0].unit, "2020-01_2020-02=1");
        assert!(result.metadata()[0].is_ratio_unit());
    }

    #[test]
    fn test_missing_reference_is_an_error() {
        let dataset = monthly("idx", vec![f64::NAN, 30.0], SeriesType::Unspecified);
        let result = rebase(&dataset, d(2020, 1, 31), None, 100.0);
        assert!(matches!(result, Err(TransformError::MissingReference(_))));

        let outside = monthly("idx", vec![10.0, 30.0], SeriesType::Unspecified);
        let result = rebase(&outside, d(2019, 1, 1), Some(d(2019, 6, 30)), 100.0);
        assert!(matches!(result, Err(TransformError::MissingReference(_))));
    }

    #[test]
    fn test_fractional_base_is_kept_in_unit() {
        let dataset = monthly("idx", vec![2.0, 4.0], SeriesType::Unspecified);
        let result = rebase(&dataset, d(2020, 1, 31), None, 2.5).unwrap();
        assert_eq!(result.metadata()[0].unit, "2020-01=2.5");
        assert_close(result.column(0).unwrap(), &[2.5, 5.0], 1e-12);
    }

    #[test]
    fn test_start_early_in_month_uses_that_month() {
        let dataset = monthly("idx", vec![100.0, 200.0, 400.0], SeriesType::Unspecified);
        let result = rebase(&dataset, d(2020, 2, 1), None, 100.0).unwrap();
        assert_close(result.column(0).unwrap(), &[50.0, 100.0, 200.0], 1e-12);
        assert_eq!(result.metadata()[0].unit, "2020-02=100");
    }

    #[test]
    fn test_range_covers_whole_months() {
        let dataset = monthly("idx", vec![100.0, 200.0, 400.0], SeriesType::Unspecified);
        let result = rebase(&dataset, d(2020, 1, 1), Some(d(2020, 2, 1)), 100.0).unwrap();
        assert_close(result.column(0).unwrap(), &[200.0 / 3.0, 400.0 / 3.0, 800.0 / 3.0], 1e-9);
        assert_eq!(result.metadata()[0].unit, "2020-01_2020-02=100");
    }

    #[test]
    fn test_absent_period_labels_the_row_used() {
        let dataset = monthly("idx", vec![100.0, 200.0, 400.0], SeriesType::Unspecified);
        let result = rebase(&dataset, d(2019, 12, 20), None, 100.0).unwrap();
        assert_close(result.column(0).unwrap(), &[100.0, 200.0, 400.0], 1e-12);
        assert_eq!(result.metadata()[0].unit, "2020-01=100");
    }
}
