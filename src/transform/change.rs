use super::primitives::{difference, pct_change, window_mean};
use super::windows::{Lagged, Trailing};
use super::{frequency_of, TransformError};
use crate::dataset::Dataset;
use crate::metadata::Currency;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeOperation {
    /// Percent change.
    Chg,
    /// Absolute difference.
    Diff,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangePeriod {
    /// Against the previous row.
    Last,
    /// Against the same period one year earlier.
    #[serde(alias = "interannual")]
    Inter,
    /// Trailing-year average against the previous trailing-year average.
    Annual,
}

impl ChangePeriod {
    fn label(&self) -> &'static str {
        match self {
            ChangePeriod::Last => "",
            ChangePeriod::Inter => " interanual",
            ChangePeriod::Annual => " anual",
        }
    }
}

/// Percent change or difference over the chosen period.
///
/// `inter` and `annual` need a frequency with a fixed number of periods
/// per year. Percent changes are tagged `%` and lose their currency;
/// differences are tagged `Cambio` and keep it.
pub fn chg_diff(
    dataset: &Dataset,
    operation: ChangeOperation,
    period: ChangePeriod,
) -> Result<Dataset, TransformError> {
    let lag = match period {
        ChangePeriod::Last => 1,
        ChangePeriod::Inter | ChangePeriod::Annual => {
            let frequency = frequency_of(dataset);
            frequency
                .and_then(|f| f.periods_per_year())
                .ok_or(TransformError::UnsupportedFrequency {
                    operation: "chg_diff",
                    frequency,
                })?
        }
    };

    dataset.map_columns(|values, meta| {
        let base = match period {
            ChangePeriod::Annual => Trailing::new(lag).apply(values, window_mean),
            _ => values.to_vec(),
        };
        let lagged = Lagged::new(lag);
        let mut meta = meta.clone();
        let changed = match operation {
            ChangeOperation::Chg => {
                meta.unit = format!("% variación{}", period.label());
                meta.currency = Currency::None;
                lagged.apply(&base, pct_change)
            }
            ChangeOperation::Diff => {
                meta.unit = format!("Cambio{}: {}", period.label(), meta.unit);
                lagged.apply(&base, difference)
            }
        };
        Ok((changed, meta))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Dataset;
    use crate::frequency::Frequency;
    use crate::metadata::{SeriesMetadata, SeriesType};
    use crate::transform::testing::*;

    #[test]
    fn test_last_period_percent_change() {
        let dataset = monthly("x", vec![100.0, 110.0, 121.0], SeriesType::Flujo);
        let result = chg_diff(&dataset, ChangeOperation::Chg, ChangePeriod::Last).unwrap();
        assert_close(result.column(0).unwrap(), &[f64::NAN, 10.0, 10.0], 1e-9);
        assert_eq!(result.metadata()[0].unit, "% variación");
        assert_eq!(result.metadata()[0].currency, Currency::None);
    }

    #[test]
    fn test_repeated_percent_change_is_not_idempotent() {
        let dataset = monthly("x", vec![100.0, 110.0, 132.0, 198.0], SeriesType::Flujo);
        let once = chg_diff(&dataset, ChangeOperation::Chg, ChangePeriod::Last).unwrap();
        let twice = chg_diff(&once, ChangeOperation::Chg, ChangePeriod::Last).unwrap();
        assert_ne!(once, twice);
        // 10% then 20% then 50%: second change of the changes
        assert_close(
            twice.column(0).unwrap(),
            &[f64::NAN, f64::NAN, 100.0, 150.0],
            1e-9,
        );
    }

    #[test]
    fn test_interannual_difference_on_quarterly() {
        let values: Vec<f64> = (0..8).map(|i| i as f64 * 10.0).collect();
        let dataset = Dataset::from_series(
            quarter_ends(2019, 8),
            values,
            SeriesMetadata::new("x", "Millones", SeriesType::Flujo)
                .with_frequency(Frequency::Quarterly),
        )
        .unwrap();
        let result = chg_diff(&dataset, ChangeOperation::Diff, ChangePeriod::Inter).unwrap();
        let column = result.column(0).unwrap();
        assert!(column[..4].iter().all(|v| v.is_nan()));
        assert_eq!(&column[4..], &[40.0, 40.0, 40.0, 40.0]);
        assert_eq!(result.metadata()[0].unit, "Cambio interanual: Millones");
        assert!(result.metadata()[0].is_ratio_unit());
    }

    #[test]
    fn test_annual_change_compares_trailing_year_averages() {
        let mut values = vec![100.0; 12];
        values.extend(vec![110.0; 12]);
        let dataset = monthly("x", values, SeriesType::Flujo);
        let result = chg_diff(&dataset, ChangeOperation::Chg, ChangePeriod::Annual).unwrap();
        let column = result.column(0).unwrap();
        assert!(column[..23].iter().all(|v| v.is_nan()));
        assert!((column[23] - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_interannual_needs_known_frequency() {
        let dataset = Dataset::from_series(
            vec![d(2020, 1, 3), d(2020, 1, 9), d(2020, 3, 1)],
            vec![1.0, 2.0, 3.0],
            SeriesMetadata::new("x", "u", SeriesType::Flujo),
        )
        .unwrap();
        assert!(matches!(
            chg_diff(&dataset, ChangeOperation::Chg, ChangePeriod::Inter),
            Err(TransformError::UnsupportedFrequency { .. })
        ));
    }
}
