//! Conversions that divide by a reference series: exchange rate (`usd`),
//! consumer prices (`real`) and nominal GDP (`gdp`).

use super::primitives::{mean_valid, ratio, window_sum};
use super::resample::{interpolate_linear, resample, ResampleOperation};
use super::windows::Trailing;
use super::{frequency_of, ErrorPolicy, ReferenceSource, TransformError};
use crate::dataset::Dataset;
use crate::frequency::Frequency;
use crate::metadata::{Currency, SeriesMetadata, SeriesType};
use chrono::NaiveDate;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Converts local-currency columns to US dollars.
///
/// Stocks are divided by the end-of-period rate and everything else by the
/// period-average rate.
pub fn convert_usd(
    dataset: &Dataset,
    references: &dyn ReferenceSource,
    policy: ErrorPolicy,
) -> Result<Dataset, TransformError> {
    let rates = references.exchange_rate()?;
    require_columns(&rates, 2, "exchange rate")?;
    let average = align_reference(&rates, 0, dataset, ResampleOperation::Mean)?;
    let end_of_period = align_reference(&rates, 1, dataset, ResampleOperation::Last)?;

    dataset.map_columns(|values, meta| {
        if meta.currency != Currency::Local {
            return skip_or_fail(policy, values, meta, "usd", "currency is not UYU");
        }
        let rate = if meta.series_type == SeriesType::Stock {
            &end_of_period
        } else {
            &average
        };
        let converted = divide(values, rate, &meta.name, "exchange rate")?;
        let mut meta = meta.clone();
        meta.currency = Currency::Usd;
        Ok((converted, meta))
    })
}

/// Deflates local-currency columns by the consumer price index.
///
/// With no dates the result is an index with no currency; with `start`
/// only it is expressed in prices of that month; with both, in average
/// prices of the range.
pub fn convert_real(
    dataset: &Dataset,
    references: &dyn ReferenceSource,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    policy: ErrorPolicy,
) -> Result<Dataset, TransformError> {
    let label = match (start, end) {
        (None, None) => "Const.".to_string(),
        (None, Some(_)) => {
            return Err(TransformError::InvalidParameter(
                "real: end date given without start date".to_string(),
            ))
        }
        (Some(start), Some(end)) if end < start => {
            return Err(TransformError::InvalidParameter(format!(
                "real: end {} is before start {}",
                end, start
            )))
        }
        (Some(start), None) => format!("Const. {}", start.format("%Y-%m")),
        (Some(start), Some(end)) => {
            format!("Const. {}_{}", start.format("%Y-%m"), end.format("%Y-%m"))
        }
    };

    let prices = references.consumer_prices()?;
    require_columns(&prices, 1, "consumer prices")?;
    let aligned = align_reference(&prices, 0, dataset, ResampleOperation::Mean)?;
    let scale = price_level(&prices, start, end)?;
    debug!(scale, inflation_adjustment = %label, "convert_real: price level");

    dataset.map_columns(|values, meta| {
        if meta.currency != Currency::Local {
            return skip_or_fail(policy, values, meta, "real", "currency is not UYU");
        }
        if meta.is_inflation_adjusted() {
            return skip_or_fail(policy, values, meta, "real", "already inflation adjusted");
        }
        let deflated = divide(values, &aligned, &meta.name, "consumer prices")?
            .into_iter()
            .map(|value| value * scale)
            .collect();
        let mut meta = meta.clone();
        meta.inflation_adjustment = label.clone();
        if start.is_none() {
            meta.currency = Currency::None;
        }
        Ok((deflated, meta))
    })
}

/// Expresses columns as a percentage of annualised nominal GDP in the
/// same currency.
///
/// Flows not yet accumulated over a year are converted to trailing-year
/// sums first. Only annual, quarterly and monthly data are supported.
pub fn convert_gdp(
    dataset: &Dataset,
    references: &dyn ReferenceSource,
    policy: ErrorPolicy,
) -> Result<Dataset, TransformError> {
    let frequency = match frequency_of(dataset) {
        Some(f @ (Frequency::Annual | Frequency::Quarterly | Frequency::Monthly)) => f,
        other => {
            return Err(TransformError::UnsupportedFrequency {
                operation: "gdp",
                frequency: other,
            })
        }
    };
    let periods_per_year = frequency.periods_per_year().unwrap_or(1);

    let gdp = references.gdp()?;
    require_columns(&gdp, 2, "GDP")?;
    let local = annual_gdp_on(&gdp, 0, dataset, frequency)?;
    let usd = annual_gdp_on(&gdp, 1, dataset, frequency)?;

    dataset.map_columns(|values, meta| {
        let reference = match meta.currency {
            Currency::Local => &local,
            Currency::Usd => &usd,
            Currency::None => {
                return skip_or_fail(policy, values, meta, "gdp", "currency is neither UYU nor USD")
            }
        };

        let mut meta = meta.clone();
        let mut values = values.to_vec();
        let accumulated = meta.cumulative_periods as usize;
        if meta.series_type == SeriesType::Flujo && accumulated < periods_per_year {
            let window = periods_per_year / accumulated.max(1);
            if window > 1 {
                values = Trailing::new(window).apply(&values, window_sum);
            }
            meta.cumulative_periods = periods_per_year as u32;
        }

        let converted = divide(&values, reference, &meta.name, "GDP")?
            .into_iter()
            .map(|value| value * 100.0)
            .collect();
        meta.unit = "% PBI".to_string();
        meta.currency = Currency::None;
        Ok((converted, meta))
    })
}

fn require_columns(reference: &Dataset, width: usize, name: &str) -> Result<(), TransformError> {
    if reference.width() < width {
        return Err(TransformError::MissingReference(format!(
            "{} reference has {} columns, expected {}",
            name,
            reference.width(),
            width
        )));
    }
    Ok(())
}

fn skip_or_fail(
    policy: ErrorPolicy,
    values: &[f64],
    meta: &SeriesMetadata,
    operation: &str,
    reason: &str,
) -> Result<(Vec<f64>, SeriesMetadata), TransformError> {
    match policy {
        ErrorPolicy::Raise => Err(TransformError::Precondition {
            series: meta.name.clone(),
            reason: reason.to_string(),
        }),
        ErrorPolicy::Ignore => {
            warn!(series = %meta.name, operation, reason, "conversion skipped for column");
            Ok((values.to_vec(), meta.clone()))
        }
    }
}

/// Divides `values` by `reference`, failing when the series has data but
/// never overlaps the reference.
fn divide(
    values: &[f64],
    reference: &[f64],
    series: &str,
    reference_name: &str,
) -> Result<Vec<f64>, TransformError> {
    let has_data = values.iter().any(|v| !v.is_nan());
    let overlaps = values
        .iter()
        .zip(reference)
        .any(|(v, r)| !v.is_nan() && !r.is_nan());
    if has_data && !overlaps {
        return Err(TransformError::NoOverlap {
            series: series.to_string(),
            reference: reference_name.to_string(),
        });
    }
    Ok(values
        .iter()
        .zip(reference)
        .map(|(v, r)| ratio(*v, *r))
        .collect())
}

fn single_column(reference: &Dataset, column: usize) -> Result<Dataset, TransformError> {
    let values = reference.columns()[column].clone();
    let meta = reference.metadata()[column].clone();
    Ok(Dataset::from_series(reference.index().to_vec(), values, meta)?)
}

/// Places column `column` of `reference` on the dates of `dataset`.
///
/// When the dataset is coarser the reference is aggregated with
/// `aggregation`; otherwise every dataset row takes the reference value of
/// the period containing it.
fn align_reference(
    reference: &Dataset,
    column: usize,
    dataset: &Dataset,
    aggregation: ResampleOperation,
) -> Result<Vec<f64>, TransformError> {
    let series = single_column(reference, column)?;
    let reference_frequency = frequency_of(&series);
    let target_frequency = frequency_of(dataset);

    let (lookup, frequency) = match (reference_frequency, target_frequency) {
        (Some(source), Some(target)) if target.is_coarser_than(source) => {
            (resample(&series, target, aggregation)?, target)
        }
        (Some(source), _) => (series, source),
        (None, _) => {
            return Err(TransformError::UnsupportedFrequency {
                operation: "reference alignment",
                frequency: None,
            })
        }
    };

    Ok(values_by_period(&lookup, frequency, dataset.index()))
}

fn values_by_period(lookup: &Dataset, frequency: Frequency, dates: &[NaiveDate]) -> Vec<f64> {
    let values = lookup.column(0).unwrap_or_default();
    let by_period: HashMap<NaiveDate, f64> = lookup
        .index()
        .iter()
        .zip(values)
        .map(|(date, value)| (frequency.period_end(*date), *value))
        .collect();
    dates
        .iter()
        .map(|date| {
            by_period
                .get(&frequency.period_end(*date))
                .copied()
                .unwrap_or(f64::NAN)
        })
        .collect()
}

/// Price level that deflated values are expressed in.
fn price_level(
    prices: &Dataset,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> Result<f64, TransformError> {
    let values = prices.column(0).unwrap_or_default();
    let level = match (start, end) {
        (None, _) => return Ok(1.0),
        (Some(start), None) => prices
            .position(Frequency::Monthly.period_end(start))
            .or_else(|| prices.nearest_position(start))
            .map_or(f64::NAN, |row| values[row]),
        (Some(start), Some(end)) => {
            let from = Frequency::Monthly.period_start(start);
            let to = Frequency::Monthly.period_end(end);
            let window: Vec<f64> = prices
                .index()
                .iter()
                .zip(values)
                .filter(|(date, _)| **date >= from && **date <= to)
                .map(|(_, value)| *value)
                .collect();
            mean_valid(&window)
        }
    };
    if level.is_nan() {
        return Err(TransformError::MissingReference(
            "consumer prices have no value in the requested base period".to_string(),
        ));
    }
    Ok(level)
}

/// Annualised GDP (trailing four-quarter sum) placed on the dates of
/// `dataset`: taken directly for quarterly and annual data and linearly
/// interpolated for monthly data.
fn annual_gdp_on(
    gdp: &Dataset,
    column: usize,
    dataset: &Dataset,
    frequency: Frequency,
) -> Result<Vec<f64>, TransformError> {
    let quarterly = single_column(gdp, column)?;
    match frequency_of(&quarterly) {
        Some(Frequency::Quarterly) => {}
        other => {
            return Err(TransformError::UnsupportedFrequency {
                operation: "gdp reference",
                frequency: other,
            })
        }
    }

    let annualised = Dataset::from_series(
        quarterly.index().to_vec(),
        Trailing::new(4).apply(quarterly.column(0).unwrap_or_default(), window_sum),
        quarterly.metadata()[0].clone(),
    )?;

    let (lookup, lookup_frequency) = match frequency {
        Frequency::Monthly => (
            interpolate_linear(&annualised, Frequency::Monthly)?,
            Frequency::Monthly,
        ),
        _ => (annualised, Frequency::Quarterly),
    };
    Ok(values_by_period(&lookup, lookup_frequency, dataset.index()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::testing::*;

    fn references() -> FixedReferences {
        let months = month_ends(2020, 1, 6);
        FixedReferences {
            exchange_rate: Dataset::new(
                months.clone(),
                vec![
                    vec![10.0, 20.0, 30.0, 40.0, 40.0, 40.0],
                    vec![20.0, 40.0, 60.0, 80.0, 80.0, 80.0],
                ],
                vec![
                    SeriesMetadata::new("promedio", "UYU/USD", SeriesType::Unspecified),
                    SeriesMetadata::new("fin", "UYU/USD", SeriesType::Unspecified),
                ],
            )
            .unwrap(),
            prices: Dataset::from_series(
                months,
                vec![100.0, 200.0, 400.0, 400.0, 400.0, 400.0],
                SeriesMetadata::new("ipc", "2010-12=100", SeriesType::Unspecified),
            )
            .unwrap(),
            gdp: Dataset::new(
                quarter_ends(2019, 8),
                vec![vec![250.0; 8], vec![25.0; 8]],
                vec![
                    SeriesMetadata::new("pbi", "Millones de pesos", SeriesType::Flujo),
                    SeriesMetadata::new("pbi usd", "Millones de dólares", SeriesType::Flujo),
                ],
            )
            .unwrap(),
        }
    }

    fn two_columns() -> Dataset {
        let flow = monthly("flow", vec![100.0, 200.0, 300.0], SeriesType::Flujo);
        let stock = monthly("stock", vec![100.0, 200.0, 300.0], SeriesType::Stock);
        Dataset::outer_join(&[flow, stock])
    }

    #[test]
    fn test_usd_uses_average_for_flows_and_end_for_stocks() {
        let result = convert_usd(&two_columns(), &references(), ErrorPolicy::Raise).unwrap();
        assert_close(result.column(0).unwrap(), &[10.0, 10.0, 10.0], 1e-12);
        assert_close(result.column(1).unwrap(), &[5.0, 5.0, 5.0], 1e-12);
        assert!(result.metadata().iter().all(|m| m.currency == Currency::Usd));
    }

    #[test]
    fn test_usd_aggregates_reference_for_coarser_data() {
        let quarterly = Dataset::from_series(
            quarter_ends(2020, 2),
            vec![300.0, 800.0],
            SeriesMetadata::new("q", "Millones", SeriesType::Flujo)
                .with_currency(Currency::Local)
                .with_frequency(Frequency::Quarterly),
        )
        .unwrap();
        let result = convert_usd(&quarterly, &references(), ErrorPolicy::Raise).unwrap();
        assert_close(result.column(0).unwrap(), &[15.0, 20.0], 1e-12);
    }

    #[test]
    fn test_usd_policy_controls_precondition_failures() {
        let mut dataset = two_columns();
        dataset.metadata_mut()[0].currency = Currency::Usd;

        let raised = convert_usd(&dataset, &references(), ErrorPolicy::Raise);
        assert!(matches!(raised, Err(TransformError::Precondition { .. })));

        let ignored = convert_usd(&dataset, &references(), ErrorPolicy::Ignore).unwrap();
        assert_eq!(ignored.column(0).unwrap(), dataset.column(0).unwrap());
        assert_close(ignored.column(1).unwrap(), &[5.0, 5.0, 5.0], 1e-12);
    }

    #[test]
    fn test_real_without_dates_is_an_index() {
        let dataset = monthly("flow", vec![100.0, 200.0, 400.0], SeriesType::Flujo);
        let result = convert_real(&dataset, &references(), None, None, ErrorPolicy::Raise).unwrap();
        assert_close(result.column(0).unwrap(), &[1.0, 1.0, 1.0], 1e-12);
        assert_eq!(result.metadata()[0].inflation_adjustment, "Const.");
        assert_eq!(result.metadata()[0].currency, Currency::None);
    }

    #[test]
    fn test_real_with_base_month_and_range() {
        let dataset = monthly("flow", vec![100.0, 200.0, 400.0], SeriesType::Flujo);
        let result = convert_real(
            &dataset,
            &references(),
            Some(d(2020, 2, 1)),
            None,
            ErrorPolicy::Raise,
        )
        .unwrap();
        assert_close(result.column(0).unwrap(), &[200.0, 200.0, 200.0], 1e-12);
        assert_eq!(result.metadata()[0].inflation_adjustment, "Const. 2020-02");
        assert_eq!(result.metadata()[0].currency, Currency::Local);

        let ranged = convert_real(
            &dataset,
            &references(),
            Some(d(2020, 1, 1)),
            Some(d(2020, 2, 29)),
            ErrorPolicy::Raise,
        )
        .unwrap();
        assert_close(ranged.column(0).unwrap(), &[150.0, 150.0, 150.0], 1e-12);
        assert_eq!(ranged.metadata()[0].inflation_adjustment, "Const. 2020-01_2020-02");
    }

    #[test]
    fn test_real_rejects_already_deflated_series() {
        let mut dataset = monthly("flow", vec![1.0, 2.0, 3.0], SeriesType::Flujo);
        dataset.metadata_mut()[0].inflation_adjustment = "Const.".to_string();
        let result = convert_real(&dataset, &references(), None, None, ErrorPolicy::Raise);
        assert!(matches!(result, Err(TransformError::Precondition { .. })));
    }

    #[test]
    fn test_gdp_accumulates_quarterly_flows() {
        let dataset = Dataset::from_series(
            quarter_ends(2019, 8),
            vec![50.0; 8],
            SeriesMetadata::new("deficit", "Millones de pesos", SeriesType::Flujo)
                .with_currency(Currency::Local),
        )
        .unwrap();
        let result = convert_gdp(&dataset, &references(), ErrorPolicy::Raise).unwrap();
        let column = result.column(0).unwrap();
        assert!(column[..3].iter().all(|v| v.is_nan()));
        assert_close(&column[3..], &[20.0; 5], 1e-9);
        assert_eq!(result.metadata()[0].unit, "% PBI");
        assert_eq!(result.metadata()[0].cumulative_periods, 4);
    }

    #[test]
    fn test_gdp_annual_stock_in_dollars() {
        let dataset = Dataset::from_series(
            vec![d(2019, 12, 31), d(2020, 12, 31)],
            vec![10.0, 50.0],
            SeriesMetadata::new("deuda", "Millones de dólares", SeriesType::Stock)
                .with_currency(Currency::Usd)
                .with_frequency(Frequency::Annual),
        )
        .unwrap();
        let result = convert_gdp(&dataset, &references(), ErrorPolicy::Raise).unwrap();
        assert_close(result.column(0).unwrap(), &[10.0, 50.0], 1e-9);
    }

    #[test]
    fn test_gdp_rejects_weekly_data() {
        let dataset = Dataset::from_series(
            vec![d(2021, 1, 3), d(2021, 1, 10), d(2021, 1, 17)],
            vec![1.0, 2.0, 3.0],
            SeriesMetadata::new("x", "Millones", SeriesType::Flujo).with_currency(Currency::Local),
        )
        .unwrap();
        assert!(matches!(
            convert_gdp(&dataset, &references(), ErrorPolicy::Raise),
            Err(TransformError::UnsupportedFrequency { operation: "gdp", .. })
        ));
    }

    #[test]
    fn test_conversion_without_overlap_fails() {
        let dataset = Dataset::from_series(
            month_ends(2030, 1, 3),
            vec![1.0, 2.0, 3.0],
            SeriesMetadata::new("x", "Millones", SeriesType::Flujo).with_currency(Currency::Local),
        )
        .unwrap();
        assert!(matches!(
            convert_usd(&dataset, &references(), ErrorPolicy::Raise),
            Err(TransformError::NoOverlap { .. })
        ));
    }
}
