//! Seasonal decomposition.
//!
//! Series are decomposed over their observed span; leading and trailing
//! missing values are kept, interior gaps are rejected. Strictly positive
//! series are decomposed on the log scale so the seasonal factor is
//! multiplicative.

mod classical;
mod stl;
mod x13;

pub use x13::X13Decomposer;

use super::{frequency_of, TransformError};
use crate::config::X13Config;
use crate::dataset::Dataset;
use crate::frequency::Frequency;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecomposeMethod {
    /// STL: seasonal-trend decomposition by loess.
    #[serde(alias = "stl")]
    Loess,
    /// Classical centred moving average.
    #[serde(alias = "ma")]
    MovingAverage,
    /// X13-ARIMA-SEATS through an external binary.
    #[serde(alias = "x13-arima", alias = "x13_arima")]
    X13,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Component {
    #[serde(alias = "seas", alias = "sa")]
    SeasonallyAdjusted,
    #[serde(alias = "trend_cycle")]
    Trend,
}

impl Component {
    /// Value written to the seasonal-adjustment metadata field.
    pub fn label(&self) -> &'static str {
        match self {
            Component::SeasonallyAdjusted => "SA",
            Component::Trend => "Tendencia",
        }
    }
}

/// A contiguous run of observations handed to a decomposer.
#[derive(Debug, Clone, Copy)]
pub struct Segment<'a> {
    pub values: &'a [f64],
    pub dates: &'a [NaiveDate],
    pub frequency: Frequency,
    pub period: usize,
}

/// Both components, on the scale of the input.
#[derive(Debug, Clone, PartialEq)]
pub struct Decomposition {
    pub seasonally_adjusted: Vec<f64>,
    pub trend: Vec<f64>,
}

/// Trend and seasonal parts of an additive decomposition.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Components {
    pub trend: Vec<f64>,
    pub seasonal: Vec<f64>,
}

/// A seasonal decomposition method.
pub trait Decomposer {
    fn name(&self) -> &'static str;

    fn decompose(&self, segment: &Segment<'_>) -> Result<Decomposition, TransformError>;
}

struct LoessDecomposer;

impl Decomposer for LoessDecomposer {
    fn name(&self) -> &'static str {
        "loess"
    }

    fn decompose(&self, segment: &Segment<'_>) -> Result<Decomposition, TransformError> {
        Ok(on_working_scale(segment, stl::stl))
    }
}

struct MovingAverageDecomposer;

impl Decomposer for MovingAverageDecomposer {
    fn name(&self) -> &'static str {
        "moving_average"
    }

    fn decompose(&self, segment: &Segment<'_>) -> Result<Decomposition, TransformError> {
        Ok(on_working_scale(segment, classical::classical))
    }
}

/// Runs an additive kernel, on logs when every value is positive.
fn on_working_scale<K>(segment: &Segment<'_>, kernel: K) -> Decomposition
where
    K: Fn(&[f64], usize) -> Components,
{
    let multiplicative = segment.values.iter().all(|v| *v > 0.0);
    let working: Vec<f64> = if multiplicative {
        segment.values.iter().map(|v| v.ln()).collect()
    } else {
        segment.values.to_vec()
    };

    let Components { trend, seasonal } = kernel(&working, segment.period);
    let adjusted: Vec<f64> = working.iter().zip(&seasonal).map(|(y, s)| y - s).collect();

    if multiplicative {
        Decomposition {
            seasonally_adjusted: adjusted.iter().map(|v| v.exp()).collect(),
            trend: trend.iter().map(|v| v.exp()).collect(),
        }
    } else {
        Decomposition {
            seasonally_adjusted: adjusted,
            trend,
        }
    }
}

/// Replaces every column with its seasonally adjusted or trend component.
///
/// Only monthly and quarterly data are supported, and each series needs at
/// least two full seasonal cycles.
pub fn decompose(
    dataset: &Dataset,
    method: DecomposeMethod,
    component: Component,
    x13: &X13Config,
) -> Result<Dataset, TransformError> {
    let detected = frequency_of(dataset);
    let (frequency, period) = match detected.and_then(|f| f.seasonal_period().map(|p| (f, p))) {
        Some(found) => found,
        None => {
            return Err(TransformError::UnsupportedFrequency {
                operation: "decompose",
                frequency: detected,
            })
        }
    };

    let decomposer: Box<dyn Decomposer + '_> = match method {
        DecomposeMethod::Loess => Box::new(LoessDecomposer),
        DecomposeMethod::MovingAverage => Box::new(MovingAverageDecomposer),
        DecomposeMethod::X13 => Box::new(X13Decomposer::new(x13)),
    };

    dataset.map_columns(|values, meta| {
        let (first, last) = match (
            values.iter().position(|v| !v.is_nan()),
            values.iter().rposition(|v| !v.is_nan()),
        ) {
            (Some(first), Some(last)) => (first, last),
            _ => {
                return Err(TransformError::DecompositionFailed(format!(
                    "series '{}' has no observations",
                    meta.name
                )))
            }
        };
        let span = &values[first..=last];
        if span.iter().any(|v| v.is_nan()) {
            return Err(TransformError::DecompositionFailed(format!(
                "series '{}' has gaps inside its observed span",
                meta.name
            )));
        }
        if span.len() < 2 * period {
            return Err(TransformError::DecompositionFailed(format!(
                "series '{}' has {} observations, needs at least {}",
                meta.name,
                span.len(),
                2 * period
            )));
        }

        let segment = Segment {
            values: span,
            dates: &dataset.index()[first..=last],
            frequency,
            period,
        };
        debug!(
            series = %meta.name,
            method = decomposer.name(),
            observations = span.len(),
            "decompose: running"
        );
        let result = decomposer.decompose(&segment)?;
        let picked = match component {
            Component::SeasonallyAdjusted => result.seasonally_adjusted,
            Component::Trend => result.trend,
        };
        if picked.len() != span.len() {
            return Err(TransformError::DecompositionFailed(format!(
                "{} returned {} values for {} observations",
                decomposer.name(),
                picked.len(),
                span.len()
            )));
        }

        let mut output = vec![f64::NAN; values.len()];
        output[first..=last].copy_from_slice(&picked);
        let mut meta = meta.clone();
        meta.seasonal_adjustment = component.label().to_string();
        Ok((output, meta))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{SeriesMetadata, SeriesType};
    use crate::transform::testing::*;

    const SEASON: [f64; 12] = [3.0, -2.0, 1.0, 4.0, -1.0, -3.0, 2.0, 0.5, -0.5, -4.0, 1.5, -1.5];

    fn seasonal_negative(length: usize) -> Vec<f64> {
        (0..length)
            .map(|t| -50.0 + 0.5 * t as f64 + SEASON[t % 12])
            .collect()
    }

    #[test]
    fn test_moving_average_recovers_additive_components() {
        let values = seasonal_negative(48);
        let dataset = monthly("x", values, SeriesType::Flujo);
        let config = X13Config::default();

        let adjusted = decompose(
            &dataset,
            DecomposeMethod::MovingAverage,
            Component::SeasonallyAdjusted,
            &config,
        )
        .unwrap();
        let expected: Vec<f64> = (0..48).map(|t| -50.0 + 0.5 * t as f64).collect();
        assert_close(adjusted.column(0).unwrap(), &expected, 1e-9);
        assert_eq!(adjusted.metadata()[0].seasonal_adjustment, "SA");

        let trend = decompose(&dataset, DecomposeMethod::MovingAverage, Component::Trend, &config)
            .unwrap();
        assert_close(trend.column(0).unwrap(), &expected, 1e-9);
        assert_eq!(trend.metadata()[0].seasonal_adjustment, "Tendencia");
    }

    #[test]
    fn test_loess_recovers_linear_trend_with_fixed_season() {
        let values: Vec<f64> = (0..60)
            .map(|t| -300.0 + t as f64 + 10.0 * SEASON[t % 12])
            .collect();
        let dataset = monthly("x", values, SeriesType::Flujo);
        let adjusted = decompose(
            &dataset,
            DecomposeMethod::Loess,
            Component::SeasonallyAdjusted,
            &X13Config::default(),
        )
        .unwrap();
        let expected: Vec<f64> = (0..60).map(|t| -300.0 + t as f64).collect();
        assert_close(adjusted.column(0).unwrap(), &expected, 1e-6);
    }

    #[test]
    fn test_positive_series_are_decomposed_multiplicatively() {
        let values: Vec<f64> = (0..36)
            .map(|t| (100.0 + t as f64) * (1.0 + SEASON[t % 12] / 20.0))
            .collect();
        let dataset = monthly("x", values, SeriesType::Flujo);
        let adjusted = decompose(
            &dataset,
            DecomposeMethod::MovingAverage,
            Component::SeasonallyAdjusted,
            &X13Config::default(),
        )
        .unwrap();
        let column = adjusted.column(0).unwrap();
        assert!(column.iter().all(|v| v.is_finite() && *v > 0.0));
        // the seasonal swing is mostly gone
        let jumps: f64 = column.windows(2).map(|w| (w[1] - w[0]).abs()).sum::<f64>() / 35.0;
        assert!(jumps < 3.0, "average month-to-month move {jumps}");
    }

    #[test]
    fn test_leading_and_trailing_gaps_are_kept() {
        let mut values = seasonal_negative(30);
        values.insert(0, f64::NAN);
        values.push(f64::NAN);
        let dataset = monthly("x", values, SeriesType::Flujo);
        let result = decompose(
            &dataset,
            DecomposeMethod::MovingAverage,
            Component::Trend,
            &X13Config::default(),
        )
        .unwrap();
        let column = result.column(0).unwrap();
        assert!(column[0].is_nan());
        assert!(column[31].is_nan());
        assert!(column[1..31].iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_short_or_gappy_series_fail() {
        let config = X13Config::default();
        let short = monthly("x", seasonal_negative(20), SeriesType::Flujo);
        assert!(matches!(
            decompose(&short, DecomposeMethod::Loess, Component::Trend, &config),
            Err(TransformError::DecompositionFailed(_))
        ));

        let mut gappy_values = seasonal_negative(36);
        gappy_values[10] = f64::NAN;
        let gappy = monthly("x", gappy_values, SeriesType::Flujo);
        assert!(matches!(
            decompose(&gappy, DecomposeMethod::Loess, Component::Trend, &config),
            Err(TransformError::DecompositionFailed(_))
        ));
    }

    #[test]
    fn test_annual_data_is_unsupported() {
        let dataset = Dataset::from_series(
            vec![d(2018, 12, 31), d(2019, 12, 31), d(2020, 12, 31)],
            vec![1.0, 2.0, 3.0],
            SeriesMetadata::new("x", "u", SeriesType::Flujo),
        )
        .unwrap();
        assert!(matches!(
            decompose(
                &dataset,
                DecomposeMethod::MovingAverage,
                Component::Trend,
                &X13Config::default()
            ),
            Err(TransformError::UnsupportedFrequency { .. })
        ));
    }
}
