//! Classical decomposition: centred moving-average trend, seasonal index
//! from phase means of the detrended series.

use super::Components;
use crate::transform::primitives::{linear_fit, mean_valid};

pub(crate) fn classical(values: &[f64], period: usize) -> Components {
    let n = values.len();
    let mut trend = centred_moving_average(values, period);
    extrapolate_ends(&mut trend, period);

    let detrended: Vec<f64> = values.iter().zip(&trend).map(|(y, t)| y - t).collect();
    let mut index: Vec<f64> = (0..period)
        .map(|phase| {
            let phase_values: Vec<f64> = detrended
                .iter()
                .skip(phase)
                .step_by(period)
                .copied()
                .collect();
            mean_valid(&phase_values)
        })
        .collect();
    let centre = mean_valid(&index);
    index.iter_mut().for_each(|value| *value -= centre);

    Components {
        trend,
        seasonal: (0..n).map(|i| index[i % period]).collect(),
    }
}

/// `2 x period` moving average for even periods, simple for odd ones.
/// The first and last `period / 2` entries are `NaN`.
fn centred_moving_average(values: &[f64], period: usize) -> Vec<f64> {
    let n = values.len();
    let half = period / 2;
    let weights: Vec<f64> = if period % 2 == 0 {
        let mut weights = vec![1.0 / period as f64; period + 1];
        weights[0] /= 2.0;
        weights[period] /= 2.0;
        weights
    } else {
        vec![1.0 / period as f64; period]
    };

    (0..n)
        .map(|i| {
            if i < half || i + weights.len() - half > n {
                f64::NAN
            } else {
                weights
                    .iter()
                    .enumerate()
                    .map(|(offset, w)| w * values[i - half + offset])
                    .sum()
            }
        })
        .collect()
}

/// Fills the missing ends of the trend with least-squares lines through
/// the nearest `period` known values on each side.
fn extrapolate_ends(trend: &mut [f64], period: usize) {
    let known: Vec<usize> = (0..trend.len()).filter(|&i| !trend[i].is_nan()).collect();
    let (Some(&first), Some(&last)) = (known.first(), known.last()) else {
        return;
    };

    let head: Vec<(f64, f64)> = known
        .iter()
        .take(period)
        .map(|&i| (i as f64, trend[i]))
        .collect();
    if let Some((intercept, slope)) = linear_fit(&head) {
        for i in 0..first {
            trend[i] = intercept + slope * i as f64;
        }
    }

    let tail: Vec<(f64, f64)> = known
        .iter()
        .rev()
        .take(period)
        .map(|&i| (i as f64, trend[i]))
        .collect();
    if let Some((intercept, slope)) = linear_fit(&tail) {
        for i in last + 1..trend.len() {
            trend[i] = intercept + slope * i as f64;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_centred_average_for_even_and_odd_periods() {
        let values: Vec<f64> = (0..8).map(|i| i as f64).collect();
        let even = centred_moving_average(&values, 4);
        assert!(even[0].is_nan() && even[1].is_nan());
        assert!((even[2] - 2.0).abs() < 1e-12);
        assert!((even[5] - 5.0).abs() < 1e-12);
        assert!(even[6].is_nan() && even[7].is_nan());

        let odd = centred_moving_average(&values, 3);
        assert!(odd[0].is_nan());
        assert!((odd[1] - 1.0).abs() < 1e-12);
        assert!((odd[6] - 6.0).abs() < 1e-12);
        assert!(odd[7].is_nan());
    }

    #[test]
    fn test_trend_ends_are_extrapolated() {
        let mut trend = vec![f64::NAN, f64::NAN, 2.0, 3.0, 4.0, 5.0, f64::NAN];
        extrapolate_ends(&mut trend, 4);
        assert!((trend[0] - 0.0).abs() < 1e-12);
        assert!((trend[1] - 1.0).abs() < 1e-12);
        assert!((trend[6] - 6.0).abs() < 1e-12);
    }

    #[test]
    fn test_seasonal_index_is_centred() {
        let values: Vec<f64> = (0..16).map(|i| if i % 4 == 0 { 8.0 } else { 4.0 }).collect();
        let Components { seasonal, .. } = classical(&values, 4);
        assert!((seasonal.iter().take(4).sum::<f64>()).abs() < 1e-12);
        assert!((seasonal[0] - 3.0).abs() < 1e-12);
        assert!((seasonal[1] + 1.0).abs() < 1e-12);
    }
}
