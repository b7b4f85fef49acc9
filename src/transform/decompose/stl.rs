//! STL seasonal-trend decomposition by loess (Cleveland et al., 1990),
//! non-robust variant with two inner passes.

use super::Components;
use tracing::trace;

const SEASONAL_SPAN: usize = 7;
const INNER_PASSES: usize = 2;

/// Smoother spans for a given seasonal period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Spans {
    seasonal: usize,
    trend: usize,
    low_pass: usize,
}

impl Spans {
    fn for_period(period: usize) -> Self {
        let trend = (1.5 * period as f64 / (1.0 - 1.5 / SEASONAL_SPAN as f64)).ceil() as usize;
        Spans {
            seasonal: SEASONAL_SPAN,
            trend: next_odd(trend),
            low_pass: next_odd(period + 1),
        }
    }
}

fn next_odd(value: usize) -> usize {
    if value % 2 == 0 {
        value + 1
    } else {
        value
    }
}

pub(crate) fn stl(values: &[f64], period: usize) -> Components {
    let n = values.len();
    let spans = Spans::for_period(period);
    trace!(n, period, ?spans, "stl: start");

    let mut trend = vec![0.0; n];
    let mut seasonal = vec![0.0; n];
    for _ in 0..INNER_PASSES {
        let detrended: Vec<f64> = values.iter().zip(&trend).map(|(y, t)| y - t).collect();
        let cycle = smooth_cycle_subseries(&detrended, period, spans.seasonal);

        let low = moving_average(&moving_average(&moving_average(&cycle, period), period), 3);
        let low = loess_all(&low, spans.low_pass);
        seasonal = (0..n).map(|i| cycle[period + i] - low[i]).collect();

        let deseasonalized: Vec<f64> = values.iter().zip(&seasonal).map(|(y, s)| y - s).collect();
        trend = loess_all(&deseasonalized, spans.trend);
    }

    Components { trend, seasonal }
}

/// Smooths each cycle-subseries and extends it by one period at both ends.
/// The result has `n + 2 * period` entries; entry `i + period` lines up with
/// input position `i`.
fn smooth_cycle_subseries(values: &[f64], period: usize, span: usize) -> Vec<f64> {
    let n = values.len();
    let mut cycle = vec![0.0; n + 2 * period];
    for phase in 0..period.min(n) {
        let subseries: Vec<f64> = values.iter().skip(phase).step_by(period).copied().collect();
        let length = subseries.len() as isize;
        for position in -1..=length {
            let smoothed = loess_at(&subseries, span, position as f64);
            let slot = phase as isize + (position + 1) * period as isize;
            cycle[slot as usize] = smoothed;
        }
    }
    cycle
}

fn moving_average(values: &[f64], length: usize) -> Vec<f64> {
    if values.len() < length {
        return Vec::new();
    }
    let mut output = Vec::with_capacity(values.len() - length + 1);
    let mut sum: f64 = values[..length].iter().sum();
    output.push(sum / length as f64);
    for i in length..values.len() {
        sum += values[i] - values[i - length];
        output.push(sum / length as f64);
    }
    output
}

fn loess_all(values: &[f64], span: usize) -> Vec<f64> {
    (0..values.len())
        .map(|i| loess_at(values, span, i as f64))
        .collect()
}

/// Locally linear loess fit of equally spaced `values` evaluated at `x`,
/// using the `span` nearest points with tricube weights.
fn loess_at(values: &[f64], span: usize, x: f64) -> f64 {
    let n = values.len();
    if n == 0 {
        return f64::NAN;
    }
    if n == 1 {
        return values[0];
    }

    let span = span.max(2);
    let (left, right) = if span >= n {
        (0, n - 1)
    } else {
        let centre = x.round().clamp(0.0, (n - 1) as f64) as usize;
        let left = centre.saturating_sub((span - 1) / 2).min(n - span);
        (left, left + span - 1)
    };

    let mut h = (x - left as f64).max(right as f64 - x);
    if span > n {
        h += ((span - n) / 2) as f64;
    }
    let upper = 0.999 * h;
    let lower = 0.001 * h;

    let mut weights: Vec<f64> = (left..=right)
        .map(|j| {
            let r = (j as f64 - x).abs();
            if r <= lower {
                1.0
            } else if r <= upper {
                (1.0 - (r / h).powi(3)).powi(3)
            } else {
                0.0
            }
        })
        .collect();
    let total: f64 = weights.iter().sum();
    if total <= 0.0 {
        return f64::NAN;
    }
    weights.iter_mut().for_each(|w| *w /= total);

    if h > 0.0 {
        let centre: f64 = (left..=right)
            .zip(&weights)
            .map(|(j, w)| w * j as f64)
            .sum();
        let spread: f64 = (left..=right)
            .zip(&weights)
            .map(|(j, w)| w * (j as f64 - centre).powi(2))
            .sum();
        if spread.sqrt() > 0.001 * (n - 1) as f64 {
            let slope = (x - centre) / spread;
            for (j, w) in (left..=right).zip(weights.iter_mut()) {
                *w *= slope * (j as f64 - centre) + 1.0;
            }
        }
    }

    (left..=right)
        .zip(&weights)
        .map(|(j, w)| w * values[j])
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spans_follow_period() {
        let monthly = Spans::for_period(12);
        assert_eq!(monthly.trend, 23);
        assert_eq!(monthly.low_pass, 13);
        let quarterly = Spans::for_period(4);
        assert_eq!(quarterly.trend, 9);
        assert_eq!(quarterly.low_pass, 5);
    }

    #[test]
    fn test_loess_reproduces_lines_and_extrapolates() {
        let line: Vec<f64> = (0..10).map(|i| 3.0 + 2.0 * i as f64).collect();
        for x in [-1.0, 0.0, 4.0, 9.0, 10.0] {
            assert!((loess_at(&line, 5, x) - (3.0 + 2.0 * x)).abs() < 1e-9);
        }
        assert!((loess_at(&line, 25, 10.0) - 23.0).abs() < 1e-9);
    }

    #[test]
    fn test_moving_average_shortens_series() {
        assert_eq!(moving_average(&[1.0, 2.0, 3.0, 4.0], 2), vec![1.5, 2.5, 3.5]);
        assert!(moving_average(&[1.0], 3).is_empty());
    }

    #[test]
    fn test_pure_seasonal_pattern_goes_to_seasonal_component() {
        let pattern = [1.0, -1.0, 2.0, -2.0];
        let values: Vec<f64> = (0..16).map(|t| 10.0 + pattern[t % 4]).collect();
        let Components { trend, seasonal } = stl(&values, 4);
        for t in 0..16 {
            assert!((trend[t] - 10.0).abs() < 1e-6);
            assert!((seasonal[t] - pattern[t % 4]).abs() < 1e-6);
        }
    }
}
