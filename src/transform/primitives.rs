//! Stateless numeric primitives used by the transformation functions.
//!
//! These are pure functions that only operate on slices of numeric data and
//! can be composed with windowing strategies. Missing values are `NaN`.

/// Sum of the non-missing values; `NaN` when there are none.
pub fn sum_valid(values: &[f64]) -> f64 {
    let mut valid = values.iter().filter(|v| !v.is_nan()).peekable();
    if valid.peek().is_none() {
        return f64::NAN;
    }
    valid.sum()
}

/// Mean of the non-missing values; `NaN` when there are none.
pub fn mean_valid(values: &[f64]) -> f64 {
    let valid: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    if valid.is_empty() {
        return f64::NAN;
    }
    valid.iter().sum::<f64>() / valid.len() as f64
}

/// Last non-missing value; `NaN` when there is none.
pub fn last_valid(values: &[f64]) -> f64 {
    values
        .iter()
        .rev()
        .copied()
        .find(|v| !v.is_nan())
        .unwrap_or(f64::NAN)
}

/// Sum of a full window: any missing value makes the result missing.
pub fn window_sum(window: &[f64]) -> f64 {
    if window.iter().any(|v| v.is_nan()) {
        return f64::NAN;
    }
    window.iter().sum()
}

/// Mean of a full window: any missing value makes the result missing.
pub fn window_mean(window: &[f64]) -> f64 {
    if window.is_empty() {
        return f64::NAN;
    }
    window_sum(window) / window.len() as f64
}

/// Percent change from `previous` to `current`.
///
/// Division by zero yields `NaN` rather than an infinity.
pub fn pct_change(current: f64, previous: f64) -> f64 {
    let change = (current / previous - 1.0) * 100.0;
    if change.is_finite() {
        change
    } else {
        f64::NAN
    }
}

pub fn difference(current: f64, previous: f64) -> f64 {
    current - previous
}

/// Divides, mapping infinities to `NaN`.
pub fn ratio(numerator: f64, denominator: f64) -> f64 {
    let value = numerator / denominator;
    if value.is_finite() {
        value
    } else {
        f64::NAN
    }
}

/// Ordinary least squares line through `(x, y)` pairs.
///
/// Returns `(intercept, slope)`, or `None` with fewer than two distinct x.
pub fn linear_fit(points: &[(f64, f64)]) -> Option<(f64, f64)> {
    if points.len() < 2 {
        return None;
    }
    let n = points.len() as f64;
    let mean_x = points.iter().map(|(x, _)| x).sum::<f64>() / n;
    let mean_y = points.iter().map(|(_, y)| y).sum::<f64>() / n;
    let sxx: f64 = points.iter().map(|(x, _)| (x - mean_x).powi(2)).sum();
    if sxx == 0.0 {
        return None;
    }
    let sxy: f64 = points
        .iter()
        .map(|(x, y)| (x - mean_x) * (y - mean_y))
        .sum();
    let slope = sxy / sxx;
    Some((mean_y - slope * mean_x, slope))
}

/// Fills interior missing values by linear interpolation on position.
///
/// Leading and trailing missing values are left as they are.
pub fn fill_interior_linear(values: &mut [f64]) {
    let known: Vec<usize> = (0..values.len()).filter(|&i| !values[i].is_nan()).collect();
    for pair in known.windows(2) {
        let (left, right) = (pair[0], pair[1]);
        let span = (right - left) as f64;
        for position in left + 1..right {
            let weight = (position - left) as f64 / span;
            values[position] = values[left] + (values[right] - values[left]) * weight;
        }
    }
}
