//! Row-aligned windows over a single column.
//!
//! Both shapes return a vector as long as their input, with `NaN` in the
//! leading rows that lack enough history.

/// How much history a window needs before it yields a value.
pub trait Windowed {
    /// Rows needed before the first output.
    fn warm_up(&self) -> usize;
}

/// The `len` most recent rows, ending at the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trailing {
    len: usize,
}

impl Trailing {
    pub fn new(len: usize) -> Self {
        Trailing { len: len.max(1) }
    }

    /// Reduces every full trailing window to one value.
    pub fn apply<F>(&self, column: &[f64], mut reduce: F) -> Vec<f64>
    where
        F: FnMut(&[f64]) -> f64,
    {
        let mut output = vec![f64::NAN; column.len()];
        for end in self.len..=column.len() {
            output[end - 1] = reduce(&column[end - self.len..end]);
        }
        output
    }
}

impl Windowed for Trailing {
    fn warm_up(&self) -> usize {
        self.len
    }
}

/// Each row paired with the row `periods` earlier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lagged {
    periods: usize,
}

impl Lagged {
    pub fn new(periods: usize) -> Self {
        Lagged {
            periods: periods.max(1),
        }
    }

    /// Computes `combine(current, earlier)` for every row with a partner.
    pub fn apply<F>(&self, column: &[f64], mut combine: F) -> Vec<f64>
    where
        F: FnMut(f64, f64) -> f64,
    {
        let mut output = vec![f64::NAN; column.len()];
        for row in self.periods..column.len() {
            output[row] = combine(column[row], column[row - self.periods]);
        }
        output
    }
}

impl Windowed for Lagged {
    fn warm_up(&self) -> usize {
        self.periods + 1
    }
}

#[cfg(test)]
mod tests {
    use super::super::primitives::{pct_change, window_sum};
    use super::*;

    #[test]
    fn test_trailing_reduces_full_windows_only() {
        let window = Trailing::new(3);
        let result = window.apply(&[1.0, 2.0, 3.0, 4.0], window_sum);
        assert!(result[0].is_nan() && result[1].is_nan());
        assert_eq!(&result[2..], &[6.0, 9.0]);
        assert_eq!(window.warm_up(), 3);
    }

    #[test]
    fn test_trailing_longer_than_column() {
        let result = Trailing::new(2).apply(&[5.0], window_sum);
        assert_eq!(result.len(), 1);
        assert!(result[0].is_nan());
    }

    #[test]
    fn test_lagged_pairs_rows() {
        let lag = Lagged::new(2);
        let result = lag.apply(&[100.0, 50.0, 110.0, 100.0], pct_change);
        assert!(result[0].is_nan() && result[1].is_nan());
        assert!((result[2] - 10.0).abs() < 1e-12);
        assert!((result[3] - 100.0).abs() < 1e-12);
        assert_eq!(lag.warm_up(), 3);
    }
}
