use super::primitives::{window_mean, window_sum};
use super::windows::{Trailing, Windowed};
use super::TransformError;
use crate::dataset::Dataset;
use crate::metadata::SeriesType;
use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RollingOperation {
    Sum,
    #[serde(alias = "average")]
    Mean,
}

/// Trailing-window aggregation over `window` rows.
///
/// A row is missing unless all `window` values ending at it are present,
/// so a dataset shorter than the window comes back entirely missing.
pub fn rolling(
    dataset: &Dataset,
    window: usize,
    operation: RollingOperation,
) -> Result<Dataset, TransformError> {
    if window < 2 {
        return Err(TransformError::InvalidParameter(format!(
            "rolling window must be at least 2, got {}",
            window
        )));
    }

    let strategy = Trailing::new(window);
    if dataset.len() < strategy.warm_up() {
        trace!(rows = dataset.len(), window, "rolling: dataset shorter than window");
    }

    dataset.map_columns(|values, meta| {
        if meta.series_type == SeriesType::Stock {
            warn!(series = %meta.name, "rolling: aggregating a stock series");
        }
        let mut meta = meta.clone();
        let rolled = match operation {
            RollingOperation::Sum => {
                meta.cumulative_periods = window as u32;
                strategy.apply(values, window_sum)
            }
            RollingOperation::Mean => strategy.apply(values, window_mean),
        };
        Ok((rolled, meta))
    })
}
