//! Ordered transformation pipelines.
//!
//! A request names a position and an on/off flag per step. The active steps
//! are sorted into a [`ResolvedOrder`] and run one after another, each on the
//! output of the previous one. A pipeline either completes or fails as a
//! whole; no partially transformed dataset is returned.

pub mod order;
pub mod registry;
pub mod types;

pub use order::{resolve_order, ResolvedOrder};
pub use registry::{TransformDefinition, TransformRegistry};
pub use types::{
    ActiveFlags, ChgDiffParams, DateParams, DecomposeParams, MissingParameter, RebaseParams,
    RequestedPositions, ResampleParams, RollingParams, StepKind, StepParams, TransformParams,
};

use crate::dataset::Dataset;
use crate::transform::{TransformContext, TransformError};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PipelineError {
    #[error(transparent)]
    MissingParameter(#[from] MissingParameter),
    #[error("no transformation registered for '{0}'")]
    Unregistered(StepKind),
    #[error("step '{step}' failed: {source}")]
    StepFailed {
        step: StepKind,
        #[source]
        source: TransformError,
    },
}

/// Runs resolved pipelines against the steps of a registry.
pub struct PipelineExecutor<'a> {
    registry: &'a TransformRegistry,
    context: TransformContext<'a>,
}

impl<'a> PipelineExecutor<'a> {
    pub fn new(registry: &'a TransformRegistry, context: TransformContext<'a>) -> Self {
        PipelineExecutor { registry, context }
    }

    /// Applies `order` to `dataset`.
    ///
    /// Parameters for every step are checked before any step runs. An empty
    /// order returns the input unchanged.
    pub fn execute(
        &self,
        dataset: &Dataset,
        order: &ResolvedOrder,
        params: &TransformParams,
    ) -> Result<Dataset, PipelineError> {
        let mut planned = Vec::with_capacity(order.len());
        for kind in order.iter() {
            let definition = self
                .registry
                .definition(kind)
                .ok_or(PipelineError::Unregistered(kind))?;
            planned.push((definition, params.for_step(kind)?));
        }

        let mut current = dataset.clone();
        for (position, (definition, step_params)) in planned.iter().enumerate() {
            let step = definition.kind();
            debug!(
                position = position + 1,
                step = %step,
                rows = current.len(),
                columns = current.width(),
                "pipeline: applying step"
            );
            current = definition
                .apply(&current, step_params, &self.context)
                .map_err(|source| PipelineError::StepFailed { step, source })?;
        }

        debug!(
            steps = order.len(),
            rows = current.len(),
            "pipeline: completed"
        );
        Ok(current)
    }
}

/// Convenience wrapper running `order` with the built-in registry.
pub fn execute(
    dataset: &Dataset,
    order: &ResolvedOrder,
    params: &TransformParams,
    context: TransformContext<'_>,
) -> Result<Dataset, PipelineError> {
    let registry = TransformRegistry::new();
    PipelineExecutor::new(&registry, context).execute(dataset, order, params)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::X13Config;
    use crate::metadata::SeriesType;
    use crate::transform::testing::{assert_close, monthly, FixedReferences};
    use crate::transform::{ChangeOperation, ChangePeriod, RollingOperation};

    fn no_references() -> FixedReferences {
        FixedReferences {
            exchange_rate: Dataset::empty(),
            prices: Dataset::empty(),
            gdp: Dataset::empty(),
        }
    }

    #[test]
    fn test_empty_pipeline_is_identity() {
        let dataset = monthly("x", vec![1.0, f64::NAN, 3.0], SeriesType::Flujo);
        let references = no_references();
        let x13 = X13Config::default();
        let result = execute(
            &dataset,
            &ResolvedOrder::default(),
            &TransformParams::default(),
            TransformContext::new(&references, &x13),
        )
        .unwrap();
        assert_eq!(result, dataset);
    }

    #[test]
    fn test_steps_run_in_order() {
        let dataset = monthly("x", vec![10.0, 20.0, 30.0, 40.0], SeriesType::Flujo);
        let mut params = TransformParams::default();
        params.rolling = RollingParams {
            window: Some(2),
            operation: Some(RollingOperation::Sum),
        };
        params.chg_diff = ChgDiffParams {
            operation: Some(ChangeOperation::Diff),
            period: Some(ChangePeriod::Last),
        };
        let references = no_references();
        let x13 = X13Config::default();
        let context = TransformContext::new(&references, &x13);

        let roll_first = ResolvedOrder::new(vec![StepKind::Rolling, StepKind::ChgDiff]);
        let result = execute(&dataset, &roll_first, &params, context).unwrap();
        // sums [NaN, 30, 50, 70], then differences
        assert_close(
            result.column(0).unwrap(),
            &[f64::NAN, f64::NAN, 20.0, 20.0],
            1e-12,
        );
        assert_eq!(result.metadata()[0].cumulative_periods, 2);
    }

    #[test]
    fn test_missing_parameters_fail_before_running() {
        let dataset = monthly("x", vec![1.0, 2.0, 3.0], SeriesType::Flujo);
        let references = no_references();
        let x13 = X13Config::default();
        let order = ResolvedOrder::new(vec![StepKind::Usd, StepKind::Rebase]);
        let result = execute(
            &dataset,
            &order,
            &TransformParams::default(),
            TransformContext::new(&references, &x13),
        );
        assert_eq!(
            result.unwrap_err(),
            PipelineError::MissingParameter(MissingParameter {
                step: StepKind::Rebase,
                parameter: "start",
            })
        );
    }

    #[test]
    fn test_failed_step_is_reported() {
        let dataset = monthly("x", vec![1.0, 2.0, 3.0], SeriesType::Flujo);
        let mut params = TransformParams::default();
        params.rolling = RollingParams {
            window: Some(1),
            operation: Some(RollingOperation::Mean),
        };
        let references = no_references();
        let x13 = X13Config::default();
        let result = execute(
            &dataset,
            &ResolvedOrder::new(vec![StepKind::Rolling]),
            &params,
            TransformContext::new(&references, &x13),
        );
        assert!(matches!(
            result,
            Err(PipelineError::StepFailed {
                step: StepKind::Rolling,
                source: TransformError::InvalidParameter(_)
            })
        ));
    }
}
