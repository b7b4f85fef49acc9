use super::types::{StepKind, StepParams};
use crate::dataset::Dataset;
use crate::transform::{
    chg_diff, convert_gdp, convert_real, convert_usd, decompose, rebase, resample, rolling,
    TransformContext, TransformError,
};
use std::collections::HashMap;

/// A pipeline step: which kind it is and how it transforms a dataset.
pub trait TransformDefinition: Send + Sync {
    /// Step kind that this definition satisfies.
    fn kind(&self) -> StepKind;

    /// Applies the step. `params` must belong to the same kind.
    fn apply(
        &self,
        dataset: &Dataset,
        params: &StepParams,
        context: &TransformContext<'_>,
    ) -> Result<Dataset, TransformError>;
}

/// Registry of the built-in transformation steps.
pub struct TransformRegistry {
    definitions: HashMap<StepKind, Box<dyn TransformDefinition>>,
}

impl std::fmt::Debug for TransformRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransformRegistry")
            .field("definitions", &"<omitted>")
            .finish()
    }
}

impl TransformRegistry {
    /// Creates a registry populated with every built-in step.
    pub fn new() -> Self {
        let mut definitions: HashMap<StepKind, Box<dyn TransformDefinition>> = HashMap::new();
        definitions.insert(StepKind::Usd, Box::new(UsdDefinition));
        definitions.insert(StepKind::Real, Box::new(RealDefinition));
        definitions.insert(StepKind::Gdp, Box::new(GdpDefinition));
        definitions.insert(StepKind::Resample, Box::new(ResampleDefinition));
        definitions.insert(StepKind::Rolling, Box::new(RollingDefinition));
        definitions.insert(StepKind::Rebase, Box::new(RebaseDefinition));
        definitions.insert(StepKind::ChgDiff, Box::new(ChgDiffDefinition));
        definitions.insert(StepKind::Decompose, Box::new(DecomposeDefinition));
        TransformRegistry { definitions }
    }

    /// Returns the definition registered for a step kind.
    pub fn definition(&self, kind: StepKind) -> Option<&dyn TransformDefinition> {
        self.definitions.get(&kind).map(|boxed| boxed.as_ref())
    }
}

impl Default for TransformRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn mismatched(expected: StepKind, params: &StepParams) -> TransformError {
    TransformError::InvalidParameter(format!(
        "{} step received parameters for {}",
        expected,
        params.kind()
    ))
}

struct UsdDefinition;

impl TransformDefinition for UsdDefinition {
    fn kind(&self) -> StepKind {
        StepKind::Usd
    }

    fn apply(
        &self,
        dataset: &Dataset,
        params: &StepParams,
        context: &TransformContext<'_>,
    ) -> Result<Dataset, TransformError> {
        match params {
            StepParams::Usd { errors } => convert_usd(dataset, context.references, *errors),
            other => Err(mismatched(self.kind(), other)),
        }
    }
}

struct RealDefinition;

impl TransformDefinition for RealDefinition {
    fn kind(&self) -> StepKind {
        StepKind::Real
    }

    fn apply(
        &self,
        dataset: &Dataset,
        params: &StepParams,
        context: &TransformContext<'_>,
    ) -> Result<Dataset, TransformError> {
        match params {
            StepParams::Real { start, end, errors } => {
                convert_real(dataset, context.references, *start, *end, *errors)
            }
            other => Err(mismatched(self.kind(), other)),
        }
    }
}

struct GdpDefinition;

impl TransformDefinition for GdpDefinition {
    fn kind(&self) -> StepKind {
        StepKind::Gdp
    }

    fn apply(
        &self,
        dataset: &Dataset,
        params: &StepParams,
        context: &TransformContext<'_>,
    ) -> Result<Dataset, TransformError> {
        match params {
            StepParams::Gdp { errors } => convert_gdp(dataset, context.references, *errors),
            other => Err(mismatched(self.kind(), other)),
        }
    }
}

struct ResampleDefinition;

impl TransformDefinition for ResampleDefinition {
    fn kind(&self) -> StepKind {
        StepKind::Resample
    }

    fn apply(
        &self,
        dataset: &Dataset,
        params: &StepParams,
        _context: &TransformContext<'_>,
    ) -> Result<Dataset, TransformError> {
        match params {
            StepParams::Resample {
                frequency,
                operation,
            } => resample(dataset, *frequency, *operation),
            other => Err(mismatched(self.kind(), other)),
        }
    }
}

struct RollingDefinition;

impl TransformDefinition for RollingDefinition {
    fn kind(&self) -> StepKind {
        StepKind::Rolling
    }

    fn apply(
        &self,
        dataset: &Dataset,
        params: &StepParams,
        _context: &TransformContext<'_>,
    ) -> Result<Dataset, TransformError> {
        match params {
            StepParams::Rolling { window, operation } => rolling(dataset, *window, *operation),
            other => Err(mismatched(self.kind(), other)),
        }
    }
}

struct RebaseDefinition;

impl TransformDefinition for RebaseDefinition {
    fn kind(&self) -> StepKind {
        StepKind::Rebase
    }

    fn apply(
        &self,
        dataset: &Dataset,
        params: &StepParams,
        _context: &TransformContext<'_>,
    ) -> Result<Dataset, TransformError> {
        match params {
            StepParams::Rebase { start, end, base } => rebase(dataset, *start, *end, *base),
            other => Err(mismatched(self.kind(), other)),
        }
    }
}

struct ChgDiffDefinition;

impl TransformDefinition for ChgDiffDefinition {
    fn kind(&self) -> StepKind {
        StepKind::ChgDiff
    }

    fn apply(
        &self,
        dataset: &Dataset,
        params: &StepParams,
        _context: &TransformContext<'_>,
    ) -> Result<Dataset, TransformError> {
        match params {
            StepParams::ChgDiff { operation, period } => chg_diff(dataset, *operation, *period),
            other => Err(mismatched(self.kind(), other)),
        }
    }
}

struct DecomposeDefinition;

impl TransformDefinition for DecomposeDefinition {
    fn kind(&self) -> StepKind {
        StepKind::Decompose
    }

    fn apply(
        &self,
        dataset: &Dataset,
        params: &StepParams,
        context: &TransformContext<'_>,
    ) -> Result<Dataset, TransformError> {
        match params {
            StepParams::Decompose { method, component } => {
                decompose(dataset, *method, *component, context.x13)
            }
            other => Err(mismatched(self.kind(), other)),
        }
    }
}
