use super::types::{ActiveFlags, RequestedPositions, StepKind};
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Active steps in execution order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResolvedOrder {
    steps: Vec<StepKind>,
}

impl ResolvedOrder {
    pub fn new(steps: Vec<StepKind>) -> Self {
        ResolvedOrder { steps }
    }

    pub fn steps(&self) -> &[StepKind] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = StepKind> + '_ {
        self.steps.iter().copied()
    }

    /// Display labels of the steps, in order.
    pub fn labels(&self) -> Vec<&'static str> {
        self.steps.iter().map(|kind| kind.label()).collect()
    }
}

/// Orders the active steps by requested position.
///
/// Inactive steps are dropped whatever their position. The sort is stable,
/// so steps sharing a position keep the order in which they were declared.
pub fn resolve_order(requested: &RequestedPositions, active: &ActiveFlags) -> ResolvedOrder {
    let mut entries: Vec<(StepKind, i64)> = requested
        .iter()
        .filter(|(kind, _)| active.get(kind).copied().unwrap_or(false))
        .collect();
    entries.sort_by_key(|(_, position)| *position);
    trace!(steps = ?entries, "resolve_order: sorted");
    ResolvedOrder::new(entries.into_iter().map(|(kind, _)| kind).collect())
}
