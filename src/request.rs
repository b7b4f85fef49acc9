//! Request-scoped chart configuration and its end-to-end execution.
//!
//! A [`ChartRequest`] selects up to a handful of stored tables, each with its
//! own transformation pipeline, and a chart window. Running it reads every
//! selection, applies its pipeline, reconciles the results onto one index
//! and trims them for display.

use crate::config::PipelineConfig;
use crate::dataset::Dataset;
use crate::frequency::Frequency;
use crate::pipeline::{
    resolve_order, ActiveFlags, MissingParameter, PipelineError, PipelineExecutor,
    RequestedPositions, ResolvedOrder, StepKind, TransformParams, TransformRegistry,
};
use crate::reconcile::{reconcile, unique_names, ReconcileError};
use crate::time_series::{ColumnSelection, DataProvider, DataProviderError, DateRange};
use crate::transform::{
    resample, ProviderReferences, ResampleOperation, TransformContext, TransformError,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;
use tracing::{debug, info};

/// Charts longer than this are shown as monthly averages.
pub const MAX_CHART_ROWS: usize = 7000;

fn default_chart_start() -> NaiveDate {
    NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or(NaiveDate::MIN)
}

fn default_chart_end() -> NaiveDate {
    NaiveDate::from_ymd_opt(2100, 1, 1).unwrap_or(NaiveDate::MAX)
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("{0} is active but has no position")]
    MissingPosition(StepKind),
    #[error("{step} position must be at least 1, got {position}")]
    InvalidPosition { step: StepKind, position: i64 },
    #[error(transparent)]
    MissingParameter(#[from] MissingParameter),
    #[error("{step}: {reason}")]
    InvalidParameter { step: StepKind, reason: String },
}

/// Positions, on/off flags and parameters for one selection's pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformationRequest {
    pub positions: RequestedPositions,
    pub active: ActiveFlags,
    pub params: TransformParams,
}

impl TransformationRequest {
    fn is_active(&self, kind: StepKind) -> bool {
        self.active.get(&kind).copied().unwrap_or(false)
    }

    /// Checks every active step has a usable position and complete,
    /// consistent parameters.
    pub fn validate(&self) -> Result<(), ValidationError> {
        for kind in StepKind::ALL.into_iter().filter(|kind| self.is_active(*kind)) {
            match self.positions.get(kind) {
                None => return Err(ValidationError::MissingPosition(kind)),
                Some(position) if position < 1 => {
                    return Err(ValidationError::InvalidPosition {
                        step: kind,
                        position,
                    })
                }
                Some(_) => {}
            }
            self.params.for_step(kind)?;
            self.check_values(kind)?;
        }
        Ok(())
    }

    fn check_values(&self, kind: StepKind) -> Result<(), ValidationError> {
        let invalid = |reason: String| ValidationError::InvalidParameter { step: kind, reason };
        match kind {
            StepKind::Real => {
                check_dates(self.params.real.start, self.params.real.end).map_err(invalid)
            }
            StepKind::Rebase => {
                check_dates(self.params.rebase.start, self.params.rebase.end).map_err(invalid)?;
                match self.params.rebase.base {
                    Some(base) if !base.is_finite() => {
                        Err(invalid(format!("base must be a finite number, got {}", base)))
                    }
                    _ => Ok(()),
                }
            }
            StepKind::Rolling => match self.params.rolling.window {
                Some(window) if window < 2 => {
                    Err(invalid(format!("window must be at least 2, got {}", window)))
                }
                _ => Ok(()),
            },
            _ => Ok(()),
        }
    }

    /// Validates and returns the active steps in execution order.
    pub fn resolve(&self) -> Result<ResolvedOrder, ValidationError> {
        self.validate()?;
        Ok(resolve_order(&self.positions, &self.active))
    }
}

fn check_dates(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Result<(), String> {
    match (start, end) {
        (None, Some(_)) => Err("an end date needs a start date".to_string()),
        (Some(start), Some(end)) if end < start => {
            Err(format!("end date {} is before start date {}", end, start))
        }
        _ => Ok(()),
    }
}

/// One stored table, the columns to read from it and its pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesSelection {
    pub table: String,
    #[serde(default)]
    pub columns: ColumnSelection,
    #[serde(default)]
    pub transformations: TransformationRequest,
}

impl SeriesSelection {
    pub fn new(table: impl Into<String>, columns: ColumnSelection) -> Self {
        SeriesSelection {
            table: table.into(),
            columns,
            transformations: TransformationRequest::default(),
        }
    }

    pub fn with_transformations(mut self, transformations: TransformationRequest) -> Self {
        self.transformations = transformations;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RequestError {
    #[error("no series selected")]
    NoSeries,
    #[error("chart window ends ({end}) before it starts ({start})")]
    InvalidWindow { start: NaiveDate, end: NaiveDate },
    #[error("selection {selection} ({table}): {source}")]
    Validation {
        selection: usize,
        table: String,
        #[source]
        source: ValidationError,
    },
    #[error("reading '{table}': {source}")]
    Provider {
        table: String,
        #[source]
        source: DataProviderError,
    },
    #[error("transforming '{table}': {source}")]
    Pipeline {
        table: String,
        #[source]
        source: PipelineError,
    },
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
    #[error("reducing chart to monthly averages: {0}")]
    Downsample(#[source] TransformError),
}

/// A step as applied, with the label shown to users.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppliedStep {
    pub step: StepKind,
    pub label: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppliedSteps {
    pub table: String,
    pub steps: Vec<AppliedStep>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartOutput {
    pub dataset: Dataset,
    pub target_frequency: Option<Frequency>,
    pub applied_steps: Vec<AppliedSteps>,
}

/// Everything needed to draw one chart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartRequest {
    pub series: Vec<SeriesSelection>,
    #[serde(default)]
    pub start: Option<NaiveDate>,
    #[serde(default)]
    pub end: Option<NaiveDate>,
}

impl ChartRequest {
    pub fn new(series: Vec<SeriesSelection>) -> Self {
        ChartRequest {
            series,
            start: None,
            end: None,
        }
    }

    /// Chart window, defaulting to 1970-01-01 through 2100-01-01.
    pub fn window(&self) -> DateRange {
        DateRange::new(
            self.start.unwrap_or_else(default_chart_start),
            self.end.unwrap_or_else(default_chart_end),
        )
    }

    /// Validates every pipeline, then reads, transforms and combines the
    /// selected series.
    pub fn run(
        &self,
        provider: &dyn DataProvider,
        config: &PipelineConfig,
    ) -> Result<ChartOutput, RequestError> {
        if self.series.is_empty() {
            return Err(RequestError::NoSeries);
        }
        let window = self.window();
        if let (Some(start), Some(end)) = (window.start, window.end) {
            if end < start {
                return Err(RequestError::InvalidWindow { start, end });
            }
        }

        let mut orders = Vec::with_capacity(self.series.len());
        for (position, selection) in self.series.iter().enumerate() {
            let order = selection.transformations.resolve().map_err(|source| {
                RequestError::Validation {
                    selection: position + 1,
                    table: selection.table.clone(),
                    source,
                }
            })?;
            orders.push(order);
        }

        let references = ProviderReferences::new(provider, &config.references);
        let registry = TransformRegistry::new();
        let executor =
            PipelineExecutor::new(&registry, TransformContext::new(&references, &config.x13));

        let mut outputs = Vec::with_capacity(self.series.len());
        for (selection, order) in self.series.iter().zip(&orders) {
            let dataset = provider
                .read(&selection.table, &selection.columns, &DateRange::unbounded())
                .map_err(|source| RequestError::Provider {
                    table: selection.table.clone(),
                    source,
                })?;
            debug!(
                table = %selection.table,
                rows = dataset.len(),
                columns = dataset.width(),
                steps = ?order.steps(),
                "ChartRequest: running pipeline"
            );
            let transformed = executor
                .execute(&dataset, order, &selection.transformations.params)
                .map_err(|source| RequestError::Pipeline {
                    table: selection.table.clone(),
                    source,
                })?;
            outputs.push(transformed);
        }

        let tables: Vec<String> = self.series.iter().map(|s| s.table.clone()).collect();
        prefix_colliding_names(&mut outputs, &unique_names(&tables));

        let reconciled = reconcile(&outputs)?;
        let mut dataset = reconciled.dataset.drop_empty_rows().slice(&window);
        if dataset.len() > MAX_CHART_ROWS {
            info!(
                rows = dataset.len(),
                "ChartRequest: too many rows, resampling to monthly averages"
            );
            dataset = resample(&dataset, Frequency::Monthly, ResampleOperation::Mean)
                .map_err(RequestError::Downsample)?;
        }

        let applied_steps = self
            .series
            .iter()
            .zip(&orders)
            .map(|(selection, order)| AppliedSteps {
                table: selection.table.clone(),
                steps: order
                    .iter()
                    .map(|step| AppliedStep {
                        step,
                        label: step.label(),
                    })
                    .collect(),
            })
            .collect();

        Ok(ChartOutput {
            dataset,
            target_frequency: reconciled.target,
            applied_steps,
        })
    }
}

/// When the same indicator name appears in more than one selection, every
/// column is renamed to `<table label> | <name>`.
fn prefix_colliding_names(outputs: &mut [Dataset], labels: &[String]) {
    let names: Vec<&str> = outputs.iter().flat_map(|dataset| dataset.names()).collect();
    let distinct: HashSet<&str> = names.iter().copied().collect();
    if distinct.len() == names.len() {
        return;
    }
    for (dataset, label) in outputs.iter_mut().zip(labels) {
        for meta in dataset.metadata_mut() {
            meta.name = format!("{} | {}", label, meta.name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{ResampleParams, RollingParams};
    use crate::transform::RollingOperation;

    fn request(json: &str) -> TransformationRequest {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_inactive_steps_need_nothing() {
        let transformations = request(r#"{"positions": {"resample": 1}, "active": {"resample": false}}"#);
        assert!(transformations.resolve().unwrap().is_empty());
    }

    #[test]
    fn test_active_step_requires_position_and_params() {
        let missing_position = request(r#"{"active": {"usd": true}}"#);
        assert_eq!(
            missing_position.validate(),
            Err(ValidationError::MissingPosition(StepKind::Usd))
        );

        let zero = request(r#"{"positions": {"usd": 0}, "active": {"usd": true}}"#);
        assert!(matches!(
            zero.validate(),
            Err(ValidationError::InvalidPosition { position: 0, .. })
        ));

        let no_params = request(r#"{"positions": {"res": 1}, "active": {"res": true}}"#);
        assert!(matches!(
            no_params.validate(),
            Err(ValidationError::MissingParameter(MissingParameter {
                step: StepKind::Resample,
                ..
            }))
        ));
    }

    #[test]
    fn test_parameter_values_are_checked() {
        let mut transformations = request(r#"{"positions": {"roll": 1}, "active": {"roll": true}}"#);
        transformations.params.rolling = RollingParams {
            window: Some(1),
            operation: Some(RollingOperation::Sum),
        };
        assert!(matches!(
            transformations.validate(),
            Err(ValidationError::InvalidParameter {
                step: StepKind::Rolling,
                ..
            })
        ));

        let reversed = request(
            r#"{"positions": {"real": 1}, "active": {"real": true},
                "params": {"real": {"start": "2020-01-31", "end": "2019-01-31"}}}"#,
        );
        assert!(reversed.validate().is_err());

        let end_only = request(
            r#"{"positions": {"base_index": 1}, "active": {"base_index": true},
                "params": {"rebase": {"end": "2019-01-31", "base": 100}}}"#,
        );
        assert!(end_only.validate().is_err());
    }

    #[test]
    fn test_resolve_orders_valid_request() {
        let mut transformations = request(
            r#"{"positions": {"usd": 2, "res": 1}, "active": {"usd": true, "res": true}}"#,
        );
        transformations.params.resample = ResampleParams {
            frequency: Some(Frequency::Quarterly),
            operation: Some(ResampleOperation::Sum),
        };
        let order = transformations.resolve().unwrap();
        assert_eq!(order.steps(), &[StepKind::Resample, StepKind::Usd]);
    }

    #[test]
    fn test_chart_window_defaults() {
        let chart = ChartRequest::new(vec![SeriesSelection::new("t", ColumnSelection::All)]);
        let window = chart.window();
        assert_eq!(window.start, NaiveDate::from_ymd_opt(1970, 1, 1));
        assert_eq!(window.end, NaiveDate::from_ymd_opt(2100, 1, 1));
    }

    #[test]
    fn test_colliding_names_are_prefixed() {
        use crate::metadata::{SeriesMetadata, SeriesType};
        let date = NaiveDate::from_ymd_opt(2020, 1, 31).unwrap();
        let make = |name: &str| {
            Dataset::from_series(
                vec![date],
                vec![1.0],
                SeriesMetadata::new(name, "u", SeriesType::Flujo),
            )
            .unwrap()
        };
        let mut outputs = vec![make("Total"), make("Total")];
        let labels = unique_names(&["cpi".to_string(), "cpi".to_string()]);
        prefix_colliding_names(&mut outputs, &labels);
        assert_eq!(outputs[0].names(), vec!["cpi | Total"]);
        assert_eq!(outputs[1].names(), vec!["cpi (1) | Total"]);

        let mut distinct = vec![make("a"), make("b")];
        prefix_colliding_names(&mut distinct, &labels);
        assert_eq!(distinct[1].names(), vec!["b"]);
    }
}
