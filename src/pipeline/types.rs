use crate::frequency::Frequency;
use crate::transform::{
    ChangeOperation, ChangePeriod, Component, DecomposeMethod, ErrorPolicy, ResampleOperation,
    RollingOperation,
};
use chrono::NaiveDate;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use thiserror::Error;

/// Transformation step kinds supported by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum StepKind {
    Usd,
    Real,
    Gdp,
    Resample,
    Rolling,
    Rebase,
    ChgDiff,
    Decompose,
}

impl StepKind {
    pub const ALL: [StepKind; 8] = [
        StepKind::Usd,
        StepKind::Real,
        StepKind::Gdp,
        StepKind::Resample,
        StepKind::Rolling,
        StepKind::Rebase,
        StepKind::ChgDiff,
        StepKind::Decompose,
    ];

    /// Parses a step name, accepting the short aliases.
    pub fn from_name(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "usd" => Some(StepKind::Usd),
            "real" => Some(StepKind::Real),
            "gdp" => Some(StepKind::Gdp),
            "res" | "resample" => Some(StepKind::Resample),
            "roll" | "rolling" => Some(StepKind::Rolling),
            "base_index" | "rebase" => Some(StepKind::Rebase),
            "chg_diff" | "chg-diff" => Some(StepKind::ChgDiff),
            "seas" | "decompose" => Some(StepKind::Decompose),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            StepKind::Usd => "usd",
            StepKind::Real => "real",
            StepKind::Gdp => "gdp",
            StepKind::Resample => "resample",
            StepKind::Rolling => "rolling",
            StepKind::Rebase => "rebase",
            StepKind::ChgDiff => "chg_diff",
            StepKind::Decompose => "decompose",
        }
    }

    /// Label shown to users next to the step.
    pub fn label(&self) -> &'static str {
        match self {
            StepKind::Usd => "Convertir a dólares",
            StepKind::Real => "Convertir a precios constantes",
            StepKind::Gdp => "Convertir a % del PBI",
            StepKind::Resample => "Cambiar frecuencia",
            StepKind::Rolling => "Acumular",
            StepKind::Rebase => "Indexar a período base",
            StepKind::ChgDiff => "Calcular variaciones o diferencias",
            StepKind::Decompose => "Desestacionalizar",
        }
    }
}

impl std::fmt::Display for StepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl From<StepKind> for String {
    fn from(kind: StepKind) -> Self {
        kind.name().to_string()
    }
}

impl TryFrom<String> for StepKind {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        StepKind::from_name(&value).ok_or_else(|| format!("unknown transformation '{value}'"))
    }
}

/// Fully specified parameters for one step.
#[derive(Debug, Clone, PartialEq)]
pub enum StepParams {
    Usd {
        errors: ErrorPolicy,
    },
    Real {
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        errors: ErrorPolicy,
    },
    Gdp {
        errors: ErrorPolicy,
    },
    Resample {
        frequency: Frequency,
        operation: ResampleOperation,
    },
    Rolling {
        window: usize,
        operation: RollingOperation,
    },
    Rebase {
        start: NaiveDate,
        end: Option<NaiveDate>,
        base: f64,
    },
    ChgDiff {
        operation: ChangeOperation,
        period: ChangePeriod,
    },
    Decompose {
        method: DecomposeMethod,
        component: Component,
    },
}

impl StepParams {
    pub fn kind(&self) -> StepKind {
        match self {
            StepParams::Usd { .. } => StepKind::Usd,
            StepParams::Real { .. } => StepKind::Real,
            StepParams::Gdp { .. } => StepKind::Gdp,
            StepParams::Resample { .. } => StepKind::Resample,
            StepParams::Rolling { .. } => StepKind::Rolling,
            StepParams::Rebase { .. } => StepKind::Rebase,
            StepParams::ChgDiff { .. } => StepKind::ChgDiff,
            StepParams::Decompose { .. } => StepKind::Decompose,
        }
    }
}

/// An active step is missing a parameter it cannot run without.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{step} requires '{parameter}'")]
pub struct MissingParameter {
    pub step: StepKind,
    pub parameter: &'static str,
}

impl MissingParameter {
    fn new(step: StepKind, parameter: &'static str) -> Self {
        MissingParameter { step, parameter }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DateParams {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResampleParams {
    pub frequency: Option<Frequency>,
    pub operation: Option<ResampleOperation>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RollingParams {
    pub window: Option<usize>,
    pub operation: Option<RollingOperation>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RebaseParams {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub base: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChgDiffParams {
    pub operation: Option<ChangeOperation>,
    pub period: Option<ChangePeriod>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecomposeParams {
    pub method: Option<DecomposeMethod>,
    pub component: Option<Component>,
}

/// Parameter values for every step as submitted with a request. Only the
/// ones belonging to active steps are required.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformParams {
    /// Precondition policy for `usd`, `real` and `gdp`.
    pub errors: ErrorPolicy,
    pub real: DateParams,
    pub resample: ResampleParams,
    pub rolling: RollingParams,
    pub rebase: RebaseParams,
    pub chg_diff: ChgDiffParams,
    pub decompose: DecomposeParams,
}

impl Default for TransformParams {
    fn default() -> Self {
        TransformParams {
            errors: ErrorPolicy::Ignore,
            real: DateParams::default(),
            resample: ResampleParams::default(),
            rolling: RollingParams::default(),
            rebase: RebaseParams::default(),
            chg_diff: ChgDiffParams::default(),
            decompose: DecomposeParams::default(),
        }
    }
}

impl TransformParams {
    /// Builds the parameters of `kind`, failing on the first required value
    /// that is absent.
    pub fn for_step(&self, kind: StepKind) -> Result<StepParams, MissingParameter> {
        let missing = |parameter| MissingParameter::new(kind, parameter);
        Ok(match kind {
            StepKind::Usd => StepParams::Usd {
                errors: self.errors,
            },
            StepKind::Real => StepParams::Real {
                start: self.real.start,
                end: self.real.end,
                errors: self.errors,
            },
            StepKind::Gdp => StepParams::Gdp {
                errors: self.errors,
            },
            StepKind::Resample => StepParams::Resample {
                frequency: self.resample.frequency.ok_or_else(|| missing("frequency"))?,
                operation: self.resample.operation.ok_or_else(|| missing("operation"))?,
            },
            StepKind::Rolling => StepParams::Rolling {
                window: self.rolling.window.ok_or_else(|| missing("window"))?,
                operation: self.rolling.operation.ok_or_else(|| missing("operation"))?,
            },
            StepKind::Rebase => StepParams::Rebase {
                start: self.rebase.start.ok_or_else(|| missing("start"))?,
                end: self.rebase.end,
                base: self.rebase.base.ok_or_else(|| missing("base"))?,
            },
            StepKind::ChgDiff => StepParams::ChgDiff {
                operation: self.chg_diff.operation.ok_or_else(|| missing("operation"))?,
                period: self.chg_diff.period.ok_or_else(|| missing("period"))?,
            },
            StepKind::Decompose => StepParams::Decompose {
                method: self.decompose.method.ok_or_else(|| missing("method"))?,
                component: self.decompose.component.ok_or_else(|| missing("component"))?,
            },
        })
    }
}

/// Requested position per step, in the order the steps were declared.
///
/// Declaration order breaks ties between equal positions, so it is kept:
/// a JSON object deserialises in document order, and inserting a step that
/// is already present updates its position without moving it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestedPositions {
    entries: Vec<(StepKind, i64)>,
}

impl RequestedPositions {
    pub fn new() -> Self {
        RequestedPositions::default()
    }

    pub fn insert(&mut self, kind: StepKind, position: i64) {
        match self.entries.iter_mut().find(|(existing, _)| *existing == kind) {
            Some(entry) => entry.1 = position,
            None => self.entries.push((kind, position)),
        }
    }

    pub fn get(&self, kind: StepKind) -> Option<i64> {
        self.entries
            .iter()
            .find(|(existing, _)| *existing == kind)
            .map(|(_, position)| *position)
    }

    pub fn iter(&self) -> impl Iterator<Item = (StepKind, i64)> + '_ {
        self.entries.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(StepKind, i64)> for RequestedPositions {
    fn from_iter<I: IntoIterator<Item = (StepKind, i64)>>(iter: I) -> Self {
        let mut positions = RequestedPositions::new();
        for (kind, position) in iter {
            positions.insert(kind, position);
        }
        positions
    }
}

impl Serialize for RequestedPositions {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (kind, position) in &self.entries {
            map.serialize_entry(kind.name(), position)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for RequestedPositions {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct PositionsVisitor;

        impl<'de> Visitor<'de> for PositionsVisitor {
            type Value = RequestedPositions;

            fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "a map of transformation name to position")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut positions = RequestedPositions::new();
                while let Some((kind, position)) = access.next_entry::<StepKind, i64>()? {
                    positions.insert(kind, position);
                }
                Ok(positions)
            }
        }

        deserializer.deserialize_map(PositionsVisitor)
    }
}

/// Which steps are switched on.
pub type ActiveFlags = HashMap<StepKind, bool>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_aliases_parse() {
        assert_eq!(StepKind::from_name("res"), Some(StepKind::Resample));
        assert_eq!(StepKind::from_name("roll"), Some(StepKind::Rolling));
        assert_eq!(StepKind::from_name("base_index"), Some(StepKind::Rebase));
        assert_eq!(StepKind::from_name("chg-diff"), Some(StepKind::ChgDiff));
        assert_eq!(StepKind::from_name("seas"), Some(StepKind::Decompose));
        assert_eq!(StepKind::from_name("fx"), None);
        for kind in StepKind::ALL {
            assert_eq!(StepKind::from_name(kind.name()), Some(kind));
        }
    }

    #[test]
    fn test_positions_keep_document_order() {
        let positions: RequestedPositions =
            serde_json::from_str(r#"{"real": 1, "usd": 1, "gdp": 2}"#).unwrap();
        let kinds: Vec<StepKind> = positions.iter().map(|(kind, _)| kind).collect();
        assert_eq!(kinds, vec![StepKind::Real, StepKind::Usd, StepKind::Gdp]);

        let json = serde_json::to_string(&positions).unwrap();
        assert_eq!(json, r#"{"real":1,"usd":1,"gdp":2}"#);
    }

    #[test]
    fn test_reinserting_keeps_slot() {
        let mut positions: RequestedPositions =
            [(StepKind::Usd, 1), (StepKind::Real, 2)].into_iter().collect();
        positions.insert(StepKind::Usd, 5);
        assert_eq!(
            positions.iter().collect::<Vec<_>>(),
            vec![(StepKind::Usd, 5), (StepKind::Real, 2)]
        );
        assert_eq!(positions.get(StepKind::Real), Some(2));
        assert_eq!(positions.get(StepKind::Gdp), None);
    }

    #[test]
    fn test_missing_parameters_are_reported() {
        let params = TransformParams::default();
        assert!(params.for_step(StepKind::Usd).is_ok());
        assert_eq!(
            params.for_step(StepKind::Resample).unwrap_err(),
            MissingParameter::new(StepKind::Resample, "frequency")
        );

        let params: TransformParams = serde_json::from_str(
            r#"{"resample": {"frequency": "A", "operation": "sum"}, "rolling": {"window": 12}}"#,
        )
        .unwrap();
        assert_eq!(
            params.for_step(StepKind::Resample).unwrap(),
            StepParams::Resample {
                frequency: Frequency::Annual,
                operation: ResampleOperation::Sum
            }
        );
        assert_eq!(
            params.for_step(StepKind::Rolling).unwrap_err().parameter,
            "operation"
        );
        assert_eq!(params.errors, ErrorPolicy::Ignore);
    }
}
