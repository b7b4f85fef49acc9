use crate::frequency::Frequency;
use serde::{Deserialize, Serialize};

/// Whether a series measures a level at a point in time or an amount
/// accumulated over each period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SeriesType {
    /// Point-in-time measurement (debt, reserves, price levels).
    Stock,
    /// Amount accumulated over the period (revenue, exports).
    Flujo,
    /// Neither applies, e.g. exchange rates or indices.
    #[serde(rename = "-")]
    Unspecified,
}

impl SeriesType {
    pub fn label(&self) -> &'static str {
        match self {
            SeriesType::Stock => "Stock",
            SeriesType::Flujo => "Flujo",
            SeriesType::Unspecified => "-",
        }
    }

    pub fn from_label(value: &str) -> Self {
        match value.trim() {
            "Stock" => SeriesType::Stock,
            "Flujo" | "Flow" => SeriesType::Flujo,
            _ => SeriesType::Unspecified,
        }
    }
}

impl std::fmt::Display for SeriesType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Currency denomination of a series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Currency {
    #[serde(rename = "UYU")]
    Local,
    #[serde(rename = "USD")]
    Usd,
    /// Not a currency amount (ratios, indices, percentages).
    #[serde(rename = "-")]
    None,
}

impl Currency {
    pub fn code(&self) -> &'static str {
        match self {
            Currency::Local => "UYU",
            Currency::Usd => "USD",
            Currency::None => "-",
        }
    }

    pub fn from_code(value: &str) -> Self {
        match value.trim().to_uppercase().as_str() {
            "UYU" | "$" => Currency::Local,
            "USD" | "US$" => Currency::Usd,
            _ => Currency::None,
        }
    }
}

impl std::fmt::Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Descriptive tags attached to every column of a [`Dataset`](crate::Dataset).
///
/// Transformations rewrite the fields they affect and carry the rest over
/// untouched; the frequency reconciler later branches on `series_type` and
/// `unit` to choose an aggregation rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesMetadata {
    /// Indicator name, unique within a combined table.
    pub name: String,
    /// Geographic or topical area.
    #[serde(default = "dash")]
    pub area: String,
    #[serde(default)]
    pub frequency: Option<Frequency>,
    #[serde(default = "no_currency")]
    pub currency: Currency,
    /// "No" for nominal series, "Const. ..." after deflation.
    #[serde(default = "no")]
    pub inflation_adjustment: String,
    pub unit: String,
    /// "NSA", "SA" or "Tendencia".
    #[serde(default = "nsa")]
    pub seasonal_adjustment: String,
    pub series_type: SeriesType,
    #[serde(default = "one")]
    pub cumulative_periods: u32,
}

fn dash() -> String {
    "-".to_string()
}

fn no() -> String {
    "No".to_string()
}

fn nsa() -> String {
    "NSA".to_string()
}

fn one() -> u32 {
    1
}

fn no_currency() -> Currency {
    Currency::None
}

impl SeriesMetadata {
    /// Creates metadata with neutral defaults for everything but the
    /// name, unit and series type.
    pub fn new(name: impl Into<String>, unit: impl Into<String>, series_type: SeriesType) -> Self {
        SeriesMetadata {
            name: name.into(),
            area: dash(),
            frequency: None,
            currency: Currency::None,
            inflation_adjustment: no(),
            unit: unit.into(),
            seasonal_adjustment: nsa(),
            series_type,
            cumulative_periods: 1,
        }
    }

    pub fn with_currency(mut self, currency: Currency) -> Self {
        self.currency = currency;
        self
    }

    pub fn with_area(mut self, area: impl Into<String>) -> Self {
        self.area = area.into();
        self
    }

    pub fn with_frequency(mut self, frequency: Frequency) -> Self {
        self.frequency = Some(frequency);
        self
    }

    pub fn with_cumulative_periods(mut self, periods: u32) -> Self {
        self.cumulative_periods = periods;
        self
    }

    /// True when the unit already expresses a ratio, a percentage, an index
    /// relative to a base period, or a change. Such flows are averaged
    /// rather than summed when moved to a coarser frequency.
    pub fn is_ratio_unit(&self) -> bool {
        ["%", "=", "Cambio"]
            .iter()
            .any(|marker| self.unit.contains(marker))
    }

    pub fn is_inflation_adjusted(&self) -> bool {
        self.inflation_adjustment != "No"
    }
}
