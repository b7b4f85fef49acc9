//! X13-ARIMA-SEATS through the external `x13as` binary.
//!
//! A spec file is written to a scratch directory, the binary is run on it,
//! and the saved D11 (seasonally adjusted) and D12 (trend) tables are read
//! back. The first attempt uses trading-day and Easter regressors with
//! outlier detection; if that run fails, a plain automatic model is tried.

use super::{Decomposer, Decomposition, Segment};
use crate::config::X13Config;
use crate::frequency::Frequency;
use crate::transform::TransformError;
use chrono::Datelike;
use std::fmt::{self, Write as _};
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, warn};
use uuid::Uuid;

const OUTPUT_EXTENSIONS: [&str; 8] = ["spc", "out", "err", "log", "d11", "d12", "udg", "xdg"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ModelSpec {
    Full,
    Plain,
}

/// Why one run of the binary produced no tables.
enum Attempt {
    /// The binary could not be started; retrying is pointless.
    Unavailable(String),
    Failed(String),
}

pub struct X13Decomposer<'a> {
    config: &'a X13Config,
}

impl<'a> X13Decomposer<'a> {
    pub fn new(config: &'a X13Config) -> Self {
        X13Decomposer { config }
    }

    fn run(&self, base: &Path, segment: &Segment<'_>, model: ModelSpec) -> Result<Decomposition, Attempt> {
        let spec = render_spec(segment, model)
            .map_err(|e| Attempt::Unavailable(format!("cannot render spec file: {}", e)))?;
        std::fs::write(base.with_extension("spc"), spec)
            .map_err(|e| Attempt::Unavailable(format!("cannot write spec file: {}", e)))?;

        let output = Command::new(&self.config.binary)
            .arg(base)
            .output()
            .map_err(|e| {
                Attempt::Unavailable(format!("cannot run {}: {}", self.config.binary.display(), e))
            })?;
        if !output.status.success() {
            return Err(Attempt::Failed(format!(
                "{} exited with {}",
                self.config.binary.display(),
                output.status
            )));
        }

        let seasonally_adjusted = read_table(&base.with_extension("d11"), segment.values.len())
            .map_err(Attempt::Failed)?;
        let trend =
            read_table(&base.with_extension("d12"), segment.values.len()).map_err(Attempt::Failed)?;
        Ok(Decomposition {
            seasonally_adjusted,
            trend,
        })
    }
}

impl Decomposer for X13Decomposer<'_> {
    fn name(&self) -> &'static str {
        "x13"
    }

    fn decompose(&self, segment: &Segment<'_>) -> Result<Decomposition, TransformError> {
        let scratch = Scratch::new(&self.config.work_dir());
        let mut last_error = String::new();

        for model in [ModelSpec::Full, ModelSpec::Plain] {
            debug!(base = %scratch.base.display(), ?model, "x13: running");
            match self.run(&scratch.base, segment, model) {
                Ok(decomposition) => return Ok(decomposition),
                Err(Attempt::Unavailable(message)) => {
                    return Err(TransformError::DecompositionFailed(message))
                }
                Err(Attempt::Failed(message)) => {
                    warn!(?model, error = %message, "x13: attempt failed");
                    last_error = message;
                }
            }
        }

        Err(TransformError::DecompositionFailed(last_error))
    }
}

/// Scratch file prefix, removed with every output extension on drop.
struct Scratch {
    base: PathBuf,
}

impl Scratch {
    fn new(dir: &Path) -> Self {
        Scratch {
            base: dir.join(format!("econuy-x13-{}", Uuid::new_v4().simple())),
        }
    }
}

impl Drop for Scratch {
    fn drop(&mut self) {
        for extension in OUTPUT_EXTENSIONS {
            let _ = std::fs::remove_file(self.base.with_extension(extension));
        }
    }
}

fn render_spec(segment: &Segment<'_>, model: ModelSpec) -> Result<String, fmt::Error> {
    let first = segment.dates.first().copied().unwrap_or_default();
    let start = match segment.frequency {
        Frequency::Quarterly => format!("{}.{}", first.year(), (first.month() - 1) / 3 + 1),
        _ => format!("{}.{:02}", first.year(), first.month()),
    };

    let mut spec = String::new();
    write!(
        spec,
        "series{{\n  title=\"econuy\"\n  start={}\n  period={}\n  data=(\n",
        start, segment.period
    )?;
    for value in segment.values {
        writeln!(spec, "    {}", value)?;
    }
    spec.push_str("  )\n}\ntransform{function=auto}\n");
    if model == ModelSpec::Full {
        spec.push_str("regression{aictest=(td easter)}\noutlier{}\n");
    }
    spec.push_str("automdl{}\nx11{save=(d11 d12)}\n");
    Ok(spec)
}

fn read_table(path: &Path, expected: usize) -> Result<Vec<f64>, String> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("cannot read {}: {}", path.display(), e))?;
    let values = parse_table(&text);
    if values.len() != expected {
        return Err(format!(
            "{} has {} values, expected {}",
            path.display(),
            values.len(),
            expected
        ));
    }
    Ok(values)
}

/// Values of a saved X13 table: rows whose first field is a `yyyypp` date.
fn parse_table(text: &str) -> Vec<f64> {
    text.lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let date = fields.next()?;
            if date.len() < 5 || !date.chars().all(|c| c.is_ascii_digit()) {
                return None;
            }
            fields.next()?.parse::<f64>().ok()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn segment<'a>(values: &'a [f64], dates: &'a [NaiveDate], frequency: Frequency) -> Segment<'a> {
        Segment {
            values,
            dates,
            frequency,
            period: frequency.seasonal_period().unwrap(),
        }
    }

    #[test]
    fn test_spec_lists_start_period_and_data() {
        let dates = [NaiveDate::from_ymd_opt(2015, 3, 31).unwrap()];
        let values = [1.5, 2.0];
        let spec =
            render_spec(&segment(&values, &dates, Frequency::Monthly), ModelSpec::Full).unwrap();
        assert!(spec.contains("start=2015.03"));
        assert!(spec.contains("period=12"));
        assert!(spec.contains("    1.5\n    2\n"));
        assert!(spec.contains("aictest=(td easter)"));
        assert!(spec.starts_with("series{\n  title=\"econuy\"\n"));
        assert!(spec.contains("  )\n}\ntransform{function=auto}\n"));
        assert!(spec.ends_with("automdl{}\nx11{save=(d11 d12)}\n"));

        let quarterly =
            render_spec(&segment(&values, &dates, Frequency::Quarterly), ModelSpec::Plain)
                .unwrap();
        assert!(quarterly.contains("start=2015.1"));
        assert!(quarterly.contains("period=4"));
        assert!(!quarterly.contains("outlier"));
    }

    #[test]
    fn test_saved_tables_are_parsed() {
        let text = "date\tseries\n------\t------\n201501\t+0.10000000000000E+03\n201502\t101.5\n";
        assert_eq!(parse_table(text), vec![100.0, 101.5]);
    }

    #[test]
    fn test_missing_binary_fails_decomposition() {
        let config = X13Config {
            binary: PathBuf::from("/nonexistent/x13as"),
            work_dir: None,
        };
        let dates: Vec<NaiveDate> = (1..=24)
            .map(|m| NaiveDate::from_ymd_opt(2019 + (m - 1) / 12, ((m - 1) % 12 + 1) as u32, 1).unwrap())
            .collect();
        let values = vec![1.0; 24];
        let result = X13Decomposer::new(&config).decompose(&segment(&values, &dates, Frequency::Monthly));
        assert!(matches!(result, Err(TransformError::DecompositionFailed(_))));
    }
}
