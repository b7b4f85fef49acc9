//! Reader for the series CSV layout the store is seeded from.
//!
//! The first nine rows carry one metadata level each (indicator, area,
//! frequency, currency, inflation adjustment, unit, seasonal adjustment,
//! type, cumulative periods); the first cell of each names the level.
//! Every following row is a date followed by one value per series, with
//! empty cells for missing observations.

use crate::dataset::{Dataset, DatasetError};
use crate::frequency::Frequency;
use crate::metadata::{Currency, SeriesMetadata, SeriesType};
use chrono::{NaiveDate, NaiveDateTime};
use csv::StringRecord;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, warn};

/// Number of metadata rows above the data.
pub const HEADER_ROWS: usize = 9;

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("failed to open '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("expected 9 metadata rows, found {0}")]
    MissingHeader(usize),
    #[error("file has no series columns")]
    NoSeries,
    #[error("line {line}: invalid date '{value}'")]
    InvalidDate { line: usize, value: String },
    #[error("line {line}: invalid value '{value}' for '{series}'")]
    InvalidValue {
        line: usize,
        series: String,
        value: String,
    },
    #[error(transparent)]
    Dataset(#[from] DatasetError),
}

/// Reads a series CSV from disk.
pub fn read_path<P: AsRef<Path>>(path: P) -> Result<Dataset, ImportError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| ImportError::Io {
        path: path.display().to_string(),
        source,
    })?;
    read_dataset(file)
}

/// Reads a series CSV from any reader.
///
/// Rows are sorted by date; a repeated date is rejected by the dataset
/// constructor.
pub fn read_dataset<R: Read>(reader: R) -> Result<Dataset, ImportError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut records = reader.records();
    let mut header = Vec::with_capacity(HEADER_ROWS);
    for _ in 0..HEADER_ROWS {
        match records.next() {
            Some(record) => header.push(record?),
            None => return Err(ImportError::MissingHeader(header.len())),
        }
    }

    let width = header[0].len().saturating_sub(1);
    if width == 0 {
        return Err(ImportError::NoSeries);
    }
    let metadata: Vec<SeriesMetadata> = (1..=width)
        .map(|column| metadata_for_column(&header, column))
        .collect();

    let mut rows: Vec<(NaiveDate, Vec<f64>)> = Vec::new();
    for (offset, record) in records.enumerate() {
        let record = record?;
        let line = HEADER_ROWS + offset + 1;
        let raw_date = record.get(0).unwrap_or_default();
        if raw_date.is_empty() {
            continue;
        }
        let date = parse_date(raw_date).ok_or_else(|| ImportError::InvalidDate {
            line,
            value: raw_date.to_string(),
        })?;

        let mut values = Vec::with_capacity(width);
        for (column, meta) in metadata.iter().enumerate() {
            let cell = record.get(column + 1).unwrap_or_default();
            values.push(parse_value(cell).ok_or_else(|| ImportError::InvalidValue {
                line,
                series: meta.name.clone(),
                value: cell.to_string(),
            })?);
        }
        rows.push((date, values));
    }

    rows.sort_by_key(|(date, _)| *date);
    let index: Vec<NaiveDate> = rows.iter().map(|(date, _)| *date).collect();
    let mut columns = vec![Vec::with_capacity(rows.len()); width];
    for (_, values) in &rows {
        for (column, value) in values.iter().enumerate() {
            columns[column].push(*value);
        }
    }

    let dataset = Dataset::new(index, columns, metadata)?;
    debug!(
        series = dataset.width(),
        rows = dataset.len(),
        "csv_import: parsed dataset"
    );
    Ok(dataset)
}

fn cell(header: &[StringRecord], level: usize, column: usize) -> String {
    header[level].get(column).unwrap_or("-").to_string()
}

fn metadata_for_column(header: &[StringRecord], column: usize) -> SeriesMetadata {
    let name = cell(header, 0, column);
    let frequency_code = cell(header, 2, column);
    let frequency = Frequency::from_code(&frequency_code);
    if frequency.is_none() && frequency_code != "-" {
        warn!(series = %name, code = %frequency_code, "csv_import: unknown frequency code");
    }
    let cumulative_periods = cell(header, 8, column)
        .parse::<f64>()
        .ok()
        .filter(|periods| *periods >= 1.0)
        .map_or(1, |periods| periods as u32);

    SeriesMetadata {
        name,
        area: cell(header, 1, column),
        frequency,
        currency: Currency::from_code(&cell(header, 3, column)),
        inflation_adjustment: cell(header, 4, column),
        unit: cell(header, 5, column),
        seasonal_adjustment: cell(header, 6, column),
        series_type: SeriesType::from_label(&cell(header, 7, column)),
        cumulative_periods,
    }
}

fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S")
                .ok()
                .map(|timestamp| timestamp.date())
        })
}

fn parse_value(value: &str) -> Option<f64> {
    if value.is_empty() || value.eq_ignore_ascii_case("nan") {
        return Some(f64::NAN);
    }
    value.parse::<f64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
Indicador,Ingresos,Deuda
Área,Sector público,Sector público
Frecuencia,M,M
Moneda,UYU,UYU
Inf. adj.,No,No
Unidad,Millones de pesos,Millones de pesos
Seas. Adj.,NSA,NSA
Tipo,Flujo,Stock
Acum. períodos,1,1
2020-02-29,200.5,
2020-01-31 00:00:00,100,1000
";

    #[test]
    fn test_parses_metadata_rows_and_values() {
        let dataset = read_dataset(SAMPLE.as_bytes()).unwrap();
        assert_eq!(dataset.names(), vec!["Ingresos", "Deuda"]);
        assert_eq!(
            dataset.index(),
            &[
                NaiveDate::from_ymd_opt(2020, 1, 31).unwrap(),
                NaiveDate::from_ymd_opt(2020, 2, 29).unwrap()
            ]
        );
        assert_eq!(dataset.column(0).unwrap(), &[100.0, 200.5]);
        assert!(dataset.column(1).unwrap()[1].is_nan());

        let meta = &dataset.metadata()[1];
        assert_eq!(meta.series_type, SeriesType::Stock);
        assert_eq!(meta.currency, Currency::Local);
        assert_eq!(meta.frequency, Some(Frequency::Monthly));
        assert_eq!(meta.area, "Sector público");
    }

    #[test]
    fn test_short_header_is_rejected() {
        let result = read_dataset("Indicador,a\nÁrea,b\n".as_bytes());
        assert!(matches!(result, Err(ImportError::MissingHeader(2))));
    }

    #[test]
    fn test_bad_cells_report_line() {
        let bad = SAMPLE.replace("200.5", "abc");
        match read_dataset(bad.as_bytes()) {
            Err(ImportError::InvalidValue { line, series, .. }) => {
                assert_eq!(line, 10);
                assert_eq!(series, "Ingresos");
            }
            other => panic!("unexpected result: {other:?}"),
        }

        let bad_date = SAMPLE.replace("2020-02-29", "febrero");
        assert!(matches!(
            read_dataset(bad_date.as_bytes()),
            Err(ImportError::InvalidDate { line: 10, .. })
        ));
    }
}
