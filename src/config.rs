//! Runtime configuration for the pipeline and its command-line front end.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Path to SQLite database (default: "econuy.db")
    pub database_path: String,
    /// Where the conversion steps find their reference series
    pub references: ReferenceTables,
    pub x13: X13Config,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            database_path: "econuy.db".to_string(),
            references: ReferenceTables::default(),
            x13: X13Config::default(),
        }
    }
}

impl PipelineConfig {
    /// Creates a configuration with default reference tables.
    pub fn new(database_path: impl Into<String>) -> Self {
        PipelineConfig {
            database_path: database_path.into(),
            ..PipelineConfig::default()
        }
    }

    /// Defaults overridden by `DATABASE_PATH`, `X13_PATH` and `X13_WORK_DIR`.
    pub fn from_env() -> Self {
        let mut config = PipelineConfig::default();
        config.apply_env();
        config
    }

    /// Reads a JSON config file. Fields absent from the file keep their
    /// defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Environment variables take precedence over whatever was loaded.
    pub fn apply_env(&mut self) {
        if let Ok(path) = std::env::var("DATABASE_PATH") {
            self.database_path = path;
        }
        if let Ok(binary) = std::env::var("X13_PATH") {
            self.x13.binary = PathBuf::from(binary);
        }
        if let Ok(dir) = std::env::var("X13_WORK_DIR") {
            self.x13.work_dir = Some(PathBuf::from(dir));
        }
    }
}

/// Table and column names of the reference series used by `usd`, `real`
/// and `gdp`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReferenceTables {
    pub exchange_rate_table: String,
    /// Monthly average sell rate, used for flows.
    pub exchange_rate_average: String,
    /// End-of-period sell rate, used for stocks.
    pub exchange_rate_end: String,
    pub cpi_table: String,
    pub cpi_column: String,
    /// Quarterly nominal GDP.
    pub gdp_table: String,
    pub gdp_local_column: String,
    pub gdp_usd_column: String,
}

impl Default for ReferenceTables {
    fn default() -> Self {
        ReferenceTables {
            exchange_rate_table: "nxr_monthly".to_string(),
            exchange_rate_average: "Tipo de cambio venta, promedio".to_string(),
            exchange_rate_end: "Tipo de cambio venta, fin de período".to_string(),
            cpi_table: "cpi".to_string(),
            cpi_column: "Índice General".to_string(),
            gdp_table: "naccounts_gdp_cur_nsa".to_string(),
            gdp_local_column: "Producto bruto interno".to_string(),
            gdp_usd_column: "Producto bruto interno (USD)".to_string(),
        }
    }
}

/// Location of the X13-ARIMA-SEATS binary used by `decompose` with the
/// `x13` method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct X13Config {
    pub binary: PathBuf,
    /// Scratch directory for spec and output files; the system temp
    /// directory when unset.
    pub work_dir: Option<PathBuf>,
}

impl Default for X13Config {
    fn default() -> Self {
        X13Config {
            binary: PathBuf::from("x13as"),
            work_dir: None,
        }
    }
}

impl X13Config {
    pub fn work_dir(&self) -> PathBuf {
        self.work_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}
