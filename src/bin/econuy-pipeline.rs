//! econuy pipeline command line.
//!
//! Commands:
//! - `import`: load a series CSV into a SQLite table
//! - `run`: execute a JSON chart request and print the result as JSON
//! - `tables`: list stored tables
//!
//! Set RUST_LOG to control log output, e.g. `RUST_LOG=econuy_pipeline=debug`.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use econuy_pipeline::{csv_import, ChartRequest, DataProvider, PipelineConfig, SqliteDataProvider};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "econuy-pipeline",
    about = "Transform and combine Uruguayan economic time series"
)]
struct Cli {
    /// JSON configuration file. Environment variables override it.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// SQLite database path. Overrides file and environment.
    #[arg(long, global = true)]
    database: Option<String>,

    /// X13-ARIMA-SEATS binary. Overrides file and environment.
    #[arg(long, global = true)]
    x13: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a series CSV (nine metadata header rows) into a table.
    Import {
        /// Target table name.
        table: String,
        /// CSV file to read.
        file: PathBuf,
    },
    /// Execute a chart request read from a JSON file ("-" for stdin).
    Run {
        request: PathBuf,
        /// Pretty-print the output.
        #[arg(long, default_value_t = false)]
        pretty: bool,
    },
    /// List stored tables.
    Tables,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;
    let provider = SqliteDataProvider::new(&config.database_path)
        .with_context(|| format!("opening database {}", config.database_path))?;

    match cli.command {
        Commands::Import { table, file } => run_import(&provider, &table, &file),
        Commands::Run { request, pretty } => run_request(&provider, &config, &request, pretty),
        Commands::Tables => run_tables(&provider),
    }
}

fn load_config(cli: &Cli) -> Result<PipelineConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let mut config = PipelineConfig::from_file(path)?;
            config.apply_env();
            config
        }
        None => PipelineConfig::from_env(),
    };
    if let Some(database) = &cli.database {
        config.database_path = database.clone();
    }
    if let Some(binary) = &cli.x13 {
        config.x13.binary = binary.clone();
    }
    Ok(config)
}

fn run_import(provider: &SqliteDataProvider, table: &str, file: &Path) -> Result<()> {
    let dataset = csv_import::read_path(file)
        .with_context(|| format!("reading {}", file.display()))?;
    provider
        .store(table, &dataset)
        .with_context(|| format!("storing table {}", table))?;
    info!(
        table = table,
        rows = dataset.len(),
        columns = dataset.width(),
        "imported"
    );
    Ok(())
}

fn run_request(
    provider: &SqliteDataProvider,
    config: &PipelineConfig,
    path: &Path,
    pretty: bool,
) -> Result<()> {
    let text = if path.as_os_str() == "-" {
        std::io::read_to_string(std::io::stdin()).context("reading request from stdin")?
    } else {
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?
    };
    let request: ChartRequest = serde_json::from_str(&text).context("parsing chart request")?;
    let output = request.run(provider, config)?;
    info!(
        rows = output.dataset.len(),
        columns = output.dataset.width(),
        frequency = output.target_frequency.map_or("-", |f| f.code()),
        "chart ready"
    );

    let json = if pretty {
        serde_json::to_string_pretty(&output)?
    } else {
        serde_json::to_string(&output)?
    };
    println!("{}", json);
    Ok(())
}

fn run_tables(provider: &SqliteDataProvider) -> Result<()> {
    for table in provider.tables()? {
        match provider.series_count(&table)? {
            Some(count) => println!("{}\t{} series", table, count),
            None => println!("{}", table),
        }
    }
    Ok(())
}
