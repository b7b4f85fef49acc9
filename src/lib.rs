pub mod config;
pub mod csv_import;
pub mod dataset;
pub mod frequency;
pub mod metadata;
pub mod pipeline;
pub mod reconcile;
pub mod request;
pub mod sqlite_provider;
pub mod time_series;
pub mod transform;


pub use config::{ConfigError, PipelineConfig, ReferenceTables, X13Config};
pub use csv_import::ImportError;
pub use dataset::{Dataset, DatasetError};
pub use frequency::Frequency;
pub use metadata::{Currency, SeriesMetadata, SeriesType};
pub use pipeline::{
    execute, resolve_order, PipelineError, PipelineExecutor, RequestedPositions, ResolvedOrder,
    StepKind, StepParams, TransformParams, TransformRegistry,
};
pub use reconcile::{reconcile, ReconcileError, Reconciliation};
pub use request::{
    ChartOutput, ChartRequest, RequestError, SeriesSelection, TransformationRequest,
    ValidationError,
};
pub use sqlite_provider::SqliteDataProvider;
pub use time_series::{
    ColumnSelection, DataProvider, DataProviderError, DateRange, InMemoryDataProvider,
};
pub use transform::{
    ErrorPolicy, ProviderReferences, ReferenceSource, TransformContext, TransformError,
};
