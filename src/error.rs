//! Error types for each boundary of the pipeline
//!
//! Normalization is total and has no error type. Translation failures never
//! leave `civic-agentic`. Everything else returns one of these.

use thiserror::Error;

/// Raw payload could not become a canonical table
#[derive(Error, Debug)]
pub enum IngestionError {
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Archive contains no CSV member")]
    EmptyArchive,

    #[error("Unreadable payload: {0}")]
    Unreadable(String),

    #[error("Dataset has no rows")]
    EmptyDataset,

    #[error("Synthetic sources are not accepted: {0}")]
    SyntheticSource(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl From<csv::Error> for IngestionError {
    fn from(error: csv::Error) -> Self {
        IngestionError::Unreadable(error.to_string())
    }
}

impl From<zip::result::ZipError> for IngestionError {
    fn from(error: zip::result::ZipError) -> Self {
        IngestionError::Unreadable(error.to_string())
    }
}

impl From<calamine::XlsxError> for IngestionError {
    fn from(error: calamine::XlsxError) -> Self {
        IngestionError::Unreadable(error.to_string())
    }
}

/// Relational store failures
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Table not found: {0}")]
    MissingTable(String),

    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A query could not be executed; carries the text that was attempted
#[derive(Error, Debug)]
#[error("Query execution failed: {source}")]
pub struct ExecutionError {
    pub query: String,
    #[source]
    pub source: StoreError,
}

impl ExecutionError {
    pub fn new(query: impl Into<String>, source: impl Into<StoreError>) -> Self {
        Self {
            query: query.into(),
            source: source.into(),
        }
    }
}

/// A metric query or the schema lookup behind it failed
#[derive(Error, Debug)]
pub enum MetricsError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),
}

/// Cache backend failures; logged and bypassed, never surfaced to callers
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache backend error: {0}")]
    Backend(#[from] sqlx::Error),

    #[error("Cache value could not be encoded: {0}")]
    Encoding(#[from] serde_json::Error),
}
