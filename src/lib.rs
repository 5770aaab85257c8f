//! Civic Query - natural-language questions over police stop datasets
//!
//! Raw department datasets of arbitrary schema are decoded, normalized onto a
//! canonical stop record and stored one table per department. Questions are
//! translated to SQL (pattern rules first, a generative model as fallback),
//! executed through a content-addressed cache and explained in one sentence.
//!
//! ```text
//! bytes ─► ingest::decode ─► schema::normalizer ─► database (police_data_<dept>)
//!                                                       ▲
//! question ─► civic_agentic::QueryTranslator ─► execution (cache) ─► explain
//! ```
//!
//! # Modules
//!
//! - [`ingest`] - source descriptors, payload decoding, metadata records
//! - [`schema`] - canonical fields, column normalizer, table naming
//! - [`database`] - SQLite table store and result sets
//! - [`cache`] - shared and in-process result caches
//! - [`execution`] - cached, department-scoped query execution
//! - [`loader`] - load pipeline with cache invalidation
//! - [`explain`] - result explanations
//! - [`metrics`] - dashboard KPIs
//! - [`agent`] - the question-answering entry point

pub mod agent;
pub mod cache;
pub mod config;
pub mod database;
pub mod error;
pub mod execution;
pub mod explain;
pub mod ingest;
pub mod loader;
pub mod metrics;
pub mod schema;
pub mod table;

pub use agent::{QueryAgent, QueryAnswer, QueryFailure, QueryResponse};
pub use cache::{CacheBackend, CacheClient};
pub use config::AppConfig;
pub use database::{ResultSet, TableSchema, TableStore};
pub use error::{CacheError, ExecutionError, IngestionError, MetricsError, StoreError};
pub use execution::QueryExecutor;
pub use ingest::{MetadataRecord, SourceCatalog, SourceDescriptor};
pub use loader::{DatasetLoader, LoadOutcome};
pub use metrics::KpiMetrics;
pub use schema::{CanonicalField, SchemaNormalizer};
pub use table::DataTable;
