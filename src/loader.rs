//! Dataset load pipeline
//!
//! bytes → decode → normalize → persist table + metadata → invalidate cache.
//! The department's write lock is held from persist to invalidation, so no
//! query can observe the new table through a stale cache entry.

use std::sync::Arc;
use std::time::Instant;

use tracing::info;

use crate::error::IngestionError;
use crate::execution::QueryExecutor;
use crate::ingest::{decode_payload, MetadataRecord, SourceDescriptor};
use crate::schema::naming::{sanitize_identifiers, table_name_for};
use crate::schema::{CanonicalField, ColumnMapping, SchemaNormalizer};
use crate::table::DataTable;

/// What a load produced
#[derive(Debug, Clone)]
pub struct LoadOutcome {
    pub table_name: String,
    pub columns: Vec<String>,
    pub metadata: MetadataRecord,
    pub mappings: Vec<ColumnMapping>,
    pub synthesized: Vec<CanonicalField>,
    /// Cache entries dropped for the previous version of the table
    pub invalidated: usize,
}

pub struct DatasetLoader {
    executor: Arc<QueryExecutor>,
    normalizer: SchemaNormalizer,
}

impl DatasetLoader {
    pub fn new(executor: Arc<QueryExecutor>) -> Self {
        Self {
            executor,
            normalizer: SchemaNormalizer::default(),
        }
    }

    /// Decode and load a raw payload for `department`
    pub async fn load(
        &self,
        department: &str,
        bytes: &[u8],
        descriptor: &SourceDescriptor,
    ) -> Result<LoadOutcome, IngestionError> {
        let start = Instant::now();
        descriptor.ensure_real()?;
        let table = decode_payload(bytes, descriptor)?;
        self.load_decoded(department, table, descriptor, start).await
    }

    /// Load an already decoded table for `department`
    pub async fn load_table(
        &self,
        department: &str,
        table: DataTable,
        descriptor: &SourceDescriptor,
    ) -> Result<LoadOutcome, IngestionError> {
        let start = Instant::now();
        descriptor.ensure_real()?;
        if table.is_empty() {
            return Err(IngestionError::EmptyDataset);
        }
        self.load_decoded(department, table, descriptor, start).await
    }

    async fn load_decoded(
        &self,
        department: &str,
        table: DataTable,
        descriptor: &SourceDescriptor,
        start: Instant,
    ) -> Result<LoadOutcome, IngestionError> {
        let table_name = table_name_for(department);
        let normalized = self.normalizer.normalize(table);

        let mut metadata = MetadataRecord::build(&normalized.table, descriptor, start.elapsed());
        metadata.columns = sanitize_identifiers(normalized.table.columns());

        let (columns, invalidated) = {
            let _guard = self.executor.lock_for_reload(&table_name).await;
            let columns = self
                .executor
                .store()
                .replace_table(&table_name, &normalized.table, &metadata)
                .await?;
            let invalidated = self.executor.cache().invalidate_tag(&table_name).await;
            (columns, invalidated)
        };

        info!(
            "Loaded {} rows for {} into {} in {:.2}s",
            metadata.rows,
            department,
            table_name,
            start.elapsed().as_secs_f64()
        );

        Ok(LoadOutcome {
            table_name,
            columns,
            metadata,
            mappings: normalized.mappings,
            synthesized: normalized.synthesized,
            invalidated,
        })
    }
}
