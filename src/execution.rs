//! Cached, table-scoped query execution
//!
//! Every query runs against one department table. The placeholder table name
//! is rewritten to the resolved table first, and the rewritten text is what
//! gets hashed for the cache, so two questions that translate to the same SQL
//! share one entry and one store execution.
//!
//! Reads and reloads of the same department are serialized through a
//! per-department `RwLock`: queries share it, a reload takes it exclusively.
//! A query that names other department tables directly holds the read lock of
//! each, and its cache entry is tagged with all of them.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::{NoExpand, Regex};
use civic_agentic::tables_read_by;
use tokio::sync::{Mutex, OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};
use tracing::{debug, error, info};

use crate::cache::{cache_key, query_cache_key, sample_cache_key, schema_cache_key, CacheClient};
use crate::database::{ResultSet, TableSchema, TableStore};
use crate::error::{ExecutionError, StoreError};
use crate::schema::naming::{table_name_for, TABLE_PLACEHOLDER};

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"\b{}\b", TABLE_PLACEHOLDER)).expect("static regex")
});

/// Rewrite whole-word uses of the placeholder table name to `table`
///
/// `police_data_seattle` is left alone: `_` is a word character, so the
/// placeholder never matches inside a longer identifier.
pub fn bind_table(query: &str, table: &str) -> String {
    PLACEHOLDER.replace_all(query, NoExpand(table)).into_owned()
}

/// Executes queries through the cache
pub struct QueryExecutor {
    store: TableStore,
    cache: CacheClient,
    executions: AtomicU64,
    locks: Mutex<HashMap<String, Arc<RwLock<()>>>>,
}

impl QueryExecutor {
    pub fn new(store: TableStore, cache: CacheClient) -> Self {
        Self {
            store,
            cache,
            executions: AtomicU64::new(0),
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &TableStore {
        &self.store
    }

    pub fn cache(&self) -> &CacheClient {
        &self.cache
    }

    /// Queries that reached the store (cache misses)
    pub fn execution_count(&self) -> u64 {
        self.executions.load(Ordering::SeqCst)
    }

    /// Lock for `table`; entries nobody holds are dropped on the way
    async fn lock_for(&self, table: &str) -> Arc<RwLock<()>> {
        let mut locks = self.locks.lock().await;
        locks.retain(|name, lock| name == table || Arc::strong_count(lock) > 1);
        locks
            .entry(table.to_string())
            .or_insert_with(|| Arc::new(RwLock::new(())))
            .clone()
    }

    /// Exclusive access to `table` for a reload
    pub async fn lock_for_reload(&self, table: &str) -> OwnedRwLockWriteGuard<()> {
        self.lock_for(table).await.write_owned().await
    }

    /// Shared access to every table in `tables`, taken in name order
    async fn read_all(&self, tables: &[String]) -> Vec<OwnedRwLockReadGuard<()>> {
        let mut guards = Vec::with_capacity(tables.len());
        for table in tables {
            guards.push(self.lock_for(table).await.read_owned().await);
        }
        guards
    }

    /// Execute `query` for a department, serving repeats from the cache
    pub async fn execute(&self, query: &str, department: &str) -> Result<ResultSet, ExecutionError> {
        self.execute_on_table(query, &table_name_for(department))
            .await
    }

    /// Execute `query` against an already resolved table name
    pub async fn execute_on_table(
        &self,
        query: &str,
        table: &str,
    ) -> Result<ResultSet, ExecutionError> {
        let final_query = bind_table(query, table);
        let key = query_cache_key(&final_query);
        let tables = tables_touched(&final_query, table);

        let _guards = self.read_all(&tables).await;

        if let Some(cached) = self.cache.get::<ResultSet>(&key).await {
            debug!("Returning cached result for {}", table);
            return Ok(cached);
        }

        self.executions.fetch_add(1, Ordering::SeqCst);
        let result = self.store.run_query(&final_query).await.map_err(|e| {
            error!("Query execution failed: {}", e);
            ExecutionError::new(final_query.clone(), e)
        })?;

        info!("Query returned {} rows from {}", result.len(), table);
        let tags: Vec<&str> = tables.iter().map(String::as_str).collect();
        self.cache.set(&key, &result, &tags).await;
        Ok(result)
    }

    /// Column layout of a department table
    pub async fn table_schema(&self, department: &str) -> Result<TableSchema, StoreError> {
        let table = table_name_for(department);
        let key = schema_cache_key(&table);

        let lock = self.lock_for(&table).await;
        let _guard = lock.read().await;

        if let Some(cached) = self.cache.get::<TableSchema>(&key).await {
            return Ok(cached);
        }
        let schema = self.store.table_schema(&table).await?;
        self.cache.set(&key, &schema, &[&table]).await;
        Ok(schema)
    }

    /// First `limit` rows of a department table
    pub async fn sample_rows(&self, department: &str, limit: usize) -> Result<ResultSet, StoreError> {
        let table = table_name_for(department);
        let key = sample_cache_key(&table, limit);

        let lock = self.lock_for(&table).await;
        let _guard = lock.read().await;

        if let Some(cached) = self.cache.get::<ResultSet>(&key).await {
            return Ok(cached);
        }
        let rows = self.store.sample_rows(&table, limit).await?;
        self.cache.set(&key, &rows, &[&table]).await;
        Ok(rows)
    }

    /// Distinct values of a column, for prompt grounding
    pub async fn distinct_values(
        &self,
        table: &str,
        column: &str,
        limit: usize,
    ) -> Result<Vec<String>, StoreError> {
        let key = cache_key("distinct", &format!("{}_{}_{}", table, column, limit));

        let lock = self.lock_for(table).await;
        let _guard = lock.read().await;

        if let Some(cached) = self.cache.get::<Vec<String>>(&key).await {
            return Ok(cached);
        }
        let values = self.store.distinct_values(table, column, limit).await?;
        self.cache.set(&key, &values, &[table]).await;
        Ok(values)
    }
}

/// Sorted, deduplicated tables `query` reads, always including `table`
///
/// A query the parser cannot read is attributed to `table` alone; the store
/// decides whether it runs.
fn tables_touched(query: &str, table: &str) -> Vec<String> {
    let mut tables = match tables_read_by(query) {
        Ok(tables) => tables,
        Err(e) => {
            debug!("Could not list tables read by query: {}", e);
            Vec::new()
        }
    };
    tables.push(table.to_lowercase());
    tables.sort();
    tables.dedup();
    tables
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    async fn executor() -> QueryExecutor {
        QueryExecutor::new(
            TableStore::in_memory().await.expect("store"),
            CacheClient::in_memory(Duration::from_secs(60)),
        )
    }

    #[test]
    fn test_tables_touched() {
        assert_eq!(
            tables_touched(
                "SELECT COUNT(*) FROM police_data_seattle",
                "police_data_chicago"
            ),
            vec!["police_data_chicago", "police_data_seattle"]
        );
        assert_eq!(
            tables_touched("SELECT COUNT(*) FROM police_data_seattle", "police_data_seattle"),
            vec!["police_data_seattle"]
        );
        assert_eq!(
            tables_touched("not sql at all", "police_data_seattle"),
            vec!["police_data_seattle"]
        );
    }

    #[tokio::test]
    async fn test_idle_locks_are_pruned() {
        let executor = executor().await;
        for department in ["Boston Police", "Springfield", "Shelbyville"] {
            assert!(executor
                .execute("SELECT COUNT(*) FROM police_data", department)
                .await
                .is_err());
        }
        let locks = executor.locks.lock().await;
        assert_eq!(locks.len(), 1);
        assert!(locks.contains_key("police_data_shelbyville"));
    }

    #[test]
    fn test_bind_table_whole_word_only() {
        assert_eq!(
            bind_table("SELECT COUNT(*) FROM police_data", "police_data_seattle"),
            "SELECT COUNT(*) FROM police_data_seattle"
        );
        assert_eq!(
            bind_table("SELECT COUNT(*) FROM police_data_seattle", "police_data_chicago"),
            "SELECT COUNT(*) FROM police_data_seattle"
        );
        assert_eq!(
            bind_table(
                "SELECT a.x FROM police_data a JOIN police_data_seattle b ON 1 = 1",
                "police_data_seattle"
            ),
            "SELECT a.x FROM police_data_seattle a JOIN police_data_seattle b ON 1 = 1"
        );
    }
}
