//! Shared cache backend in a SQLite database
//!
//! Several processes (or several clients in one process) pointing at the same
//! database file see each other's entries.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use tracing::{debug, info};

use super::CacheBackend;
use crate::error::CacheError;

const CREATE_CACHE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS query_cache (
    cache_key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    expires_at INTEGER NOT NULL
)
"#;

const CREATE_TAG_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS query_cache_tags (
    cache_key TEXT NOT NULL,
    tag TEXT NOT NULL,
    PRIMARY KEY (cache_key, tag)
)
"#;

/// TTL store backed by a `query_cache` table and its `query_cache_tags` index
pub struct SharedSqlCache {
    pool: SqlitePool,
}

impl SharedSqlCache {
    /// Open (creating if needed) the cache database at `url`
    pub async fn connect(url: &str) -> Result<Self, CacheError> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        info!("Connected shared cache at {}", url);
        Self::with_pool(pool).await
    }

    /// Use an existing pool, creating the cache table if needed
    pub async fn with_pool(pool: SqlitePool) -> Result<Self, CacheError> {
        sqlx::query(CREATE_CACHE_TABLE).execute(&pool).await?;
        sqlx::query(CREATE_TAG_TABLE).execute(&pool).await?;
        Ok(Self { pool })
    }

    /// Remove expired entries and their tags
    pub async fn purge_expired(&self) -> Result<u64, CacheError> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query("DELETE FROM query_cache WHERE expires_at <= ?")
            .bind(now_millis())
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "DELETE FROM query_cache_tags WHERE cache_key NOT IN (SELECT cache_key FROM query_cache)",
        )
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(result.rows_affected())
    }
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

#[async_trait]
impl CacheBackend for SharedSqlCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let value: Option<String> = sqlx::query_scalar(
            "SELECT value FROM query_cache WHERE cache_key = ? AND expires_at > ?",
        )
        .bind(key)
        .bind(now_millis())
        .fetch_optional(&self.pool)
        .await?;
        Ok(value)
    }

    async fn set(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
        tags: &[&str],
    ) -> Result<(), CacheError> {
        let ttl_millis = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let expires_at = now_millis().saturating_add(ttl_millis);

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT OR REPLACE INTO query_cache (cache_key, value, expires_at) VALUES (?, ?, ?)",
        )
        .bind(key)
        .bind(value)
        .bind(expires_at)
        .execute(&mut *tx)
        .await?;
        sqlx::query("DELETE FROM query_cache_tags WHERE cache_key = ?")
            .bind(key)
            .execute(&mut *tx)
            .await?;
        for tag in tags {
            sqlx::query("INSERT OR IGNORE INTO query_cache_tags (cache_key, tag) VALUES (?, ?)")
                .bind(key)
                .bind(*tag)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        let purged = self.purge_expired().await?;
        if purged > 0 {
            debug!("Purged {} expired cache entries", purged);
        }
        Ok(())
    }

    async fn invalidate_tag(&self, tag: &str) -> Result<usize, CacheError> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            "DELETE FROM query_cache WHERE cache_key IN \
             (SELECT cache_key FROM query_cache_tags WHERE tag = ?)",
        )
        .bind(tag)
        .execute(&mut *tx)
        .await?;
        sqlx::query(
            "DELETE FROM query_cache_tags WHERE cache_key IN \
             (SELECT cache_key FROM query_cache_tags WHERE tag = ?)",
        )
        .bind(tag)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(result.rows_affected() as usize)
    }

    fn name(&self) -> &'static str {
        "shared"
    }
}
