//! Content-addressed result cache
//!
//! Keys are `police_data:` followed by the SHA-256 hex digest of a semantic
//! key (`query_<sql>`, `schema_<table>`, ...), so identical final query text
//! always lands on the same entry. Entries carry the names of the tables they
//! were read from as tags, and a reload of any of those tables drops them.
//!
//! [`CacheClient`] never fails: backend errors are logged, the in-process
//! fallback map takes over, and the caller just sees a miss.

pub mod memory;
pub mod shared;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::config::CacheConfig;
use crate::error::CacheError;

pub use memory::MemoryCache;
pub use shared::SharedSqlCache;

const KEY_NAMESPACE: &str = "police_data";

/// Storage behind a [`CacheClient`]
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn set(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
        tags: &[&str],
    ) -> Result<(), CacheError>;

    /// Drop every entry carrying `tag`; returns how many were removed
    async fn invalidate_tag(&self, tag: &str) -> Result<usize, CacheError>;

    fn name(&self) -> &'static str;
}

/// Cache key for `kind` + `text`
pub fn cache_key(kind: &str, text: &str) -> String {
    let digest = Sha256::digest(format!("{}_{}", kind, text).as_bytes());
    format!("{}:{}", KEY_NAMESPACE, hex::encode(digest))
}

pub fn query_cache_key(sql: &str) -> String {
    cache_key("query", sql)
}

pub fn schema_cache_key(table: &str) -> String {
    cache_key("schema", table)
}

pub fn sample_cache_key(table: &str, limit: usize) -> String {
    cache_key("sample", &format!("{}_{}", table, limit))
}

/// Shared handle to the configured backend
#[derive(Clone)]
pub struct CacheClient {
    backend: Arc<dyn CacheBackend>,
    fallback: Arc<MemoryCache>,
    ttl: Duration,
}

impl CacheClient {
    pub fn new(backend: Arc<dyn CacheBackend>, ttl: Duration) -> Self {
        Self {
            backend,
            fallback: Arc::new(MemoryCache::default()),
            ttl,
        }
    }

    /// In-process cache only
    pub fn in_memory(ttl: Duration) -> Self {
        Self::new(Arc::new(MemoryCache::default()), ttl)
    }

    /// Shared backend when configured and reachable, otherwise in-process
    pub async fn from_config(config: &CacheConfig) -> Self {
        match &config.shared_url {
            Some(url) => match SharedSqlCache::connect(url).await {
                Ok(shared) => {
                    info!("Using shared cache backend");
                    Self::new(Arc::new(shared), config.expiry)
                }
                Err(e) => {
                    warn!("Shared cache unavailable ({}), using in-memory cache", e);
                    Self::in_memory(config.expiry)
                }
            },
            None => {
                info!("Using in-memory cache backend");
                Self::in_memory(config.expiry)
            }
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Cached value for `key`, if present and decodable
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = match self.backend.get(key).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Cache read failed on {} backend: {}", self.backend.name(), e);
                self.fallback.get(key).await.ok().flatten()
            }
        }?;

        match serde_json::from_str(&raw) {
            Ok(value) => {
                debug!("Cache hit for key: {}", key);
                Some(value)
            }
            Err(e) => {
                warn!("Discarding undecodable cache entry {}: {}", key, e);
                None
            }
        }
    }

    /// Store `value` under `key` with the default TTL
    pub async fn set<T: Serialize>(&self, key: &str, value: &T, tags: &[&str]) {
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Cache value for {} not serializable: {}", key, e);
                return;
            }
        };

        if let Err(e) = self.backend.set(key, &raw, self.ttl, tags).await {
            warn!("Cache write failed on {} backend: {}", self.backend.name(), e);
            // The in-process map cannot fail
            let _ = self.fallback.set(key, &raw, self.ttl, tags).await;
        }
    }

    /// Drop all entries tagged with `tag`
    pub async fn invalidate_tag(&self, tag: &str) -> usize {
        let removed = match self.backend.invalidate_tag(tag).await {
            Ok(n) => n,
            Err(e) => {
                warn!("Cache invalidation failed on {} backend: {}", self.backend.name(), e);
                0
            }
        };
        let removed = removed + self.fallback.invalidate_tag(tag).await.unwrap_or(0);
        if removed > 0 {
            info!("Invalidated {} cache entries for {}", removed, tag);
        }
        removed
    }
}
