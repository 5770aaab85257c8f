//! In-process cache backend with manual expiry

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use super::CacheBackend;
use crate::error::CacheError;

/// Default entry limit
pub const DEFAULT_CAPACITY: usize = 1000;

#[derive(Debug, Clone)]
struct MemoryEntry {
    value: String,
    tags: Vec<String>,
    expires_at: Instant,
}

/// Bounded map of entries; expired entries are dropped when touched
pub struct MemoryCache {
    entries: Mutex<HashMap<String, MemoryEntry>>,
    capacity: usize,
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl MemoryCache {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .lock()
            .await
            .values()
            .filter(|e| e.expires_at > now)
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

fn make_room(entries: &mut HashMap<String, MemoryEntry>, capacity: usize) {
    let now = Instant::now();
    entries.retain(|_, e| e.expires_at > now);
    while entries.len() >= capacity {
        let Some(oldest) = entries
            .iter()
            .min_by_key(|(_, e)| e.expires_at)
            .map(|(k, _)| k.clone())
        else {
            break;
        };
        debug!("Evicting cache entry {}", oldest);
        entries.remove(&oldest);
    }
}

#[async_trait]
impl CacheBackend for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut entries = self.entries.lock().await;
        let expired = match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => {
                return Ok(Some(entry.value.clone()))
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.remove(key);
        }
        Ok(None)
    }

    async fn set(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
        tags: &[&str],
    ) -> Result<(), CacheError> {
        let mut entries = self.entries.lock().await;
        if !entries.contains_key(key) {
            make_room(&mut entries, self.capacity);
        }
        entries.insert(
            key.to_string(),
            MemoryEntry {
                value: value.to_string(),
                tags: tags.iter().map(|t| t.to_string()).collect(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn invalidate_tag(&self, tag: &str) -> Result<usize, CacheError> {
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, e| !e.tags.iter().any(|t| t == tag));
        Ok(before - entries.len())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
