//! Runtime configuration
//!
//! Defaults come from environment variables (after loading `.env`), and an
//! optional YAML file can override individual keys.

use anyhow::{Context, Result};
use civic_agentic::AgentBackend;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// Default lifetime of a cache entry
pub const DEFAULT_CACHE_EXPIRY: Duration = Duration::from_secs(3600);

/// Default end-to-end latency budget for a question
pub const DEFAULT_RESPONSE_THRESHOLD: Duration = Duration::from_secs(10);

/// Store connection settings
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub connection_timeout: Duration,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://police_data.db".to_string()),
            // SQLite serializes writers; one connection avoids "database is locked"
            max_connections: std::env::var("DATABASE_POOL_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(1),
            connection_timeout: Duration::from_secs(30),
        }
    }
}

impl DatabaseConfig {
    /// Private in-memory database, used by tests and demos
    pub fn in_memory() -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
            max_connections: 1,
            connection_timeout: Duration::from_secs(30),
        }
    }
}

/// Query cache settings
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// SQLite URL of a shared cache database; `None` keeps the cache in-process
    pub shared_url: Option<String>,
    pub expiry: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            shared_url: std::env::var("CACHE_URL")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            expiry: std::env::var("CACHE_EXPIRY_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_CACHE_EXPIRY),
        }
    }
}

/// Generative tier settings
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub backend: AgentBackend,
    pub api_key: Option<String>,
    pub model: Option<String>,
    /// Budget for one question, also used as the model call timeout
    pub response_threshold: Duration,
}

impl Default for LlmConfig {
    fn default() -> Self {
        let backend = AgentBackend::from_env().unwrap_or_else(|e| {
            warn!("{}; using {}", e, AgentBackend::default());
            AgentBackend::default()
        });
        Self {
            api_key: std::env::var(backend.api_key_var())
                .ok()
                .filter(|k| !k.trim().is_empty()),
            backend,
            model: std::env::var("LLM_MODEL").ok(),
            response_threshold: std::env::var("MAX_LLM_RESPONSE_SECS")
                .ok()
                .and_then(|s| s.parse::<f64>().ok())
                .and_then(positive_secs)
                .unwrap_or(DEFAULT_RESPONSE_THRESHOLD),
        }
    }
}

impl LlmConfig {
    /// Pattern tier only
    pub fn disabled() -> Self {
        Self {
            backend: AgentBackend::default(),
            api_key: None,
            model: None,
            response_threshold: DEFAULT_RESPONSE_THRESHOLD,
        }
    }
}

/// Complete application configuration
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub cache: CacheConfig,
    pub llm: LlmConfig,
}

/// Keys accepted in a YAML configuration file
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    database_url: Option<String>,
    database_pool_size: Option<u32>,
    cache_url: Option<String>,
    cache_expiry_secs: Option<u64>,
    agent_backend: Option<String>,
    llm_model: Option<String>,
    max_llm_response_secs: Option<f64>,
}

impl AppConfig {
    /// Load `.env` if present, then read the environment
    pub fn from_env() -> Self {
        if let Ok(path) = dotenvy::dotenv() {
            info!("Loaded environment from {}", path.display());
        }
        Self::default()
    }

    /// Environment defaults overlaid with a YAML file
    ///
    /// Credentials are never read from the file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading configuration from {}", path.display());

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let mut config = Self::from_env();
        config.apply_yaml(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(config)
    }

    fn apply_yaml(&mut self, content: &str) -> Result<()> {
        let file: ConfigFile = serde_yaml::from_str(content)?;

        if let Some(url) = file.database_url {
            self.database.database_url = url;
        }
        if let Some(size) = file.database_pool_size {
            self.database.max_connections = size.max(1);
        }
        if let Some(url) = file.cache_url {
            self.cache.shared_url = Some(url);
        }
        if let Some(secs) = file.cache_expiry_secs {
            self.cache.expiry = Duration::from_secs(secs);
        }
        if let Some(backend) = file.agent_backend {
            let backend: AgentBackend = backend
                .parse()
                .map_err(|e| anyhow::anyhow!("agent_backend: {}", e))?;
            if backend != self.llm.backend {
                self.llm.backend = backend;
                self.llm.api_key = std::env::var(backend.api_key_var())
                    .ok()
                    .filter(|k| !k.trim().is_empty());
            }
        }
        if let Some(model) = file.llm_model {
            self.llm.model = Some(model);
        }
        if let Some(threshold) = file.max_llm_response_secs.and_then(positive_secs) {
            self.llm.response_threshold = threshold;
        }
        Ok(())
    }

    /// In-memory store, in-process cache, no model
    pub fn for_tests() -> Self {
        Self {
            database: DatabaseConfig::in_memory(),
            cache: CacheConfig {
                shared_url: None,
                expiry: DEFAULT_CACHE_EXPIRY,
            },
            llm: LlmConfig::disabled(),
        }
    }
}

/// A strictly positive, finite number of seconds
fn positive_secs(secs: f64) -> Option<Duration> {
    if secs > 0.0 {
        Duration::try_from_secs_f64(secs).ok()
    } else {
        None
    }
}
