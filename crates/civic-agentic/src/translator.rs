//! Two-tier question translator
//!
//! ```text
//! question ─► pattern tier ─(match)──────────────────────────► template SQL
//!                 │
//!                 └(no match, credential)─► prompt ─► LLM ─► sanitize ─► validate
//!                                                       │                   │
//!                                                       └──(any failure)────┴─► COUNT(*) fallback
//! ```
//!
//! [`QueryTranslator::translate`] is total: it always returns a query bound to
//! the resolved table, whatever the input and whatever the model does.

use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::llm_client::LlmClient;
use crate::patterns::{classify, fallback_query};
use crate::prompt::{build_system_prompt, build_user_prompt, SchemaSource};
use crate::sanitizer::SqlSanitizer;
use crate::validator::{validate_select, ValidationError};

/// Default budget for the generative call
pub const DEFAULT_GENERATION_TIMEOUT: Duration = Duration::from_secs(10);

/// Failures inside the generative tier; never escape [`QueryTranslator::translate`]
#[derive(Debug, Error)]
pub enum TranslationError {
    #[error("schema snapshot unavailable: {0}")]
    SchemaUnavailable(String),

    #[error("model call failed: {0}")]
    Model(String),

    #[error("model did not answer within {0:?}")]
    Timeout(Duration),

    #[error("model returned unusable SQL: {0}")]
    InvalidOutput(#[from] ValidationError),
}

/// Why the fallback query was used
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackReason {
    /// No pattern matched and no model credential is configured
    NoCredential,
    SchemaUnavailable,
    ModelError,
    Timeout,
    InvalidOutput,
}

impl From<&TranslationError> for FallbackReason {
    fn from(err: &TranslationError) -> Self {
        match err {
            TranslationError::SchemaUnavailable(_) => FallbackReason::SchemaUnavailable,
            TranslationError::Model(_) => FallbackReason::ModelError,
            TranslationError::Timeout(_) => FallbackReason::Timeout,
            TranslationError::InvalidOutput(_) => FallbackReason::InvalidOutput,
        }
    }
}

/// Which tier produced the query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranslationTier {
    /// Deterministic template, with the matching rule name
    Pattern(&'static str),
    Generative,
    Fallback(FallbackReason),
}

impl std::fmt::Display for TranslationTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TranslationTier::Pattern(rule) => write!(f, "pattern:{}", rule),
            TranslationTier::Generative => write!(f, "generative"),
            TranslationTier::Fallback(reason) => {
                let reason = match reason {
                    FallbackReason::NoCredential => "no_credential",
                    FallbackReason::SchemaUnavailable => "schema_unavailable",
                    FallbackReason::ModelError => "model_error",
                    FallbackReason::Timeout => "timeout",
                    FallbackReason::InvalidOutput => "invalid_output",
                };
                write!(f, "fallback:{}", reason)
            }
        }
    }
}

/// A translated question
#[derive(Debug, Clone)]
pub struct Translation {
    pub query: String,
    pub tier: TranslationTier,
    pub elapsed: Duration,
}

/// Natural-language to SQL translator
pub struct QueryTranslator {
    client: Option<Arc<dyn LlmClient>>,
    sanitizer: SqlSanitizer,
    timeout: Duration,
}

impl QueryTranslator {
    /// Create a translator; `None` disables the generative tier
    pub fn new(client: Option<Arc<dyn LlmClient>>) -> Self {
        Self {
            client,
            sanitizer: SqlSanitizer::default(),
            timeout: DEFAULT_GENERATION_TIMEOUT,
        }
    }

    /// Pattern tier only
    pub fn patterns_only() -> Self {
        Self::new(None)
    }

    pub fn with_sanitizer(mut self, sanitizer: SqlSanitizer) -> Self {
        self.sanitizer = sanitizer;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn has_generative_tier(&self) -> bool {
        self.client.is_some()
    }

    /// Translate `question` into a query against `table`
    pub async fn translate(
        &self,
        question: &str,
        table: &str,
        schema: &dyn SchemaSource,
    ) -> Translation {
        let start = Instant::now();

        let (query, tier) = if let Some((rule, pattern)) = classify(question) {
            debug!("Question matched pattern '{}'", rule);
            (pattern.to_sql(table), TranslationTier::Pattern(rule))
        } else if let Some(client) = &self.client {
            match self.generate(client.as_ref(), question, table, schema).await {
                Ok(sql) => (sql, TranslationTier::Generative),
                Err(err) => {
                    warn!("Generative translation failed, using fallback query: {}", err);
                    (
                        fallback_query(table),
                        TranslationTier::Fallback(FallbackReason::from(&err)),
                    )
                }
            }
        } else {
            info!("Using fallback query due to missing API key");
            (
                fallback_query(table),
                TranslationTier::Fallback(FallbackReason::NoCredential),
            )
        };

        let elapsed = start.elapsed();
        info!(
            "Generated SQL ({:?}) in {:.3}s: {}",
            tier,
            elapsed.as_secs_f64(),
            truncate_for_log(&query)
        );

        Translation {
            query,
            tier,
            elapsed,
        }
    }

    async fn generate(
        &self,
        client: &dyn LlmClient,
        question: &str,
        table: &str,
        schema: &dyn SchemaSource,
    ) -> Result<String, TranslationError> {
        let snapshot = schema
            .snapshot()
            .await
            .map_err(|e| TranslationError::SchemaUnavailable(e.to_string()))?;

        let system_prompt = build_system_prompt(&snapshot);
        let user_prompt = build_user_prompt(question);

        debug!(
            "Calling {} ({}) for table {}",
            client.provider_name(),
            client.model_name(),
            snapshot.table_name
        );

        let raw = tokio::time::timeout(self.timeout, client.chat(&system_prompt, &user_prompt))
            .await
            .map_err(|_| TranslationError::Timeout(self.timeout))?
            .map_err(|e| TranslationError::Model(e.to_string()))?;

        let sql = self.sanitizer.sanitize(&raw);
        validate_select(&sql, table)?;
        Ok(sql)
    }
}

fn truncate_for_log(query: &str) -> String {
    const MAX: usize = 100;
    match query.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &query[..idx]),
        None => query.to_string(),
    }
}
