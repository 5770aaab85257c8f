//! Natural-language to SQL translation for police-stop tables
//!
//! This crate has no database dependencies. The store and executor live in
//! `civic-query`; here the translator only sees a table name and a
//! [`SchemaSource`] it may consult lazily.
//!
//! ## Architecture
//!
//! ```text
//! Question → Pattern tier (classify → template SQL)
//!          ↘ Generative tier (prompt → LLM → sanitize → validate)
//!          ↘ Fallback (COUNT(*) on the resolved table)
//! ```
//!
//! ## Backend Selection
//!
//! Set `AGENT_BACKEND` environment variable:
//! - `groq` (default): Groq OpenAI-compatible API
//! - `openai`: OpenAI API
//! - `anthropic`: Anthropic Claude API

// LLM client abstraction
pub mod anthropic_client;
pub mod backend;
pub mod client_factory;
pub mod llm_client;
pub mod openai_client;

// Translation pipeline
pub mod patterns;
pub mod prompt;
pub mod sanitizer;
pub mod translator;
pub mod validator;
pub mod vocabulary;

// Re-exports for convenience
pub use backend::{AgentBackend, UnknownBackend};
pub use client_factory::create_llm_client_with_key;
pub use llm_client::{CompletionSettings, LlmClient};
pub use patterns::{classify, fallback_query, sample_questions, Dimension, QuestionPattern};
pub use prompt::{SchemaSnapshot, SchemaSource};
pub use sanitizer::{RewriteRule, SqlSanitizer};
pub use translator::{FallbackReason, QueryTranslator, Translation, TranslationTier};
pub use validator::{tables_read_by, validate_select, ValidationError};
