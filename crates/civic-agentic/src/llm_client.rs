//! LLM Client Trait
//!
//! Unified interface for the chat-completion providers used by the generative
//! translation tier (Groq, OpenAI, Anthropic).

use anyhow::Result;
use async_trait::async_trait;

/// Sampling settings shared by every provider
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompletionSettings {
    /// Low temperature keeps the generated SQL close to the templates in the prompt
    pub temperature: f32,
    /// Upper bound on generated tokens
    pub max_tokens: u32,
}

impl Default for CompletionSettings {
    fn default() -> Self {
        Self {
            temperature: 0.1,
            max_tokens: 500,
        }
    }
}

/// Unified LLM client interface
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Call the LLM with system + user prompts, return raw text response
    async fn chat(&self, system_prompt: &str, user_prompt: &str) -> Result<String>;

    /// Get the model name for logging
    fn model_name(&self) -> &str;

    /// Get the provider name for logging
    fn provider_name(&self) -> &str;
}
