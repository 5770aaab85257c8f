//! OpenAI-compatible Client
//!
//! LLM client for chat-completion APIs that speak the OpenAI wire format.
//! Groq exposes the same endpoint shape, so both backends share this client.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::llm_client::{CompletionSettings, LlmClient};

/// Default OpenAI model
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o";

/// Default Groq model
pub const DEFAULT_GROQ_MODEL: &str = "deepseek-r1-distill-llama-70b";

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Message {
    content: Option<String>,
}

/// OpenAI-compatible API client
#[derive(Clone)]
pub struct OpenAiClient {
    api_key: String,
    client: reqwest::Client,
    base_url: String,
    model: String,
    provider: &'static str,
    settings: CompletionSettings,
}

impl OpenAiClient {
    pub fn new(api_key: String) -> Self {
        Self::with_model(api_key, DEFAULT_OPENAI_MODEL)
    }

    pub fn with_model(api_key: String, model: &str) -> Self {
        Self {
            api_key,
            client: reqwest::Client::new(),
            base_url: OPENAI_BASE_URL.to_string(),
            model: model.to_string(),
            provider: "OpenAI",
            settings: CompletionSettings::default(),
        }
    }

    /// Client pointed at Groq's OpenAI-compatible endpoint
    pub fn groq(api_key: String, model: &str) -> Self {
        Self {
            base_url: GROQ_BASE_URL.to_string(),
            provider: "Groq",
            ..Self::with_model(api_key, model)
        }
    }

    pub fn with_settings(mut self, settings: CompletionSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request<'a>(&'a self, system_prompt: &'a str, user_prompt: &'a str) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: user_prompt,
                },
            ],
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
        }
    }

    /// Text of the first choice; a choice cut off at the token limit is an
    /// error since partial SQL never validates
    fn completion_text(&self, response: ChatResponse) -> Result<String> {
        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("{} returned no choices", self.provider))?;
        if choice.finish_reason.as_deref() == Some("length") {
            return Err(anyhow!(
                "{} response truncated at {} tokens",
                self.provider,
                self.settings.max_tokens
            ));
        }
        choice
            .message
            .content
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| anyhow!("{} returned an empty message", self.provider))
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn chat(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&self.request(system_prompt, user_prompt))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("{} API error {}: {}", self.provider, status, body));
        }
        self.completion_text(response.json().await?)
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn provider_name(&self) -> &str {
        self.provider
    }
}
