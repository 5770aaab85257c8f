//! Anthropic Messages API client

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::llm_client::{CompletionSettings, LlmClient};

pub const DEFAULT_ANTHROPIC_MODEL: &str = "claude-sonnet-4-20250514";

const MESSAGES_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";

#[derive(Debug, Serialize)]
struct UserMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    system: &'a str,
    messages: [UserMessage<'a>; 1],
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    text: Option<String>,
}

#[derive(Clone)]
pub struct AnthropicClient {
    api_key: String,
    client: reqwest::Client,
    model: String,
    settings: CompletionSettings,
}

impl AnthropicClient {
    pub fn new(api_key: String) -> Self {
        Self::with_model(api_key, DEFAULT_ANTHROPIC_MODEL)
    }

    pub fn with_model(api_key: String, model: &str) -> Self {
        Self {
            api_key,
            client: reqwest::Client::new(),
            model: model.to_string(),
            settings: CompletionSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: CompletionSettings) -> Self {
        self.settings = settings;
        self
    }

    fn request<'a>(&'a self, system_prompt: &'a str, user_prompt: &'a str) -> MessagesRequest<'a> {
        MessagesRequest {
            model: &self.model,
            max_tokens: self.settings.max_tokens,
            temperature: self.settings.temperature,
            system: system_prompt,
            messages: [UserMessage {
                role: "user",
                content: user_prompt,
            }],
        }
    }
}

/// Concatenated text blocks of a reply
fn reply_text(response: MessagesResponse) -> Result<String> {
    if response.stop_reason.as_deref() == Some("max_tokens") {
        return Err(anyhow!("Anthropic response truncated at the token limit"));
    }
    let text: String = response
        .content
        .into_iter()
        .filter(|block| block.kind == "text")
        .filter_map(|block| block.text)
        .collect::<Vec<_>>()
        .join("\n");
    if text.trim().is_empty() {
        Err(anyhow!("Empty response from Anthropic"))
    } else {
        Ok(text)
    }
}

#[async_trait]
impl LlmClient for AnthropicClient {
    async fn chat(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        let response = self
            .client
            .post(MESSAGES_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&self.request(system_prompt, user_prompt))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Anthropic API error {}: {}", status, body));
        }
        reply_text(response.json().await?)
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn provider_name(&self) -> &str {
        "Anthropic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_with_model() {
        let client = AnthropicClient::with_model("test-key".to_string(), "claude-3-opus");
        assert_eq!(client.model_name(), "claude-3-opus");
        assert_eq!(AnthropicClient::new("k".to_string()).model_name(), DEFAULT_ANTHROPIC_MODEL);
    }

    #[test]
    fn test_request_puts_system_prompt_at_top_level() {
        let client = AnthropicClient::new("k".to_string());
        let body = serde_json::to_value(client.request("schema here", "arrests by race")).unwrap();
        assert_eq!(body["system"], json!("schema here"));
        assert_eq!(body["messages"], json!([{"role": "user", "content": "arrests by race"}]));
        assert_eq!(body["max_tokens"], json!(500));
    }

    #[test]
    fn test_reply_text() {
        let reply: MessagesResponse = serde_json::from_value(json!({
            "content": [
                {"type": "text", "text": "SELECT driver_race, COUNT(*)"},
                {"type": "text", "text": "FROM police_data GROUP BY driver_race"}
            ],
            "stop_reason": "end_turn"
        }))
        .unwrap();
        assert_eq!(
            reply_text(reply).unwrap(),
            "SELECT driver_race, COUNT(*)\nFROM police_data GROUP BY driver_race"
        );

        let truncated: MessagesResponse = serde_json::from_value(json!({
            "content": [{"type": "text", "text": "SELECT"}],
            "stop_reason": "max_tokens"
        }))
        .unwrap();
        assert!(reply_text(truncated).is_err());
    }
}
