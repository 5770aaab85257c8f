//! LLM client construction
//!
//! Builds the configured backend. Callers that have no credential pass no
//! client to the translator, which then runs without its generative tier.

use std::sync::Arc;

use crate::anthropic_client::AnthropicClient;
use crate::backend::AgentBackend;
use crate::llm_client::LlmClient;
use crate::openai_client::OpenAiClient;

/// Create a client for `backend` with an explicit key and optional model override
pub fn create_llm_client_with_key(
    backend: AgentBackend,
    api_key: String,
    model: Option<&str>,
) -> Arc<dyn LlmClient> {
    let model = model.unwrap_or(backend.default_model());
    match backend {
        AgentBackend::Groq => Arc::new(OpenAiClient::groq(api_key, model)),
        AgentBackend::OpenAi => Arc::new(OpenAiClient::with_model(api_key, model)),
        AgentBackend::Anthropic => Arc::new(AnthropicClient::with_model(api_key, model)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_selects_provider() {
        let client = create_llm_client_with_key(AgentBackend::Groq, "k".to_string(), None);
        assert_eq!(client.provider_name(), "Groq");
        assert_eq!(client.model_name(), AgentBackend::Groq.default_model());

        let client = create_llm_client_with_key(
            AgentBackend::Anthropic,
            "k".to_string(),
            Some("claude-3-haiku"),
        );
        assert_eq!(client.provider_name(), "Anthropic");
        assert_eq!(client.model_name(), "claude-3-haiku");
    }
}
