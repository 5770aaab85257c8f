//! Model provider chosen by `AGENT_BACKEND`

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::anthropic_client::DEFAULT_ANTHROPIC_MODEL;
use crate::openai_client::{DEFAULT_GROQ_MODEL, DEFAULT_OPENAI_MODEL};

pub const BACKEND_VAR: &str = "AGENT_BACKEND";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AgentBackend {
    /// Groq's OpenAI-compatible endpoint
    #[default]
    Groq,
    OpenAi,
    Anthropic,
}

/// Accepted spellings, matched case-insensitively
const ALIASES: &[(&str, AgentBackend)] = &[
    ("groq", AgentBackend::Groq),
    ("openai", AgentBackend::OpenAi),
    ("gpt", AgentBackend::OpenAi),
    ("anthropic", AgentBackend::Anthropic),
    ("claude", AgentBackend::Anthropic),
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown AGENT_BACKEND '{0}', expected groq, openai or anthropic")]
pub struct UnknownBackend(pub String);

impl AgentBackend {
    pub fn from_env() -> Result<Self, UnknownBackend> {
        Self::from_setting(std::env::var(BACKEND_VAR).ok().as_deref())
    }

    /// Unset or blank selects the default
    pub fn from_setting(value: Option<&str>) -> Result<Self, UnknownBackend> {
        match value.map(str::trim).filter(|v| !v.is_empty()) {
            Some(v) => v.parse(),
            None => Ok(Self::default()),
        }
    }

    pub fn provider_name(&self) -> &'static str {
        match self {
            AgentBackend::Groq => "Groq",
            AgentBackend::OpenAi => "OpenAI",
            AgentBackend::Anthropic => "Anthropic",
        }
    }

    /// Environment variable holding this provider's credential
    pub fn api_key_var(&self) -> &'static str {
        match self {
            AgentBackend::Groq => "GROQ_API_KEY",
            AgentBackend::OpenAi => "OPENAI_API_KEY",
            AgentBackend::Anthropic => "ANTHROPIC_API_KEY",
        }
    }

    /// Model used when `LLM_MODEL` is not set
    pub fn default_model(&self) -> &'static str {
        match self {
            AgentBackend::Groq => DEFAULT_GROQ_MODEL,
            AgentBackend::OpenAi => DEFAULT_OPENAI_MODEL,
            AgentBackend::Anthropic => DEFAULT_ANTHROPIC_MODEL,
        }
    }
}

impl FromStr for AgentBackend {
    type Err = UnknownBackend;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        ALIASES
            .iter()
            .find(|(alias, _)| alias.eq_ignore_ascii_case(wanted))
            .map(|(_, backend)| *backend)
            .ok_or_else(|| UnknownBackend(wanted.to_string()))
    }
}

impl fmt::Display for AgentBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.provider_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aliases() {
        assert_eq!(" Claude ".parse::<AgentBackend>(), Ok(AgentBackend::Anthropic));
        assert_eq!("GPT".parse::<AgentBackend>(), Ok(AgentBackend::OpenAi));
        assert_eq!(
            "llama".parse::<AgentBackend>(),
            Err(UnknownBackend("llama".to_string()))
        );
    }

    #[test]
    fn test_unset_or_blank_is_groq() {
        assert_eq!(AgentBackend::from_setting(None), Ok(AgentBackend::Groq));
        assert_eq!(AgentBackend::from_setting(Some("  ")), Ok(AgentBackend::Groq));
        assert_eq!(
            AgentBackend::from_setting(Some("openai")).map(|b| b.api_key_var()),
            Ok("OPENAI_API_KEY")
        );
    }
}
