//! LLM integration.
//!
//! Two backend wire shapes (Anthropic messages API, OpenAI chat completions)
//! are reduced to one contract: an ordered list of role-tagged messages in,
//! generated text out. Transport and auth failures raise straight to the
//! caller — retry policy, if any, belongs to whoever schedules the work.

mod anthropic;
mod openai;
pub mod service;

pub use service::{AiService, ExtractedData, GeneratedPrompt};

use std::sync::Arc;

use async_trait::async_trait;
use secrecy::SecretString;

use crate::error::ProviderError;

/// Message author role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// One role-tagged message in a conversation.
#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// The uniform provider contract: role-tagged messages → generated text.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Provider name for metadata and logging.
    fn name(&self) -> &'static str;

    /// Model identifier in use.
    fn model(&self) -> &str;

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, ProviderError>;
}

/// Supported backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmBackend {
    Anthropic,
    OpenAi,
}

/// Configuration for creating a provider.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub backend: LlmBackend,
    pub api_key: SecretString,
    pub model: String,
    /// Override the API origin (tests, proxies).
    pub base_url: Option<String>,
}

/// Create a provider from configuration.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn ProviderClient>, ProviderError> {
    match config.backend {
        LlmBackend::Anthropic => {
            let provider = anthropic::AnthropicClient::new(config)?;
            tracing::info!(model = %config.model, "Using Anthropic provider");
            Ok(Arc::new(provider))
        }
        LlmBackend::OpenAi => {
            let provider = openai::OpenAiClient::new(config)?;
            tracing::info!(model = %config.model, "Using OpenAI provider");
            Ok(Arc::new(provider))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_provider_constructs_both_backends() {
        // Keys are validated at request time, not construction time.
        for backend in [LlmBackend::Anthropic, LlmBackend::OpenAi] {
            let config = LlmConfig {
                backend,
                api_key: SecretString::from("test-key"),
                model: "test-model".to_string(),
                base_url: None,
            };
            let provider = create_provider(&config).unwrap();
            assert_eq!(provider.model(), "test-model");
        }
    }

    #[test]
    fn chat_message_constructors_tag_roles() {
        assert_eq!(ChatMessage::system("s").role, Role::System);
        assert_eq!(ChatMessage::user("u").role, Role::User);
        assert_eq!(ChatMessage::assistant("a").role, Role::Assistant);
        assert_eq!(Role::Assistant.as_str(), "assistant");
    }
}
