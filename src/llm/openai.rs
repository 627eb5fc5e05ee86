//! OpenAI chat-completions backend.
//!
//! Wire shape: system messages ride inline in the `messages` array, text
//! comes back in `choices[0].message.content`.

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::json;

use crate::error::ProviderError;
use crate::llm::{ChatMessage, LlmConfig, ProviderClient};

const OPENAI_API_URL: &str = "https://api.openai.com";
const MAX_TOKENS: u32 = 512;

pub struct OpenAiClient {
    client: reqwest::Client,
    api_key: secrecy::SecretString,
    model: String,
    base_url: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiClient {
    pub fn new(config: &LlmConfig) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder().build().map_err(|e| {
            ProviderError::RequestFailed {
                provider: "openai".into(),
                reason: format!("failed to build HTTP client: {e}"),
            }
        })?;
        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| OPENAI_API_URL.to_string()),
        })
    }

    fn build_body(&self, messages: &[ChatMessage]) -> serde_json::Value {
        let turns: Vec<serde_json::Value> = messages
            .iter()
            .map(|m| json!({ "role": m.role.as_str(), "content": m.content }))
            .collect();
        json!({
            "model": self.model,
            "max_tokens": MAX_TOKENS,
            "messages": turns,
        })
    }
}

#[async_trait]
impl ProviderClient for OpenAiClient {
    fn name(&self) -> &'static str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, ProviderError> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(self.api_key.expose_secret())
            .json(&self.build_body(messages))
            .send()
            .await
            .map_err(|e| ProviderError::RequestFailed {
                provider: "openai".into(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(ProviderError::AuthFailed {
                provider: "openai".into(),
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::RequestFailed {
                provider: "openai".into(),
                reason: format!("HTTP {status}: {body}"),
            });
        }

        let parsed: ChatResponse =
            response
                .json()
                .await
                .map_err(|e| ProviderError::InvalidResponse {
                    provider: "openai".into(),
                    reason: e.to_string(),
                })?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|text| !text.is_empty())
            .ok_or_else(|| ProviderError::InvalidResponse {
                provider: "openai".into(),
                reason: "no message content in first choice".into(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Role;
    use secrecy::SecretString;

    #[test]
    fn system_messages_stay_inline() {
        let client = OpenAiClient::new(&LlmConfig {
            backend: crate::llm::LlmBackend::OpenAi,
            api_key: SecretString::from("k"),
            model: "gpt-test".into(),
            base_url: None,
        })
        .unwrap();

        let body = client.build_body(&[
            ChatMessage::system("persona"),
            ChatMessage::user("hi"),
        ]);
        let turns = body["messages"].as_array().unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0]["role"], Role::System.as_str());
    }
}
