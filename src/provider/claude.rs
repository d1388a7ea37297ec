// src/provider/claude.rs
// Anthropic Messages API adapter.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use super::{
    env_key, status_error, transport_error, ChatRole, ChatTurn, GenerationParams, ModelInfo,
    ModelProvider, DEFAULT_TIMEOUT_SECS,
};
use crate::error::ProviderError;

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
pub const DEFAULT_MODEL: &str = "claude-3-opus-20240229";

pub struct ClaudeProvider {
    client: Client,
    api_key: String,
    model: String,
}

impl ClaudeProvider {
    pub fn new(api_key: Option<String>, model: Option<String>) -> Result<Self, ProviderError> {
        let api_key = api_key
            .or_else(|| env_key("ANTHROPIC_API_KEY"))
            .ok_or_else(|| ProviderError::Auth("ANTHROPIC_API_KEY not set".into()))?;

        Ok(Self {
            client: Client::new(),
            api_key,
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        })
    }

    async fn send(&self, mut body: Value, params: &GenerationParams) -> Result<String, ProviderError> {
        for (key, value) in &params.options {
            body[key] = value.clone();
        }

        debug!("Claude request: model={}", self.model);

        let response = self
            .client
            .post(ANTHROPIC_API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, body));
        }

        let raw: Value = response.json().await.map_err(transport_error)?;

        raw["content"][0]["text"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| ProviderError::Request {
                status: 200,
                message: "no content in Claude response".into(),
            })
    }
}

#[async_trait]
impl ModelProvider for ClaudeProvider {
    fn info(&self) -> ModelInfo {
        ModelInfo {
            name: self.model.clone(),
            provider: "Anthropic".into(),
            description: "Anthropic's Claude model for text generation and chat".into(),
            is_default: false,
            capabilities: vec![
                "text_generation".into(),
                "chat".into(),
                "conflict_resolution".into(),
            ],
            max_tokens: 4096,
            supports_system_message: true,
        }
    }

    async fn generate_text(
        &self,
        prompt: &str,
        system_message: Option<&str>,
        params: &GenerationParams,
    ) -> Result<String, ProviderError> {
        let mut body = json!({
            "model": self.model,
            "max_tokens": params.max_tokens,
            "temperature": params.temperature,
            "messages": [{"role": "user", "content": prompt}],
        });

        if let Some(system) = system_message {
            body["system"] = json!(system);
        }

        self.send(body, params).await
    }

    async fn generate_chat_response(
        &self,
        history: &[ChatTurn],
        params: &GenerationParams,
    ) -> Result<String, ProviderError> {
        // System turns become the top-level system parameter; the Messages
        // API only accepts user/assistant roles in the message list.
        let system: Vec<&str> = history
            .iter()
            .filter(|t| t.role == ChatRole::System)
            .map(|t| t.content.as_str())
            .collect();

        let messages: Vec<Value> = history
            .iter()
            .filter(|t| t.role != ChatRole::System)
            .map(|t| json!({"role": t.role.as_str(), "content": t.content}))
            .collect();

        let mut body = json!({
            "model": self.model,
            "max_tokens": params.max_tokens,
            "temperature": params.temperature,
            "messages": messages,
        });

        if !system.is_empty() {
            body["system"] = json!(system.join("\n"));
        }

        self.send(body, params).await
    }
}
