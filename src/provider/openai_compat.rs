// src/provider/openai_compat.rs
// One adapter for every vendor speaking the OpenAI chat/completions wire
// format. The per-vendor differences are a base URL, a credential variable,
// and a default model; everything else is identical boilerplate.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use super::{
    env_key, status_error, transport_error, ChatTurn, GenerationParams, ModelInfo, ModelProvider,
    DEFAULT_TIMEOUT_SECS,
};
use crate::error::ProviderError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompatVendor {
    OpenAi,
    Mistral,
    DeepSeek,
    Grok,
    OpenRouter,
    Perplexity,
}

impl CompatVendor {
    pub fn display_name(&self) -> &'static str {
        match self {
            CompatVendor::OpenAi => "OpenAI",
            CompatVendor::Mistral => "Mistral AI",
            CompatVendor::DeepSeek => "DeepSeek",
            CompatVendor::Grok => "xAI",
            CompatVendor::OpenRouter => "OpenRouter",
            CompatVendor::Perplexity => "Perplexity",
        }
    }

    fn api_url(&self) -> &'static str {
        match self {
            CompatVendor::OpenAi => "https://api.openai.com/v1/chat/completions",
            CompatVendor::Mistral => "https://api.mistral.ai/v1/chat/completions",
            CompatVendor::DeepSeek => "https://api.deepseek.com/v1/chat/completions",
            CompatVendor::Grok => "https://api.x.ai/v1/chat/completions",
            CompatVendor::OpenRouter => "https://openrouter.ai/api/v1/chat/completions",
            CompatVendor::Perplexity => "https://api.perplexity.ai/chat/completions",
        }
    }

    fn key_var(&self) -> &'static str {
        match self {
            CompatVendor::OpenAi => "OPENAI_API_KEY",
            CompatVendor::Mistral => "MISTRAL_API_KEY",
            CompatVendor::DeepSeek => "DEEPSEEK_API_KEY",
            CompatVendor::Grok => "GROK_API_KEY",
            CompatVendor::OpenRouter => "OPENROUTER_API_KEY",
            CompatVendor::Perplexity => "PERPLEXITY_API_KEY",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            CompatVendor::OpenAi => "gpt-4o",
            CompatVendor::Mistral => "mistral-large-latest",
            CompatVendor::DeepSeek => "deepseek-chat",
            CompatVendor::Grok => "grok-1",
            CompatVendor::OpenRouter => "openai/gpt-4o",
            CompatVendor::Perplexity => "sonar-medium-online",
        }
    }

    fn max_tokens(&self) -> u32 {
        match self {
            CompatVendor::OpenAi | CompatVendor::OpenRouter => 128_000,
            CompatVendor::Mistral => 32_768,
            CompatVendor::DeepSeek => 64_000,
            CompatVendor::Grok => 8192,
            CompatVendor::Perplexity => 16_384,
        }
    }
}

pub struct OpenAiCompatProvider {
    client: Client,
    vendor: CompatVendor,
    api_key: String,
    model: String,
}

impl OpenAiCompatProvider {
    pub fn new(
        vendor: CompatVendor,
        api_key: Option<String>,
        model: Option<String>,
    ) -> Result<Self, ProviderError> {
        let api_key = api_key
            .or_else(|| env_key(vendor.key_var()))
            .ok_or_else(|| ProviderError::Auth(format!("{} not set", vendor.key_var())))?;

        Ok(Self {
            client: Client::new(),
            vendor,
            api_key,
            model: model.unwrap_or_else(|| vendor.default_model().to_string()),
        })
    }

    async fn chat_completion(
        &self,
        messages: Vec<Value>,
        params: &GenerationParams,
    ) -> Result<String, ProviderError> {
        let mut body = json!({
            "model": self.model,
            "messages": messages,
            "temperature": params.temperature,
            "max_tokens": params.max_tokens,
        });
        for (key, value) in &params.options {
            body[key] = value.clone();
        }

        debug!("{} request: model={}", self.vendor.display_name(), self.model);

        let response = self
            .client
            .post(self.vendor.api_url())
            .bearer_auth(&self.api_key)
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

        raw["choices"][0]["message"]["content"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| ProviderError::Request {
                status: 200,
                message: format!("no content in {} response", self.vendor.display_name()),
            })
    }
}

#[async_trait]
impl ModelProvider for OpenAiCompatProvider {
    fn info(&self) -> ModelInfo {
        ModelInfo {
            name: self.model.clone(),
            provider: self.vendor.display_name().into(),
            description: format!(
                "{} chat-completions model for text generation and chat",
                self.vendor.display_name()
            ),
            is_default: false,
            capabilities: vec![
                "text_generation".into(),
                "chat".into(),
                "conflict_resolution".into(),
            ],
            max_tokens: self.vendor.max_tokens(),
            supports_system_message: true,
        }
    }

    async fn generate_text(
        &self,
        prompt: &str,
        system_message: Option<&str>,
        params: &GenerationParams,
    ) -> Result<String, ProviderError> {
        let mut messages = Vec::new();
        if let Some(system) = system_message {
            messages.push(json!({"role": "system", "content": system}));
        }
        messages.push(json!({"role": "user", "content": prompt}));

        self.chat_completion(messages, params).await
    }

    async fn generate_chat_response(
        &self,
        history: &[ChatTurn],
        params: &GenerationParams,
    ) -> Result<String, ProviderError> {
        let messages: Vec<Value> = history
            .iter()
            .map(|t| json!({"role": t.role.as_str(), "content": t.content}))
            .collect();

        self.chat_completion(messages, params).await
    }
}
