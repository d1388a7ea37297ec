// src/provider/gemini.rs
// Gemini generateContent adapter. This is the system's default provider and
// the designated conflict-scoring backend.

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

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";
pub const DEFAULT_MODEL: &str = "gemini-flash-2.0";

pub struct GeminiProvider {
    client: Client,
    api_key: String,
    model: String,
}

impl GeminiProvider {
    pub fn new(api_key: Option<String>, model: Option<String>) -> Result<Self, ProviderError> {
        let api_key = api_key
            .or_else(|| env_key("GEMINI_API_KEY"))
            .ok_or_else(|| ProviderError::Auth("GEMINI_API_KEY not set".into()))?;

        Ok(Self {
            client: Client::new(),
            api_key,
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        })
    }

    fn generation_config(&self, params: &GenerationParams) -> Value {
        let mut config = json!({
            "temperature": params.temperature,
            "maxOutputTokens": params.max_tokens,
            "topP": 0.95,
            "topK": 40,
        });
        for (key, value) in &params.options {
            config[key] = value.clone();
        }
        config
    }

    async fn generate(&self, body: Value) -> Result<String, ProviderError> {
        let url = format!(
            "{}/{}:generateContent?key={}",
            GEMINI_API_BASE, self.model, self.api_key
        );

        debug!("Gemini request: model={}", self.model);

        let response = self
            .client
            .post(&url)
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

        let mut text = String::new();
        if let Some(parts) = raw["candidates"][0]["content"]["parts"].as_array() {
            for part in parts {
                if let Some(chunk) = part["text"].as_str() {
                    text.push_str(chunk);
                }
            }
        }

        if text.is_empty() {
            return Err(ProviderError::Request {
                status: 200,
                message: "no text in Gemini response".into(),
            });
        }

        Ok(text)
    }
}

#[async_trait]
impl ModelProvider for GeminiProvider {
    fn info(&self) -> ModelInfo {
        ModelInfo {
            name: self.model.clone(),
            provider: "Google".into(),
            description: "Google's Gemini model for text generation and chat".into(),
            is_default: true,
            capabilities: vec![
                "text_generation".into(),
                "chat".into(),
                "conflict_resolution".into(),
            ],
            max_tokens: 8192,
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
            "contents": [{
                "role": "user",
                "parts": [{"text": prompt}],
            }],
            "generationConfig": self.generation_config(params),
        });

        if let Some(system) = system_message {
            body["systemInstruction"] = json!({"parts": [{"text": system}]});
        }

        self.generate(body).await
    }

    async fn generate_chat_response(
        &self,
        history: &[ChatTurn],
        params: &GenerationParams,
    ) -> Result<String, ProviderError> {
        let system: Vec<&str> = history
            .iter()
            .filter(|t| t.role == ChatRole::System)
            .map(|t| t.content.as_str())
            .collect();

        let mut contents: Vec<Value> = history
            .iter()
            .filter(|t| t.role != ChatRole::System)
            .map(|t| {
                let role = match t.role {
                    ChatRole::Assistant => "model",
                    _ => "user",
                };
                json!({"role": role, "parts": [{"text": t.content}]})
            })
            .collect();

        // Gemini expects the conversation to end on a user turn.
        let ends_on_user = contents
            .last()
            .and_then(|c| c["role"].as_str())
            .map(|r| r == "user")
            .unwrap_or(false);
        if !ends_on_user {
            contents.push(json!({
                "role": "user",
                "parts": [{"text": "Please continue the conversation."}],
            }));
        }

        let mut body = json!({
            "contents": contents,
            "generationConfig": self.generation_config(params),
        });

        if !system.is_empty() {
            body["systemInstruction"] = json!({"parts": [{"text": system.join("\n")}]});
        }

        self.generate(body).await
    }
}
