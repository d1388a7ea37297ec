// src/provider/huggingface.rs
// Hugging Face Inference API adapter. Text-in/text-out with no structured
// chat roles: the history is flattened into a transcript and system content
// is folded in with a label rather than dropped.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use super::{
    env_key, fold_system_turns, status_error, transport_error, ChatRole, ChatTurn,
    GenerationParams, ModelInfo, ModelProvider, DEFAULT_TIMEOUT_SECS,
};
use crate::error::ProviderError;

const HF_API_BASE: &str = "https://api-inference.huggingface.co/models";
pub const DEFAULT_MODEL: &str = "meta-llama/Llama-3-70b-chat";

pub struct HuggingfaceProvider {
    client: Client,
    api_key: String,
    model: String,
}

impl HuggingfaceProvider {
    pub fn new(api_key: Option<String>, model: Option<String>) -> Result<Self, ProviderError> {
        let api_key = api_key
            .or_else(|| env_key("HUGGINGFACE_API_KEY"))
            .ok_or_else(|| ProviderError::Auth("HUGGINGFACE_API_KEY not set".into()))?;

        Ok(Self {
            client: Client::new(),
            api_key,
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        })
    }

    async fn infer(&self, inputs: String, params: &GenerationParams) -> Result<String, ProviderError> {
        let mut parameters = json!({
            "temperature": params.temperature,
            "max_new_tokens": params.max_tokens,
            "return_full_text": false,
        });
        if let Some(extra) = params.options.get("parameters").and_then(|v| v.as_object()) {
            for (key, value) in extra {
                parameters[key] = value.clone();
            }
        }

        debug!("Huggingface request: model={}", self.model);

        let response = self
            .client
            .post(format!("{}/{}", HF_API_BASE, self.model))
            .bearer_auth(&self.api_key)
            .json(&json!({"inputs": inputs, "parameters": parameters}))
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

        // The inference API answers either a list of generations or a bare
        // object depending on the hosted model.
        let text = raw[0]["generated_text"]
            .as_str()
            .or_else(|| raw["generated_text"].as_str())
            .map(|s| s.to_string());

        text.ok_or_else(|| ProviderError::Request {
            status: 200,
            message: "no generated_text in Huggingface response".into(),
        })
    }
}

#[async_trait]
impl ModelProvider for HuggingfaceProvider {
    fn info(&self) -> ModelInfo {
        ModelInfo {
            name: self.model.clone(),
            provider: "Huggingface".into(),
            description: "Huggingface's hosted models for text generation and chat".into(),
            is_default: false,
            capabilities: vec![
                "text_generation".into(),
                "chat".into(),
                "conflict_resolution".into(),
            ],
            max_tokens: 4096,
            supports_system_message: false,
        }
    }

    async fn generate_text(
        &self,
        prompt: &str,
        system_message: Option<&str>,
        params: &GenerationParams,
    ) -> Result<String, ProviderError> {
        let inputs = match system_message {
            Some(system) => format!("{}\n\n{}", system, prompt),
            None => prompt.to_string(),
        };
        self.infer(inputs, params).await
    }

    async fn generate_chat_response(
        &self,
        history: &[ChatTurn],
        params: &GenerationParams,
    ) -> Result<String, ProviderError> {
        let mut transcript = String::new();
        for turn in fold_system_turns(history) {
            let speaker = match turn.role {
                ChatRole::Assistant => "Assistant",
                _ => "User",
            };
            transcript.push_str(&format!("{}: {}\n", speaker, turn.content));
        }
        transcript.push_str("Assistant: ");

        self.infer(transcript, params).await
    }
}
