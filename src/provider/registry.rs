// src/provider/registry.rs
// Flat registry over the fixed vendor enumeration. Selection happens here,
// once, by id; callers only ever hold `Arc<dyn ModelProvider>`.

use std::sync::Arc;

use tracing::debug;

use super::claude::ClaudeProvider;
use super::gemini::GeminiProvider;
use super::huggingface::HuggingfaceProvider;
use super::openai_compat::{CompatVendor, OpenAiCompatProvider};
use super::{ModelInfo, ModelProvider};
use crate::error::ProviderError;

/// Every supported provider id, in enumeration order.
pub const SUPPORTED_PROVIDERS: &[&str] = &[
    "gemini",
    "openai",
    "claude",
    "mistral",
    "deepseek",
    "grok",
    "huggingface",
    "openrouter",
    "perplexity",
];

/// Adapter resolution seam. The invocation engine and conflict resolver
/// depend on this trait so tests can substitute scripted providers.
pub trait ResolveProvider: Send + Sync {
    fn resolve(
        &self,
        provider: &str,
        api_key: Option<String>,
        model: Option<String>,
    ) -> Result<Arc<dyn ModelProvider>, ProviderError>;
}

#[derive(Debug, Clone, Default)]
pub struct ProviderRegistry;

impl ProviderRegistry {
    pub fn new() -> Self {
        Self
    }

    /// Whether an id names a supported provider, without constructing an
    /// adapter. Used to validate agent configurations up front.
    pub fn is_supported(&self, provider: &str) -> bool {
        let id = provider.trim().to_lowercase();
        id == "mistralai" || SUPPORTED_PROVIDERS.contains(&id.as_str())
    }

    /// The zero-config model: gemini with environment credentials.
    pub fn default_provider(&self) -> Result<Arc<dyn ModelProvider>, ProviderError> {
        self.resolve("gemini", None, None)
    }

    /// Best-effort enumeration of every provider constructible from the
    /// environment. Providers with absent credentials are silently skipped;
    /// this never fails.
    pub fn list_models(&self) -> Vec<ModelInfo> {
        let mut models = Vec::new();
        for id in SUPPORTED_PROVIDERS {
            match self.resolve(id, None, None) {
                Ok(provider) => models.push(provider.info()),
                Err(err) => debug!("Skipping provider '{}' in listing: {}", id, err),
            }
        }
        models
    }
}

impl ResolveProvider for ProviderRegistry {
    fn resolve(
        &self,
        provider: &str,
        api_key: Option<String>,
        model: Option<String>,
    ) -> Result<Arc<dyn ModelProvider>, ProviderError> {
        let id = provider.trim().to_lowercase();

        let adapter: Arc<dyn ModelProvider> = match id.as_str() {
            "gemini" => Arc::new(GeminiProvider::new(api_key, model)?),
            "claude" => Arc::new(ClaudeProvider::new(api_key, model)?),
            "openai" => Arc::new(OpenAiCompatProvider::new(CompatVendor::OpenAi, api_key, model)?),
            "mistral" | "mistralai" => {
                Arc::new(OpenAiCompatProvider::new(CompatVendor::Mistral, api_key, model)?)
            }
            "deepseek" => {
                Arc::new(OpenAiCompatProvider::new(CompatVendor::DeepSeek, api_key, model)?)
            }
            "grok" => Arc::new(OpenAiCompatProvider::new(CompatVendor::Grok, api_key, model)?),
            "openrouter" => {
                Arc::new(OpenAiCompatProvider::new(CompatVendor::OpenRouter, api_key, model)?)
            }
            "perplexity" => {
                Arc::new(OpenAiCompatProvider::new(CompatVendor::Perplexity, api_key, model)?)
            }
            "huggingface" => Arc::new(HuggingfaceProvider::new(api_key, model)?),
            _ => return Err(ProviderError::UnsupportedProvider(provider.to_string())),
        };

        Ok(adapter)
    }
}
