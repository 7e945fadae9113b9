use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use denkwerk::{
    providers::{
        openrouter::{
            OpenRouter as DenkwerkOpenRouter, OpenRouterConfig as DenkwerkOpenRouterConfig,
        },
        LLMProvider,
    },
    ChatMessage, CompletionRequest, ProviderCapabilities,
};
use parley_config::EnrichmentConfig;
use tracing::{debug, info};

use crate::EnrichmentError;

/// Result of a single generation call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generation {
    pub text: String,
    /// Provider-reported total tokens; 0 when the provider reports none.
    pub tokens_used: u32,
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<Generation, EnrichmentError>;
}

/// Chat-completions generator backed by OpenRouter.
pub struct OpenRouterGenerator {
    provider: Arc<dyn LLMProvider>,
    model: String,
}

impl OpenRouterGenerator {
    pub fn from_config(config: &EnrichmentConfig) -> Result<Self, EnrichmentError> {
        let openrouter = &config.openrouter;
        let api_key = openrouter
            .api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .ok_or(EnrichmentError::ApiKeyMissing)?;

        let mut provider_config = DenkwerkOpenRouterConfig::new(api_key);
        provider_config.base_url = openrouter.base_url.clone();
        provider_config.request_timeout = Duration::from_secs(openrouter.request_timeout_seconds);
        provider_config.referer = openrouter.referer.clone();
        provider_config.title = openrouter.title.clone();

        debug!(base_url = %openrouter.base_url, "initialising OpenRouter provider");

        let provider =
            DenkwerkOpenRouter::from_config(provider_config).map_err(EnrichmentError::ProviderInit)?;

        info!(
            model = %config.model,
            capabilities = ?describe_capabilities(provider.capabilities()),
            "text generation provider ready"
        );

        Ok(Self::with_provider(Arc::new(provider), config.model.clone()))
    }

    pub fn with_provider(provider: Arc<dyn LLMProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }
}

#[async_trait]
impl TextGenerator for OpenRouterGenerator {
    async fn generate(&self, prompt: &str) -> Result<Generation, EnrichmentError> {
        let request = CompletionRequest::new(self.model.clone(), vec![ChatMessage::user(prompt)]);
        let completion = self.provider.complete(request).await?;

        let text = completion.message.text().unwrap_or_default().trim().to_string();
        let tokens_used = completion
            .usage
            .map(|usage| usage.total_tokens)
            .unwrap_or_default();

        debug!(model = %self.model, tokens_used, "generation completed");
        Ok(Generation { text, tokens_used })
    }
}

fn describe_capabilities(capabilities: ProviderCapabilities) -> Vec<&'static str> {
    let mut values = vec!["chat-completions"];

    if capabilities.supports_streaming {
        values.push("streaming");
    }

    if capabilities.supports_reasoning_stream {
        values.push("reasoning");
    }

    if capabilities.supports_image_uploads {
        values.push("image-uploads");
    }

    values
}
