use std::sync::Arc;

use super::TextGenerator;
use super::hosted::HostedBackend;
use super::ollama::OllamaBackend;
use super::rig_backend::RigBackend;
use crate::config::ProviderConfig;

/// Build the generation backend for the configured provider.
pub fn build_generator(provider: &ProviderConfig) -> Arc<dyn TextGenerator> {
    match provider {
        ProviderConfig::Hosted { endpoint, api_key } => {
            Arc::new(HostedBackend::new(endpoint.clone(), api_key.clone()))
        }
        ProviderConfig::OpenAI { api_key } => Arc::new(RigBackend::openai(api_key)),
        ProviderConfig::Anthropic { api_key } => Arc::new(RigBackend::anthropic(api_key)),
        ProviderConfig::Ollama { endpoint } => Arc::new(OllamaBackend::new(endpoint.clone())),
    }
}

pub fn provider_label(provider: &ProviderConfig) -> &'static str {
    match provider {
        ProviderConfig::Hosted { .. } => "hosted",
        ProviderConfig::OpenAI { .. } => "openai",
        ProviderConfig::Anthropic { .. } => "anthropic",
        ProviderConfig::Ollama { .. } => "ollama",
    }
}
