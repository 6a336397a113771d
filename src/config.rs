//! Runtime configuration read from the environment (and an optional `.env`).

use std::path::PathBuf;
use thiserror::Error;

use crate::ai::ollama;
use crate::types::User;

const DEFAULT_HOSTED_MODEL: &str = "gpt-oss-120b";
const DEFAULT_OPENAI_MODEL: &str = "gpt-4o";
const DEFAULT_ANTHROPIC_MODEL: &str = "claude-3-5-sonnet-20241022";
const DEFAULT_OLLAMA_MODEL: &str = "llama3.1:latest";
const FALLBACK_USER_ID: &str = "local";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error(
        "No AI provider configured. Set CHATDESK_ENDPOINT, OPENAI_API_KEY, ANTHROPIC_API_KEY, or CHATDESK_USE_OLLAMA=true"
    )]
    NoProvider,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProviderConfig {
    Hosted {
        endpoint: String,
        api_key: Option<String>,
    },
    OpenAI {
        api_key: String,
    },
    Anthropic {
        api_key: String,
    },
    Ollama {
        endpoint: String,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub struct AppConfig {
    pub user: User,
    pub data_dir: Option<PathBuf>,
    pub model: String,
    pub provider: ProviderConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let provider = detect_provider(&get)?;
        let model = get("CHATDESK_MODEL").unwrap_or_else(|| default_model(&provider, &get));

        let user_id = get("CHATDESK_USER_ID")
            .or_else(|| get("USER"))
            .or_else(|| get("USERNAME"))
            .unwrap_or_else(|| FALLBACK_USER_ID.to_string());
        let user = User {
            id: user_id,
            display_name: get("CHATDESK_USER_NAME"),
        };

        Ok(Self {
            user,
            data_dir: get("CHATDESK_DATA_DIR").map(PathBuf::from),
            model,
            provider,
        })
    }
}

pub fn parse_flag(value: Option<String>) -> bool {
    matches!(
        value.unwrap_or_default().trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Priority: hosted endpoint, OpenAI, Anthropic, local Ollama.
fn detect_provider(lookup: &impl Fn(&str) -> Option<String>) -> Result<ProviderConfig, ConfigError> {
    if let Some(endpoint) = lookup("CHATDESK_ENDPOINT") {
        return Ok(ProviderConfig::Hosted {
            endpoint,
            api_key: lookup("CHATDESK_API_KEY"),
        });
    }

    if let Some(api_key) = lookup("OPENAI_API_KEY") {
        return Ok(ProviderConfig::OpenAI { api_key });
    }

    if let Some(api_key) = lookup("ANTHROPIC_API_KEY") {
        return Ok(ProviderConfig::Anthropic { api_key });
    }

    if parse_flag(lookup("CHATDESK_USE_OLLAMA")) {
        let endpoint =
            lookup("OLLAMA_ENDPOINT").unwrap_or_else(|| ollama::DEFAULT_ENDPOINT.to_string());
        return Ok(ProviderConfig::Ollama { endpoint });
    }

    Err(ConfigError::NoProvider)
}

fn default_model(provider: &ProviderConfig, lookup: &impl Fn(&str) -> Option<String>) -> String {
    match provider {
        ProviderConfig::Hosted { .. } => DEFAULT_HOSTED_MODEL.to_string(),
        ProviderConfig::OpenAI { .. } => {
            lookup("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string())
        }
        ProviderConfig::Anthropic { .. } => {
            lookup("ANTHROPIC_MODEL").unwrap_or_else(|| DEFAULT_ANTHROPIC_MODEL.to_string())
        }
        ProviderConfig::Ollama { .. } => DEFAULT_OLLAMA_MODEL.to_string(),
    }
}
