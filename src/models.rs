//! Model registry: which chat models can back the synthesizer.
//!
//! Ids are `provider/model`, e.g. `ollama/llama3.1` or
//! `openrouter/anthropic/claude-3.5-sonnet`. Hosted providers are listed only
//! when their API key is present in the environment.

use anyhow::{bail, Result};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use crate::config::LlmConfig;
use crate::llm::OpenAiCompatClient;
use crate::synthesizer::{LlmSynthesizer, Synthesizer};

const OPENAI_BASE_URL: &str = "https://api.openai.com";
const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Ollama,
    OpenAi,
    OpenRouter,
}

impl Provider {
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Ollama => "ollama",
            Self::OpenAi => "openai",
            Self::OpenRouter => "openrouter",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelInfo {
    pub id: String,
    pub display_name: String,
    pub description: String,
    pub is_free: bool,
    pub provider: Provider,
}

impl ModelInfo {
    /// Name the provider knows the model by (the id without its prefix).
    pub fn provider_model(&self) -> &str {
        self.id
            .strip_prefix(self.provider.prefix())
            .and_then(|rest| rest.strip_prefix('/'))
            .unwrap_or(&self.id)
    }
}

/// Source of synthesizer backends for [`crate::agent::IterativeAgent::set_model`].
pub trait ModelCatalog: Send + Sync {
    fn available_models(&self) -> Vec<ModelInfo>;

    fn build(&self, model: &ModelInfo) -> Result<Arc<dyn Synthesizer>>;

    fn find(&self, id: &str) -> Option<ModelInfo> {
        self.available_models().into_iter().find(|m| m.id == id)
    }
}

/// Catalog over the OpenAI-compatible endpoints named in `[llm]`.
pub struct LlmCatalog {
    config: LlmConfig,
    openai_key: Option<String>,
    openrouter_key: Option<String>,
    timeout: Duration,
}

impl LlmCatalog {
    /// Keys are read from `OPENAI_API_KEY` and `OPENROUTER_API_KEY`.
    pub fn from_env(config: LlmConfig, timeout: Duration) -> Self {
        let key = |name: &str| std::env::var(name).ok().filter(|k| !k.trim().is_empty());
        Self::new(
            config,
            key("OPENAI_API_KEY"),
            key("OPENROUTER_API_KEY"),
            timeout,
        )
    }

    pub fn new(
        config: LlmConfig,
        openai_key: Option<String>,
        openrouter_key: Option<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            config,
            openai_key,
            openrouter_key,
            timeout,
        }
    }

    fn endpoint(&self, provider: Provider) -> (String, Option<String>) {
        match provider {
            Provider::Ollama => (self.config.ollama_url.clone(), None),
            Provider::OpenAi => (OPENAI_BASE_URL.to_string(), self.openai_key.clone()),
            Provider::OpenRouter => (OPENROUTER_BASE_URL.to_string(), self.openrouter_key.clone()),
        }
    }
}

fn entry(provider: Provider, name: &str) -> ModelInfo {
    let (display_name, description, is_free) = match provider {
        Provider::Ollama => (
            format!("{name} (local)"),
            format!("Runs locally through Ollama ({name})"),
            true,
        ),
        Provider::OpenAi => (
            format!("OpenAI {name}"),
            format!("OpenAI hosted model {name}; billed per token"),
            false,
        ),
        Provider::OpenRouter => (
            name.rsplit('/').next().unwrap_or(name).to_string(),
            format!("{name} via OpenRouter; billed per token"),
            name.ends_with(":free"),
        ),
    };
    ModelInfo {
        id: format!("{}/{name}", provider.prefix()),
        display_name,
        description,
        is_free,
        provider,
    }
}

impl ModelCatalog for LlmCatalog {
    fn available_models(&self) -> Vec<ModelInfo> {
        let mut models: Vec<ModelInfo> = self
            .config
            .ollama_models
            .iter()
            .map(|name| entry(Provider::Ollama, name))
            .collect();
        if self.openai_key.is_some() {
            models.extend(
                self.config
                    .openai_models
                    .iter()
                    .map(|name| entry(Provider::OpenAi, name)),
            );
        }
        if self.openrouter_key.is_some() {
            models.extend(
                self.config
                    .openrouter_models
                    .iter()
                    .map(|name| entry(Provider::OpenRouter, name)),
            );
        }
        models
    }

    fn build(&self, model: &ModelInfo) -> Result<Arc<dyn Synthesizer>> {
        let (base_url, api_key) = self.endpoint(model.provider);
        if model.provider != Provider::Ollama && api_key.is_none() {
            bail!("no API key configured for {}", model.provider.prefix());
        }
        let client =
            OpenAiCompatClient::new(base_url, model.provider_model(), api_key, self.timeout)?;
        Ok(Arc::new(LlmSynthesizer::new(
            Box::new(client),
            model.id.clone(),
            self.config.temperature,
            self.config.max_tokens,
        )))
    }
}
