use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct SuttaConfig {
    pub logging: LoggingConfig,
    pub storage: StorageConfig,
    pub embedding: EmbeddingConfig,
    pub retrieval: RetrievalConfig,
    pub agent: AgentConfig,
    pub llm: LlmConfig,
    pub memory: MemoryConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub log_level: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// `local` (ONNX Runtime) or `ollama`.
    pub provider: String,
    pub model: String,
    pub cache_dir: String,
    pub ollama_url: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Chunks fetched per agent search round.
    pub top_k: usize,
    /// Chunks fetched by the grouped `search` command.
    pub search_top_k: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AgentConfig {
    pub max_iterations: u32,
    pub retrieval_timeout_secs: u64,
    pub llm_timeout_secs: u64,
    pub snippet_chars: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LlmConfig {
    pub default_model: String,
    pub ollama_url: String,
    pub ollama_models: Vec<String>,
    pub openai_models: Vec<String>,
    pub openrouter_models: Vec<String>,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MemoryConfig {
    /// Drop ASCII punctuation when fingerprinting questions.
    pub strip_punctuation: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let db_path = default_sutta_dir()
            .join("sutta.db")
            .to_string_lossy()
            .into_owned();
        Self { db_path }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        let cache_dir = default_sutta_dir()
            .join("models")
            .to_string_lossy()
            .into_owned();
        Self {
            provider: "local".into(),
            model: "all-MiniLM-L6-v2".into(),
            cache_dir,
            ollama_url: "http://localhost:11434".into(),
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 8,
            search_top_k: 200,
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: 3,
            retrieval_timeout_secs: 30,
            llm_timeout_secs: 120,
            snippet_chars: 500,
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            default_model: "ollama/llama3.1".into(),
            ollama_url: "http://localhost:11434".into(),
            ollama_models: vec!["llama3.1".into(), "qwen2.5".into()],
            openai_models: vec!["gpt-4o-mini".into(), "gpt-4o".into()],
            openrouter_models: vec!["anthropic/claude-3.5-sonnet".into()],
            temperature: 0.2,
            max_tokens: 2048,
        }
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            strip_punctuation: true,
        }
    }
}

impl AgentConfig {
    pub fn retrieval_timeout(&self) -> Duration {
        Duration::from_secs(self.retrieval_timeout_secs)
    }

    pub fn llm_timeout(&self) -> Duration {
        Duration::from_secs(self.llm_timeout_secs)
    }
}

/// Returns `~/.sutta-agent/`, or `./.sutta-agent/` when no home directory is known.
pub fn default_sutta_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".sutta-agent")
}

/// Returns the default config file path: `~/.sutta-agent/config.toml`
pub fn default_config_path() -> PathBuf {
    default_sutta_dir().join("config.toml")
}

impl SuttaConfig {
    /// Load config from TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env var overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            SuttaConfig::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides (SUTTA_DB, SUTTA_LOG_LEVEL, SUTTA_MODEL, OLLAMA_HOST).
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("SUTTA_DB") {
            self.storage.db_path = val;
        }
        if let Ok(val) = std::env::var("SUTTA_LOG_LEVEL") {
            self.logging.log_level = val;
        }
        if let Ok(val) = std::env::var("SUTTA_MODEL") {
            self.llm.default_model = val;
        }
        if let Ok(val) = std::env::var("OLLAMA_HOST") {
            self.llm.ollama_url = val.clone();
            self.embedding.ollama_url = val;
        }
    }

    /// Resolve the database path, expanding `~` if needed.
    pub fn resolved_db_path(&self) -> PathBuf {
        expand_tilde(&self.storage.db_path)
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}
