//! TOML configuration parsing and validation.
//!
//! Every section is optional; a missing file section falls back to the
//! defaults below, so HealthDoc runs without any config file at all.
//! The chat-model credential is never read from this file: it comes from
//! `OPENAI_API_KEY` in the environment.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::Path;

/// Environment variable holding the hosted model credential.
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub chat: ChatConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    1000
}
fn default_chunk_overlap() -> usize {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExtractionConfig {
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            max_file_bytes: default_max_file_bytes(),
        }
    }
}

fn default_max_file_bytes() -> u64 {
    50 * 1024 * 1024
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default)]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Ollama server URL.
    #[serde(default)]
    pub url: Option<String>,
    /// OpenAI-compatible API root.
    #[serde(default)]
    pub base_url: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            batch_size: default_batch_size(),
            max_retries: 0,
            timeout_secs: default_timeout_secs(),
            url: None,
            base_url: None,
        }
    }
}

fn default_provider() -> String {
    "openai".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
        }
    }
}

fn default_top_k() -> usize {
    4
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatConfig {
    #[serde(default = "default_chat_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_chat_timeout_secs")]
    pub timeout_secs: u64,
    /// Rephrase follow-up questions into standalone ones before retrieval.
    #[serde(default = "default_condense_question")]
    pub condense_question: bool,
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            model: default_chat_model(),
            temperature: default_temperature(),
            timeout_secs: default_chat_timeout_secs(),
            condense_question: default_condense_question(),
            base_url: default_base_url(),
        }
    }
}

fn default_chat_model() -> String {
    "gpt-3.5-turbo".to_string()
}
fn default_temperature() -> f32 {
    0.2
}
fn default_chat_timeout_secs() -> u64 {
    60
}
fn default_condense_question() -> bool {
    true
}
pub(crate) fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

impl Config {
    /// Parse and validate a config from TOML text.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).context("Failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunking.chunk_size == 0 {
            bail!("chunking.chunk_size must be > 0");
        }
        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            bail!(
                "chunking.chunk_overlap ({}) must be smaller than chunking.chunk_size ({})",
                self.chunking.chunk_overlap,
                self.chunking.chunk_size
            );
        }

        if self.retrieval.top_k < 1 {
            bail!("retrieval.top_k must be >= 1");
        }

        if !(0.0..=2.0).contains(&self.chat.temperature) {
            bail!("chat.temperature must be in [0.0, 2.0]");
        }
        if self.chat.timeout_secs == 0 {
            bail!("chat.timeout_secs must be > 0");
        }

        if self.embedding.batch_size == 0 {
            bail!("embedding.batch_size must be > 0");
        }
        if self.embedding.dims == Some(0) {
            bail!("embedding.dims must be > 0 when set");
        }
        if self.embedding.timeout_secs == 0 {
            bail!("embedding.timeout_secs must be > 0");
        }

        match self.embedding.provider.as_str() {
            "openai" | "ollama" | "local" => {}
            other => bail!(
                "Unknown embedding provider: '{}'. Must be openai, ollama, or local.",
                other
            ),
        }

        if self.embedding.provider == "ollama" && self.embedding.model.is_none() {
            bail!("embedding.model must be specified when provider is 'ollama'");
        }

        Ok(())
    }
}

/// Load a config file. Fails if the file is missing or invalid.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    Config::from_toml(&content)
}

/// Load `path` if given; otherwise fall back to `default_path` when it
/// exists, and to built-in defaults when it does not.
pub fn load_or_default(path: Option<&Path>, default_path: &Path) -> Result<Config> {
    match path {
        Some(p) => load_config(p),
        None if default_path.exists() => load_config(default_path),
        None => Ok(Config::default()),
    }
}

/// Read the hosted model credential from the environment.
pub fn api_key_from_env() -> Result<String> {
    match std::env::var(API_KEY_ENV) {
        Ok(key) if !key.trim().is_empty() => Ok(key),
        _ => bail!(
            "{} not found. Set it in your environment or in a .env file.",
            API_KEY_ENV
        ),
    }
}
