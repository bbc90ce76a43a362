//! TOML configuration for the assistant.
//!
//! Every section except `[documents]` is optional and falls back to the
//! defaults below. [`load_config`] parses and validates in one step so the
//! rest of the application can trust the values it reads.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use hr_retrieval_core::chunk::{ChunkingParams, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};
use hr_retrieval_core::index::{BuildOptions, DEFAULT_INSERT_BATCH_SIZE, DEFAULT_INSERT_RETRIES};
use hr_retrieval_core::query::{AcronymMap, DEFAULT_ACRONYMS};
use hr_retrieval_core::search::{
    RetrievalParams, DEFAULT_FINGERPRINT_PREFIX_CHARS, DEFAULT_KEYWORD_K,
    DEFAULT_MAX_CONTEXT_CHUNKS, DEFAULT_VECTOR_K,
};
use hr_retrieval_core::special::BotProfile;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub documents: DocumentsConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub query: QueryConfig,
    #[serde(default)]
    pub assistant: AssistantConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DocumentsConfig {
    pub folder: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

fn default_include_globs() -> Vec<String> {
    ["**/*.pdf", "**/*.docx", "**/*.md", "**/*.txt"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}
fn default_chunk_overlap() -> usize {
    DEFAULT_CHUNK_OVERLAP
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

impl ChunkingConfig {
    pub fn params(&self) -> ChunkingParams {
        ChunkingParams {
            chunk_size: self.chunk_size,
            chunk_overlap: self.chunk_overlap,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_vector_k")]
    pub vector_k: usize,
    #[serde(default = "default_keyword_k")]
    pub keyword_k: usize,
    #[serde(default = "default_max_context_chunks")]
    pub max_context_chunks: usize,
    #[serde(default = "default_fingerprint_prefix_chars")]
    pub fingerprint_prefix_chars: usize,
    #[serde(default)]
    pub max_vector_distance: Option<f64>,
    #[serde(default = "default_insert_batch_size")]
    pub insert_batch_size: usize,
    #[serde(default = "default_insert_retries")]
    pub insert_retries: usize,
}

fn default_vector_k() -> usize {
    DEFAULT_VECTOR_K
}
fn default_keyword_k() -> usize {
    DEFAULT_KEYWORD_K
}
fn default_max_context_chunks() -> usize {
    DEFAULT_MAX_CONTEXT_CHUNKS
}
fn default_fingerprint_prefix_chars() -> usize {
    DEFAULT_FINGERPRINT_PREFIX_CHARS
}
fn default_insert_batch_size() -> usize {
    DEFAULT_INSERT_BATCH_SIZE
}
fn default_insert_retries() -> usize {
    DEFAULT_INSERT_RETRIES
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            vector_k: DEFAULT_VECTOR_K,
            keyword_k: DEFAULT_KEYWORD_K,
            max_context_chunks: DEFAULT_MAX_CONTEXT_CHUNKS,
            fingerprint_prefix_chars: DEFAULT_FINGERPRINT_PREFIX_CHARS,
            max_vector_distance: None,
            insert_batch_size: DEFAULT_INSERT_BATCH_SIZE,
            insert_retries: DEFAULT_INSERT_RETRIES,
        }
    }
}

impl RetrievalConfig {
    pub fn params(&self) -> RetrievalParams {
        RetrievalParams {
            vector_k: self.vector_k,
            keyword_k: self.keyword_k,
            max_context_chunks: self.max_context_chunks,
            fingerprint_prefix_chars: self.fingerprint_prefix_chars,
            max_vector_distance: self.max_vector_distance,
        }
    }

    pub fn build_options(&self) -> BuildOptions {
        BuildOptions {
            insert_batch_size: self.insert_batch_size,
            insert_retries: self.insert_retries,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL. OpenAI: `https://api.openai.com/v1`; Ollama: `http://localhost:11434`.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_embedding_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            dims: None,
            url: None,
            api_key_env: default_api_key_env(),
            max_retries: 5,
            timeout_secs: 30,
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}
fn default_max_retries() -> u32 {
    5
}
fn default_embedding_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_generation_url")]
    pub url: String,
    #[serde(default = "default_generation_model")]
    pub model: String,
    /// Environment variable holding the bearer token. Unset means no auth header.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default = "default_generation_retries")]
    pub max_retries: u32,
    #[serde(default = "default_generation_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_generation_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_generation_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_temperature() -> f32 {
    0.3
}
fn default_generation_retries() -> u32 {
    2
}
fn default_generation_timeout_secs() -> u64 {
    120
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            url: default_generation_url(),
            model: default_generation_model(),
            api_key_env: default_api_key_env(),
            temperature: default_temperature(),
            max_tokens: None,
            max_retries: default_generation_retries(),
            timeout_secs: default_generation_timeout_secs(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct QueryConfig {
    /// Ask the generation model for extra phrasings before retrieval.
    #[serde(default)]
    pub llm_expansion: bool,
    /// Replaces the built-in acronym table when present.
    #[serde(default)]
    pub acronyms: Option<BTreeMap<String, String>>,
}

impl QueryConfig {
    pub fn acronym_map(&self) -> AcronymMap {
        match &self.acronyms {
            Some(table) => AcronymMap::new(table.iter().map(|(k, v)| (k.as_str(), v.clone()))),
            None => AcronymMap::new(DEFAULT_ACRONYMS.iter().copied()),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AssistantConfig {
    #[serde(default = "default_bot_name")]
    pub name: String,
    #[serde(default = "default_creator")]
    pub creator: String,
    #[serde(default = "default_responsibility")]
    pub responsibility: String,
    #[serde(default = "default_capabilities")]
    pub capabilities: String,
    /// Markdown file returned verbatim for holiday questions. A relative
    /// path is resolved against the config file's directory.
    #[serde(default)]
    pub holiday_calendar: Option<PathBuf>,
}

fn default_bot_name() -> String {
    BotProfile::default().name
}
fn default_creator() -> String {
    BotProfile::default().creator
}
fn default_responsibility() -> String {
    BotProfile::default().responsibility
}
fn default_capabilities() -> String {
    BotProfile::default().capabilities
}

impl Default for AssistantConfig {
    fn default() -> Self {
        let p = BotProfile::default();
        Self {
            name: p.name,
            creator: p.creator,
            responsibility: p.responsibility,
            capabilities: p.capabilities,
            holiday_calendar: None,
        }
    }
}

impl AssistantConfig {
    fn resolve_paths(&mut self, base: &Path) {
        if let Some(calendar) = self.holiday_calendar.as_mut() {
            if calendar.is_relative() {
                *calendar = base.join(&*calendar);
            }
        }
    }

    pub fn profile(&self) -> BotProfile {
        BotProfile {
            name: self.name.clone(),
            creator: self.creator.clone(),
            responsibility: self.responsibility.clone(),
            capabilities: self.capabilities.clone(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

/// Parse and validate configuration text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    let mut config =
        parse_config(&content).with_context(|| format!("Invalid config: {}", path.display()))?;
    if let Some(dir) = path.parent() {
        config.assistant.resolve_paths(dir);
    }
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    config.chunking.params().validate()?;

    let r = &config.retrieval;
    if r.max_context_chunks < 1 {
        bail!("retrieval.max_context_chunks must be >= 1");
    }
    if r.insert_batch_size < 1 {
        bail!("retrieval.insert_batch_size must be >= 1");
    }
    if r.fingerprint_prefix_chars < 1 {
        bail!("retrieval.fingerprint_prefix_chars must be >= 1");
    }
    if let Some(d) = r.max_vector_distance {
        if !(0.0..=2.0).contains(&d) {
            bail!("retrieval.max_vector_distance must be in [0.0, 2.0]");
        }
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "ollama" | "local" => {}
        other => bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, ollama, or local.",
            other
        ),
    }
    // The local provider resolves model and dims from its own table.
    if config.embedding.is_enabled() && config.embedding.provider != "local" {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }

    if !(0.0..=2.0).contains(&config.generation.temperature) {
        bail!("generation.temperature must be in [0.0, 2.0]");
    }

    Ok(())
}
