use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub source: SourceConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub server: ServerConfig,
    /// Prompt template for the chat engine. Must contain `{context}` and
    /// `{question}`; `{chat_history}` is substituted when present.
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    /// Directory scanned for `.docx` files by `docmill extract`.
    pub dir: PathBuf,
    /// Path of the persisted corpus snapshot JSON.
    pub corpus_path: PathBuf,
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
    600
}
fn default_chunk_overlap() -> usize {
    150
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// `"gemini"`, `"openai"`, or `"disabled"`.
    #[serde(default = "default_disabled")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_disabled(),
            model: None,
            dims: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_disabled() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    /// `"local"` (SQLite), `"pinecone"` (managed index), or `"memory"`.
    #[serde(default = "default_store_backend")]
    pub backend: String,
    /// SQLite database path for the local backend.
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
    /// Index name, used for reporting and as the Pinecone index identifier.
    #[serde(default = "default_index_name")]
    pub index_name: String,
    /// Data-plane host of the Pinecone index (e.g.
    /// `"myindex-abc1234.svc.aped-4627-b74a.pinecone.io"`).
    #[serde(default)]
    pub index_host: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_store_backend(),
            path: default_store_path(),
            index_name: default_index_name(),
            index_host: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_store_backend() -> String {
    "local".to_string()
}
fn default_store_path() -> PathBuf {
    PathBuf::from("./data/docmill.sqlite")
}
fn default_index_name() -> String {
    "docmill".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    /// Only `"gemini"` is currently implemented.
    #[serde(default = "default_llm_provider")]
    pub provider: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
    #[serde(default = "default_top_p")]
    pub top_p: f64,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            model: default_llm_model(),
            temperature: default_temperature(),
            max_output_tokens: default_max_output_tokens(),
            top_p: default_top_p(),
            timeout_secs: default_llm_timeout_secs(),
        }
    }
}

fn default_llm_provider() -> String {
    "gemini".to_string()
}
fn default_llm_model() -> String {
    "gemini-2.0-flash".to_string()
}
fn default_temperature() -> f64 {
    0.3
}
fn default_max_output_tokens() -> u32 {
    2048
}
fn default_top_p() -> f64 {
    0.8
}
fn default_llm_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Number of nearest-neighbor chunks fed to the LLM per question.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Maximum number of question/answer turns kept in conversation memory.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            history_limit: default_history_limit(),
        }
    }
}

fn default_top_k() -> usize {
    5
}
fn default_history_limit() -> usize {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

fn default_system_prompt() -> String {
    "Tu es un assistant IA spécialisé dans l'analyse de documents. Tu dois :\n\
     1. Répondre de manière précise et concise aux questions posées\n\
     2. Utiliser uniquement les informations fournies dans le contexte\n\
     3. Si tu ne trouves pas l'information dans le contexte, dire clairement que tu ne peux pas répondre\n\
     4. Structurer tes réponses de manière claire et professionnelle\n\
     5. Citer les sources pertinentes dans ta réponse\n\
     6. Maintenir un ton professionnel et objectif\n\
     \n\
     Historique :\n{chat_history}\n\
     \n\
     Contexte : {context}\n\
     \n\
     Question : {question}\n\
     \n\
     Réponse :"
        .to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    // Validate chunking
    if config.chunking.chunk_size == 0 {
        anyhow::bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.chunk_overlap >= config.chunking.chunk_size {
        anyhow::bail!("chunking.chunk_overlap must be smaller than chunking.chunk_size");
    }

    // Validate retrieval
    if config.retrieval.top_k == 0 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }

    // Validate embedding
    if config.embedding.is_enabled() {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }

    match config.embedding.provider.as_str() {
        "disabled" | "gemini" | "openai" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, gemini, or openai.",
            other
        ),
    }

    match config.store.backend.as_str() {
        "local" | "memory" => {}
        "pinecone" => {
            if config.store.index_host.as_deref().unwrap_or("").is_empty() {
                anyhow::bail!("store.index_host must be set when backend is 'pinecone'");
            }
        }
        other => anyhow::bail!(
            "Unknown store backend: '{}'. Must be local, pinecone, or memory.",
            other
        ),
    }

    if !config.system_prompt.contains("{context}") || !config.system_prompt.contains("{question}")
    {
        anyhow::bail!("system_prompt must contain the {{context}} and {{question}} placeholders");
    }

    Ok(config)
}
