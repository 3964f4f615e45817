use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub transcription: TranscriptionConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub cleanup: CleanupConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_ms")]
    pub chunk_ms: u64,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_ms: default_chunk_ms(),
        }
    }
}

fn default_chunk_ms() -> u64 {
    60_000
}

#[derive(Debug, Deserialize, Clone)]
pub struct TranscriptionConfig {
    #[serde(default = "default_transcription_provider")]
    pub provider: String,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_transcription_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_transcription_retries")]
    pub max_retries: u32,
    /// Path to the ffmpeg binary used to decode video audio.
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg: String,
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            provider: default_transcription_provider(),
            language: default_language(),
            api_key: None,
            url: None,
            model: None,
            timeout_secs: default_transcription_timeout(),
            max_retries: default_transcription_retries(),
            ffmpeg: default_ffmpeg(),
        }
    }
}

fn default_transcription_provider() -> String {
    "google".to_string()
}
fn default_language() -> String {
    "en-US".to_string()
}
fn default_transcription_timeout() -> u64 {
    60
}
fn default_transcription_retries() -> u32 {
    3
}
fn default_ffmpeg() -> String {
    "ffmpeg".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
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
    /// Base URL for the Ollama provider.
    #[serde(default)]
    pub url: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            dims: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            url: None,
        }
    }
}

fn default_embedding_provider() -> String {
    "local".to_string()
}
fn default_batch_size() -> usize {
    16
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_index_dir")]
    pub index_dir: PathBuf,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            index_dir: default_index_dir(),
        }
    }
}

fn default_top_k() -> usize {
    5
}
fn default_index_dir() -> PathBuf {
    PathBuf::from(".")
}

/// Destructive cleanup policy applied at the end of `process`.
#[derive(Debug, Deserialize, Clone)]
pub struct CleanupConfig {
    /// Remove the input root folder after the record is written.
    #[serde(default)]
    pub delete_root: bool,
    /// Remove the audio working directory after all chunks are transcribed.
    #[serde(default = "default_true")]
    pub delete_audio: bool,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            delete_root: false,
            delete_audio: true,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Load and validate a config file.
///
/// A missing file yields the built-in defaults; an unreadable or invalid
/// one is an error.
pub fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    if config.chunking.chunk_ms == 0 {
        anyhow::bail!("chunking.chunk_ms must be > 0");
    }

    if config.retrieval.top_k < 1 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }

    match config.transcription.provider.as_str() {
        "google" | "openai" => {}
        other => anyhow::bail!(
            "Unknown transcription provider: '{}'. Must be google or openai.",
            other
        ),
    }

    if config.embedding.batch_size == 0 {
        anyhow::bail!("embedding.batch_size must be > 0");
    }

    match config.embedding.provider.as_str() {
        "local" | "hash" => {}
        "openai" | "ollama" => {
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
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be local, openai, ollama, or hash.",
            other
        ),
    }

    Ok(())
}
