use anyhow::{Context, Result};
use std::env;
use std::str::FromStr;

use crate::chunking::ChunkingConfig;

const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-004";
const DEFAULT_CHAT_MODEL: &str = "gemini-2.0-flash";
const DEFAULT_QDRANT_URL: &str = "http://localhost:6334";
const DEFAULT_COLLECTION: &str = "rag_documents";
const DEFAULT_TOP_K: u64 = 4;

/// Sampling parameters sent with every generation request
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationOptions {
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: i32,
    pub max_output_tokens: i32,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        GenerationOptions {
            temperature: 0.2,
            top_p: 0.8,
            top_k: 40,
            max_output_tokens: 1024,
        }
    }
}

/// Configuration for Gemini API
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub embedding_model: String,
    pub chat_model: String,
    /// Truncates embeddings to this many dimensions when set
    pub embedding_dimension: Option<u32>,
    pub embedding_batch_size: usize,
    pub generation: GenerationOptions,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        GeminiConfig {
            api_key: None,
            base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            embedding_dimension: None,
            embedding_batch_size: 100,
            generation: GenerationOptions::default(),
        }
    }
}

impl GeminiConfig {
    /// Create a new configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let defaults = GeminiConfig::default();
        let generation = GenerationOptions {
            temperature: parse_var("GEMINI_TEMPERATURE")?
                .unwrap_or(defaults.generation.temperature),
            top_p: parse_var("GEMINI_TOP_P")?.unwrap_or(defaults.generation.top_p),
            top_k: parse_var("GEMINI_TOP_K")?.unwrap_or(defaults.generation.top_k),
            max_output_tokens: parse_var("GEMINI_MAX_OUTPUT_TOKENS")?
                .unwrap_or(defaults.generation.max_output_tokens),
        };

        let embedding_batch_size =
            parse_var("GEMINI_EMBEDDING_BATCH_SIZE")?.unwrap_or(defaults.embedding_batch_size);
        if embedding_batch_size == 0 {
            anyhow::bail!("GEMINI_EMBEDDING_BATCH_SIZE must be greater than zero");
        }

        Ok(GeminiConfig {
            api_key: string_var("GEMINI_API_KEY"),
            base_url: string_var("GEMINI_BASE_URL").unwrap_or(defaults.base_url),
            embedding_model: string_var("GEMINI_EMBEDDING_MODEL")
                .unwrap_or(defaults.embedding_model),
            chat_model: string_var("GEMINI_CHAT_MODEL").unwrap_or(defaults.chat_model),
            embedding_dimension: parse_var("GEMINI_EMBEDDING_DIMENSION")?,
            embedding_batch_size,
            generation,
        })
    }

    /// The API key, or an error explaining how to provide one
    pub fn require_api_key(&self) -> Result<&str> {
        self.api_key
            .as_deref()
            .context("GEMINI_API_KEY is not set (export it or add it to .env)")
    }
}

/// Configuration for Qdrant
#[derive(Debug, Clone)]
pub struct QdrantConfig {
    pub url: String,
    pub api_key: Option<String>,
}

impl QdrantConfig {
    /// Create a new configuration from environment variables
    pub fn from_env() -> Self {
        QdrantConfig {
            url: string_var("QDRANT_URL").unwrap_or_else(|| DEFAULT_QDRANT_URL.to_string()),
            api_key: string_var("QDRANT_API_KEY"),
        }
    }
}

/// Everything the pipeline reads from the environment
#[derive(Debug, Clone)]
pub struct Config {
    pub gemini: GeminiConfig,
    pub qdrant: QdrantConfig,
    pub chunking: ChunkingConfig,
    pub collection: String,
    pub top_k: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let default_chunking = ChunkingConfig::default();
        let chunking = ChunkingConfig::new(
            parse_var("RAG_CHUNK_SIZE")?.unwrap_or(default_chunking.chunk_size),
            parse_var("RAG_CHUNK_OVERLAP")?.unwrap_or(default_chunking.chunk_overlap),
        )
        .context("Invalid RAG_CHUNK_SIZE / RAG_CHUNK_OVERLAP")?;

        let top_k = parse_var("RAG_TOP_K")?.unwrap_or(DEFAULT_TOP_K);
        if top_k == 0 {
            anyhow::bail!("RAG_TOP_K must be greater than zero");
        }

        Ok(Config {
            gemini: GeminiConfig::from_env()?,
            qdrant: QdrantConfig::from_env(),
            chunking,
            collection: string_var("RAG_COLLECTION")
                .unwrap_or_else(|| DEFAULT_COLLECTION.to_string()),
            top_k,
        })
    }
}

/// Read a variable, treating an empty value as unset
fn string_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_var<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    parse_value(name, string_var(name))
}

fn parse_value<T>(name: &str, raw: Option<String>) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.map(|value| {
        value
            .trim()
            .parse::<T>()
            .with_context(|| format!("Invalid value for {}: {:?}", name, value))
    })
    .transpose()
}
