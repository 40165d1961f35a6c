//! Configuration types for the studio workspace.
//!
//! Settings come from a TOML file; secrets only from the environment.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::retry::{RetryOn, RetryPolicy};

/// Main configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StudioConfig {
    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Embedding configuration.
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Vector index configuration.
    #[serde(default)]
    pub vector_store: VectorStoreConfig,

    /// Reranking configuration.
    #[serde(default)]
    pub rerank: RerankConfig,

    /// Chunking configuration.
    #[serde(default)]
    pub chunking: ChunkingConfig,

    /// Chat model configuration.
    #[serde(default)]
    pub chat: ChatConfig,

    /// Retry configuration.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Batch media jobs.
    #[serde(default)]
    pub media: MediaConfig,

    /// Workflow event API.
    #[serde(default)]
    pub workflow: WorkflowConfig,

    /// Upload limits.
    #[serde(default)]
    pub upload: UploadConfig,
}

/// Database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to SQLite database file.
    #[serde(default = "default_database_path")]
    pub path: PathBuf,

    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_ms: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            busy_timeout_ms: 30000,
        }
    }
}

/// Embedding configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// OpenAI-compatible base URL.
    #[serde(default = "default_openai_base")]
    pub base_url: String,

    /// Embedding model name.
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Vector dimension of the model.
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,

    /// Inputs per embedding request.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            base_url: default_openai_base(),
            model: default_embedding_model(),
            dimension: 1536,
            batch_size: 96,
        }
    }
}

/// Vector index configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorStoreConfig {
    /// Index name (informational; the host addresses the index).
    #[serde(default = "default_index_name")]
    pub index_name: String,

    /// Records per upsert request.
    #[serde(default = "default_upsert_batch")]
    pub upsert_batch_size: usize,
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            index_name: default_index_name(),
            upsert_batch_size: 100,
        }
    }
}

/// Reranking configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerankConfig {
    /// Set to false to disable reranking entirely.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Reranking model.
    #[serde(default = "default_rerank_model")]
    pub model: String,

    /// Maximum tokens per document sent for reranking.
    #[serde(default = "default_max_tokens_per_doc")]
    pub max_tokens_per_doc: u32,

    /// Similarity results fetched before reranking.
    #[serde(default = "default_initial_results")]
    pub initial_results: usize,

    /// Results kept after reranking.
    #[serde(default = "default_final_results")]
    pub final_results: usize,
}

impl Default for RerankConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            model: default_rerank_model(),
            max_tokens_per_doc: 4096,
            initial_results: 20,
            final_results: 10,
        }
    }
}

/// Chunking configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Maximum characters per chunk.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Characters of overlap between chunks.
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 2000,
            chunk_overlap: 400,
        }
    }
}

/// Chat model configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// OpenAI-compatible base URL.
    #[serde(default = "default_openai_base")]
    pub base_url: String,

    /// Model used for document chat.
    #[serde(default = "default_chat_model")]
    pub model: String,

    /// Sampling temperature for document chat.
    #[serde(default = "default_chat_temperature")]
    pub temperature: f32,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            base_url: default_openai_base(),
            model: default_chat_model(),
            temperature: 0.1,
        }
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Attempts per remote call.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay when the provider does not specify one, in seconds.
    #[serde(default = "default_retry_delay")]
    pub default_delay_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 6,
            default_delay_secs: 10,
        }
    }
}

impl RetryConfig {
    /// Policy retrying transient failures with these settings.
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            default_delay: Duration::from_secs(self.default_delay_secs),
            retry_on: RetryOn::Transient,
        }
    }
}

/// Batch media job configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaConfig {
    /// Root directory for generated files.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Pause between generation requests, in seconds.
    #[serde(default = "default_throttle")]
    pub throttle_secs: u64,

    /// Model that rewrites a theme into an image prompt.
    #[serde(default = "default_prompt_model")]
    pub prompt_model: String,

    /// Image model.
    #[serde(default = "default_image_model")]
    pub image_model: String,

    /// Image sizes generated per theme, `WIDTHxHEIGHT`.
    #[serde(default = "default_image_sizes")]
    pub image_sizes: Vec<String>,

    /// Text-to-speech model.
    #[serde(default = "default_speech_model")]
    pub speech_model: String,

    /// Reference voice sample for speech synthesis.
    #[serde(default = "default_speaker_voice")]
    pub speaker_voice: String,

    /// Model for blog outlines.
    #[serde(default = "default_prompt_model")]
    pub outline_model: String,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            throttle_secs: 10,
            prompt_model: default_prompt_model(),
            image_model: default_image_model(),
            image_sizes: default_image_sizes(),
            speech_model: default_speech_model(),
            speaker_voice: default_speaker_voice(),
            outline_model: default_prompt_model(),
        }
    }
}

/// Workflow event API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Event API base URL.
    #[serde(default = "default_workflow_base")]
    pub base_url: String,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            base_url: default_workflow_base(),
        }
    }
}

/// Upload limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Maximum accepted file size in bytes.
    #[serde(default = "default_max_upload")]
    pub max_file_size: u64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_file_size: default_max_upload(),
        }
    }
}

/// Provider credentials, read from the environment.
#[derive(Debug, Clone, Default)]
pub struct ApiKeys {
    pub openai: Option<String>,
    pub cohere: Option<String>,
    pub pinecone: Option<String>,
    pub pinecone_host: Option<String>,
    pub replicate: Option<String>,
    pub workflow_event_key: Option<String>,
}

impl ApiKeys {
    /// Read every known key; empty values count as absent.
    pub fn from_env() -> Self {
        fn var(name: &str) -> Option<String> {
            std::env::var(name).ok().filter(|v| !v.trim().is_empty())
        }

        Self {
            openai: var("OPENAI_API_KEY"),
            cohere: var("COHERE_API_KEY"),
            pinecone: var("PINECONE_API_KEY"),
            pinecone_host: var("PINECONE_INDEX_HOST"),
            replicate: var("REPLICATE_API_TOKEN"),
            workflow_event_key: var("INNGEST_EVENT_KEY"),
        }
    }

    /// Fetch a key or fail with a configuration error naming the variable.
    pub fn require<'a>(key: &'a Option<String>, env_name: &str) -> crate::error::Result<&'a str> {
        key.as_deref().ok_or_else(|| {
            crate::error::StudioError::config(format!("{} is not set", env_name))
        })
    }
}

// Default value functions

fn default_true() -> bool {
    true
}

fn default_busy_timeout() -> u32 {
    30000
}

fn default_openai_base() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_embedding_dimension() -> usize {
    1536
}

fn default_batch_size() -> usize {
    96
}

fn default_index_name() -> String {
    "rag-documents".to_string()
}

fn default_upsert_batch() -> usize {
    100
}

fn default_rerank_model() -> String {
    "rerank-v3.5".to_string()
}

fn default_max_tokens_per_doc() -> u32 {
    4096
}

fn default_initial_results() -> usize {
    20
}

fn default_final_results() -> usize {
    10
}

fn default_chunk_size() -> usize {
    2000
}

fn default_chunk_overlap() -> usize {
    400
}

fn default_chat_model() -> String {
    "gpt-5-mini-2025-08-07".to_string()
}

fn default_chat_temperature() -> f32 {
    0.1
}

fn default_max_attempts() -> u32 {
    6
}

fn default_retry_delay() -> u64 {
    10
}

fn default_throttle() -> u64 {
    10
}

fn default_prompt_model() -> String {
    "meta/meta-llama-3-8b-instruct".to_string()
}

fn default_image_model() -> String {
    "stability-ai/sdxl:7762fd07cf82c948538e41f63f77d685e02b063e37e496e96eefd46c929f9bdc"
        .to_string()
}

fn default_image_sizes() -> Vec<String> {
    vec![
        "1024x1024".to_string(),
        "1280x720".to_string(),
        "720x1280".to_string(),
    ]
}

fn default_speech_model() -> String {
    "lucataco/xtts-v2:684bc3855b37866c0c65add2ff39c78f3dea3f4ff103a436465326e0f438d55e"
        .to_string()
}

fn default_speaker_voice() -> String {
    "https://replicate.delivery/pbxt/Jt79w0xsT64R1JsiJ0LQRL8UcWspg5J4RFrU6YwEKpOT1ukS/male.wav"
        .to_string()
}

fn default_workflow_base() -> String {
    "https://inn.gs".to_string()
}

fn default_max_upload() -> u64 {
    100 * 1024 * 1024
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("generated")
}

fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("genai-studio")
        .join("studio.db")
}

impl StudioConfig {
    /// Load configuration from file.
    pub fn load(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text.
    pub fn from_toml(content: &str) -> crate::error::Result<Self> {
        toml::from_str(content).map_err(|e| crate::error::StudioError::Config {
            message: format!("Failed to parse config: {}", e),
        })
    }

    /// Load configuration from default paths.
    pub fn load_default() -> crate::error::Result<Self> {
        // Try user config first
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("genai-studio").join("config.toml");
            if user_config.exists() {
                return Self::load(&user_config);
            }
        }

        // Try local config
        let local_config = PathBuf::from("studio.toml");
        if local_config.exists() {
            return Self::load(&local_config);
        }

        Ok(Self::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = StudioConfig::default();
        assert_eq!(config.chunking.chunk_size, 2000);
        assert_eq!(config.chunking.chunk_overlap, 400);
        assert_eq!(config.rerank.initial_results, 20);
        assert_eq!(config.rerank.final_results, 10);
        assert_eq!(config.embedding.dimension, 1536);
        assert_eq!(config.upload.max_file_size, 100 * 1024 * 1024);
    }

    #[test]
    fn test_partial_toml() {
        let config = StudioConfig::from_toml(
            r#"
            [rerank]
            enabled = false

            [retry]
            max_attempts = 3
            "#,
        )
        .unwrap();
        assert!(!config.rerank.enabled);
        assert_eq!(config.rerank.model, "rerank-v3.5");
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.default_delay_secs, 10);
        assert_eq!(config.media.image_sizes.len(), 3);
    }

    #[test]
    fn test_bad_toml() {
        let err = StudioConfig::from_toml("[chunking\nchunk_size = 1").unwrap_err();
        assert_eq!(err.error_code(), "CONFIG_ERROR");
    }

    #[test]
    fn test_retry_policy_from_config() {
        let policy = RetryConfig::default().policy();
        assert_eq!(policy.max_attempts, 6);
        assert_eq!(policy.default_delay, Duration::from_secs(10));
    }

    #[test]
    fn test_require_key() {
        let keys = ApiKeys::default();
        let err = ApiKeys::require(&keys.openai, "OPENAI_API_KEY").unwrap_err();
        assert!(err.to_string().contains("OPENAI_API_KEY"));
    }
}
